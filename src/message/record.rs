use super::ProtocolVersion;
use crate::util::{be_u48, put_u48};
use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

/// DTLS record header length (DTLS1_RT_HEADER_LENGTH).
pub const RECORD_HEADER_LEN: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordHeader {
    pub content_type: ContentType,
    pub version: ProtocolVersion,
    pub epoch: u16,
    /// 48 bit on the wire.
    pub sequence_number: u64,
    pub length: u16,
}

impl RecordHeader {
    /// Header of an epoch 0 handshake record announced as DTLS 1.0.
    ///
    /// RFC 6347 asks stateless server messages to use DTLS 1.0 regardless of
    /// the version that will be negotiated.
    pub fn handshake(length: u16) -> Self {
        RecordHeader {
            content_type: ContentType::Handshake,
            version: ProtocolVersion::DTLS1_0,
            epoch: 0,
            sequence_number: 0,
            length,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], RecordHeader> {
        let (input, content_type) = ContentType::parse(input)?;
        let (input, version) = ProtocolVersion::parse(input)?;
        let (input, epoch) = be_u16(input)?;
        let (input, sequence_number) = be_u48(input)?;
        let (input, length) = be_u16(input)?;

        Ok((
            input,
            RecordHeader {
                content_type,
                version,
                epoch,
                sequence_number,
                length,
            },
        ))
    }

    /// Parse the header and take the fragment it announces.
    pub fn parse_record(input: &[u8]) -> IResult<&[u8], (RecordHeader, &[u8])> {
        let (input, header) = Self::parse(input)?;
        let (input, fragment) = take(header.length as usize)(input)?;
        Ok((input, (header, fragment)))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.push(self.content_type.as_u8());
        self.version.serialize(output);
        output.extend_from_slice(&self.epoch.to_be_bytes());
        put_u48(self.sequence_number, output);
        output.extend_from_slice(&self.length.to_be_bytes());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    ChangeCipherSpec,
    Alert,
    Handshake,
    ApplicationData,
    Heartbeat,
    Unknown(u8),
}

impl Default for ContentType {
    fn default() -> Self {
        Self::Unknown(0)
    }
}

impl ContentType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            20 => ContentType::ChangeCipherSpec,
            21 => ContentType::Alert,
            22 => ContentType::Handshake,
            23 => ContentType::ApplicationData,
            24 => ContentType::Heartbeat,
            _ => ContentType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            ContentType::ChangeCipherSpec => 20,
            ContentType::Alert => 21,
            ContentType::Handshake => 22,
            ContentType::ApplicationData => 23,
            ContentType::Heartbeat => 24,
            ContentType::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ContentType> {
        let (input, byte) = be_u8(input)?;
        Ok((input, Self::from_u8(byte)))
    }
}

/// Split a buffer of concatenated records into one slice per record.
///
/// Engines write whole flights into one buffer; every record must leave as
/// its own datagram. Iteration stops at the first truncated record, whose
/// bytes (and everything after) are left in [`Records::remainder`].
pub fn split_records(buf: &[u8]) -> Records<'_> {
    Records { buf, pos: 0 }
}

pub struct Records<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Records<'a> {
    /// Bytes that did not form a complete record.
    pub fn remainder(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.buf[self.pos..];
        let (after, _) = RecordHeader::parse_record(rest).ok()?;
        let len = rest.len() - after.len();
        self.pos += len;
        Some(&rest[..len])
    }
}
