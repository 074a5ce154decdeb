use super::{ContentType, RecordHeader, RECORD_HEADER_LEN};
use crate::util::put_u24;
use nom::number::complete::{be_u16, be_u24, be_u8};
use nom::IResult;

/// Handshake message header length (DTLS1_HM_HEADER_LENGTH).
pub const HANDSHAKE_HEADER_LEN: usize = 12;

/// A record header followed by a handshake message header.
///
/// Only valid for unfragmented epoch 0 records, which is all the driver ever
/// looks at without an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandshakeHeader {
    pub record: RecordHeader,
    pub msg_type: MessageType,
    pub length: u32,
    pub message_seq: u16,
    pub fragment_offset: u32,
    pub fragment_length: u32,
}

impl HandshakeHeader {
    /// Header for a complete, unfragmented message with a `body_len` body.
    pub fn unfragmented(msg_type: MessageType, body_len: u32) -> Self {
        HandshakeHeader {
            record: RecordHeader::handshake((HANDSHAKE_HEADER_LEN as u32 + body_len) as u16),
            msg_type,
            length: body_len,
            message_seq: 0,
            fragment_offset: 0,
            fragment_length: body_len,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], HandshakeHeader> {
        let (input, record) = RecordHeader::parse(input)?;
        let (input, msg_type) = MessageType::parse(input)?;
        let (input, length) = be_u24(input)?;
        let (input, message_seq) = be_u16(input)?;
        let (input, fragment_offset) = be_u24(input)?;
        let (input, fragment_length) = be_u24(input)?;

        Ok((
            input,
            HandshakeHeader {
                record,
                msg_type,
                length,
                message_seq,
                fragment_offset,
                fragment_length,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        self.record.serialize(output);
        output.push(self.msg_type.as_u8());
        put_u24(self.length, output);
        output.extend_from_slice(&self.message_seq.to_be_bytes());
        put_u24(self.fragment_offset, output);
        put_u24(self.fragment_length, output);
    }

    pub fn is_handshake(&self) -> bool {
        self.record.content_type == ContentType::Handshake
    }

    /// Size of record header, handshake header and the announced body.
    pub fn wire_len(&self) -> usize {
        RECORD_HEADER_LEN + self.record.length as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    HelloRequest, // empty
    ClientHello,
    ServerHello,
    HelloVerifyRequest,
    NewSessionTicket,
    Certificate,
    ServerKeyExchange,
    CertificateRequest,
    ServerHelloDone, // empty
    CertificateVerify,
    ClientKeyExchange,
    Finished,
    CertificateStatus,
    Unknown(u8),
}

impl Default for MessageType {
    fn default() -> Self {
        Self::Unknown(255)
    }
}

impl MessageType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => MessageType::HelloRequest,
            1 => MessageType::ClientHello,
            2 => MessageType::ServerHello,
            3 => MessageType::HelloVerifyRequest,
            4 => MessageType::NewSessionTicket,
            11 => MessageType::Certificate,
            12 => MessageType::ServerKeyExchange,
            13 => MessageType::CertificateRequest,
            14 => MessageType::ServerHelloDone,
            15 => MessageType::CertificateVerify,
            16 => MessageType::ClientKeyExchange,
            20 => MessageType::Finished,
            22 => MessageType::CertificateStatus,
            _ => MessageType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            MessageType::HelloRequest => 0,
            MessageType::ClientHello => 1,
            MessageType::ServerHello => 2,
            MessageType::HelloVerifyRequest => 3,
            MessageType::NewSessionTicket => 4,
            MessageType::Certificate => 11,
            MessageType::ServerKeyExchange => 12,
            MessageType::CertificateRequest => 13,
            MessageType::ServerHelloDone => 14,
            MessageType::CertificateVerify => 15,
            MessageType::ClientKeyExchange => 16,
            MessageType::Finished => 20,
            MessageType::CertificateStatus => 22,
            MessageType::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], MessageType> {
        let (input, byte) = be_u8(input)?;
        Ok((input, Self::from_u8(byte)))
    }

    pub fn name(&self) -> &'static str {
        match self {
            MessageType::HelloRequest => "HelloRequest",
            MessageType::ClientHello => "ClientHello",
            MessageType::ServerHello => "ServerHello",
            MessageType::HelloVerifyRequest => "HelloVerifyReq",
            MessageType::NewSessionTicket => "NewSessionTicket",
            MessageType::Certificate => "Certificate",
            MessageType::ServerKeyExchange => "ServerKeyExch",
            MessageType::CertificateRequest => "CertRequest",
            MessageType::ServerHelloDone => "ServerDone",
            MessageType::CertificateVerify => "CertVerify",
            MessageType::ClientKeyExchange => "ClientKeyExch",
            MessageType::Finished => "Finished",
            MessageType::CertificateStatus => "CertStatus",
            MessageType::Unknown(_) => "Unknown Handshake/CCS",
        }
    }
}
