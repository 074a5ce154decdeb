use super::{Cookie, HandshakeHeader, MessageType, ProtocolVersion, SessionId};
use super::{HANDSHAKE_HEADER_LEN, RECORD_HEADER_LEN};
use crate::Error;
use nom::bytes::complete::take;
use nom::error::{Error as NomError, ErrorKind};
use nom::{Err, IResult};

/// The part of a ClientHello record the driver needs to do cookie exchange.
///
/// Only the headers, version, random, session id and cookie are decoded.
/// Cipher suites, compression methods and extensions are kept opaque in
/// `rest`; those are the engine's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello<'a> {
    pub header: HandshakeHeader,
    pub client_version: ProtocolVersion,
    pub random: [u8; 32],
    pub session_id: SessionId,
    pub cookie: Cookie,
    pub rest: &'a [u8],
}

impl<'a> ClientHello<'a> {
    /// Build an unfragmented ClientHello record with consistent lengths.
    pub fn new(
        message_seq: u16,
        random: [u8; 32],
        session_id: SessionId,
        cookie: Cookie,
        rest: &'a [u8],
    ) -> Self {
        let body_len = 2 + 32 + 1 + session_id.len() + 1 + cookie.len() + rest.len();
        let mut header = HandshakeHeader::unfragmented(MessageType::ClientHello, body_len as u32);
        header.record.version = ProtocolVersion::DTLS1_2;
        header.message_seq = message_seq;

        ClientHello {
            header,
            client_version: ProtocolVersion::DTLS1_2,
            random,
            session_id,
            cookie,
            rest,
        }
    }

    /// Parse a whole ClientHello record.
    ///
    /// Fails if any length prefix points past the record, if the record
    /// claims more bytes than the buffer holds, or if the decoded prefix does
    /// not fit inside the declared record length.
    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], ClientHello<'a>> {
        let start = input;
        let (input, header) = HandshakeHeader::parse(input)?;

        if header.msg_type != MessageType::ClientHello {
            return Err(Err::Error(NomError::new(start, ErrorKind::Tag)));
        }

        // Everything after the record header, bounded by the declared length.
        let record_len = header.record.length as usize;
        if record_len < HANDSHAKE_HEADER_LEN {
            return Err(Err::Failure(NomError::new(start, ErrorKind::LengthValue)));
        }
        let (rest_of_buffer, body) = take(record_len - HANDSHAKE_HEADER_LEN)(input)?;

        let (body, client_version) = ProtocolVersion::parse(body)?;
        let (body, random) = take(32_usize)(body)?;
        let (body, session_id) = SessionId::parse(body)?;
        let (body, cookie) = Cookie::parse(body)?;

        let mut r = [0u8; 32];
        r.copy_from_slice(random);

        Ok((
            rest_of_buffer,
            ClientHello {
                header,
                client_version,
                random: r,
                session_id,
                cookie,
                rest: body,
            },
        ))
    }

    /// Parse a datagram that must hold exactly one ClientHello record.
    pub fn unpack(input: &'a [u8]) -> Result<ClientHello<'a>, Error> {
        let (rest, hello) = Self::parse(input)?;
        if !rest.is_empty() {
            return Err(Error::PackSizeMismatch {
                expected: input.len() - rest.len(),
                actual: input.len(),
            });
        }
        Ok(hello)
    }

    /// Bytes consumed by the decoded prefix (headers through the cookie).
    pub fn prefix_len(&self) -> usize {
        RECORD_HEADER_LEN
            + HANDSHAKE_HEADER_LEN
            + 2
            + 32
            + 1
            + self.session_id.len()
            + 1
            + self.cookie.len()
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        self.header.serialize(output);
        self.client_version.serialize(output);
        output.extend_from_slice(&self.random);
        self.session_id.serialize(output);
        self.cookie.serialize(output);
        output.extend_from_slice(self.rest);
    }
}
