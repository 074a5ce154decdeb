use super::{HandshakeHeader, MessageType};
use super::{HANDSHAKE_HEADER_LEN, RECORD_HEADER_LEN};
use crate::Error;
use nom::error::{Error as NomError, ErrorKind};
use nom::{Err, IResult};

/// Zero-length HelloRequest record (headers only).
///
/// Sent statelessly by the responder to tell an initiator its cookie was
/// accepted and the handshake should restart from a fresh ClientHello.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelloRequest {
    pub header: HandshakeHeader,
}

impl Default for HelloRequest {
    fn default() -> Self {
        HelloRequest {
            header: HandshakeHeader::unfragmented(MessageType::HelloRequest, 0),
        }
    }
}

impl HelloRequest {
    pub const LEN: usize = RECORD_HEADER_LEN + HANDSHAKE_HEADER_LEN;

    pub fn parse(input: &[u8]) -> IResult<&[u8], HelloRequest> {
        let start = input;
        let (input, header) = HandshakeHeader::parse(input)?;
        if header.msg_type != MessageType::HelloRequest || header.length != 0 {
            return Err(Err::Error(NomError::new(start, ErrorKind::Tag)));
        }
        Ok((input, HelloRequest { header }))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) -> Result<(), Error> {
        if self.header.wire_len() != Self::LEN {
            return Err(Error::PackSizeMismatch {
                expected: Self::LEN,
                actual: self.header.wire_len(),
            });
        }
        self.header.serialize(output);
        Ok(())
    }

    /// The packed record.
    pub fn to_vec(&self) -> Result<Vec<u8>, Error> {
        let mut v = Vec::with_capacity(Self::LEN);
        self.serialize(&mut v)?;
        Ok(v)
    }
}
