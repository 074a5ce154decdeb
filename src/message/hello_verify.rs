use super::{Cookie, HandshakeHeader, MessageType, ProtocolVersion};
use super::{HANDSHAKE_HEADER_LEN, RECORD_HEADER_LEN};
use crate::Error;
use nom::error::{Error as NomError, ErrorKind};
use nom::{Err, IResult};

/// Stateless HelloVerifyRequest record sent in reply to a cookie-less
/// ClientHello.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloVerifyRequest {
    pub header: HandshakeHeader,
    pub server_version: ProtocolVersion,
    pub cookie: Cookie,
}

impl HelloVerifyRequest {
    /// Record with all header fields pre-filled: DTLS 1.0, epoch 0, sequence 0.
    pub fn new(cookie: Cookie) -> Self {
        let body_len = Self::body_len(&cookie);
        HelloVerifyRequest {
            header: HandshakeHeader::unfragmented(MessageType::HelloVerifyRequest, body_len as u32),
            server_version: ProtocolVersion::DTLS1_0,
            cookie,
        }
    }

    fn body_len(cookie: &Cookie) -> usize {
        // server_version + cookie length byte + cookie
        2 + 1 + cookie.len()
    }

    /// Size of the packed record as derived from the cookie.
    pub fn expected_len(&self) -> usize {
        RECORD_HEADER_LEN + HANDSHAKE_HEADER_LEN + Self::body_len(&self.cookie)
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], HelloVerifyRequest> {
        let start = input;
        let (input, header) = HandshakeHeader::parse(input)?;
        if header.msg_type != MessageType::HelloVerifyRequest {
            return Err(Err::Error(NomError::new(start, ErrorKind::Tag)));
        }
        let (input, server_version) = ProtocolVersion::parse(input)?;
        let (input, cookie) = Cookie::parse(input)?;

        Ok((
            input,
            HelloVerifyRequest {
                header,
                server_version,
                cookie,
            },
        ))
    }

    /// Pack into `output`.
    ///
    /// Fails if the header lengths disagree with the cookie, i.e. when the
    /// packed size would differ from [`HelloVerifyRequest::expected_len`].
    pub fn serialize(&self, output: &mut Vec<u8>) -> Result<(), Error> {
        let start = output.len();

        self.header.serialize(output);
        self.server_version.serialize(output);
        self.cookie.serialize(output);

        let actual = output.len() - start;
        let expected = self.expected_len();
        if actual != expected || self.header.wire_len() != expected {
            output.truncate(start);
            return Err(Error::PackSizeMismatch {
                expected,
                actual: self.header.wire_len(),
            });
        }

        Ok(())
    }
}
