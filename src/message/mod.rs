//! Wire codec for the handful of DTLS records the driver must understand
//! before a connection (and its engine) exists.
//!
//! Everything here is pure: no I/O, no cryptography. All parsers are nom
//! complete-input parsers, so a short buffer is an error, never a panic.

mod classify;
mod client_hello;
mod handshake;
mod hello_request;
mod hello_verify;
mod id;
mod record;

pub use classify::{classify_opener, describe, is_change_cipher_spec, is_client_hello};
pub use classify::{is_handshake, is_hello_request, is_hello_verify_request, Opener};
pub use client_hello::ClientHello;
pub use handshake::{HandshakeHeader, MessageType, HANDSHAKE_HEADER_LEN};
pub use hello_request::HelloRequest;
pub use hello_verify::HelloVerifyRequest;
pub use id::{Cookie, InvalidLength, SessionId};
pub use record::{split_records, ContentType, RecordHeader, Records, RECORD_HEADER_LEN};

use nom::number::complete::be_u16;
use nom::IResult;

/// Major version byte shared by every DTLS version.
pub const DTLS_VERSION_MAJOR: u8 = 0xFE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    DTLS1_0,
    DTLS1_2,
    DTLS1_3,
    Unknown(u16),
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::Unknown(0)
    }
}

impl ProtocolVersion {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0xFEFF => ProtocolVersion::DTLS1_0,
            0xFEFD => ProtocolVersion::DTLS1_2,
            0xFEFC => ProtocolVersion::DTLS1_3,
            _ => ProtocolVersion::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            ProtocolVersion::DTLS1_0 => 0xFEFF,
            ProtocolVersion::DTLS1_2 => 0xFEFD,
            ProtocolVersion::DTLS1_3 => 0xFEFC,
            ProtocolVersion::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ProtocolVersion> {
        let (input, version) = be_u16(input)?;
        Ok((input, ProtocolVersion::from_u16(version)))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.as_u16().to_be_bytes());
    }
}
