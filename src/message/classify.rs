//! Byte-level predicates used to tell message kinds apart before any
//! connection state exists.

use super::{ClientHello, ContentType, MessageType, ProtocolVersion};
use super::{DTLS_VERSION_MAJOR, HANDSHAKE_HEADER_LEN, RECORD_HEADER_LEN};
use crate::cookie::COOKIE_LEN;

/// At least a record header and a handshake header, content type handshake
/// and a DTLS major version.
pub fn is_handshake(data: &[u8]) -> bool {
    data.len() >= RECORD_HEADER_LEN + HANDSHAKE_HEADER_LEN
        && data[0] == ContentType::Handshake.as_u8()
        && data[1] == DTLS_VERSION_MAJOR
}

/// A lone ChangeCipherSpec record (13 byte header + 1 byte body).
pub fn is_change_cipher_spec(data: &[u8]) -> bool {
    data.len() == RECORD_HEADER_LEN + 1
        && data[0] == ContentType::ChangeCipherSpec.as_u8()
        && data[1] == DTLS_VERSION_MAJOR
}

pub fn is_client_hello(data: &[u8]) -> bool {
    is_handshake(data) && data[RECORD_HEADER_LEN] == MessageType::ClientHello.as_u8()
}

pub fn is_hello_verify_request(data: &[u8]) -> bool {
    is_handshake(data) && data[RECORD_HEADER_LEN] == MessageType::HelloVerifyRequest.as_u8()
}

/// The zero-length stateless HelloRequest, and nothing else in the datagram.
pub fn is_hello_request(data: &[u8]) -> bool {
    is_handshake(data)
        && data.len() == RECORD_HEADER_LEN + HANDSHAKE_HEADER_LEN
        && data[RECORD_HEADER_LEN] == MessageType::HelloRequest.as_u8()
        && data[RECORD_HEADER_LEN + 1..RECORD_HEADER_LEN + 4] == [0, 0, 0]
}

/// Human readable record kind, for logs.
pub fn describe(data: &[u8]) -> &'static str {
    if is_change_cipher_spec(data) {
        return "ChangeCipherSpec";
    }

    if !is_handshake(data) {
        return match data.first().copied().map(ContentType::from_u8) {
            Some(ContentType::ApplicationData) => "AppData",
            Some(ContentType::Heartbeat) => "HeartBeat",
            Some(ContentType::Alert) => "Alert",
            _ => "Unknown",
        };
    }

    MessageType::from_u8(data[RECORD_HEADER_LEN]).name()
}

/// What to do with a datagram from a peer that has no connection.
#[derive(Debug, PartialEq, Eq)]
pub enum Opener<'a> {
    /// A fresh ClientHello (message_seq 0). Answer with a HelloVerifyRequest.
    Fresh,
    /// The second ClientHello (message_seq 1) carrying a cookie of the
    /// expected size. Verify it.
    WithCookie(ClientHello<'a>),
    /// Anything else. Drop it.
    Invalid,
}

/// Classify the first datagram of an unknown peer.
///
/// RFC 6347: the first message each side transmits in each handshake has
/// message_seq 0, and the ClientHello answering a HelloVerifyRequest has
/// message_seq 1.
pub fn classify_opener(data: &[u8]) -> Opener<'_> {
    if !is_client_hello(data) {
        return Opener::Invalid;
    }

    let Ok((_, hello)) = ClientHello::parse(data) else {
        return Opener::Invalid;
    };

    let version = hello.header.record.version;
    if version != ProtocolVersion::DTLS1_0 && version != ProtocolVersion::DTLS1_2 {
        return Opener::Invalid;
    }

    match hello.header.message_seq {
        0 => Opener::Fresh,
        1 if hello.cookie.len() == COOKIE_LEN => Opener::WithCookie(hello),
        _ => Opener::Invalid,
    }
}
