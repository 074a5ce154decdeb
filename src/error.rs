use thiserror::Error;

use crate::engine::EngineError;
use crate::message::InvalidLength;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Parse incomplete")]
    ParseIncomplete,

    #[error("Parse error: {0:?}")]
    ParseError(nom::error::ErrorKind),

    #[error("Packed size {actual} does not match expected {expected}")]
    PackSizeMismatch { expected: usize, actual: usize },

    #[error("{0}")]
    InvalidLength(#[from] InvalidLength),

    #[error("Cookie length {0} exceeds digest length {1}")]
    CookieTooLong(usize, usize),

    #[error("Invalid HMAC key")]
    InvalidKey,

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Transmit queue full")]
    TransmitQueueFull,

    #[error("Datagram too large: {0} > {1}")]
    TooLarge(usize, usize),

    #[error("Connection is disconnected")]
    Disconnected,

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl<'a> From<nom::Err<nom::error::Error<&'a [u8]>>> for Error {
    fn from(value: nom::Err<nom::error::Error<&'a [u8]>>) -> Self {
        match value {
            nom::Err::Incomplete(_) => Error::ParseIncomplete,
            nom::Err::Error(x) | nom::Err::Failure(x) => {
                if x.code == nom::error::ErrorKind::Eof {
                    Error::ParseIncomplete
                } else {
                    Error::ParseError(x.code)
                }
            }
        }
    }
}
