//! Seam to the external cryptographic engine.
//!
//! The driver never does DTLS cryptography itself. Each connection owns
//! exactly one engine instance, created through an [`EngineFactory`] and
//! destroyed by dropping it.

use thiserror::Error;

/// Which side of the handshake a connection plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Opened by us through [`crate::Driver::send`]. Acts as DTLS client.
    Initiator,
    /// Opened by a peer that passed the cookie exchange. Acts as DTLS server.
    Responder,
}

/// Outcome of one [`CryptoEngine::advance_handshake`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    InProgress,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Needs more input, or output space. Not an error; retry later.
    #[error("Would block")]
    WouldBlock,
    /// Anything else. Terminal for the connection.
    #[error("Fatal engine error: {0}")]
    Fatal(i32),
}

/// One DTLS session, as seen by a connection.
///
/// All calls must be non-blocking. Ciphertext flows through memory: the
/// connection feeds received records in and drains produced records out.
pub trait CryptoEngine {
    /// Run the handshake as far as buffered input allows.
    fn advance_handshake(&mut self) -> Result<HandshakeStatus, EngineError>;

    /// Hand one received datagram to the engine.
    fn feed_ciphertext(&mut self, data: &[u8]);

    /// Take all ciphertext produced since the last call. May hold several
    /// concatenated records.
    fn drain_ciphertext(&mut self) -> Vec<u8>;

    /// Encrypt one application datagram. The ciphertext is returned directly.
    fn encrypt_plaintext(&mut self, data: &[u8]) -> Result<Vec<u8>, EngineError>;

    /// Decrypt the next buffered application record.
    ///
    /// `Err(EngineError::WouldBlock)` when nothing complete is pending.
    fn decrypt_ciphertext(&mut self) -> Result<Vec<u8>, EngineError>;

    /// Retransmit the current flight into the drain buffer.
    fn handle_timeout(&mut self);

    /// The final flight of a completed handshake, for resending to a peer
    /// that missed it.
    fn finished_message(&mut self) -> Option<Vec<u8>>;

    /// Last error code, for diagnostics.
    fn last_error(&self) -> i32;
}

/// Creates engines. Destruction is `Drop`.
pub trait EngineFactory {
    type Engine: CryptoEngine;

    fn create(&mut self, role: Role, mtu: usize) -> Result<Self::Engine, EngineError>;
}
