//! dtlsmux
//!
//! Secure, connectionless transport driver that multiplexes many DTLS peer
//! sessions over one UDP socket.
//!
//! Initial contact is stateless: an unknown peer's first `ClientHello` is
//! answered with a `HelloVerifyRequest` carrying an HMAC cookie bound to the
//! peer's address, and no per-peer state is allocated until the peer echoes
//! a valid cookie back. After that each peer gets a [`Connection`] with its own
//! handshake state machine driving an external [`CryptoEngine`].
//!
//! The driver never blocks and has no background threads. The caller feeds it
//! time via [`Driver::handle_timeout`] and datagrams via
//! [`Driver::process_incoming`] (or [`Driver::handle_datagram`] directly).
//!
//! ```text
//!   raw datagram ──► Driver ──┬─ unknown peer ─► Wire codec + CookieAuthority
//!                             │                   (HelloVerifyRequest / new Connection)
//!                             └─ known peer ───► Connection state machine ──► CryptoEngine
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]

#[macro_use]
extern crate log;

mod config;
pub use config::{Config, ConfigBuilder};

mod connection;
pub use connection::{Connection, State};

mod cookie;
pub use cookie::{CookieAuthority, COOKIE_LEN};

mod driver;
pub use driver::Driver;

mod engine;
pub use engine::{CryptoEngine, EngineError, EngineFactory, HandshakeStatus, Role};

mod error;
pub use error::Error;

pub mod message;

mod socket;
pub use socket::{bind_udp, DatagramSocket};

mod table;
pub use table::ConnectionTable;

mod timer;
mod util;

/// Masks a peer address in log output unless the `log-addresses` feature is on.
pub(crate) struct SafeAddr<'a>(pub &'a std::net::SocketAddr);

impl std::fmt::Display for SafeAddr<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if cfg!(feature = "log-addresses") {
            write!(f, "{}", self.0)
        } else {
            write!(f, "x.x.x.x|x")
        }
    }
}
