use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use crate::Error;

/// The raw datagram transport the driver sits on.
///
/// Implementations must never block: "nothing to read" is `None` and "can't
/// send right now" is `false`.
pub trait DatagramSocket {
    /// Send one datagram. `false` if it could not be sent now.
    fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> bool;

    /// Receive one datagram into `buf`.
    fn recv_from(&mut self, buf: &mut [u8]) -> Option<(usize, SocketAddr)>;

    /// Largest datagram the transport carries.
    fn max_datagram_size(&self) -> usize;

    /// Whether there is send buffer space available.
    fn can_send(&self) -> bool {
        true
    }
}

/// IPv4 UDP payload limit.
const UDP_MAX_PAYLOAD: usize = 65_507;

impl DatagramSocket for UdpSocket {
    fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> bool {
        match UdpSocket::send_to(self, data, addr) {
            Ok(n) => n == data.len(),
            Err(e) => {
                if e.kind() != ErrorKind::WouldBlock {
                    debug!("Raw send failed: {}", e);
                }
                false
            }
        }
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> Option<(usize, SocketAddr)> {
        match UdpSocket::recv_from(self, buf) {
            Ok(v) => Some(v),
            Err(e) => {
                if e.kind() != ErrorKind::WouldBlock {
                    debug!("Raw receive failed: {}", e);
                }
                None
            }
        }
    }

    fn max_datagram_size(&self) -> usize {
        UDP_MAX_PAYLOAD
    }
}

/// Bind a non-blocking UDP socket, ready to hand to [`crate::Driver::new`].
pub fn bind_udp<A: ToSocketAddrs>(addr: A) -> Result<UdpSocket, Error> {
    let socket = UdpSocket::bind(addr)?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}
