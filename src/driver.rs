use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use crate::connection::Connection;
use crate::cookie::CookieAuthority;
use crate::engine::{CryptoEngine, EngineFactory, Role};
use crate::message::{classify_opener, describe, HelloVerifyRequest, Opener, RECORD_HEADER_LEN};
use crate::socket::DatagramSocket;
use crate::table::ConnectionTable;
use crate::{Config, Error, SafeAddr};

/// Worst case bytes a cipher adds to a record (IV, MAC, padding).
const CIPHER_OVERHEAD: usize = 30;

/// Multiplexes DTLS sessions with many peers over one datagram socket.
///
/// The driver owns the socket, the cookie secret and every [`Connection`].
/// Nothing happens unless the caller drives it:
///
/// * [`Driver::process_incoming`] (or [`Driver::handle_datagram`]) for input
/// * [`Driver::update`] (or [`Driver::handle_timeout`]) on a regular cadence
/// * [`Driver::flush_outgoing`] to put queued datagrams on the wire
pub struct Driver<S, F: EngineFactory> {
    config: Arc<Config>,
    socket: S,
    factory: F,
    cookies: CookieAuthority,
    table: ConnectionTable<F::Engine>,

    /// Decrypted application data from all connections.
    received: VecDeque<(Vec<u8>, SocketAddr)>,

    /// Reused by every [`Driver::process_incoming`].
    recv_buf: Vec<u8>,

    last_now: Instant,
    last_update: Option<Instant>,
}

impl<S: DatagramSocket, F: EngineFactory> Driver<S, F> {
    pub fn new(config: Config, socket: S, factory: F, now: Instant) -> Self {
        let max_send_size = max_send_size(&socket);
        if config.mtu() > max_send_size {
            warn!(
                "Configured mtu {} capped to max send size {}",
                config.mtu(),
                max_send_size
            );
        }

        let cookies = CookieAuthority::new(now, config.cookie_rotation_interval());
        let recv_buf = vec![0; socket.max_datagram_size()];

        Driver {
            config: Arc::new(config),
            socket,
            factory,
            cookies,
            table: ConnectionTable::new(),
            received: VecDeque::new(),
            recv_buf,
            last_now: now,
            last_update: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    pub fn socket_mut(&mut self) -> &mut S {
        &mut self.socket
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut F {
        &mut self.factory
    }

    /// The cookie authority answering unknown peers.
    pub fn cookies_mut(&mut self) -> &mut CookieAuthority {
        &mut self.cookies
    }

    /// Largest plaintext datagram [`Driver::send`] accepts.
    pub fn max_send_size(&self) -> usize {
        max_send_size(&self.socket)
    }

    /// MTU handed to new engines.
    pub fn mtu(&self) -> usize {
        self.config.mtu().min(self.max_send_size())
    }

    /// Handle one datagram read from the socket.
    ///
    /// Known peers go to their connection. Unknown peers get the stateless
    /// cookie exchange; nothing is allocated for them until they echo a
    /// valid cookie.
    pub fn handle_datagram(&mut self, now: Instant, data: &[u8], from: SocketAddr) {
        self.last_now = now;

        let Some(connection) = self.table.get_mut(&from) else {
            self.handle_unknown(now, data, from);
            return;
        };

        connection.handle_datagram(now, data, &mut self.factory);
        collect_plaintext(
            connection,
            &mut self.received,
            self.config.max_queue_rx(),
        );
    }

    fn handle_unknown(&mut self, now: Instant, data: &[u8], from: SocketAddr) {
        let count = self.table.count_for(from.ip());
        if count >= self.config.max_connections_per_ip() {
            debug!(
                "{} Drop {}: {} connections from this IP",
                SafeAddr(&from),
                describe(data),
                count
            );
            return;
        }

        match classify_opener(data) {
            Opener::Fresh => self.send_hello_verify_request(now, from),

            Opener::WithCookie(hello) => {
                if !self.cookies.verify(now, &from, &hello.cookie) {
                    debug!("{} Cookie rejected", SafeAddr(&from));
                    return;
                }

                let mtu = self.mtu();
                let mut connection = match Connection::new(
                    from,
                    Role::Responder,
                    self.config.clone(),
                    mtu,
                    &mut self.factory,
                    now,
                ) {
                    Ok(c) => c,
                    Err(e) => {
                        debug!("{} Failed to create connection: {}", SafeAddr(&from), e);
                        return;
                    }
                };

                connection.handle_datagram(now, data, &mut self.factory);
                self.table.insert(connection);
            }

            Opener::Invalid => {
                trace!(
                    "{} Drop {} from unknown peer",
                    SafeAddr(&from),
                    describe(data)
                );
            }
        }
    }

    fn send_hello_verify_request(&mut self, now: Instant, to: SocketAddr) {
        if !self.socket.can_send() {
            debug!("{} No send buffer for HelloVerifyRequest", SafeAddr(&to));
            return;
        }

        let cookie = match self.cookies.derive(now, &to) {
            Ok(c) => c,
            Err(e) => {
                debug!("{} Failed to derive cookie: {}", SafeAddr(&to), e);
                return;
            }
        };

        let hvr = HelloVerifyRequest::new(cookie);
        let mut datagram = Vec::with_capacity(hvr.expected_len());
        if let Err(e) = hvr.serialize(&mut datagram) {
            debug!("{} Failed to pack HelloVerifyRequest: {}", SafeAddr(&to), e);
            return;
        }

        trace!("{} Send HelloVerifyRequest", SafeAddr(&to));
        if !self.socket.send_to(&datagram, to) {
            debug!("{} Raw send of HelloVerifyRequest failed", SafeAddr(&to));
        }
    }

    /// Periodic update for every connection, then remove the disconnected.
    pub fn handle_timeout(&mut self, now: Instant) {
        self.last_now = now;

        let max_queue_rx = self.config.max_queue_rx();
        for connection in self.table.iter_mut() {
            connection.handle_timeout(now, &mut self.factory);
            collect_plaintext(connection, &mut self.received, max_queue_rx);
        }

        self.table.sweep();
    }

    /// [`Driver::handle_timeout`], at most once per tick resolution.
    ///
    /// Returns whether a pass was made.
    pub fn update(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_update {
            if now.saturating_duration_since(last) < self.config.tick_resolution() {
                return false;
            }
        }

        self.last_update = Some(now);
        self.handle_timeout(now);
        true
    }

    /// Read and handle everything the socket has. Returns the number of
    /// datagrams read.
    pub fn process_incoming(&mut self, now: Instant) -> usize {
        let mut buf = std::mem::take(&mut self.recv_buf);
        buf.resize(self.socket.max_datagram_size(), 0);
        let mut n = 0;

        while let Some((len, from)) = self.socket.recv_from(&mut buf) {
            n += 1;
            if len > buf.len() {
                debug!(
                    "{} Drop datagram: length {} exceeds receive buffer {}",
                    SafeAddr(&from),
                    len,
                    buf.len()
                );
                continue;
            }
            self.handle_datagram(now, &buf[..len], from);
        }

        self.recv_buf = buf;
        n
    }

    /// Encrypt pending plaintext and send queued datagrams.
    ///
    /// A datagram the socket refuses stays at the head of its connection's
    /// queue and goes first next time; the other connections still flush.
    /// Running out of send buffer stops the whole flush. Returns the number
    /// of datagrams sent.
    pub fn flush_outgoing(&mut self) -> usize {
        let now = self.last_now;
        let mut sent = 0;

        for connection in self.table.iter_mut() {
            connection.prepare_outgoing(now, &mut self.factory);

            let addr = connection.addr();
            while let Some(datagram) = connection.peek_datagram() {
                if !self.socket.can_send() {
                    debug!("No send buffer, {} datagrams sent", sent);
                    return sent;
                }

                trace!(
                    "{} Send {} ({} bytes)",
                    SafeAddr(&addr),
                    describe(datagram),
                    datagram.len()
                );

                if !self.socket.send_to(datagram, addr) {
                    debug!(
                        "{} Raw send failed, {} datagrams held",
                        SafeAddr(&addr),
                        connection.pending_datagrams()
                    );
                    break;
                }

                connection.pop_datagram();
                sent += 1;
            }
        }

        sent
    }

    /// Same as [`Driver::flush_outgoing`].
    pub fn process_outgoing(&mut self) -> usize {
        self.flush_outgoing()
    }

    /// Queue `data` for `to`, opening a connection if there is none.
    ///
    /// The data goes out once the handshake completes and
    /// [`Driver::flush_outgoing`] runs.
    pub fn send(&mut self, now: Instant, to: SocketAddr, data: &[u8]) -> Result<(), Error> {
        self.last_now = now;

        let max = self.max_send_size();
        if data.len() > max {
            return Err(Error::TooLarge(data.len(), max));
        }

        if !self.table.contains(&to) {
            let mtu = self.mtu();
            let connection = Connection::new(
                to,
                Role::Initiator,
                self.config.clone(),
                mtu,
                &mut self.factory,
                now,
            )?;
            self.table.insert(connection);
        }

        let connection = self.table.get_mut(&to).ok_or(Error::Disconnected)?;
        connection.enqueue(data)
    }

    /// Next decrypted datagram from any peer.
    pub fn poll_plaintext(&mut self) -> Option<(Vec<u8>, SocketAddr)> {
        self.received.pop_front()
    }

    /// Whether `addr` has a connection that completed its handshake.
    pub fn is_connected(&self, addr: SocketAddr) -> bool {
        self.table
            .get(&addr)
            .map(|c| c.is_established())
            .unwrap_or(false)
    }

    pub fn connection(&self, addr: SocketAddr) -> Option<&Connection<F::Engine>> {
        self.table.get(&addr)
    }

    pub fn connection_count(&self) -> usize {
        self.table.len()
    }

    /// Connections held for one source IP.
    pub fn connections_from(&self, ip: IpAddr) -> usize {
        self.table.count_for(ip)
    }

    /// Mark the connection as claimed by a higher level session, exempting
    /// it from the unbound timeout. Returns `false` for unknown peers.
    pub fn bind(&mut self, addr: SocketAddr) -> bool {
        self.set_bound(addr, true)
    }

    pub fn unbind(&mut self, addr: SocketAddr) -> bool {
        self.set_bound(addr, false)
    }

    fn set_bound(&mut self, addr: SocketAddr, bound: bool) -> bool {
        match self.table.get_mut(&addr) {
            Some(c) => {
                c.set_bound(bound);
                true
            }
            None => false,
        }
    }

    /// Tear down the connection to `addr`. It is removed by the next
    /// [`Driver::handle_timeout`].
    pub fn disconnect(&mut self, now: Instant, addr: SocketAddr) -> bool {
        match self.table.get_mut(&addr) {
            Some(c) => {
                c.disconnect(now, &mut self.factory);
                true
            }
            None => false,
        }
    }
}

fn max_send_size<S: DatagramSocket>(socket: &S) -> usize {
    socket
        .max_datagram_size()
        .saturating_sub(RECORD_HEADER_LEN + CIPHER_OVERHEAD)
}

fn collect_plaintext<E: CryptoEngine>(
    connection: &mut Connection<E>,
    received: &mut VecDeque<(Vec<u8>, SocketAddr)>,
    max: usize,
) {
    while let Some(data) = connection.poll_plaintext() {
        if received.len() >= max {
            debug!(
                "{} Receive queue full, dropping {} bytes",
                SafeAddr(&connection.addr()),
                data.len()
            );
            continue;
        }
        received.push_back((data, connection.addr()));
    }
}
