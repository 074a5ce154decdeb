//! One peer session: the state machine plus the engine and queues its
//! effects act on.

mod state;

pub use state::State;
pub(crate) use state::{DatagramKind, Effect, Event};

use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::engine::{CryptoEngine, EngineError, EngineFactory, HandshakeStatus, Role};
use crate::message::{describe, split_records, HelloRequest};
use crate::timer::ExponentialBackoff;
use crate::{Config, Error, SafeAddr};

/// HelloRequest resends never back off further than this.
const HELLO_REQUEST_CEILING: Duration = Duration::from_secs(1);

pub struct Connection<E> {
    addr: SocketAddr,
    role: Role,
    state: State,

    /// Exactly one while active. Dropped on entering `Disconnected`.
    engine: Option<E>,

    config: Arc<Config>,
    mtu: usize,

    created: Instant,

    /// Claimed by a higher level session. Unbound connections time out.
    bound: bool,

    /// Shared by HelloRequest resends and handshake retransmits; only one of
    /// them is ever live for a given state.
    backoff: ExponentialBackoff,
    retry_deadline: Option<Instant>,

    /// Ciphertext datagrams waiting for the socket.
    queue_tx: VecDeque<Vec<u8>>,

    /// Plaintext waiting for the handshake to complete, or for the engine.
    queue_plain: VecDeque<Vec<u8>>,

    /// Decrypted application data waiting to be picked up.
    delivered: VecDeque<Vec<u8>>,

    datagrams_sent: u64,
    datagrams_received: u64,
    last_error: Option<i32>,
}

impl<E: CryptoEngine> Connection<E> {
    /// Create a connection and its engine, and enter the role's first state.
    ///
    /// Initiators start in [`State::CookieExchange`], responders in
    /// [`State::SendHelloRequest`].
    pub fn new<F>(
        addr: SocketAddr,
        role: Role,
        config: Arc<Config>,
        mtu: usize,
        factory: &mut F,
        now: Instant,
    ) -> Result<Self, Error>
    where
        F: EngineFactory<Engine = E>,
    {
        let engine = factory.create(role, mtu).map_err(|e| {
            warn!("{} Failed to create engine: {}", SafeAddr(&addr), e);
            e
        })?;

        let state = match role {
            Role::Initiator => State::CookieExchange,
            Role::Responder => State::SendHelloRequest,
        };

        let backoff = ExponentialBackoff::new(config.flight_start_rto(), config.retry_ceiling());

        let mut connection = Connection {
            addr,
            role,
            state,
            engine: Some(engine),
            config,
            mtu,
            created: now,
            bound: false,
            backoff,
            retry_deadline: None,
            queue_tx: VecDeque::new(),
            queue_plain: VecDeque::new(),
            delivered: VecDeque::new(),
            datagrams_sent: 0,
            datagrams_received: 0,
            last_error: None,
        };

        debug!(
            "{} New {:?} connection in {}",
            SafeAddr(&addr),
            role,
            state.name()
        );
        connection.run(now, Event::Enter, factory);

        Ok(connection)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn created(&self) -> Instant {
        self.created
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub fn is_established(&self) -> bool {
        self.state == State::Established
    }

    /// The current engine. `None` once disconnected.
    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    /// Last engine error code seen, if any.
    pub fn last_error(&self) -> Option<i32> {
        self.last_error
    }

    pub fn datagrams_sent(&self) -> u64 {
        self.datagrams_sent
    }

    pub fn datagrams_received(&self) -> u64 {
        self.datagrams_received
    }

    /// Ciphertext datagrams waiting to be sent.
    pub fn pending_datagrams(&self) -> usize {
        self.queue_tx.len()
    }

    /// Plaintext datagrams waiting to be encrypted.
    pub fn pending_plaintext(&self) -> usize {
        self.queue_plain.len()
    }

    pub(crate) fn set_bound(&mut self, bound: bool) {
        self.bound = bound;
    }

    /// Process one datagram from the peer.
    pub(crate) fn handle_datagram<F>(&mut self, now: Instant, data: &[u8], factory: &mut F)
    where
        F: EngineFactory<Engine = E>,
    {
        self.datagrams_received += 1;
        trace!(
            "{} Recv {} ({} bytes) in {}",
            SafeAddr(&self.addr),
            describe(data),
            data.len(),
            self.state.name()
        );

        let kind = DatagramKind::of(data);
        let within_liveness =
            now.saturating_duration_since(self.created) <= self.config.connection_timeout();

        let keep = self.run(
            now,
            Event::Datagram {
                kind,
                within_liveness,
            },
            factory,
        );

        if !keep {
            trace!(
                "{} Drop {} in {}",
                SafeAddr(&self.addr),
                describe(data),
                self.state.name()
            );
            return;
        }

        if !self.state.is_active() {
            return;
        }

        if let Some(engine) = self.engine.as_mut() {
            engine.feed_ciphertext(data);
        }
        self.run(now, Event::Ciphertext, factory);
    }

    /// Periodic update: retries and timeouts.
    pub(crate) fn handle_timeout<F>(&mut self, now: Instant, factory: &mut F)
    where
        F: EngineFactory<Engine = E>,
    {
        let age = now.saturating_duration_since(self.created);
        let expired = age > self.config.connection_timeout();
        let unbound_expired = expired && !self.bound;

        if self.state.is_active() && expired {
            if unbound_expired {
                debug!(
                    "{} Unbound for {:?} in {}",
                    SafeAddr(&self.addr),
                    age,
                    self.state.name()
                );
            } else if self.state != State::Established {
                debug!(
                    "{} Handshake not complete after {:?} in {}",
                    SafeAddr(&self.addr),
                    age,
                    self.state.name()
                );
            }
        }

        let retry_due = self.retry_deadline.map(|d| now >= d).unwrap_or(false);

        self.run(
            now,
            Event::Tick {
                unbound_expired,
                handshake_expired: expired,
                retry_due,
            },
            factory,
        );
    }

    /// Encrypt pending plaintext ahead of a flush.
    pub(crate) fn prepare_outgoing<F>(&mut self, now: Instant, factory: &mut F)
    where
        F: EngineFactory<Engine = E>,
    {
        if self.queue_plain.is_empty() {
            return;
        }
        self.run(now, Event::Outgoing, factory);
    }

    /// Queue plaintext for sending once established.
    pub(crate) fn enqueue(&mut self, data: &[u8]) -> Result<(), Error> {
        if !self.state.is_active() {
            return Err(Error::Disconnected);
        }

        if self.queue_plain.len() >= self.config.max_queue_tx() {
            debug!(
                "{} Transmit queue full ({})",
                SafeAddr(&self.addr),
                self.queue_plain.len()
            );
            return Err(Error::TransmitQueueFull);
        }

        self.queue_plain.push_back(data.to_vec());
        Ok(())
    }

    /// Tear down. The connection is reclaimed by the next sweep.
    pub(crate) fn disconnect<F>(&mut self, now: Instant, factory: &mut F)
    where
        F: EngineFactory<Engine = E>,
    {
        self.transition(now, State::Disconnected, factory);
    }

    pub(crate) fn peek_datagram(&self) -> Option<&[u8]> {
        self.queue_tx.front().map(|d| d.as_slice())
    }

    /// Remove the datagram returned by [`Connection::peek_datagram`] after it
    /// was handed to the socket.
    pub(crate) fn pop_datagram(&mut self) -> Option<Vec<u8>> {
        let datagram = self.queue_tx.pop_front()?;
        self.datagrams_sent += 1;
        Some(datagram)
    }

    pub(crate) fn poll_plaintext(&mut self) -> Option<Vec<u8>> {
        self.delivered.pop_front()
    }

    /// Step the state machine and apply what it asks for. Returns whether a
    /// datagram behind `event` should go on to the engine.
    fn run<F>(&mut self, now: Instant, event: Event, factory: &mut F) -> bool
    where
        F: EngineFactory<Engine = E>,
    {
        let step = self.state.step(event);

        let mut follow_up = None;
        for effect in step.effects.iter().copied() {
            match self.apply(now, effect, factory) {
                Some(Event::EngineFailed) => {
                    follow_up = Some(Event::EngineFailed);
                    break;
                }
                Some(ev) => follow_up = Some(ev),
                None => {}
            }
        }

        if let Some(next) = step.next {
            self.transition(now, next, factory);
        }

        if let Some(ev) = follow_up {
            if self.state.is_active() {
                self.run(now, ev, factory);
            }
        }

        step.keep
    }

    fn transition<F>(&mut self, now: Instant, next: State, factory: &mut F)
    where
        F: EngineFactory<Engine = E>,
    {
        if next == self.state {
            return;
        }

        debug!(
            "{} {} -> {}",
            SafeAddr(&self.addr),
            self.state.name(),
            next.name()
        );
        self.state = next;
        self.run(now, Event::Enter, factory);
    }

    fn apply<F>(&mut self, now: Instant, effect: Effect, factory: &mut F) -> Option<Event>
    where
        F: EngineFactory<Engine = E>,
    {
        match effect {
            Effect::DrainCiphertext => {
                let output = self.engine.as_mut()?.drain_ciphertext();
                push_records(&mut self.queue_tx, &self.addr, &output);
            }

            Effect::RecreateEngine => {
                // The old engine must be gone before the new one exists.
                self.engine = None;
                match factory.create(self.role, self.mtu) {
                    Ok(engine) => {
                        trace!("{} Engine recreated", SafeAddr(&self.addr));
                        self.engine = Some(engine);
                    }
                    Err(e) => {
                        warn!("{} Failed to recreate engine: {}", SafeAddr(&self.addr), e);
                        return self.fail(e);
                    }
                }
            }

            Effect::DestroyEngine => {
                if self.engine.take().is_some() {
                    trace!("{} Engine destroyed", SafeAddr(&self.addr));
                }
            }

            Effect::SendHelloRequest => match HelloRequest::default().to_vec() {
                Ok(datagram) => self.queue_tx.push_back(datagram),
                Err(e) => debug!("{} Failed to pack HelloRequest: {}", SafeAddr(&self.addr), e),
            },

            Effect::ResetTimer => {
                self.backoff = if self.state == State::SendHelloRequest {
                    ExponentialBackoff::new(
                        self.config.hello_request_interval(),
                        HELLO_REQUEST_CEILING,
                    )
                } else {
                    ExponentialBackoff::new(
                        self.config.flight_start_rto(),
                        self.config.retry_ceiling(),
                    )
                };
                self.retry_deadline = None;
            }

            Effect::ArmRetry => {
                self.retry_deadline = Some(now + self.backoff.rto());
            }

            Effect::ScheduleRetry => {
                self.retry_deadline = Some(now + self.backoff.rto());
                self.backoff.attempt();
            }

            Effect::ForceRetransmit => {
                trace!(
                    "{} Retransmit #{} in {}",
                    SafeAddr(&self.addr),
                    self.backoff.attempts(),
                    self.state.name()
                );
                self.engine.as_mut()?.handle_timeout();
            }

            Effect::AdvanceHandshake => match self.engine.as_mut()?.advance_handshake() {
                Ok(HandshakeStatus::Complete) => return Some(Event::HandshakeComplete),
                Ok(HandshakeStatus::InProgress) | Err(EngineError::WouldBlock) => {}
                Err(e) => return self.fail(e),
            },

            Effect::ResendFinished => {
                if let Some(finished) = self.engine.as_mut()?.finished_message() {
                    trace!("{} Resend final flight", SafeAddr(&self.addr));
                    push_records(&mut self.queue_tx, &self.addr, &finished);
                }
            }

            Effect::Decrypt => loop {
                let engine = self.engine.as_mut()?;
                match engine.decrypt_ciphertext() {
                    Ok(data) => {
                        if !data.is_empty() {
                            self.delivered.push_back(data);
                        }
                    }
                    Err(EngineError::WouldBlock) => break,
                    Err(e) => return self.fail(e),
                }
            },

            Effect::Encrypt => {
                while let Some(data) = self.queue_plain.front() {
                    let engine = self.engine.as_mut()?;
                    match engine.encrypt_plaintext(data) {
                        Ok(ciphertext) => {
                            self.queue_plain.pop_front();
                            push_records(&mut self.queue_tx, &self.addr, &ciphertext);
                        }
                        Err(EngineError::WouldBlock) => break,
                        Err(e) => return self.fail(e),
                    }
                }
            }
        }

        None
    }

    fn fail(&mut self, error: EngineError) -> Option<Event> {
        let code = match error {
            EngineError::Fatal(code) => code,
            EngineError::WouldBlock => return None,
        };
        let code = match self.engine.as_ref().map(|e| e.last_error()) {
            Some(last) if last != 0 => last,
            _ => code,
        };
        debug!(
            "{} Engine error {} in {}",
            SafeAddr(&self.addr),
            code,
            self.state.name()
        );
        self.last_error = Some(code);
        Some(Event::EngineFailed)
    }
}

/// One datagram per record. Anything that doesn't parse as a whole record is
/// dropped.
fn push_records(queue: &mut VecDeque<Vec<u8>>, addr: &SocketAddr, data: &[u8]) {
    if data.is_empty() {
        return;
    }

    let mut records = split_records(data);
    for record in records.by_ref() {
        queue.push_back(record.to_vec());
    }

    let rest = records.remainder();
    if !rest.is_empty() {
        debug!(
            "{} Dropping {} bytes of malformed engine output",
            SafeAddr(addr),
            rest.len()
        );
    }
}

impl<E> fmt::Debug for Connection<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("addr", &SafeAddr(&self.addr).to_string())
            .field("role", &self.role)
            .field("state", &self.state)
            .field("bound", &self.bound)
            .field("queue_tx", &self.queue_tx.len())
            .field("queue_plain", &self.queue_plain.len())
            .finish()
    }
}
