use tinyvec::ArrayVec;

use crate::message::{is_client_hello, is_handshake, is_hello_request, HandshakeHeader};

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Responder that passed the cookie check. Announces acceptance with
    /// HelloRequest until the peer restarts with a fresh ClientHello.
    SendHelloRequest,
    /// Responder running the handshake.
    Accept,
    /// Initiator doing the stateless cookie round trip.
    CookieExchange,
    /// Initiator running the handshake with a fresh engine.
    Connect,
    /// Handshake complete. Application data flows.
    Established,
    /// Terminal. Reclaimed by the next sweep.
    Disconnected,
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::SendHelloRequest => "SendHelloRequest",
            State::Accept => "Accept",
            State::CookieExchange => "CookieExchange",
            State::Connect => "Connect",
            State::Established => "Established",
            State::Disconnected => "Disconnected",
        }
    }

    /// States that drive the engine's handshake.
    pub fn is_handshaking(&self) -> bool {
        matches!(self, State::Accept | State::CookieExchange | State::Connect)
    }

    pub fn is_active(&self) -> bool {
        *self != State::Disconnected
    }

    pub(crate) fn step(self, event: Event) -> Step {
        if self == State::Disconnected {
            return match event {
                Event::Enter => Step::stay().with(Effect::DestroyEngine),
                _ => Step::discard(),
            };
        }

        match event {
            Event::Enter => self.enter(),
            Event::Datagram {
                kind,
                within_liveness,
            } => self.datagram(kind, within_liveness),
            Event::Ciphertext => self.ciphertext(),
            Event::Tick {
                unbound_expired,
                handshake_expired,
                retry_due,
            } => self.tick(unbound_expired, handshake_expired, retry_due),
            Event::Outgoing => self.outgoing(),
            Event::HandshakeComplete => self.handshake_complete(),
            Event::EngineFailed => Step::go(State::Disconnected),
        }
    }

    fn enter(self) -> Step {
        match self {
            State::SendHelloRequest => Step::stay()
                .with(Effect::ResetTimer)
                .with(Effect::SendHelloRequest)
                .with(Effect::ArmRetry),
            // The datagram that moved us here drives the first advance.
            State::Accept => Step::stay()
                .with(Effect::ResetTimer)
                .with(Effect::ScheduleRetry),
            State::CookieExchange | State::Connect => Step::stay()
                .with(Effect::ResetTimer)
                .with(Effect::AdvanceHandshake)
                .with(Effect::DrainCiphertext)
                .with(Effect::ScheduleRetry),
            State::Established => Step::stay(),
            State::Disconnected => Step::stay().with(Effect::DestroyEngine),
        }
    }

    fn datagram(self, kind: DatagramKind, within_liveness: bool) -> Step {
        match self {
            State::SendHelloRequest => match kind {
                // A restarted handshake. Anything else is stale.
                DatagramKind::ClientHello { message_seq: 0 } => Step::go(State::Accept).keep(),
                _ => Step::discard(),
            },
            State::CookieExchange => match kind {
                // Cookie accepted. Start over with a clean transcript.
                DatagramKind::HelloRequest => Step::go(State::Connect).with(Effect::RecreateEngine),
                _ => Step::stay().keep(),
            },
            State::Connect => match kind {
                DatagramKind::HelloRequest => Step::discard(),
                _ => Step::stay().keep(),
            },
            State::Established => {
                if kind.is_handshake() && within_liveness {
                    // The peer may have missed our last flight.
                    Step::stay()
                        .with(Effect::ResendFinished)
                        .with(Effect::DrainCiphertext)
                        .keep()
                } else {
                    Step::stay().keep()
                }
            }
            State::Accept => Step::stay().keep(),
            State::Disconnected => Step::discard(),
        }
    }

    fn ciphertext(self) -> Step {
        match self {
            State::Accept | State::CookieExchange | State::Connect => Step::stay()
                .with(Effect::AdvanceHandshake)
                .with(Effect::DrainCiphertext),
            State::Established => Step::stay()
                .with(Effect::Decrypt)
                .with(Effect::DrainCiphertext),
            _ => Step::stay(),
        }
    }

    fn tick(self, unbound_expired: bool, handshake_expired: bool, retry_due: bool) -> Step {
        if unbound_expired {
            return Step::go(State::Disconnected);
        }

        if handshake_expired && self != State::Established {
            return Step::go(State::Disconnected);
        }

        match self {
            State::SendHelloRequest if retry_due => Step::stay()
                .with(Effect::SendHelloRequest)
                .with(Effect::ScheduleRetry),
            State::Accept => {
                let step = Step::stay().with(Effect::AdvanceHandshake);
                if retry_due {
                    step.with(Effect::ForceRetransmit)
                        .with(Effect::DrainCiphertext)
                        .with(Effect::ScheduleRetry)
                } else {
                    step.with(Effect::DrainCiphertext)
                }
            }
            State::CookieExchange | State::Connect if retry_due => Step::stay()
                .with(Effect::ForceRetransmit)
                .with(Effect::DrainCiphertext)
                .with(Effect::ScheduleRetry),
            // Pick up records a previous pass could not decrypt.
            State::Established => Step::stay().with(Effect::Decrypt),
            _ => Step::stay(),
        }
    }

    fn outgoing(self) -> Step {
        match self {
            State::Established => Step::stay().with(Effect::Encrypt),
            _ => Step::stay(),
        }
    }

    fn handshake_complete(self) -> Step {
        match self {
            State::Accept | State::Connect => Step::go(State::Established),
            _ => Step::stay(),
        }
    }
}

/// Coarse classification of an incoming datagram, enough for the state
/// machine to decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DatagramKind {
    HelloRequest,
    ClientHello { message_seq: u16 },
    Handshake,
    Other,
}

impl DatagramKind {
    pub fn of(data: &[u8]) -> Self {
        if is_hello_request(data) {
            return DatagramKind::HelloRequest;
        }

        if is_client_hello(data) {
            if let Ok((_, header)) = HandshakeHeader::parse(data) {
                return DatagramKind::ClientHello {
                    message_seq: header.message_seq,
                };
            }
        }

        if is_handshake(data) {
            DatagramKind::Handshake
        } else {
            DatagramKind::Other
        }
    }

    pub fn is_handshake(&self) -> bool {
        !matches!(self, DatagramKind::Other)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    /// The state was just entered.
    Enter,
    /// A datagram arrived from the peer.
    Datagram {
        kind: DatagramKind,
        within_liveness: bool,
    },
    /// A kept datagram was fed to the engine.
    Ciphertext,
    /// Periodic update.
    Tick {
        unbound_expired: bool,
        handshake_expired: bool,
        retry_due: bool,
    },
    /// The driver is about to flush.
    Outgoing,
    HandshakeComplete,
    EngineFailed,
}

/// Side effects requested by a transition, applied in order by the
/// connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Effect {
    /// Move engine output to the outbound queue.
    #[default]
    DrainCiphertext,
    /// Drop the engine and create a new one.
    RecreateEngine,
    DestroyEngine,
    /// Queue a stateless HelloRequest.
    SendHelloRequest,
    /// Restart the retry backoff for the current state.
    ResetTimer,
    /// Arm the retry deadline with the current interval.
    ArmRetry,
    /// Arm the retry deadline and back off.
    ScheduleRetry,
    ForceRetransmit,
    AdvanceHandshake,
    ResendFinished,
    Decrypt,
    Encrypt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Step {
    /// State to move to, if any.
    pub next: Option<State>,
    /// Whether a datagram that caused this step should be fed to the engine.
    pub keep: bool,
    pub effects: ArrayVec<[Effect; 4]>,
}

impl Step {
    fn stay() -> Self {
        Step {
            next: None,
            keep: false,
            effects: ArrayVec::new(),
        }
    }

    fn discard() -> Self {
        Self::stay()
    }

    fn go(state: State) -> Self {
        Step {
            next: Some(state),
            ..Self::stay()
        }
    }

    fn keep(mut self) -> Self {
        self.keep = true;
        self
    }

    fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}
