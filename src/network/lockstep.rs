//! Lockstep Gate
//!
//! Decides when the tick loop may run. The phase is a three-state machine
//! changed only through [`GatePhase::transition`]; the acked tick counter
//! only ever moves to `acked + 1`. Every accepted `start` also leaves a
//! reset request behind, which the tick loop consumes before its next tick,
//! so a session reset never depends on which phase the loop happened to see.
//!
//! ```text
//!                 start                pause
//! WaitingForStart ─────► Running ◄──────────► Paused
//!        ▲                  │      resume        │
//!        └──── rearm ───────┴────────────────────┘
//! ```
//!
//! Both values live in `tokio::sync::watch` channels: every transition is
//! applied under the channel's lock together with the reset request, and
//! waiters wake on the new value instead of polling.

use tokio::sync::watch;
use tracing::debug;

/// Gate phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GatePhase {
    /// Blocked until a `start`
    #[default]
    WaitingForStart,
    /// Ticks may run
    Running,
    /// Blocked until a `resume`
    Paused,
}

/// Inputs of the phase machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateEvent {
    /// Client sent `start`
    Start,
    /// Client sent `pause`
    Pause,
    /// Client sent `resume`
    Resume,
    /// Session ended or client sent `restart`
    Rearm,
}

impl GatePhase {
    /// Next phase, or `None` when the event does not apply.
    pub fn transition(self, event: GateEvent) -> Option<GatePhase> {
        use GatePhase::*;
        match (self, event) {
            (WaitingForStart, GateEvent::Start) => Some(Running),
            (Running, GateEvent::Pause) => Some(Paused),
            (Paused, GateEvent::Resume) => Some(Running),
            (Running | Paused, GateEvent::Rearm) => Some(WaitingForStart),
            _ => None,
        }
    }
}

/// Outcome of an ack token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckOutcome {
    /// Counter moved to this tick
    Advanced(u64),
    /// Token was not `acked + 1`; counter unchanged
    Mismatch {
        /// Token the gate wanted
        expected: u64,
        /// Token received
        got: u64,
    },
}

/// Phase plus the pending reset, guarded by one lock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct GateState {
    phase: GatePhase,
    reset_pending: bool,
}

/// Phase machine plus the client's acked tick.
#[derive(Debug)]
pub struct LockstepGate {
    state: watch::Sender<GateState>,
    acked: watch::Sender<u64>,
}

impl Default for LockstepGate {
    fn default() -> Self {
        Self::new()
    }
}

impl LockstepGate {
    /// Counter value before the first ack.
    pub const INITIAL_TICK: u64 = 1;

    /// Gate waiting for start.
    pub fn new() -> Self {
        let (state, _) = watch::channel(GateState::default());
        let (acked, _) = watch::channel(Self::INITIAL_TICK);
        Self { state, acked }
    }

    /// Current phase.
    pub fn phase(&self) -> GatePhase {
        self.state.borrow().phase
    }

    /// Apply an event. Returns the new phase when it changed anything.
    /// An accepted `Start` requests a reset.
    pub fn apply(&self, event: GateEvent) -> Option<GatePhase> {
        let mut next = None;
        self.state.send_if_modified(|state| match state.phase.transition(event) {
            Some(to) => {
                debug!("Gate {:?} -> {:?} on {:?}", state.phase, to, event);
                state.phase = to;
                if event == GateEvent::Start {
                    state.reset_pending = true;
                }
                next = Some(to);
                true
            }
            None => false,
        });
        next
    }

    /// Re-arm the start gate. Called by the tick loop when a session ends.
    pub fn rearm(&self) -> Option<GatePhase> {
        self.apply(GateEvent::Rearm)
    }

    /// Is a reset waiting to be consumed?
    pub fn reset_pending(&self) -> bool {
        self.state.borrow().reset_pending
    }

    /// Consume the reset request left by the last accepted `start`.
    pub fn take_reset(&self) -> bool {
        let mut pending = false;
        self.state.send_if_modified(|state| {
            pending = std::mem::take(&mut state.reset_pending);
            pending
        });
        pending
    }

    /// Make sure a finished session waits for a fresh `start`. Re-arms
    /// unless a `start` already arrived and its reset is still pending.
    /// Returns whether the gate was re-armed.
    pub fn require_start(&self) -> bool {
        let mut rearmed = false;
        self.state.send_if_modified(|state| {
            if state.reset_pending || state.phase == GatePhase::WaitingForStart {
                return false;
            }
            debug!("Gate {:?} -> {:?} on finished session", state.phase, GatePhase::WaitingForStart);
            state.phase = GatePhase::WaitingForStart;
            rearmed = true;
            true
        });
        rearmed
    }

    /// Last acknowledged tick.
    pub fn acked_tick(&self) -> u64 {
        *self.acked.borrow()
    }

    /// Token the next snapshot carries.
    pub fn expecting_tick(&self) -> u64 {
        self.acked_tick() + 1
    }

    /// Compare a token against `acked + 1` and advance on a match.
    pub fn handle_ack(&self, token: u64) -> AckOutcome {
        let mut outcome = AckOutcome::Mismatch { expected: 0, got: token };
        self.acked.send_if_modified(|acked| {
            let expected = *acked + 1;
            if token == expected {
                *acked = token;
                outcome = AckOutcome::Advanced(token);
                true
            } else {
                outcome = AckOutcome::Mismatch { expected, got: token };
                false
            }
        });
        outcome
    }

    /// Resolve once the phase leaves `WaitingForStart`.
    pub async fn wait_for_start(&self) {
        self.wait_for_phase(|p| p != GatePhase::WaitingForStart).await;
    }

    /// Resolve once the phase is not `Paused`.
    pub async fn wait_while_paused(&self) {
        self.wait_for_phase(|p| p != GatePhase::Paused).await;
    }

    /// Resolve once the client acked `tick`.
    pub async fn wait_for_ack(&self, tick: u64) {
        let mut rx = self.acked.subscribe();
        // the sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|acked| *acked >= tick).await;
    }

    async fn wait_for_phase(&self, done: impl Fn(GatePhase) -> bool) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| done(state.phase)).await;
    }
}
