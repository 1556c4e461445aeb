//! Network Layer
//!
//! WebSocket bridge to the renderer and the client-paced tick loop.
//! This layer is **non-deterministic** - all game logic runs through `game/`.

pub mod protocol;
pub mod lockstep;
pub mod bridge;
pub mod session;

pub use protocol::{
    parse_inbound, AckNotice, AgentView, ControlCommand, Inbound, ProtocolError, StateSnapshot,
};
pub use lockstep::{AckOutcome, GateEvent, GatePhase, LockstepGate};
pub use bridge::{BridgeError, ClientBridge, MessageOutcome, Outgoing};
pub use session::{RunSummary, Simulation};
