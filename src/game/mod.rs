//! Game Logic Module
//!
//! All game simulation code. 100% deterministic.
//!
//! ## Module Structure
//!
//! - `entity`: Entity kinds, headings, table rows and the frog
//! - `layout`: Level grid parsing and the 1-based layout store
//! - `registry`: Entity table keyed by stable id
//! - `movement`: Lane movement and the turtle dive cycle
//! - `conveyor`: Row displacement inferred from snapshots
//! - `input`: Single-slot input mailbox
//! - `state`: Session state and the world
//! - `tick`: Authoritative rule tick
//! - `events`: Game events for logging and tests

pub mod entity;
pub mod layout;
pub mod registry;
pub mod movement;
pub mod conveyor;
pub mod input;
pub mod state;
pub mod tick;
pub mod events;

// Re-export key types
pub use entity::{Direction, Entity, EntityId, EntityKind, Frog, Heading};
pub use layout::{LayoutError, LayoutStore, LevelLayout};
pub use registry::{EntityCounts, EntityRegistry};
pub use movement::MovementConfig;
pub use input::{AdmissionPolicy, InputSlot};
pub use state::{GameState, RuleConfig, SessionDefaults, World};
pub use tick::{tick, TickResult};
pub use events::{DeathCause, GameEvent, GameEventData};
