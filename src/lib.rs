//! # Frogger Lockstep Server
//!
//! Deterministic Frogger simulation driven tick-by-tick by a remote renderer.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    FROGGER SERVER                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── grid.rs     - Tiles, toroidal delta, median             │
//! │  └── hash.rs     - State hashing for verification            │
//! │                                                              │
//! │  game/           - Game logic (deterministic)                │
//! │  ├── layout.rs   - Level grids and the layout store          │
//! │  ├── registry.rs - Entity table keyed by stable id           │
//! │  ├── movement.rs - Lane movement, turtle dives               │
//! │  ├── conveyor.rs - Row displacement from snapshots           │
//! │  ├── state.rs    - Session state and the world               │
//! │  └── tick.rs     - Rule tick (carry, hazard, pad, timer)     │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── protocol.rs - Wire messages                             │
//! │  ├── lockstep.rs - Start/pause gate and ack counter          │
//! │  ├── bridge.rs   - WebSocket endpoint                        │
//! │  └── session.rs  - Client-paced tick loop                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules are deterministic:
//! - Integer grid coordinates only
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time dependencies
//!
//! Given the same layouts, configuration and per-tick inputs, the
//! simulation produces identical state hashes.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use config::{ConfigError, SimulationConfig};
pub use core::grid::{GridPos, GridSize, torus_delta};
pub use game::state::{SessionDefaults, World};
pub use game::tick::{tick, TickResult};
pub use network::{ClientBridge, RunSummary, Simulation};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
