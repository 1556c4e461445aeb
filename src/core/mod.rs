//! Core deterministic primitives.
//!
//! Integer grid geometry and state hashing. Nothing in here touches I/O,
//! threads or wall-clock time.

pub mod grid;
pub mod hash;

// Re-export core types
pub use grid::{GridPos, GridSize, torus_delta, median};
pub use hash::{StateHash, StateHasher, compute_state_hash};
