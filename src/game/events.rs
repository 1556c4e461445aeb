//! Game Events
//!
//! Events produced by the rule tick. The session logs them; tests assert on
//! them.

use serde::{Serialize, Deserialize};

use crate::core::grid::GridPos;
use crate::game::entity::EntityId;

/// Why the frog lost a life.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathCause {
    /// The turtle it rode dived this tick
    Submerged,
    /// A platform carried it past the grid edge
    CarriedOffEdge,
    /// Open water without a platform
    Drowned,
    /// Same tile as a car or truck
    HitByVehicle,
    /// The level timer reached zero
    TimeUp,
}

/// Game event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEventData {
    /// Frog lost a life
    FrogDied {
        /// Frog id
        frog_id: EntityId,
        /// Cause
        cause: DeathCause,
        /// Tile where it died
        position: GridPos,
        /// Lives remaining
        lives_left: u32,
    },

    /// Frog filled a pad
    PadReached {
        /// Frog id
        frog_id: EntityId,
        /// Pad id
        pad_id: EntityId,
        /// Pads filled so far
        occupied: usize,
    },

    /// Every pad is filled
    GameWon {
        /// Lives remaining
        lives_left: u32,
    },

    /// No lives left
    GameOver,

    /// A layout was (re)applied
    LevelApplied {
        /// Index asked for
        requested: usize,
        /// Index used
        applied: usize,
    },
}

/// A game event with its tick.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Tick when event occurred
    pub tick: u64,
    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(tick: u64, data: GameEventData) -> Self {
        Self { tick, data }
    }

    /// Create frog died event.
    pub fn frog_died(tick: u64, frog_id: EntityId, cause: DeathCause, position: GridPos, lives_left: u32) -> Self {
        Self::new(tick, GameEventData::FrogDied { frog_id, cause, position, lives_left })
    }

    /// Create pad reached event.
    pub fn pad_reached(tick: u64, frog_id: EntityId, pad_id: EntityId, occupied: usize) -> Self {
        Self::new(tick, GameEventData::PadReached { frog_id, pad_id, occupied })
    }

    /// Is this a death?
    pub fn is_death(&self) -> bool {
        matches!(self.data, GameEventData::FrogDied { .. })
    }

    /// Death cause, if this is a death.
    pub fn death_cause(&self) -> Option<DeathCause> {
        match self.data {
            GameEventData::FrogDied { cause, .. } => Some(cause),
            _ => None,
        }
    }
}
