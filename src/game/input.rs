//! Input Admission
//!
//! Single-slot mailbox between the client connection and the tick loop.
//! The slot is overwritten, never queued, and read-and-cleared once per
//! tick. Admission is tracked per ack window: the tick the client last
//! acknowledged identifies the window an input arrived in.

use serde::{Serialize, Deserialize};

use crate::game::entity::Direction;

/// What to do with a second input inside one ack window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionPolicy {
    /// First input of a window is kept, later ones are dropped
    #[default]
    FirstPerTick,
    /// Every input overwrites the slot
    LatestWins,
}

impl AdmissionPolicy {
    /// Policy from the `single_input_per_tick` switch.
    pub fn from_single_input(single_input_per_tick: bool) -> Self {
        if single_input_per_tick {
            Self::FirstPerTick
        } else {
            Self::LatestWins
        }
    }
}

/// Pending command for the frog.
#[derive(Clone, Debug, Default)]
pub struct InputSlot {
    policy: AdmissionPolicy,
    pending: Option<Direction>,
    admitted_window: Option<u64>,
}

impl InputSlot {
    /// Create an empty slot.
    pub fn new(policy: AdmissionPolicy) -> Self {
        Self {
            policy,
            pending: None,
            admitted_window: None,
        }
    }

    /// Offer a command that arrived while `window` was the acked tick.
    ///
    /// Returns whether the command was admitted.
    pub fn offer(&mut self, direction: Direction, window: u64) -> bool {
        if self.policy == AdmissionPolicy::FirstPerTick && self.admitted_window == Some(window) {
            return false;
        }
        self.pending = Some(direction);
        self.admitted_window = Some(window);
        true
    }

    /// Read and clear the slot.
    pub fn take(&mut self) -> Option<Direction> {
        self.pending.take()
    }

    /// Drop any pending command (restart).
    pub fn clear(&mut self) {
        self.pending = None;
        self.admitted_window = None;
    }

    /// Admission policy in use.
    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }
}
