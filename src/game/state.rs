//! Game State Definitions
//!
//! Session counters, runtime-adjustable defaults and the [`World`] that
//! owns everything the rule tick mutates.

use std::sync::Arc;

use serde::{Serialize, Deserialize};
use tracing::info;

use crate::core::hash::{StateHash, compute_state_hash};
use crate::game::conveyor::ConveyorEngine;
use crate::game::entity::{Direction, EntityId};
use crate::game::events::{GameEvent, GameEventData};
use crate::game::layout::LayoutStore;
use crate::game::movement::MovementConfig;
use crate::game::registry::{EntityCounts, EntityRegistry};

// =============================================================================
// SESSION DEFAULTS
// =============================================================================

/// Allowed start time range (timer units).
pub const START_TIME_RANGE: (u32, u32) = (1, 999);
/// Allowed start lives range.
pub const START_LIVES_RANGE: (u32, u32) = (1, 99);
/// Allowed start level range (1-based).
pub const START_LEVEL_RANGE: (u32, u32) = (1, 99);

fn clamp_to(value: i64, (lo, hi): (u32, u32)) -> u32 {
    value.clamp(lo as i64, hi as i64) as u32
}

/// Values a restart begins with. Adjustable at runtime by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDefaults {
    /// Timer at spawn
    pub start_time: u32,
    /// Lives at session start
    pub start_lives: u32,
    /// Requested level (1-based)
    pub start_level: usize,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self { start_time: 60, start_lives: 5, start_level: 1 }
    }
}

impl SessionDefaults {
    /// Build clamped defaults.
    pub fn clamped(start_time: i64, start_lives: i64, start_level: i64) -> Self {
        let mut defaults = Self::default();
        defaults.set_start_time(start_time);
        defaults.set_start_lives(start_lives);
        defaults.set_start_level(start_level);
        defaults
    }

    /// Set the start time, clamped to [`START_TIME_RANGE`]. Returns the stored value.
    pub fn set_start_time(&mut self, value: i64) -> u32 {
        self.start_time = clamp_to(value, START_TIME_RANGE);
        self.start_time
    }

    /// Set the start lives, clamped to [`START_LIVES_RANGE`].
    pub fn set_start_lives(&mut self, value: i64) -> u32 {
        self.start_lives = clamp_to(value, START_LIVES_RANGE);
        self.start_lives
    }

    /// Set the start level, clamped to [`START_LEVEL_RANGE`].
    pub fn set_start_level(&mut self, value: i64) -> u32 {
        let level = clamp_to(value, START_LEVEL_RANGE);
        self.start_level = level as usize;
        level
    }
}

// =============================================================================
// GAME STATE
// =============================================================================

/// Counters and flags of the running session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    /// Lives left
    pub lives: u32,
    /// Timer units left
    pub time_left: u32,
    /// No lives left
    pub game_over: bool,
    /// All pads filled
    pub game_won: bool,
    /// Level the client asked for
    pub requested_level: usize,
    /// Level actually applied
    pub current_level: usize,
}

impl GameState {
    /// Fresh state for a new session.
    pub fn fresh(defaults: &SessionDefaults, requested_level: usize, current_level: usize) -> Self {
        Self {
            lives: defaults.start_lives,
            time_left: defaults.start_time,
            game_over: false,
            game_won: false,
            requested_level,
            current_level,
        }
    }

    /// Has the session ended (either way)?
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.game_over || self.game_won
    }
}

// =============================================================================
// RULE CONFIG
// =============================================================================

/// Fixed simulation parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuleConfig {
    /// Timer loses one unit every N ticks
    pub ticks_per_second: u64,
    /// Lane movement
    pub movement: MovementConfig,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            ticks_per_second: 5,
            movement: MovementConfig::default(),
        }
    }
}

// =============================================================================
// WORLD
// =============================================================================

/// Complete simulation state.
///
/// Only the tick loop touches a `World`; nothing in here is shared.
#[derive(Clone, Debug)]
pub struct World {
    /// Simulation tick, never reset by restarts
    pub tick: u64,
    /// Session counters
    pub state: GameState,
    /// Entity positions
    pub registry: EntityRegistry,
    /// Previous-tick view for carry inference
    pub(crate) conveyor: ConveyorEngine,
    /// Defaults the current session started with
    pub(crate) defaults: SessionDefaults,
    /// Parameters
    pub(crate) rules: RuleConfig,
    layouts: Arc<LayoutStore>,
    removals: Vec<EntityId>,
    pending_events: Vec<GameEvent>,
}

impl World {
    /// Create a world with the given defaults applied.
    pub fn new(
        layouts: Arc<LayoutStore>,
        counts: EntityCounts,
        rules: RuleConfig,
        defaults: SessionDefaults,
    ) -> Self {
        let selection = layouts.select(defaults.start_level);
        let registry = EntityRegistry::new(counts, selection.layout, rules.movement.dive_stride);
        let conveyor = ConveyorEngine::primed(&registry);

        let mut world = Self {
            tick: 0,
            state: GameState::fresh(&defaults, selection.requested, selection.applied),
            registry,
            conveyor,
            defaults,
            rules,
            layouts,
            removals: Vec::new(),
            pending_events: Vec::new(),
        };
        world.reset(defaults);
        world
    }

    /// Start a new session: re-apply the requested level, clear pads,
    /// refill lives and timer, and activate a frog with a fresh id.
    pub fn reset(&mut self, defaults: SessionDefaults) {
        let selection = self.layouts.select(defaults.start_level);
        self.registry.apply_level(selection.layout.clone(), self.rules.movement.dive_stride);

        if let Some(old) = self.registry.retire_frog() {
            self.removals.push(old);
        }
        let frog_id = self.registry.activate_frog();

        self.defaults = defaults;
        self.state = GameState::fresh(&defaults, selection.requested, selection.applied);
        self.rebase();

        info!(
            "Session reset: level {} (requested {}), {} lives, time {}, frog {}",
            selection.applied, selection.requested, defaults.start_lives, defaults.start_time, frog_id
        );
        self.push_event(GameEvent::new(self.tick, GameEventData::LevelApplied {
            requested: selection.requested,
            applied: selection.applied,
        }));
    }

    /// Treat the current positions as the previous tick.
    pub fn rebase(&mut self) {
        self.conveyor.record(&self.registry);
    }

    /// Defaults of the running session.
    pub fn defaults(&self) -> &SessionDefaults {
        &self.defaults
    }

    /// Simulation parameters.
    pub fn rules(&self) -> &RuleConfig {
        &self.rules
    }

    /// Loaded layouts.
    pub fn layouts(&self) -> &Arc<LayoutStore> {
        &self.layouts
    }

    /// Hand a command to the active frog. Returns false when no frog is active.
    pub fn queue_input(&mut self, direction: Direction) -> bool {
        match self.registry.frog_mut() {
            Some(frog) => {
                frog.queue_input(direction);
                true
            }
            None => false,
        }
    }

    /// Queue an id for the client to discard.
    pub fn retire(&mut self, id: EntityId) {
        self.removals.push(id);
    }

    /// Drain ids retired since the last call.
    pub fn take_removals(&mut self) -> Vec<EntityId> {
        std::mem::take(&mut self.removals)
    }

    /// Push an event.
    pub fn push_event(&mut self, event: GameEvent) {
        self.pending_events.push(event);
    }

    /// Drain events.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Deterministic digest of the world.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.tick, |hasher| {
            hasher.update_u32(self.state.lives);
            hasher.update_u32(self.state.time_left);
            hasher.update_bool(self.state.game_over);
            hasher.update_bool(self.state.game_won);
            hasher.update_u32(self.state.current_level as u32);
            self.registry.hash_into(hasher);
        })
    }
}
