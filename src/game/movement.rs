//! Lane Movement
//!
//! Per-kind movement of cars, trucks, logs and turtles. Runs first in every
//! tick and produces the positions the conveyor engine reads.

use serde::{Serialize, Deserialize};

use crate::game::entity::{EntityKind, EntityState};
use crate::game::registry::EntityRegistry;

/// Movement periods (in ticks) and the turtle dive cycle.
///
/// A period of 0 freezes that kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Cars hop every N ticks
    pub car_period: u64,
    /// Trucks hop every N ticks
    pub truck_period: u64,
    /// Logs hop every N ticks
    pub log_period: u64,
    /// Turtles hop every N ticks
    pub turtle_period: u64,
    /// Length of one dive cycle
    pub dive_period: u64,
    /// Ticks per cycle spent under water
    pub dive_ticks: u64,
    /// Every N-th turtle of a level dives (0 = none)
    pub dive_stride: usize,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            car_period: 1,
            truck_period: 2,
            log_period: 2,
            turtle_period: 2,
            dive_period: 12,
            dive_ticks: 4,
            dive_stride: 3,
        }
    }
}

impl MovementConfig {
    /// Everything frozen, nothing dives. Handy for scripted scenarios.
    pub fn frozen() -> Self {
        Self {
            car_period: 0,
            truck_period: 0,
            log_period: 0,
            turtle_period: 0,
            dive_period: 0,
            dive_ticks: 0,
            dive_stride: 0,
        }
    }

    fn period(&self, kind: EntityKind) -> u64 {
        match kind {
            EntityKind::Car => self.car_period,
            EntityKind::Truck => self.truck_period,
            EntityKind::Log => self.log_period,
            EntityKind::Turtle => self.turtle_period,
            EntityKind::Frog | EntityKind::Pad => 0,
        }
    }

    /// Is a diving turtle under water on this tick?
    pub fn diving_at(&self, tick: u64) -> bool {
        self.dive_period > 0 && tick % self.dive_period < self.dive_ticks
    }
}

/// Advance every placed lane entity for `tick`.
pub fn advance_entities(registry: &mut EntityRegistry, tick: u64, config: &MovementConfig) {
    let size = registry.layout().size;
    let diving = config.diving_at(tick);

    for entity in registry.entities_mut() {
        if entity.is_parked() {
            continue;
        }

        let period = config.period(entity.kind);
        if period > 0 && tick % period == 0 {
            entity.position.x = size.wrap_x(entity.position.x + entity.heading.dx());
        }

        if let EntityState::Turtle { submerged, diver } = &mut entity.state {
            *submerged = *diver && diving;
        }
    }
}
