//! Entity Definitions
//!
//! Every object the renderer draws is an entity with a stable integer id.
//! Mobile entities and pads share one table; the controlled frog is kept
//! apart because at most one exists and it may be absent.

use serde::{Serialize, Deserialize};

use crate::core::grid::GridPos;

/// Stable entity identifier shared with the renderer.
pub type EntityId = u32;

// =============================================================================
// KIND
// =============================================================================

/// Kind discriminant (the renderer calls it "breed").
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum EntityKind {
    /// The controlled agent
    Frog = 0,
    /// Fast road vehicle
    Car = 1,
    /// Slow road vehicle
    Truck = 2,
    /// Floating platform, always visible
    Log = 3,
    /// Floating platform, may submerge
    Turtle = 4,
    /// Goal slot
    Pad = 5,
}

impl EntityKind {
    /// Mobile kinds in allocation order.
    pub const MOBILE: [EntityKind; 4] = [
        EntityKind::Car,
        EntityKind::Truck,
        EntityKind::Log,
        EntityKind::Turtle,
    ];

    /// Name used on the wire.
    pub fn breed(self) -> &'static str {
        match self {
            EntityKind::Frog => "frog",
            EntityKind::Car => "car",
            EntityKind::Truck => "truck",
            EntityKind::Log => "log",
            EntityKind::Turtle => "turtle",
            EntityKind::Pad => "pad",
        }
    }

    /// Can the frog stand on this kind over water?
    #[inline]
    pub fn is_platform(self) -> bool {
        matches!(self, EntityKind::Log | EntityKind::Turtle)
    }

    /// Does touching this kind kill the frog?
    #[inline]
    pub fn is_vehicle(self) -> bool {
        matches!(self, EntityKind::Car | EntityKind::Truck)
    }
}

// =============================================================================
// HEADING / DIRECTION
// =============================================================================

/// Horizontal travel direction of a lane entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Heading {
    /// Towards increasing x
    #[default]
    Right,
    /// Towards decreasing x
    Left,
}

impl Heading {
    /// Signed x step.
    #[inline]
    pub fn dx(self) -> i32 {
        match self {
            Heading::Right => 1,
            Heading::Left => -1,
        }
    }

    /// Heading in degrees as the renderer expects it.
    pub fn degrees(self) -> i32 {
        match self {
            Heading::Right => 90,
            Heading::Left => -90,
        }
    }
}

/// One hop of the controlled frog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Towards the pads (y + 1)
    Up,
    /// Away from the pads (y - 1)
    Down,
    /// x - 1
    Left,
    /// x + 1
    Right,
}

impl Direction {
    /// (dx, dy) for one hop.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, 1),
            Direction::Down => (0, -1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

// =============================================================================
// ENTITY TABLE ROWS
// =============================================================================

/// Kind-specific state carried by a table row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityState {
    /// Cars, trucks, logs
    Plain,
    /// Turtles
    Turtle {
        /// Under water this tick (not a platform)
        submerged: bool,
        /// Takes part in the dive cycle
        diver: bool,
    },
    /// Goal pads
    Pad {
        /// Filled by a frog; only cleared by a level reset
        occupied: bool,
        /// Frog that filled it
        occupied_by: Option<EntityId>,
    },
}

/// A row of the entity table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable id
    pub id: EntityId,
    /// Kind discriminant
    pub kind: EntityKind,
    /// Current tile ([`GridPos::PARKED`] when unused by the level)
    pub position: GridPos,
    /// Lane direction
    pub heading: Heading,
    /// Kind-specific state
    pub state: EntityState,
}

impl Entity {
    /// Create a parked entity of the given kind.
    pub fn parked(id: EntityId, kind: EntityKind) -> Self {
        let state = match kind {
            EntityKind::Turtle => EntityState::Turtle { submerged: false, diver: false },
            EntityKind::Pad => EntityState::Pad { occupied: false, occupied_by: None },
            _ => EntityState::Plain,
        };
        Self {
            id,
            kind,
            position: GridPos::PARKED,
            heading: Heading::default(),
            state,
        }
    }

    /// Is this entity off the grid?
    #[inline]
    pub fn is_parked(&self) -> bool {
        self.position.is_parked()
    }

    /// Submerged turtle?
    #[inline]
    pub fn is_submerged(&self) -> bool {
        matches!(self.state, EntityState::Turtle { submerged: true, .. })
    }

    /// Can the frog stand here this tick?
    #[inline]
    pub fn is_platform(&self) -> bool {
        self.kind.is_platform() && !self.is_submerged() && !self.is_parked()
    }

    /// Occupied pad?
    #[inline]
    pub fn is_occupied_pad(&self) -> bool {
        matches!(self.state, EntityState::Pad { occupied: true, .. })
    }
}

// =============================================================================
// CONTROLLED FROG
// =============================================================================

/// The single player-controlled agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frog {
    /// Stable id (a fresh one per session)
    pub id: EntityId,
    /// Current tile
    pub position: GridPos,
    /// Hops since the last spawn
    pub jumps: u32,
    /// Latest admitted command, consumed by the next tick
    pub pending_input: Option<Direction>,
}

impl Frog {
    /// Create a frog at its spawn tile.
    pub fn new(id: EntityId, spawn: GridPos) -> Self {
        Self {
            id,
            position: spawn,
            jumps: 0,
            pending_input: None,
        }
    }

    /// Queue a command, discarding any earlier one.
    pub fn queue_input(&mut self, direction: Direction) {
        self.pending_input = Some(direction);
    }

    /// Put the frog back on its spawn tile.
    pub fn respawn(&mut self, spawn: GridPos) {
        self.position = spawn;
        self.jumps = 0;
        self.pending_input = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_kinds() {
        assert!(EntityKind::Log.is_platform());
        assert!(EntityKind::Turtle.is_platform());
        assert!(!EntityKind::Car.is_platform());
        assert!(EntityKind::Truck.is_vehicle());
        assert!(!EntityKind::Pad.is_vehicle());
    }

    #[test]
    fn test_submerged_turtle_is_not_platform() {
        let mut turtle = Entity::parked(1, EntityKind::Turtle);
        turtle.position = GridPos::new(2, 3);
        assert!(turtle.is_platform());

        turtle.state = EntityState::Turtle { submerged: true, diver: true };
        assert!(!turtle.is_platform());
    }

    #[test]
    fn test_parked_log_is_not_platform() {
        let log = Entity::parked(7, EntityKind::Log);
        assert!(log.is_parked());
        assert!(!log.is_platform());
    }

    #[test]
    fn test_queue_input_keeps_latest() {
        let mut frog = Frog::new(1, GridPos::new(5, 0));
        frog.queue_input(Direction::Up);
        frog.queue_input(Direction::Left);
        assert_eq!(frog.pending_input, Some(Direction::Left));
    }

    #[test]
    fn test_breed_names() {
        assert_eq!(EntityKind::Turtle.breed(), "turtle");
        assert_eq!(serde_json::to_string(&EntityKind::Pad).unwrap(), "\"pad\"");
        assert_eq!(Heading::Left.degrees(), -90);
    }
}
