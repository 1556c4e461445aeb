//! Conveyor Motion Engine
//!
//! Infers how far each water row moved between two ticks from position
//! snapshots, so a frog standing on a log or turtle can be carried along.
//!
//! ## Per tick
//!
//! 1. For each log/turtle whose previous tile is in the same row:
//!    `dx = clamp(torus_delta(prev_x, cur_x, width), -1, 1)`.
//! 2. `dx_by_prev_x[row][prev_x] = dx` for non-zero dx; the median of all
//!    samples of a row is the fallback used when the frog's previous tile
//!    has no exact entry.
//! 3. Previous tiles of turtles that are submerged now are lethal origins.
//! 4. After the rules ran, [`ConveyorEngine::record`] captures the snapshot
//!    and rebuilds the platform map for the next tick.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::grid::{GridPos, median, torus_delta};
use crate::game::entity::{EntityId, EntityKind};
use crate::game::registry::EntityRegistry;

/// Previous-tick positions of platforms and the frog.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickSnapshot {
    /// Log and turtle tiles keyed by id
    pub platforms: BTreeMap<EntityId, GridPos>,
    /// Frog tile, if a frog was active
    pub frog: Option<GridPos>,
}

impl TickSnapshot {
    /// Capture the current registry state.
    pub fn capture(registry: &EntityRegistry) -> Self {
        let platforms = registry.entities()
            .filter(|e| e.kind.is_platform() && !e.is_parked())
            .map(|e| (e.id, e.position))
            .collect();
        Self {
            platforms,
            frog: registry.frog().map(|f| f.position),
        }
    }
}

/// Per-row set of tiles acting as a platform.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlatformMap {
    rows: BTreeMap<i32, BTreeSet<i32>>,
}

impl PlatformMap {
    /// Logs always count, turtles only while above water.
    pub fn build(registry: &EntityRegistry) -> Self {
        let mut rows: BTreeMap<i32, BTreeSet<i32>> = BTreeMap::new();
        for entity in registry.entities().filter(|e| e.is_platform()) {
            rows.entry(entity.position.y).or_default().insert(entity.position.x);
        }
        Self { rows }
    }

    /// Is this tile a platform?
    pub fn contains(&self, pos: GridPos) -> bool {
        self.rows.get(&pos.y).is_some_and(|xs| xs.contains(&pos.x))
    }

    /// Platform tiles of one row.
    pub fn row(&self, y: i32) -> Option<&BTreeSet<i32>> {
        self.rows.get(&y)
    }
}

/// Displacement of every water row between the previous and current tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RowMotion {
    dx_by_prev_x: BTreeMap<i32, BTreeMap<i32, i32>>,
    fallback_dx: BTreeMap<i32, i32>,
    lethal_origins: BTreeMap<i32, BTreeSet<i32>>,
}

impl RowMotion {
    /// Carry displacement for a frog that stood on `prev` last tick.
    pub fn carry_dx(&self, prev: GridPos) -> i32 {
        self.dx_by_prev_x
            .get(&prev.y)
            .and_then(|row| row.get(&prev.x))
            .copied()
            .unwrap_or_else(|| self.fallback_dx(prev.y))
    }

    /// Median displacement of a row.
    pub fn fallback_dx(&self, y: i32) -> i32 {
        self.fallback_dx.get(&y).copied().unwrap_or(0)
    }

    /// Did a turtle leave `prev` and dive this tick?
    pub fn is_lethal_origin(&self, prev: GridPos) -> bool {
        self.lethal_origins.get(&prev.y).is_some_and(|xs| xs.contains(&prev.x))
    }
}

/// Holds the previous tick's view and derives row motion from it.
#[derive(Clone, Debug, Default)]
pub struct ConveyorEngine {
    snapshot: TickSnapshot,
    platforms: PlatformMap,
}

impl ConveyorEngine {
    /// Empty engine (first tick carries nothing).
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine primed with the registry's current state.
    pub fn primed(registry: &EntityRegistry) -> Self {
        let mut engine = Self::new();
        engine.record(registry);
        engine
    }

    /// Derive row displacement from the stored snapshot to the registry's
    /// current positions.
    pub fn compute_motion(&self, registry: &EntityRegistry) -> RowMotion {
        let width = registry.layout().size.width;
        let mut motion = RowMotion::default();
        let mut samples: BTreeMap<i32, Vec<i32>> = BTreeMap::new();

        for entity in registry.entities().filter(|e| e.kind.is_platform() && !e.is_parked()) {
            let Some(prev) = self.snapshot.platforms.get(&entity.id) else {
                continue;
            };
            if prev.y != entity.position.y {
                continue;
            }

            // more than one tile between ticks is a wrap artifact
            let dx = torus_delta(prev.x, entity.position.x, width).clamp(-1, 1);
            if dx != 0 {
                motion.dx_by_prev_x.entry(prev.y).or_default().insert(prev.x, dx);
            }
            samples.entry(prev.y).or_default().push(dx);

            if entity.kind == EntityKind::Turtle && entity.is_submerged() {
                motion.lethal_origins.entry(prev.y).or_default().insert(prev.x);
            }
        }

        for (row, mut row_samples) in samples {
            motion.fallback_dx.insert(row, median(&mut row_samples));
        }

        motion
    }

    /// Frog tile of the previous tick.
    pub fn previous_frog(&self) -> Option<GridPos> {
        self.snapshot.frog
    }

    /// Platform map built at the end of the previous tick.
    pub fn previous_platforms(&self) -> &PlatformMap {
        &self.platforms
    }

    /// Was the frog riding a platform: same row as last tick and last
    /// tick's tile was a platform then.
    pub fn was_on_platform(&self, prev: GridPos, pos: GridPos) -> bool {
        prev.y == pos.y && self.platforms.contains(prev)
    }

    /// Store this tick as the previous tick of the next one.
    pub fn record(&mut self, registry: &EntityRegistry) {
        self.snapshot = TickSnapshot::capture(registry);
        self.platforms = PlatformMap::build(registry);
    }
}
