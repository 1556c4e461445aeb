//! Entity Registry
//!
//! One table of pre-allocated entities keyed by stable id, plus the
//! optional active frog. Ids never change for table rows: a level that
//! needs fewer instances parks the surplus off-grid instead of deleting it.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Serialize, Deserialize};
use tracing::{debug, warn};

use crate::core::grid::GridPos;
use crate::core::hash::StateHasher;
use crate::game::entity::{Entity, EntityId, EntityKind, EntityState, Frog, Heading};
use crate::game::layout::{LayoutStore, LevelLayout};

/// Number of pre-allocated instances per kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityCounts {
    /// Cars
    pub cars: usize,
    /// Trucks
    pub trucks: usize,
    /// Logs
    pub logs: usize,
    /// Turtles
    pub turtles: usize,
    /// Pads
    pub pads: usize,
}

impl EntityCounts {
    /// Enough instances for the largest layout in the store.
    pub fn covering(store: &LayoutStore) -> Self {
        Self {
            cars: store.max_spawns(EntityKind::Car),
            trucks: store.max_spawns(EntityKind::Truck),
            logs: store.max_spawns(EntityKind::Log),
            turtles: store.max_spawns(EntityKind::Turtle),
            pads: store.max_spawns(EntityKind::Pad),
        }
    }

    /// Count for a kind.
    pub fn get(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Car => self.cars,
            EntityKind::Truck => self.trucks,
            EntityKind::Log => self.logs,
            EntityKind::Turtle => self.turtles,
            EntityKind::Pad => self.pads,
            EntityKind::Frog => 1,
        }
    }
}

/// What happened when a layout was applied.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Spawn points with no instance left to fill them
    pub dropped_spawns: BTreeMap<EntityKind, usize>,
    /// Instances without a spawn point, parked off-grid
    pub parked: BTreeMap<EntityKind, usize>,
}

/// Owner of all entity positions.
#[derive(Clone, Debug)]
pub struct EntityRegistry {
    entities: BTreeMap<EntityId, Entity>,
    frog: Option<Frog>,
    next_id: EntityId,
    layout: Arc<LevelLayout>,
}

impl EntityRegistry {
    /// Allocate instances (ids from 1, kinds in a fixed order) and apply
    /// the initial layout.
    pub fn new(counts: EntityCounts, layout: Arc<LevelLayout>, dive_stride: usize) -> Self {
        let mut entities = BTreeMap::new();
        let mut next_id: EntityId = 1;

        for kind in EntityKind::MOBILE.iter().copied().chain(std::iter::once(EntityKind::Pad)) {
            for _ in 0..counts.get(kind) {
                entities.insert(next_id, Entity::parked(next_id, kind));
                next_id += 1;
            }
        }

        let mut registry = Self {
            entities,
            frog: None,
            next_id,
            layout: layout.clone(),
        };
        registry.apply_level(layout, dive_stride);
        registry
    }

    /// Place every instance on its layout spawn, clear pads and move an
    /// active frog back to the level start.
    ///
    /// Spawns are assigned in file order to instances in id order.
    pub fn apply_level(&mut self, layout: Arc<LevelLayout>, dive_stride: usize) -> ApplyReport {
        let mut report = ApplyReport::default();

        for kind in EntityKind::MOBILE {
            let spawns = layout.spawns(kind);
            let mut assigned = 0usize;
            for entity in self.entities.values_mut().filter(|e| e.kind == kind) {
                match spawns.get(assigned) {
                    Some(spawn) => {
                        entity.position = spawn.position;
                        entity.heading = spawn.heading;
                        if let EntityState::Turtle { submerged, diver } = &mut entity.state {
                            *submerged = false;
                            *diver = dive_stride > 0 && assigned % dive_stride == 0;
                        }
                    }
                    None => {
                        park(entity);
                        *report.parked.entry(kind).or_default() += 1;
                    }
                }
                assigned += 1;
            }
            if spawns.len() > assigned {
                report.dropped_spawns.insert(kind, spawns.len() - assigned);
            }
        }

        let mut assigned = 0usize;
        for pad in self.entities.values_mut().filter(|e| e.kind == EntityKind::Pad) {
            pad.state = EntityState::Pad { occupied: false, occupied_by: None };
            match layout.pads.get(assigned) {
                Some(pos) => {
                    pad.position = *pos;
                    pad.heading = Heading::default();
                }
                None => {
                    park(pad);
                    *report.parked.entry(EntityKind::Pad).or_default() += 1;
                }
            }
            assigned += 1;
        }
        if layout.pads.len() > assigned {
            report.dropped_spawns.insert(EntityKind::Pad, layout.pads.len() - assigned);
        }

        for (kind, n) in &report.dropped_spawns {
            warn!(
                "Level '{}': {} {} spawn(s) dropped, not enough instances",
                layout.name, n, kind.breed()
            );
        }
        if !report.parked.is_empty() {
            debug!("Level '{}': parked {:?}", layout.name, report.parked);
        }

        if let Some(frog) = self.frog.as_mut() {
            frog.respawn(layout.frog_start);
        }
        self.layout = layout;
        report
    }

    /// Current layout.
    pub fn layout(&self) -> &Arc<LevelLayout> {
        &self.layout
    }

    // =========================================================================
    // Frog
    // =========================================================================

    /// Create a frog with a fresh id at the level start.
    pub fn activate_frog(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        self.frog = Some(Frog::new(id, self.layout.frog_start));
        id
    }

    /// Remove the active frog, returning its id.
    pub fn retire_frog(&mut self) -> Option<EntityId> {
        self.frog.take().map(|f| f.id)
    }

    /// The active frog.
    pub fn frog(&self) -> Option<&Frog> {
        self.frog.as_ref()
    }

    /// The active frog, mutably.
    pub fn frog_mut(&mut self) -> Option<&mut Frog> {
        self.frog.as_mut()
    }

    // =========================================================================
    // Table access
    // =========================================================================

    /// All table rows in id order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// All table rows, mutably.
    pub fn entities_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }

    /// Rows of one kind.
    pub fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &Entity> {
        self.entities.values().filter(move |e| e.kind == kind)
    }

    /// Row by id.
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Row by id, mutably.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    // =========================================================================
    // Tile queries
    // =========================================================================

    /// Is a car or truck on this tile?
    pub fn vehicle_at(&self, pos: GridPos) -> bool {
        self.entities.values().any(|e| e.kind.is_vehicle() && e.position == pos)
    }

    /// Is a visible log or turtle on this tile?
    pub fn platform_at(&self, pos: GridPos) -> bool {
        self.entities.values().any(|e| e.is_platform() && e.position == pos)
    }

    /// Pad on this tile, if any.
    pub fn pad_at(&self, pos: GridPos) -> Option<&Entity> {
        self.entities.values().find(|e| e.kind == EntityKind::Pad && e.position == pos)
    }

    /// Mark a pad as filled. Occupancy is never cleared here.
    pub fn occupy_pad(&mut self, pad_id: EntityId, frog_id: EntityId) -> bool {
        match self.entities.get_mut(&pad_id).map(|e| &mut e.state) {
            Some(EntityState::Pad { occupied, occupied_by }) if !*occupied => {
                *occupied = true;
                *occupied_by = Some(frog_id);
                true
            }
            _ => false,
        }
    }

    /// Pads placed on the grid.
    pub fn placed_pads(&self) -> impl Iterator<Item = &Entity> {
        self.of_kind(EntityKind::Pad).filter(|p| !p.is_parked())
    }

    /// Number of filled pads.
    pub fn occupied_pad_count(&self) -> usize {
        self.placed_pads().filter(|p| p.is_occupied_pad()).count()
    }

    /// Are all placed pads filled?
    pub fn all_pads_occupied(&self) -> bool {
        self.placed_pads().all(|p| p.is_occupied_pad())
    }

    /// Hash table rows and frog for verification.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        for entity in self.entities.values() {
            hasher.update_u32(entity.id);
            hasher.update_u8(entity.kind as u8);
            hasher.update_pos(entity.position);
            hasher.update_bool(entity.is_submerged());
            hasher.update_bool(entity.is_occupied_pad());
        }
        match &self.frog {
            Some(frog) => {
                hasher.update_u32(frog.id);
                hasher.update_pos(frog.position);
                hasher.update_u32(frog.jumps);
            }
            None => hasher.update_u32(0),
        }
    }
}

fn park(entity: &mut Entity) {
    entity.position = GridPos::PARKED;
    if let EntityState::Turtle { submerged, diver } = &mut entity.state {
        *submerged = false;
        *diver = false;
    }
}
