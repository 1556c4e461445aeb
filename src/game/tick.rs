//! Authoritative Simulation Tick
//!
//! One call to [`tick`] advances the world by exactly one step. It is fully
//! deterministic: the same world plus the same queued inputs always yields
//! the same result and the same state hash.
//!
//! ## Order (load-bearing)
//!
//! 1. Lanes move ([`advance_entities`])
//! 2. Row displacement is inferred from last tick's snapshot
//! 3. The frog's queued hop is applied
//! 4. Carry, then submerge override and edge death inside the carry branch
//! 5. Water hazard, suppressed for one tick while being carried
//! 6. Pad arrival and win
//! 7. Vehicle collision
//! 8. Timer
//! 9. Snapshot of this tick for the next one
//!
//! Any death or pad arrival ends rule resolution for the tick.

use tracing::{debug, info};

use crate::core::grid::GridPos;
use crate::game::conveyor::RowMotion;
use crate::game::events::{DeathCause, GameEvent, GameEventData};
use crate::game::movement::advance_entities;
use crate::game::state::World;

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated this tick (including ones queued by a reset before it)
    pub events: Vec<GameEvent>,
    /// Whether the session ended (game over or won) this tick
    pub session_ended: bool,
}

impl TickResult {
    /// Deaths recorded this tick.
    pub fn deaths(&self) -> impl Iterator<Item = DeathCause> + '_ {
        self.events.iter().filter_map(GameEvent::death_cause)
    }
}

/// Run one simulation tick.
pub fn tick(world: &mut World) -> TickResult {
    let was_finished = world.state.is_finished();

    // 0. Advance tick counter
    world.tick += 1;
    let movement = world.rules.movement;
    advance_entities(&mut world.registry, world.tick, &movement);

    let motion = world.conveyor.compute_motion(&world.registry);

    if !was_finished && world.registry.frog().is_some() {
        apply_input(world);
        resolve_frog(world, &motion);
    }

    world.rebase();

    TickResult {
        events: world.take_events(),
        session_ended: !was_finished && world.state.is_finished(),
    }
}

/// Consume the frog's queued hop. A hop off the grid is ignored.
fn apply_input(world: &mut World) {
    let size = world.registry.layout().size;
    let Some(frog) = world.registry.frog_mut() else {
        return;
    };
    let Some(direction) = frog.pending_input.take() else {
        return;
    };

    let (dx, dy) = direction.delta();
    let target = frog.position.offset(dx, dy);
    if size.contains(target) {
        frog.position = target;
        frog.jumps += 1;
    } else {
        debug!("Ignoring {:?} hop off the grid at {:?}", direction, frog.position);
    }
}

fn frog_position(world: &World) -> Option<GridPos> {
    world.registry.frog().map(|f| f.position)
}

fn resolve_frog(world: &mut World, motion: &RowMotion) {
    let Some(pos) = frog_position(world) else {
        return;
    };
    let prev = world.conveyor.previous_frog().unwrap_or(pos);
    let carried = world.conveyor.was_on_platform(prev, pos);

    if carried {
        if motion.is_lethal_origin(prev) {
            kill_frog(world, DeathCause::Submerged);
            return;
        }

        let dx = motion.carry_dx(prev);
        if dx != 0 {
            let new_x = pos.x + dx;
            // no wraparound for the frog
            if !world.registry.layout().size.contains_x(new_x) {
                kill_frog(world, DeathCause::CarriedOffEdge);
                return;
            }
            if let Some(frog) = world.registry.frog_mut() {
                frog.position.x = new_x;
            }
        }
    }

    let Some(pos) = frog_position(world) else {
        return;
    };

    if check_water(world, pos, carried) {
        return;
    }
    if check_pad(world, pos) {
        return;
    }
    if world.registry.vehicle_at(pos) {
        kill_frog(world, DeathCause::HitByVehicle);
        // the death already restarted the timer
        return;
    }
    update_timer(world);
}

/// Open water kills unless the frog is riding this tick.
fn check_water(world: &mut World, pos: GridPos, carried: bool) -> bool {
    let registry = &world.registry;
    let safe = registry.platform_at(pos) || registry.pad_at(pos).is_some();
    if registry.layout().is_water_row(pos.y) && !safe && !carried {
        kill_frog(world, DeathCause::Drowned);
        return true;
    }
    false
}

fn check_pad(world: &mut World, pos: GridPos) -> bool {
    let Some(pad_id) = world.registry.pad_at(pos).filter(|p| !p.is_occupied_pad()).map(|p| p.id) else {
        return false;
    };
    let Some(frog_id) = world.registry.frog().map(|f| f.id) else {
        return false;
    };

    world.registry.occupy_pad(pad_id, frog_id);
    let spawn = world.registry.layout().frog_start;
    if let Some(frog) = world.registry.frog_mut() {
        frog.respawn(spawn);
    }

    let tick = world.tick;
    let occupied = world.registry.occupied_pad_count();
    info!("Frog {} reached pad {} ({} filled) at tick {}", frog_id, pad_id, occupied, tick);
    world.push_event(GameEvent::pad_reached(tick, frog_id, pad_id, occupied));

    if world.registry.all_pads_occupied() {
        world.state.game_won = true;
        if let Some(id) = world.registry.retire_frog() {
            world.retire(id);
        }
        let lives_left = world.state.lives;
        info!("All pads filled at tick {} with {} lives left", tick, lives_left);
        world.push_event(GameEvent::new(tick, GameEventData::GameWon { lives_left }));
    }
    true
}

fn update_timer(world: &mut World) {
    let divisor = world.rules.ticks_per_second;
    if divisor == 0 || world.tick % divisor != 0 || world.state.time_left == 0 {
        return;
    }
    world.state.time_left -= 1;
    if world.state.time_left == 0 {
        kill_frog(world, DeathCause::TimeUp);
    }
}

/// Lose a life: back to spawn with a full timer, or game over.
fn kill_frog(world: &mut World, cause: DeathCause) {
    let tick = world.tick;
    let spawn = world.registry.layout().frog_start;
    let start_time = world.defaults.start_time;

    let Some(frog) = world.registry.frog_mut() else {
        return;
    };
    let (frog_id, position) = (frog.id, frog.position);
    frog.respawn(spawn);

    world.state.lives = world.state.lives.saturating_sub(1);
    world.state.time_left = start_time;
    let lives_left = world.state.lives;

    info!("Frog {} died ({:?}) at {:?}, tick {}, {} lives left", frog_id, cause, position, tick, lives_left);
    world.push_event(GameEvent::frog_died(tick, frog_id, cause, position, lives_left));

    if lives_left == 0 {
        world.state.game_over = true;
        if let Some(id) = world.registry.retire_frog() {
            world.retire(id);
        }
        info!("Game over at tick {}", tick);
        world.push_event(GameEvent::new(tick, GameEventData::GameOver));
    }
}
