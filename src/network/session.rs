//! Simulation Session
//!
//! The tick loop. Owns the [`World`] and drives it through the
//! [`ClientBridge`]:
//!
//! ```text
//! pre-tick   re-arm a finished session, wait for start and while paused,
//!            reset when a start is pending
//! step       hand the admitted input to the frog, run one rule tick
//! post-tick  re-arm on session end, publish snapshot, wait for its ack
//! ```
//!
//! With visualization off every gate is skipped and a finished session is
//! reset automatically. Shutdown is only observed between ticks and inside
//! the waits; a rule tick always runs to completion.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::SimulationConfig;
use crate::core::hash::StateHash;
use crate::game::layout::LayoutStore;
use crate::game::registry::EntityCounts;
use crate::game::state::World;
use crate::game::tick::{tick, TickResult};
use crate::network::bridge::ClientBridge;
use crate::network::lockstep::GatePhase;
use crate::network::protocol::StateSnapshot;

/// Counters collected while running.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct RunStats {
    ticks: u64,
    deaths: u64,
    sessions_ended: u64,
}

/// What a run did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    /// Rule ticks executed
    pub ticks: u64,
    /// Wall time
    pub elapsed: Duration,
    /// Lives at the end
    pub lives: u32,
    /// Pads filled at the end
    pub pads_filled: usize,
    /// Lives lost
    pub deaths: u64,
    /// Game overs plus wins
    pub sessions_ended: u64,
    /// Stopped by shutdown before the iteration count
    pub cancelled: bool,
    /// Hash of the final world
    pub final_hash: StateHash,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Run Summary ===")?;
        writeln!(f, "Ticks executed:  {}{}", self.ticks, if self.cancelled { " (cancelled)" } else { "" })?;
        writeln!(f, "Elapsed:         {:.2?}", self.elapsed)?;
        writeln!(f, "Lives left:      {}", self.lives)?;
        writeln!(f, "Pads filled:     {}", self.pads_filled)?;
        writeln!(f, "Deaths:          {}", self.deaths)?;
        writeln!(f, "Sessions ended:  {}", self.sessions_ended)?;
        write!(f, "Final hash:      {}", hex::encode(self.final_hash))
    }
}

/// The tick loop.
pub struct Simulation {
    world: World,
    bridge: Arc<ClientBridge>,
    visualization: bool,
    poll_interval: Duration,
    stats: RunStats,
}

impl Simulation {
    /// Create a session around an existing world.
    pub fn new(world: World, bridge: Arc<ClientBridge>, visualization: bool, poll_interval: Duration) -> Self {
        Self {
            world,
            bridge,
            visualization,
            poll_interval,
            stats: RunStats::default(),
        }
    }

    /// Build the world from configuration and loaded layouts.
    pub fn from_config(config: &SimulationConfig, layouts: Arc<LayoutStore>, bridge: Arc<ClientBridge>) -> Self {
        let counts = config.entity_counts.unwrap_or_else(|| EntityCounts::covering(&layouts));
        let world = World::new(layouts, counts, config.rules(), config.session_defaults());
        Self::new(world, bridge, config.visualization, config.ack_poll_interval())
    }

    /// The simulated world.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Run up to `iterations` ticks or until the bridge shuts down.
    pub async fn run(&mut self, iterations: u64) -> RunSummary {
        let started = Instant::now();
        let bridge = self.bridge.clone();
        let mut cancelled = false;
        info!(
            "Running {} ticks ({})",
            iterations,
            if self.visualization { "client-paced" } else { "headless" }
        );

        for _ in 0..iterations {
            tokio::select! {
                biased;
                _ = bridge.closed() => {
                    cancelled = true;
                    break;
                }
                _ = self.run_tick() => {}
            }
        }

        if cancelled {
            info!("Shutdown after {} ticks", self.stats.ticks);
        }
        RunSummary {
            ticks: self.stats.ticks,
            elapsed: started.elapsed(),
            lives: self.world.state.lives,
            pads_filled: self.world.registry.occupied_pad_count(),
            deaths: self.stats.deaths,
            sessions_ended: self.stats.sessions_ended,
            cancelled,
            final_hash: self.world.compute_hash(),
        }
    }

    async fn run_tick(&mut self) {
        self.pre_tick().await;
        let result = self.step().await;
        self.post_tick(&result).await;
    }

    async fn pre_tick(&mut self) {
        if !self.visualization {
            if self.world.state.is_finished() {
                self.reset().await;
            }
            return;
        }

        let gate = self.bridge.gate();
        // a finished session only runs again after a fresh start
        if self.world.state.is_finished() && gate.require_start() {
            info!("Session finished, start gate re-armed");
        }
        loop {
            match gate.phase() {
                GatePhase::WaitingForStart => {
                    info!("Waiting for start");
                    gate.wait_for_start().await;
                }
                GatePhase::Paused => {
                    info!("Paused");
                    gate.wait_while_paused().await;
                }
                GatePhase::Running => break,
            }
        }

        if gate.take_reset() {
            self.reset().await;
        }
    }

    async fn reset(&mut self) {
        let defaults = if self.visualization {
            self.bridge.defaults().await
        } else {
            *self.world.defaults()
        };
        self.bridge.clear_input().await;
        self.world.reset(defaults);
    }

    async fn step(&mut self) -> TickResult {
        if let Some(direction) = self.bridge.take_input().await {
            self.world.queue_input(direction);
        }

        let result = tick(&mut self.world);
        self.stats.ticks += 1;
        self.stats.deaths += result.deaths().count() as u64;
        for event in &result.events {
            debug!("Tick {}: {:?}", event.tick, event.data);
        }
        result
    }

    async fn post_tick(&mut self, result: &TickResult) {
        let removed = self.world.take_removals();

        if result.session_ended {
            self.stats.sessions_ended += 1;
            if self.visualization {
                self.bridge.gate().rearm();
            }
        }
        if !self.visualization {
            return;
        }

        self.bridge.enqueue_removals(removed).await;
        self.await_client().await;

        let expecting = self.bridge.gate().expecting_tick();
        let snapshot = StateSnapshot::capture(&self.world, expecting, self.bridge.take_removals().await);
        if let Err(e) = self.bridge.publish(&snapshot).await {
            warn!("Failed to publish tick {}: {}", self.world.tick, e);
        }

        self.await_ack(expecting).await;
    }

    /// Block until a client is attached, logging every poll interval.
    async fn await_client(&self) {
        if self.bridge.is_connected() {
            return;
        }
        info!("Waiting for a client");
        let wait = self.bridge.wait_for_client();
        tokio::pin!(wait);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = &mut wait => break,
                _ = ticker.tick() => debug!("Still waiting for a client"),
            }
        }
        info!("Client attached");
    }

    /// Block until the client acks `expecting`. No timeout: the client sets the pace.
    async fn await_ack(&self, expecting: u64) {
        let gate = self.bridge.gate();
        let wait = gate.wait_for_ack(expecting);
        tokio::pin!(wait);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = &mut wait => break,
                _ = ticker.tick() => debug!("Still waiting for ack {}", expecting),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;
    use crate::game::input::AdmissionPolicy;
    use crate::game::layout::LevelLayout;
    use crate::game::layout::tests::SAMPLE;
    use crate::game::state::{RuleConfig, SessionDefaults};
    use crate::game::entity::EntityId;
    use crate::network::bridge::{MessageOutcome, Outgoing};

    const WAIT: Duration = Duration::from_secs(2);

    fn simulation(visualization: bool, defaults: SessionDefaults) -> (Simulation, Arc<ClientBridge>) {
        let layouts = Arc::new(LayoutStore::new(vec![
            LevelLayout::parse("one", SAMPLE).unwrap(),
            LevelLayout::parse("two", "8;0;0\n0;0;0\n0;1;0").unwrap(),
        ]).unwrap());
        let counts = EntityCounts::covering(&layouts);
        let world = World::new(layouts, counts, RuleConfig::default(), defaults);
        let bridge = Arc::new(ClientBridge::new(defaults, AdmissionPolicy::FirstPerTick));
        let sim = Simulation::new(world, bridge.clone(), visualization, Duration::from_millis(10));
        (sim, bridge)
    }

    /// Next frame that parses as a snapshot, skipping control acks.
    async fn next_snapshot(rx: &mut UnboundedReceiver<Outgoing>) -> StateSnapshot {
        loop {
            let frame = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
            if let Outgoing::Text(text) = frame {
                if let Ok(snapshot) = StateSnapshot::from_json(&text) {
                    return snapshot;
                }
            }
        }
    }

    async fn control(bridge: &ClientBridge, cmd: &str) {
        let text = format!(r#"{{"type":"control","cmd":{}}}"#, cmd);
        assert!(matches!(bridge.handle_text(&text).await, MessageOutcome::Control(_)));
    }

    fn frog_id(snapshot: &StateSnapshot) -> Option<EntityId> {
        snapshot.agents.iter().find(|a| a.breed == "frog").map(|a| a.id)
    }

    #[tokio::test]
    async fn test_headless_runs_and_auto_resets() {
        let defaults = SessionDefaults { start_time: 1, start_lives: 1, start_level: 1 };
        let (mut sim, _bridge) = simulation(false, defaults);

        let summary = sim.run(200).await;
        assert_eq!(summary.ticks, 200);
        assert!(!summary.cancelled);
        // timer divisor 5, one timer unit, one life
        assert_eq!(summary.sessions_ended, 40);
        assert_eq!(summary.deaths, 40);
    }

    #[tokio::test]
    async fn test_lockstep_turn_taking() {
        let (mut sim, bridge) = simulation(true, SessionDefaults::default());
        let (_, mut rx) = bridge.attach().await;
        let runner = tokio::spawn(async move { sim.run(3).await });

        bridge.handle_text(r#"{"type":"control","cmd":"start"}"#).await;

        let first = next_snapshot(&mut rx).await;
        assert_eq!((first.tick, first.expecting_tick), (1, 2));
        assert_eq!(first.remove_ids.len(), 1);

        // a wrong token only re-sends
        bridge.handle_text("7").await;
        assert_eq!(next_snapshot(&mut rx).await, first);

        bridge.handle_text("2").await;
        let second = next_snapshot(&mut rx).await;
        assert_eq!((second.tick, second.expecting_tick), (2, 3));
        assert!(second.remove_ids.is_empty());

        bridge.handle_text("3").await;
        let third = next_snapshot(&mut rx).await;
        assert_eq!(third.expecting_tick, 4);
        bridge.handle_text("4").await;

        let summary = timeout(WAIT, runner).await.unwrap().unwrap();
        assert_eq!(summary.ticks, 3);
        assert!(!summary.cancelled);
    }

    #[tokio::test]
    async fn test_no_tick_until_ack() {
        let (mut sim, bridge) = simulation(true, SessionDefaults::default());
        let (_, mut rx) = bridge.attach().await;
        let runner = tokio::spawn(async move { sim.run(5).await });

        bridge.handle_text(r#"{"type":"control","cmd":"start"}"#).await;
        next_snapshot(&mut rx).await;

        // started ack already consumed; nothing else may arrive
        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());

        bridge.shutdown().await;
        let summary = timeout(WAIT, runner).await.unwrap().unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.ticks, 1);
    }

    #[tokio::test]
    async fn test_pause_holds_next_tick() {
        let (mut sim, bridge) = simulation(true, SessionDefaults::default());
        let (_, mut rx) = bridge.attach().await;
        let runner = tokio::spawn(async move { sim.run(2).await });

        bridge.handle_text(r#"{"type":"control","cmd":"start"}"#).await;
        next_snapshot(&mut rx).await;

        bridge.handle_text(r#"{"type":"control","cmd":"pause"}"#).await;
        bridge.handle_text("2").await;
        assert!(timeout(Duration::from_millis(100), next_snapshot(&mut rx)).await.is_err());

        bridge.handle_text(r#"{"type":"control","cmd":"resume"}"#).await;
        let second = next_snapshot(&mut rx).await;
        assert_eq!(second.tick, 2);
        bridge.handle_text("3").await;

        timeout(WAIT, runner).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_restart_applies_new_defaults() {
        let (mut sim, bridge) = simulation(true, SessionDefaults::default());
        let (_, mut rx) = bridge.attach().await;
        let runner = tokio::spawn(async move { sim.run(2).await });

        bridge.handle_text(r#"{"type":"control","cmd":"start"}"#).await;
        let first = next_snapshot(&mut rx).await;
        let first_frog = first.agents.iter().find(|a| a.breed == "frog").unwrap().id;

        bridge.handle_text(r#"{"type":"control","cmd":"restart"}"#).await;
        bridge.handle_text(r#"{"type":"control","cmd":"set_start_lives","value":2}"#).await;
        bridge.handle_text(r#"{"type":"control","cmd":"set_start_level","value":2}"#).await;
        bridge.handle_text("2").await;

        // waiting for start again
        assert!(timeout(Duration::from_millis(100), next_snapshot(&mut rx)).await.is_err());
        bridge.handle_text(r#"{"type":"control","cmd":"start"}"#).await;

        let second = next_snapshot(&mut rx).await;
        assert_eq!(second.lives, 2);
        assert_eq!(second.level, 2);
        assert!(second.remove_ids.contains(&first_frog));
        bridge.handle_text("3").await;

        timeout(WAIT, runner).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_restart_and_start_in_one_ack_window() {
        let (mut sim, bridge) = simulation(true, SessionDefaults::default());
        let (_, mut rx) = bridge.attach().await;
        let runner = tokio::spawn(async move { sim.run(2).await });

        control(&bridge, r#""start""#).await;
        let first = next_snapshot(&mut rx).await;
        let first_frog = frog_id(&first).unwrap();

        control(&bridge, r#""restart""#).await;
        control(&bridge, r#""set_start_lives","value":2"#).await;
        control(&bridge, r#""start""#).await;
        bridge.handle_text("2").await;

        let second = next_snapshot(&mut rx).await;
        assert_eq!(second.tick, 2);
        assert_eq!(second.lives, 2);
        assert_eq!(second.remove_ids, vec![first_frog]);
        assert_ne!(frog_id(&second), Some(first_frog));
        bridge.handle_text("3").await;

        timeout(WAIT, runner).await.unwrap().unwrap();
    }

    /// Ack ticks 2..=5 with one life and one timer unit: game over on tick 5.
    async fn play_until_game_over(bridge: &ClientBridge, rx: &mut UnboundedReceiver<Outgoing>) -> EntityId {
        control(bridge, r#""start""#).await;
        let first = next_snapshot(rx).await;
        let frog = frog_id(&first).unwrap();
        for ack in 2..=5u64 {
            bridge.handle_text(&ack.to_string()).await;
            let snapshot = next_snapshot(rx).await;
            assert_eq!(snapshot.game_over, ack == 5);
        }
        assert_eq!(bridge.gate().phase(), GatePhase::WaitingForStart);
        frog
    }

    #[tokio::test]
    async fn test_start_before_ack_after_game_over() {
        let defaults = SessionDefaults { start_time: 1, start_lives: 1, start_level: 1 };
        let (mut sim, bridge) = simulation(true, defaults);
        let (_, mut rx) = bridge.attach().await;
        let runner = tokio::spawn(async move { sim.run(6).await });

        let old_frog = play_until_game_over(&bridge, &mut rx).await;

        control(&bridge, r#""start""#).await;
        bridge.handle_text("6").await;

        let fresh = next_snapshot(&mut rx).await;
        assert_eq!(fresh.tick, 6);
        assert!(!fresh.game_over);
        assert_eq!(fresh.lives, 1);
        let new_frog = frog_id(&fresh).unwrap();
        assert_ne!(new_frog, old_frog);
        bridge.handle_text("7").await;

        let summary = timeout(WAIT, runner).await.unwrap().unwrap();
        assert_eq!(summary.sessions_ended, 1);
    }

    #[tokio::test]
    async fn test_game_over_waits_for_fresh_start() {
        let defaults = SessionDefaults { start_time: 1, start_lives: 1, start_level: 1 };
        let (mut sim, bridge) = simulation(true, defaults);
        let (_, mut rx) = bridge.attach().await;
        let runner = tokio::spawn(async move { sim.run(6).await });

        let old_frog = play_until_game_over(&bridge, &mut rx).await;

        bridge.handle_text("6").await;
        assert!(timeout(Duration::from_millis(100), next_snapshot(&mut rx)).await.is_err());

        control(&bridge, r#""set_start_lives","value":3"#).await;
        control(&bridge, r#""start""#).await;
        let fresh = next_snapshot(&mut rx).await;
        assert_eq!(fresh.tick, 6);
        assert!(!fresh.game_over);
        assert_eq!(fresh.lives, 3);
        assert_ne!(frog_id(&fresh), Some(old_frog));
        bridge.handle_text("7").await;

        timeout(WAIT, runner).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_win_then_fresh_session() {
        // level two: one pad at (0,2), frog at (1,0)
        let defaults = SessionDefaults { start_time: 60, start_lives: 4, start_level: 2 };
        let (mut sim, bridge) = simulation(true, defaults);
        let (_, mut rx) = bridge.attach().await;
        let runner = tokio::spawn(async move { sim.run(5).await });

        control(&bridge, r#""start""#).await;
        let first = next_snapshot(&mut rx).await;
        let old_frog = frog_id(&first).unwrap();

        let mut last = first;
        for (ack, direction) in [(2u64, "up"), (3, "left"), (4, "up")] {
            let input = format!(r#"{{"type":"input","direction":"{}"}}"#, direction);
            bridge.handle_text(&input).await;
            bridge.handle_text(&ack.to_string()).await;
            last = next_snapshot(&mut rx).await;
        }
        assert!(last.game_won);
        assert_eq!(last.lives, 4);
        assert!(last.remove_ids.contains(&old_frog));
        assert_eq!(frog_id(&last), None);
        assert!(last.agents.iter().any(|a| a.breed == "pad" && a.occupied == Some(true)));
        assert_eq!(bridge.gate().phase(), GatePhase::WaitingForStart);

        control(&bridge, r#""start""#).await;
        bridge.handle_text("5").await;
        let fresh = next_snapshot(&mut rx).await;
        assert!(!fresh.game_won);
        assert_eq!(fresh.lives, 4);
        assert!(fresh.agents.iter().all(|a| a.occupied != Some(true)));
        assert!(frog_id(&fresh).is_some_and(|id| id != old_frog));
        bridge.handle_text("6").await;

        let summary = timeout(WAIT, runner).await.unwrap().unwrap();
        assert_eq!(summary.sessions_ended, 1);
    }

    #[tokio::test]
    async fn test_shutdown_while_waiting_for_start() {
        let (mut sim, bridge) = simulation(true, SessionDefaults::default());
        let runner = tokio::spawn(async move { sim.run(10).await });

        tokio::task::yield_now().await;
        bridge.shutdown().await;
        let summary = timeout(WAIT, runner).await.unwrap().unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.ticks, 0);
    }

    #[test]
    fn test_summary_display() {
        let summary = RunSummary {
            ticks: 12,
            elapsed: Duration::from_millis(1500),
            lives: 3,
            pads_filled: 1,
            deaths: 2,
            sessions_ended: 0,
            cancelled: true,
            final_hash: [0xab; 32],
        };
        let text = summary.to_string();
        assert!(text.contains("Ticks executed:  12 (cancelled)"));
        assert!(text.contains(&"ab".repeat(32)));
    }
}
