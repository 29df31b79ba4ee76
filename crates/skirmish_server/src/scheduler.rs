//! Fixed-rate tick loop.
//!
//! Each step drains the command queue, runs one simulation tick and then
//! publishes the result: the latest [`WorldSnapshot`] on a watch channel
//! (observers only ever see between-tick state) and the tick's
//! [`TickEvents`] on a broadcast channel.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;

use skirmish_core::simulation::{Simulation, TickEvents};
use skirmish_core::snapshot::WorldSnapshot;

use crate::queue::CommandReceiver;
use crate::ServerConfig;

/// Tick events kept for slow subscribers before they start lagging.
const EVENT_BUFFER: usize = 256;

/// Why [`TickScheduler::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The shutdown future resolved.
    Shutdown,
    /// The configured tick limit was reached.
    TickLimit,
}

/// Owns the simulation and advances it at a fixed rate.
#[derive(Debug)]
pub struct TickScheduler {
    sim: Simulation,
    commands: CommandReceiver,
    snapshots: watch::Sender<Arc<WorldSnapshot>>,
    events: broadcast::Sender<Arc<TickEvents>>,
    tick_duration: Duration,
    max_ticks: Option<u64>,
}

impl TickScheduler {
    /// Create a scheduler for `sim` fed by `commands`.
    #[must_use]
    pub fn new(sim: Simulation, commands: CommandReceiver, config: &ServerConfig) -> Self {
        let (snapshots, _) = watch::channel(Arc::new(sim.snapshot()));
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            sim,
            commands,
            snapshots,
            events,
            tick_duration: config.tick_duration(),
            max_ticks: config.max_ticks,
        }
    }

    /// Receiver always holding the latest published snapshot.
    #[must_use]
    pub fn subscribe_snapshots(&self) -> watch::Receiver<Arc<WorldSnapshot>> {
        self.snapshots.subscribe()
    }

    /// Receiver for per-tick events, starting with the next tick.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<Arc<TickEvents>> {
        self.events.subscribe()
    }

    /// The simulation, between ticks.
    #[must_use]
    pub const fn simulation(&self) -> &Simulation {
        &self.sim
    }

    /// Run exactly one tick and publish its results.
    pub fn step(&mut self) -> Arc<TickEvents> {
        for envelope in self.commands.drain() {
            self.sim.submit(envelope);
        }

        let events = Arc::new(self.sim.tick());
        self.snapshots.send_replace(Arc::new(self.sim.snapshot()));
        // No subscribers is fine.
        let _ = self.events.send(Arc::clone(&events));
        events
    }

    fn limit_reached(&self) -> bool {
        self.max_ticks
            .is_some_and(|limit| self.sim.get_tick() >= limit)
    }

    /// Tick at the configured rate until `shutdown` resolves or the tick
    /// limit is reached, then hand the simulation back.
    ///
    /// Ticks that would have fired while a slow step was running are
    /// skipped rather than bunched up.
    pub async fn run<F>(mut self, shutdown: F) -> (Simulation, StopReason)
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.tick_duration);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        tracing::info!(
            tick_ms = self.tick_duration.as_millis() as u64,
            max_ticks = ?self.max_ticks,
            "Tick loop started"
        );

        let reason = loop {
            if self.limit_reached() {
                break StopReason::TickLimit;
            }
            tokio::select! {
                () = &mut shutdown => break StopReason::Shutdown,
                _ = interval.tick() => {
                    let started = Instant::now();
                    self.step();
                    let elapsed = started.elapsed();
                    if elapsed > self.tick_duration {
                        tracing::warn!(
                            tick = self.sim.get_tick(),
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Tick overran its budget"
                        );
                    }
                }
            }
        };

        tracing::info!(tick = self.sim.get_tick(), ?reason, "Tick loop stopped");
        (self.sim, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::command_queue;
    use skirmish_core::commands::{Command, CommandEnvelope};
    use skirmish_core::entity::UnitType;
    use skirmish_core::formation::FormationKind;
    use skirmish_core::interface::GameServer;
    use skirmish_core::math::TilePos;
    use skirmish_core::terrain::TerrainGrid;

    fn setup() -> (Simulation, u64) {
        let mut sim = Simulation::new(TerrainGrid::new(16, 16, 1).unwrap());
        let id = sim.spawn_unit(UnitType::Scout, 1, 0, 0).unwrap();
        (sim, id)
    }

    #[test]
    fn test_step_drains_and_publishes() {
        let (sim, id) = setup();
        let (tx, rx) = command_queue(8);
        let mut scheduler = TickScheduler::new(sim, rx, &ServerConfig::default());
        let snapshots = scheduler.subscribe_snapshots();
        let mut events = scheduler.subscribe_events();

        tx.try_submit(CommandEnvelope::from_team(
            1,
            Command::Move {
                units: vec![id],
                target: TilePos::new(4, 0),
                formation: FormationKind::Box,
            },
        ))
        .unwrap();

        let stepped = scheduler.step();
        assert_eq!(stepped.command_reports.len(), 1);
        assert_eq!(events.try_recv().unwrap().tick, 0);

        let snapshot = snapshots.borrow().clone();
        assert_eq!(snapshot.tick, 1);
        assert_eq!(snapshot.entity(id).unwrap().tile, TilePos::new(1, 0));
    }

    #[tokio::test]
    async fn test_run_stops_at_tick_limit() {
        let (sim, _) = setup();
        let (_tx, rx) = command_queue(8);
        let config = ServerConfig {
            max_ticks: Some(5),
            sim: skirmish_core::config::SimConfig {
                tick_rate: 1000,
                ..Default::default()
            },
            ..Default::default()
        };
        let scheduler = TickScheduler::new(sim, rx, &config);
        let (sim, reason) = scheduler.run(std::future::pending()).await;
        assert_eq!(reason, StopReason::TickLimit);
        assert_eq!(sim.get_tick(), 5);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (sim, _) = setup();
        let (_tx, rx) = command_queue(8);
        let scheduler = TickScheduler::new(sim, rx, &ServerConfig::default());
        let (sim, reason) = scheduler.run(std::future::ready(())).await;
        assert_eq!(reason, StopReason::Shutdown);
        assert!(sim.get_tick() <= 1);
    }
}
