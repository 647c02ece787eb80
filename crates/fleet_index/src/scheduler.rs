//! Background tasks that keep the simulation running.
//!
//! Five periodic loops share one [`FleetSimulation`]: motion, index
//! rebuild, statistics, a demo rider query and the subscription broadcast.
//! Every loop selects on its interval and on a `broadcast` shutdown
//! channel, so a single `send(())` stops them all. CPU-heavy steps (tick
//! and rebuild) run on the blocking pool.

use crate::coordinator::RebuildReport;
use crate::error::{IndexError, IndexResult};
use crate::simulation::FleetSimulation;
use crate::subscriptions::SubscriptionRegistry;
use crate::types::{Bounds, Point, KM_PER_DEGREE};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// How many demo query hits get logged.
const DEMO_HITS_SHOWN: usize = 5;

/// Periods of the background loops.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerIntervals {
    pub tick: Duration,
    pub rebuild: Duration,
    pub stats: Duration,
    pub query: Duration,
    pub broadcast: Duration,
}

impl Default for SchedulerIntervals {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(220),
            rebuild: Duration::from_millis(1000),
            stats: Duration::from_millis(5000),
            query: Duration::from_millis(2000),
            broadcast: Duration::from_millis(220),
        }
    }
}

impl SchedulerIntervals {
    pub fn validate(&self) -> IndexResult<()> {
        let all = [
            ("tick", self.tick),
            ("rebuild", self.rebuild),
            ("stats", self.stats),
            ("query", self.query),
            ("broadcast", self.broadcast),
        ];
        for (name, period) in all {
            if period.is_zero() {
                return Err(IndexError::InvalidConfig(format!(
                    "{name} interval must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}

/// Handles of the running background loops.
pub struct Scheduler {
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    shutdown: broadcast::Sender<()>,
}

impl Scheduler {
    /// Starts every loop. They run until something sends on `shutdown`.
    pub fn spawn(
        simulation: Arc<FleetSimulation>,
        registry: Arc<SubscriptionRegistry>,
        intervals: SchedulerIntervals,
        shutdown: broadcast::Sender<()>,
    ) -> IndexResult<Self> {
        intervals.validate()?;

        let tasks = vec![
            (
                "motion",
                tokio::spawn(motion_loop(simulation.clone(), intervals.tick, shutdown.subscribe())),
            ),
            (
                "rebuild",
                tokio::spawn(rebuild_loop(simulation.clone(), intervals.rebuild, shutdown.clone())),
            ),
            (
                "stats",
                tokio::spawn(stats_loop(simulation.clone(), intervals.stats, shutdown.subscribe())),
            ),
            (
                "query",
                tokio::spawn(demo_query_loop(simulation.clone(), intervals.query, shutdown.subscribe())),
            ),
            (
                "broadcast",
                tokio::spawn(broadcast_loop(
                    simulation,
                    registry,
                    intervals.broadcast,
                    shutdown.subscribe(),
                )),
            ),
        ];

        info!(
            "🕒 Scheduler started: tick {:?}, rebuild {:?}, stats {:?}, query {:?}, broadcast {:?}",
            intervals.tick, intervals.rebuild, intervals.stats, intervals.query, intervals.broadcast
        );
        Ok(Self { tasks, shutdown })
    }

    /// Asks every loop to stop.
    pub fn shutdown(&self) {
        info!("🛑 Stopping background tasks...");
        let _ = self.shutdown.send(());
    }

    /// Waits for every loop to finish.
    pub async fn join(self) {
        let (names, handles): (Vec<_>, Vec<_>) = self.tasks.into_iter().unzip();
        for (name, result) in names.into_iter().zip(join_all(handles).await) {
            if let Err(e) = result {
                error!("Task '{}' ended abnormally: {}", name, e);
            }
        }
        info!("✅ Background tasks stopped");
    }
}

async fn motion_loop(
    simulation: Arc<FleetSimulation>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let dt = period.as_secs_f64();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let simulation = simulation.clone();
                match tokio::task::spawn_blocking(move || simulation.tick(dt)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("Tick failed: {}", e),
                    Err(e) => error!("Tick worker crashed: {}", e),
                }
            }
            _ = shutdown.recv() => break,
        }
    }
    debug!("Motion loop stopped");
}

async fn rebuild_loop(
    simulation: Arc<FleetSimulation>,
    period: Duration,
    shutdown_sender: broadcast::Sender<()>,
) {
    let mut shutdown = shutdown_sender.subscribe();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let simulation = simulation.clone();
                let result = match tokio::task::spawn_blocking(move || simulation.rebuild()).await {
                    Ok(result) => result,
                    Err(e) => {
                        error!("Rebuild worker crashed: {}", e);
                        continue;
                    }
                };
                if handle_rebuild_result(result, &shutdown_sender).is_break() {
                    break;
                }
            }
            _ = shutdown.recv() => break,
        }
    }
    debug!("Rebuild loop stopped");
}

/// Fatal rebuild errors stop the whole process; anything else is logged.
fn handle_rebuild_result(
    result: IndexResult<RebuildReport>,
    shutdown: &broadcast::Sender<()>,
) -> ControlFlow<()> {
    match result {
        Ok(_) => ControlFlow::Continue(()),
        Err(e) if e.is_fatal() => {
            error!("💥 Index invariant broken, shutting down: {}", e);
            let _ = shutdown.send(());
            ControlFlow::Break(())
        }
        Err(e) => {
            warn!("Index rebuild failed: {}", e);
            ControlFlow::Continue(())
        }
    }
}

async fn stats_loop(
    simulation: Arc<FleetSimulation>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval(period);
    // The first tick fires immediately; skip it so the first report has data.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let stats = simulation.stats();
                info!(
                    "📊 Drivers: {} available, {} busy, {} offline | queries: {} ({:.2} drivers/query, avg {:?}) | rebuilds: {} (last {:.1}s ago)",
                    stats.status_counts.available,
                    stats.status_counts.busy,
                    stats.status_counts.offline,
                    stats.query_count,
                    stats.avg_drivers_per_query,
                    stats.avg_query_latency,
                    stats.rebuild_count,
                    stats.last_rebuild_age.as_secs_f64()
                );
            }
            _ = shutdown.recv() => break,
        }
    }
    debug!("Stats loop stopped");
}

/// Simulates a rider asking for nearby drivers from a random spot.
async fn demo_query_loop(
    simulation: Arc<FleetSimulation>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval(period);
    ticker.tick().await;
    let mut rng = StdRng::from_entropy();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let user = random_point(&mut rng, simulation.world().bounds());
                run_demo_query(&simulation, user);
            }
            _ = shutdown.recv() => break,
        }
    }
    debug!("Demo query loop stopped");
}

fn random_point<R: Rng + ?Sized>(rng: &mut R, bounds: Bounds) -> Point {
    Point::new(
        bounds.min_x + rng.gen::<f64>() * bounds.width(),
        bounds.min_y + rng.gen::<f64>() * bounds.height(),
    )
}

fn run_demo_query(simulation: &FleetSimulation, user: Point) {
    let radius = simulation.search_radius();
    let hits = match simulation.query(user, radius) {
        Ok(hits) => hits,
        Err(e) => {
            warn!("Demo query failed: {}", e);
            return;
        }
    };

    info!(
        "🔎 User {} at {}: {} drivers within {:.2}° (≈{:.1} km)",
        simulation.world().describe_location(user),
        user,
        hits.len(),
        radius,
        radius * KM_PER_DEGREE
    );
    for hit in hits.iter().take(DEMO_HITS_SHOWN) {
        info!(
            "   Driver {} ({}) at {}, {:.2} km away, heading {:.0}°",
            hit.id,
            hit.status,
            hit.position,
            hit.distance_km(),
            hit.heading_degrees()
        );
    }
}

async fn broadcast_loop(
    simulation: Arc<FleetSimulation>,
    registry: Arc<SubscriptionRegistry>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if registry.is_empty() {
                    continue;
                }
                let report = registry.broadcast(&simulation);
                debug!(
                    "Broadcast: {} delivered, {} skipped, {} removed, {} failed",
                    report.delivered, report.skipped, report.removed, report.failed
                );
            }
            _ = shutdown.recv() => break,
        }
    }
    debug!("Broadcast loop stopped");
}
