//! Fleet simulator entry point.
//!
//! Loads configuration, populates the fleet, starts the background loops
//! and runs until a signal arrives or the index reports a fatal error.

mod cli;
mod config;
mod logging;
mod signals;

use anyhow::{Context, Result};
use cli::CliArgs;
use config::AppConfig;
use fleet_index::{
    FleetSimulation, QueryUpdate, Scheduler, SubscriberId, SubscriptionParams,
    SubscriptionRegistry,
};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Frames each subscriber may have queued before new ones are skipped.
const SUBSCRIBER_BUFFER: usize = 8;

pub struct Application {
    config: AppConfig,
    simulation: Arc<FleetSimulation>,
    registry: Arc<SubscriptionRegistry>,
}

impl Application {
    /// Loads the configuration, sets up logging and builds the fleet.
    pub async fn new(args: CliArgs) -> Result<Self> {
        // Load configuration first (before logging setup)
        let mut config = AppConfig::load_from_file(&args.config_path)
            .await
            .with_context(|| format!("failed to load {}", args.config_path.display()))?;

        // Apply CLI overrides
        if let Some(drivers) = args.drivers {
            config.simulation.num_drivers = drivers;
        }
        if let Some(seed) = args.seed {
            config.simulation.seed = Some(seed);
        }
        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }

        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}"))?;

        logging::setup_logging(&config.logging)?;

        info!("🚀 Fleet simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("📂 Config: {}", args.config_path.display());

        let world = config.world()?;
        let simulation = FleetSimulation::new(world, config.motion.clone(), &config.simulation_settings())?;
        let registry = SubscriptionRegistry::new(config.simulation.search_radius, SUBSCRIBER_BUFFER);

        Ok(Self {
            config,
            simulation: Arc::new(simulation),
            registry: Arc::new(registry),
        })
    }

    /// Runs until SIGINT/SIGTERM or a fatal index error.
    pub async fn run(self) -> Result<()> {
        let bounds = self.simulation.world().bounds();
        info!("📋 Configuration Summary:");
        info!("  🚗 Drivers: {}", self.simulation.store().len());
        info!(
            "  🌍 World: ({}, {}) to ({}, {})",
            bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y
        );
        info!(
            "  🌳 Node capacity: {} | search radius: {}°",
            self.config.simulation.node_capacity, self.config.simulation.search_radius
        );

        // One watcher per city so the broadcast path runs end to end
        let watchers: Vec<(SubscriberId, JoinHandle<()>)> = self
            .simulation
            .world()
            .cities()
            .iter()
            .map(|city| {
                let (id, updates) = self
                    .registry
                    .subscribe(SubscriptionParams::city(city.name.clone(), 0.0));
                (id, tokio::spawn(watch_updates(id, city.name.clone(), updates)))
            })
            .collect();

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let scheduler = Scheduler::spawn(
            self.simulation.clone(),
            self.registry.clone(),
            self.config.intervals(),
            shutdown_tx.clone(),
        )?;

        info!("✅ Simulation running, press Ctrl+C to stop");

        let outcome = tokio::select! {
            result = signals::wait_for_shutdown_signal() => {
                result.map(|signal| info!("🛑 Received {}, initiating graceful shutdown...", signal))
                    .context("failed to install signal handlers")
            }
            _ = shutdown_rx.recv() => {
                Err(anyhow::anyhow!("simulation stopped after a fatal index error"))
            }
        };

        scheduler.shutdown();
        scheduler.join().await;

        // Dropping the registry's senders ends the watchers
        for (id, watcher) in watchers {
            self.registry.unsubscribe(id);
            if let Err(e) = watcher.await {
                warn!("Update watcher ended abnormally: {}", e);
            }
        }

        let stats = self.simulation.stats();
        info!(
            "📊 Final: {} queries, {} rebuilds, {:.2} drivers/query",
            stats.query_count, stats.rebuild_count, stats.avg_drivers_per_query
        );
        outcome
    }
}

/// Drains one subscriber's updates, logging a summary of each frame.
async fn watch_updates(id: SubscriberId, city: String, mut updates: mpsc::Receiver<QueryUpdate>) {
    while let Some(update) = updates.recv().await {
        match update.to_json() {
            Ok(payload) => debug!(
                "📨 {} (subscriber {}): {} drivers, {} byte frame",
                city,
                id,
                update.hits.len(),
                payload.len()
            ),
            Err(e) => warn!("Failed to encode update for subscriber {}: {}", id, e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let app = Application::new(args).await?;
    if let Err(e) = app.run().await {
        error!("❌ Application error: {:?}", e);
        return Err(e);
    }
    Ok(())
}
