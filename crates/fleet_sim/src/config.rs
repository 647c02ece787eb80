//! Configuration management for the fleet simulator.
//!
//! Settings come from a TOML file; a missing file is created with the
//! defaults. Command-line overrides are applied by the caller afterwards.

use fleet_index::{Bounds, MotionParams, SchedulerIntervals, SimulationSettings, World};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

fn default_stats_interval() -> u64 {
    5000
}

fn default_query_interval() -> u64 {
    2000
}

fn default_broadcast_interval() -> u64 {
    220
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Rectangle every driver stays inside
    pub world: WorldSettings,
    pub simulation: SimulationConfig,
    /// Motion model constants
    #[serde(default)]
    pub motion: MotionParams,
    pub logging: LoggingSettings,
}

/// World rectangle in degrees of longitude (x) and latitude (y).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldSettings {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

/// Fleet size, index shape and task cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub num_drivers: usize,
    /// Points a quadtree leaf holds before splitting
    pub node_capacity: usize,
    /// Default query radius in degrees
    pub search_radius: f64,
    pub tick_interval_ms: u64,
    pub rebuild_interval_ms: u64,
    #[serde(default = "default_stats_interval")]
    pub stats_interval_ms: u64,
    #[serde(default = "default_query_interval")]
    pub query_interval_ms: u64,
    #[serde(default = "default_broadcast_interval")]
    pub broadcast_interval_ms: u64,
    /// Fixed seed for the initial population
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let bounds = fleet_index::world::default_bounds();
        let simulation = SimulationSettings::default();
        Self {
            world: WorldSettings {
                min_x: bounds.min_x,
                min_y: bounds.min_y,
                max_x: bounds.max_x,
                max_y: bounds.max_y,
            },
            simulation: SimulationConfig {
                num_drivers: simulation.num_drivers,
                node_capacity: simulation.node_capacity,
                search_radius: simulation.search_radius,
                tick_interval_ms: 220,
                rebuild_interval_ms: 1000,
                stats_interval_ms: default_stats_interval(),
                query_interval_ms: default_query_interval(),
                broadcast_interval_ms: default_broadcast_interval(),
                seed: None,
            },
            motion: MotionParams::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file, writing the defaults there if
    /// the file does not exist yet.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.world.min_x, self.world.min_y, self.world.max_x, self.world.max_y)
    }

    /// The default cities inside the configured rectangle.
    pub fn world(&self) -> anyhow::Result<World> {
        Ok(World::new(self.bounds(), fleet_index::world::default_cities())?)
    }

    pub fn simulation_settings(&self) -> SimulationSettings {
        SimulationSettings {
            num_drivers: self.simulation.num_drivers,
            node_capacity: self.simulation.node_capacity,
            search_radius: self.simulation.search_radius,
            seed: self.simulation.seed,
        }
    }

    pub fn intervals(&self) -> SchedulerIntervals {
        SchedulerIntervals {
            tick: Duration::from_millis(self.simulation.tick_interval_ms),
            rebuild: Duration::from_millis(self.simulation.rebuild_interval_ms),
            stats: Duration::from_millis(self.simulation.stats_interval_ms),
            query: Duration::from_millis(self.simulation.query_interval_ms),
            broadcast: Duration::from_millis(self.simulation.broadcast_interval_ms),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        // Validate world bounds
        if !self.bounds().is_valid() {
            return Err("World bounds must be finite with min_x <= max_x and min_y <= max_y".to_string());
        }
        if self.world.min_x >= self.world.max_x || self.world.min_y >= self.world.max_y {
            return Err("World must have a non-zero width and height".to_string());
        }

        // Validate simulation settings
        if self.simulation.node_capacity == 0 {
            return Err("Node capacity must be at least 1".to_string());
        }
        if !(self.simulation.search_radius.is_finite() && self.simulation.search_radius > 0.0) {
            return Err(format!(
                "Search radius must be positive, got {}",
                self.simulation.search_radius
            ));
        }
        self.intervals().validate().map_err(|e| e.to_string())?;

        // Validate motion model
        self.motion.validate().map_err(|e| e.to_string())?;

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, NamedTempFile};
    use tokio::fs;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.world.min_x, 42.5);
        assert_eq!(config.world.min_y, 35.5);
        assert_eq!(config.world.max_x, 44.5);
        assert_eq!(config.world.max_y, 37.5);

        assert_eq!(config.simulation.num_drivers, 1000);
        assert_eq!(config.simulation.node_capacity, 8);
        assert_eq!(config.simulation.search_radius, 0.15);
        assert_eq!(config.simulation.tick_interval_ms, 220);
        assert_eq!(config.simulation.rebuild_interval_ms, 1000);
        assert_eq!(config.simulation.stats_interval_ms, 5000);
        assert_eq!(config.simulation.query_interval_ms, 2000);
        assert_eq!(config.simulation.broadcast_interval_ms, 220);
        assert!(config.simulation.seed.is_none());

        assert_eq!(config.motion, MotionParams::default());
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fleet.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(path.exists());

        // The written file round-trips to the same configuration
        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded, config);
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let toml_content = r#"
[world]
min_x = 0.0
min_y = 0.0
max_x = 10.0
max_y = 20.0

[simulation]
num_drivers = 50
node_capacity = 4
search_radius = 0.5
tick_interval_ms = 100
rebuild_interval_ms = 500
seed = 7

[motion]
max_speed = 0.001
boundary_buffer = 0.05

[logging]
level = "debug"
json_format = true
"#;

        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), toml_content).await.unwrap();

        let config = AppConfig::load_from_file(temp_file.path()).await.unwrap();

        assert_eq!(config.bounds(), Bounds::new(0.0, 0.0, 10.0, 20.0));
        assert_eq!(config.simulation.num_drivers, 50);
        assert_eq!(config.simulation.node_capacity, 4);
        assert_eq!(config.simulation.seed, Some(7));
        // Omitted intervals fall back to their defaults
        assert_eq!(config.simulation.stats_interval_ms, 5000);
        assert_eq!(config.simulation.broadcast_interval_ms, 220);

        assert_eq!(config.motion.max_speed, 0.001);
        assert_eq!(config.motion.boundary_buffer, 0.05);
        assert_eq!(config.motion.min_speed, MotionParams::default().min_speed);

        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_rejects_malformed_toml() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), "[world\nmin_x = ").await.unwrap();
        assert!(AppConfig::load_from_file(temp_file.path()).await.is_err());
    }

    #[test]
    fn test_conversions() {
        let config = AppConfig::default();

        let settings = config.simulation_settings();
        assert_eq!(settings.num_drivers, 1000);
        assert_eq!(settings.node_capacity, 8);

        let intervals = config.intervals();
        assert_eq!(intervals.tick, Duration::from_millis(220));
        assert_eq!(intervals.stats, Duration::from_secs(5));

        let world = config.world().unwrap();
        assert_eq!(world.home_city().name, "Erbil");
    }

    #[test]
    fn test_validation_invalid_world_bounds() {
        let mut config = AppConfig::default();
        config.world.min_x = 45.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.world.max_y = config.world.min_y;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_simulation() {
        let mut config = AppConfig::default();
        config.simulation.node_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.simulation.search_radius = -0.1;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.simulation.rebuild_interval_ms = 0;
        assert!(config.validate().unwrap_err().contains("rebuild"));
    }

    #[test]
    fn test_validation_invalid_motion() {
        let mut config = AppConfig::default();
        config.motion.min_speed = 1.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.motion.available_probability = 0.9;
        config.motion.busy_probability = 0.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_log_levels() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            let mut config = AppConfig::default();
            config.logging.level = level.to_string();
            assert!(config.validate().is_ok(), "level {level} should be valid");
        }

        let mut config = AppConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().unwrap_err().contains("Invalid log level"));
    }
}
