//! # Fleet Index
//!
//! A concurrent, in-memory spatial index for a fleet of continuously moving
//! drivers. Positions change many times per second while range queries keep
//! arriving, so the crate separates the mutable entity state from an
//! immutable, periodically rebuilt quadtree.
//!
//! ## Architecture Overview
//!
//! * **[`EntityStore`]** - authoritative per-entity state, one lock per entity
//! * **[`MotionEngine`]** - randomized kinematics that keep entities in bounds
//! * **[`SpatialIndex`]** - fixed-capacity point quadtree, rebuilt from scratch
//! * **[`IndexCoordinator`]** - rebuilds and atomically publishes the index
//! * **[`FleetSimulation`]** - the `query` / `tick` / `rebuild` / `stats` facade
//! * **[`SubscriptionRegistry`]** - push-style periodic query results
//! * **[`Scheduler`]** - background loops with cooperative shutdown
//!
//! ## Data Flow
//!
//! 1. The motion loop ticks every entity in place under its own lock
//! 2. The rebuild loop snapshots all positions into a brand-new quadtree
//! 3. The new quadtree replaces the published one in a single pointer swap
//! 4. Queries run against whichever quadtree was published when they began
//!
//! Query results are joined back to the store by entity id, so a hit carries
//! the indexed position together with the live heading, speed and status.
//!
//! ## Example
//!
//! ```rust
//! use fleet_index::{FleetSimulation, MotionParams, SimulationSettings, World};
//!
//! let settings = SimulationSettings { num_drivers: 100, seed: Some(1), ..Default::default() };
//! let sim = FleetSimulation::new(World::default(), MotionParams::default(), &settings).unwrap();
//!
//! sim.tick(0.22).unwrap();
//! sim.rebuild().unwrap();
//! let hits = sim.query_city("Erbil", 0.15).unwrap();
//! assert_eq!(hits.len(), 100);
//! ```

pub mod coordinator;
pub mod error;
pub mod motion;
pub mod scheduler;
pub mod simulation;
pub mod spatial;
pub mod store;
pub mod subscriptions;
pub mod types;
pub mod world;

pub use coordinator::{IndexCoordinator, IndexQuery, QueryStats, RebuildReport};
pub use error::{IndexError, IndexResult};
pub use motion::{MotionEngine, MotionParams};
pub use scheduler::{Scheduler, SchedulerIntervals};
pub use simulation::{FleetSimulation, SimulationSettings, Stats};
pub use spatial::{IndexEntry, NodeStats, QueryHit, SpatialIndex};
pub use store::EntityStore;
pub use subscriptions::{
    QueryUpdate, SubscriberId, SubscriptionParams, SubscriptionRegistry, MIN_BROADCAST_RADIUS,
};
pub use types::{Bounds, DriverStatus, Entity, EntityId, EntityState, Point, StatusCounts};
pub use world::{City, World};
