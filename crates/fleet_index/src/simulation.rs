//! The fleet simulation facade: `query`, `tick`, `rebuild` and `stats`.
//!
//! [`FleetSimulation`] ties the entity store, the motion engine and the
//! index coordinator together. Every method takes `&self`, so one instance
//! is shared behind an `Arc` by the motion task, the rebuild task and any
//! number of query callers.

use crate::coordinator::{IndexCoordinator, RebuildReport};
use crate::error::{IndexError, IndexResult};
use crate::motion::{MotionEngine, MotionParams};
use crate::spatial::QueryHit;
use crate::store::EntityStore;
use crate::types::{Entity, Point, StatusCounts};
use crate::world::World;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Sizing knobs for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    pub num_drivers: usize,
    /// Leaf capacity of every rebuilt quadtree
    pub node_capacity: usize,
    /// Radius used when a caller does not supply a usable one
    pub search_radius: f64,
    /// Fixed seed for the initial population; random when unset
    pub seed: Option<u64>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            num_drivers: 1000,
            node_capacity: 8,
            search_radius: 0.15,
            seed: None,
        }
    }
}

/// Read-only observability snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub status_counts: StatusCounts,
    pub query_count: u64,
    pub avg_drivers_per_query: f64,
    pub avg_query_latency: Duration,
    pub rebuild_count: u64,
    pub last_rebuild_age: Duration,
    pub entity_count: usize,
}

pub struct FleetSimulation {
    world: World,
    store: EntityStore,
    engine: MotionEngine,
    coordinator: IndexCoordinator,
    search_radius: f64,
}

impl FleetSimulation {
    /// Populates a new fleet around the world's home city and publishes the
    /// first index.
    pub fn new(
        world: World,
        params: MotionParams,
        settings: &SimulationSettings,
    ) -> IndexResult<Self> {
        let engine = MotionEngine::new(world.bounds(), params)?;
        let mut rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let entities = world.populate(settings.num_drivers, &engine, &mut rng);

        Self::with_entities(world, engine, entities, settings)
    }

    /// Builds a simulation over an explicit set of entities.
    pub fn with_entities(
        world: World,
        engine: MotionEngine,
        entities: Vec<Entity>,
        settings: &SimulationSettings,
    ) -> IndexResult<Self> {
        if !(settings.search_radius.is_finite() && settings.search_radius > 0.0) {
            return Err(IndexError::InvalidConfig(format!(
                "search radius must be positive, got {}",
                settings.search_radius
            )));
        }
        if engine.bounds() != world.bounds() {
            return Err(IndexError::InvalidConfig(
                "motion engine bounds differ from the world bounds".to_string(),
            ));
        }

        let store = EntityStore::new(entities)?;
        let coordinator = IndexCoordinator::new(world.bounds(), settings.node_capacity)?;

        let simulation = Self {
            world,
            store,
            engine,
            coordinator,
            search_radius: settings.search_radius,
        };
        let report = simulation.rebuild()?;

        info!(
            "🚗 Fleet of {} drivers ready around {} ({} indexed)",
            simulation.store.len(),
            simulation.world.home_city().name,
            report.indexed
        );
        Ok(simulation)
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn engine(&self) -> &MotionEngine {
        &self.engine
    }

    pub fn coordinator(&self) -> &IndexCoordinator {
        &self.coordinator
    }

    pub fn search_radius(&self) -> f64 {
        self.search_radius
    }

    /// Advances every entity by `dt` seconds, spreading the work over the
    /// rayon pool with one RNG per worker.
    ///
    /// Only the store changes. Queries keep seeing the old positions until
    /// the next [`rebuild`](Self::rebuild).
    ///
    /// # Arguments
    ///
    /// * `dt` - Elapsed time in seconds; must be finite and non-negative
    ///
    /// # Errors
    ///
    /// [`IndexError::InvalidArgument`](crate::IndexError::InvalidArgument)
    /// for a negative or non-finite `dt`. No entity is touched in that case.
    pub fn tick(&self, dt: f64) -> IndexResult<()> {
        check_dt(dt)?;
        self.store.par_update_all(rand::thread_rng, |rng, _, state| {
            self.engine.advance(state, dt, rng);
        });
        Ok(())
    }

    /// Sequential [`tick`](Self::tick) driven by a caller-supplied RNG.
    pub fn tick_with_rng<R: Rng + ?Sized>(&self, dt: f64, rng: &mut R) -> IndexResult<()> {
        check_dt(dt)?;
        self.store.update_all(|_, state| self.engine.advance(state, dt, rng));
        Ok(())
    }

    /// Forces an index republish from the current positions.
    ///
    /// # Returns
    ///
    /// A [`RebuildReport`] with the number of indexed entities, any skipped
    /// out-of-bounds ids, the build time and the new tree's node counts.
    ///
    /// # Errors
    ///
    /// A fatal [`IndexError::SubdivisionInvariant`](crate::IndexError::SubdivisionInvariant)
    /// if the quadtree could not be built. The previous index stays published.
    pub fn rebuild(&self) -> IndexResult<RebuildReport> {
        self.coordinator.rebuild(&self.store)
    }

    /// Entities whose indexed position lies within the square of
    /// half-width `radius` around `center`.
    ///
    /// Each hit's position comes from the index snapshot that served the
    /// query; heading, speed and status are read live from the store.
    ///
    /// # Arguments
    ///
    /// * `center` - Middle of the search square
    /// * `radius` - Half-width of the square; `0` matches exact points only
    ///
    /// # Returns
    ///
    /// One [`QueryHit`] per matching entity, in index order.
    ///
    /// # Errors
    ///
    /// [`IndexError::InvalidArgument`](crate::IndexError::InvalidArgument)
    /// for a negative or non-finite radius or a non-finite center.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fleet_index::{
    ///     Bounds, City, DriverStatus, Entity, EntityId, FleetSimulation, MotionEngine,
    ///     MotionParams, Point, SimulationSettings, World,
    /// };
    ///
    /// let world = World::new(
    ///     Bounds::new(0.0, 0.0, 10.0, 10.0),
    ///     vec![City::new("Center", Point::new(5.0, 5.0), 1.0)],
    /// )
    /// .unwrap();
    /// let engine = MotionEngine::new(world.bounds(), MotionParams::default()).unwrap();
    /// let parked = |id, x, y| Entity {
    ///     id: EntityId(id),
    ///     position: Point::new(x, y),
    ///     heading: 0.0,
    ///     speed: 0.0,
    ///     status: DriverStatus::Available,
    /// };
    /// let entities = vec![parked(1, 5.0, 5.0), parked(2, 9.0, 9.0)];
    /// let sim = FleetSimulation::with_entities(world, engine, entities, &SimulationSettings::default())
    ///     .unwrap();
    ///
    /// let hits = sim.query(Point::new(5.0, 5.0), 1.0).unwrap();
    /// assert_eq!(hits.len(), 1);
    /// assert_eq!(hits[0].id, EntityId(1));
    /// assert!(sim.query(Point::new(5.0, 5.0), -1.0).is_err());
    /// ```
    pub fn query(&self, center: Point, radius: f64) -> IndexResult<Vec<QueryHit>> {
        let result = self.coordinator.query(center, radius)?;

        let mut hits = Vec::with_capacity(result.entries.len());
        for entry in result.entries {
            match self.store.get(entry.id) {
                Ok(entity) => hits.push(QueryHit::new(entry, &entity, center)),
                Err(_) => warn!("Indexed entity {} is missing from the store, skipping", entry.id),
            }
        }
        Ok(hits)
    }

    /// Queries around a named city; unknown names use the home city.
    pub fn query_city(&self, name: &str, radius: f64) -> IndexResult<Vec<QueryHit>> {
        let center = self.world.resolve_city(name).center;
        self.query(center, radius)
    }

    pub fn status_counts(&self) -> StatusCounts {
        self.store.status_counts()
    }

    /// Collects a [`Stats`] snapshot.
    ///
    /// Status counts are read entity by entity while motion may be running,
    /// so they are consistent per entity but not across the whole fleet.
    /// Query and rebuild counters come from the coordinator.
    pub fn stats(&self) -> Stats {
        let queries = self.coordinator.query_stats();
        Stats {
            status_counts: self.store.status_counts(),
            query_count: queries.total_queries,
            avg_drivers_per_query: queries.avg_entries_per_query(),
            avg_query_latency: queries.avg_query_time,
            rebuild_count: self.coordinator.rebuild_count(),
            last_rebuild_age: self.coordinator.last_rebuild_age(),
            entity_count: self.store.len(),
        }
    }
}

fn check_dt(dt: f64) -> IndexResult<()> {
    if dt.is_finite() && dt >= 0.0 {
        Ok(())
    } else {
        Err(IndexError::InvalidArgument(format!(
            "tick duration must be a finite non-negative number of seconds, got {dt}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Bounds, DriverStatus, EntityId};
    use crate::world::default_cities;

    fn settings() -> SimulationSettings {
        SimulationSettings {
            num_drivers: 200,
            node_capacity: 4,
            search_radius: 0.15,
            seed: Some(7),
        }
    }

    fn parked(id: u64, x: f64, y: f64, status: DriverStatus) -> Entity {
        Entity {
            id: EntityId(id),
            position: Point::new(x, y),
            heading: 0.0,
            speed: 0.0,
            status,
        }
    }

    fn small_simulation(entities: Vec<Entity>) -> FleetSimulation {
        let world = World::new(Bounds::new(0.0, 0.0, 10.0, 10.0), default_cities()).unwrap();
        let engine = MotionEngine::new(world.bounds(), MotionParams::default()).unwrap();
        FleetSimulation::with_entities(world, engine, entities, &settings()).unwrap()
    }

    #[test]
    fn test_new_publishes_initial_index() {
        let sim = FleetSimulation::new(World::default(), MotionParams::default(), &settings()).unwrap();
        assert_eq!(sim.store().len(), 200);
        assert_eq!(sim.coordinator().current().len(), 200);
        assert_eq!(sim.stats().rebuild_count, 1);

        let hits = sim.query_city("Erbil", 0.15).unwrap();
        assert_eq!(hits.len(), 200);
    }

    #[test]
    fn test_seeded_population_is_reproducible() {
        let a = FleetSimulation::new(World::default(), MotionParams::default(), &settings()).unwrap();
        let b = FleetSimulation::new(World::default(), MotionParams::default(), &settings()).unwrap();
        assert_eq!(a.store().positions(), b.store().positions());
    }

    #[test]
    fn test_query_joins_live_state_by_id() {
        let sim = small_simulation(vec![
            parked(1, 5.0, 5.0, DriverStatus::Available),
            parked(2, 5.0, 5.0, DriverStatus::Busy),
            parked(3, 8.0, 8.0, DriverStatus::Available),
        ]);

        sim.store().set_status(EntityId(2), DriverStatus::Offline).unwrap();

        let mut hits = sim.query(Point::new(5.0, 5.0), 0.0).unwrap();
        hits.sort_by_key(|hit| hit.id);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, EntityId(1));
        assert_eq!(hits[1].id, EntityId(2));
        assert_eq!(hits[1].status, DriverStatus::Offline);
        assert_eq!(hits[1].distance, 0.0);
    }

    #[test]
    fn test_query_position_comes_from_snapshot() {
        let sim = small_simulation(vec![parked(1, 2.0, 2.0, DriverStatus::Available)]);
        sim.store().set_position(EntityId(1), Point::new(2.5, 2.0)).unwrap();

        let hits = sim.query(Point::new(2.0, 2.0), 0.1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].position, Point::new(2.0, 2.0));

        sim.rebuild().unwrap();
        assert!(sim.query(Point::new(2.0, 2.0), 0.1).unwrap().is_empty());
    }

    #[test]
    fn test_query_rejects_bad_radius() {
        let sim = small_simulation(vec![parked(1, 1.0, 1.0, DriverStatus::Available)]);
        assert!(matches!(
            sim.query(Point::new(1.0, 1.0), -1.0),
            Err(IndexError::InvalidArgument(_))
        ));
        assert!(sim.query_city("Erbil", f64::NAN).is_err());
    }

    #[test]
    fn test_tick_rejects_bad_dt() {
        let sim = small_simulation(vec![parked(1, 1.0, 1.0, DriverStatus::Available)]);
        assert!(sim.tick(-0.5).is_err());
        assert!(sim.tick(f64::INFINITY).is_err());
        assert!(sim.tick(0.0).is_ok());
    }

    #[test]
    fn test_tick_keeps_parked_entities_in_place() {
        let sim = small_simulation((1..=50).map(|i| parked(i, 5.0, 5.0, DriverStatus::Available)).collect());
        for _ in 0..20 {
            sim.tick(1.0).unwrap();
        }
        sim.store().for_each(|e| assert_eq!(e.position, Point::new(5.0, 5.0)));
    }

    #[test]
    fn test_tick_with_rng_is_deterministic() {
        let a = FleetSimulation::new(World::default(), MotionParams::default(), &settings()).unwrap();
        let b = FleetSimulation::new(World::default(), MotionParams::default(), &settings()).unwrap();

        let mut rng_a = StdRng::seed_from_u64(99);
        let mut rng_b = StdRng::seed_from_u64(99);
        for _ in 0..10 {
            a.tick_with_rng(0.22, &mut rng_a).unwrap();
            b.tick_with_rng(0.22, &mut rng_b).unwrap();
        }
        assert_eq!(a.store().positions(), b.store().positions());
    }

    #[test]
    fn test_stats_snapshot() {
        let sim = small_simulation(vec![
            parked(1, 1.0, 1.0, DriverStatus::Available),
            parked(2, 1.0, 1.0, DriverStatus::Busy),
            parked(3, 9.0, 9.0, DriverStatus::Offline),
        ]);
        sim.query(Point::new(1.0, 1.0), 0.5).unwrap();
        sim.query(Point::new(9.0, 9.0), 0.5).unwrap();

        let stats = sim.stats();
        assert_eq!(stats.entity_count, 3);
        assert_eq!(stats.status_counts.available, 1);
        assert_eq!(stats.status_counts.busy, 1);
        assert_eq!(stats.status_counts.offline, 1);
        assert_eq!(stats.query_count, 2);
        assert_eq!(stats.avg_drivers_per_query, 1.5);
        assert_eq!(stats.rebuild_count, 1);
    }

    #[test]
    fn test_rejects_mismatched_configuration() {
        let world = World::default();
        let engine = MotionEngine::new(Bounds::new(0.0, 0.0, 1.0, 1.0), MotionParams::default()).unwrap();
        assert!(FleetSimulation::with_entities(world.clone(), engine, Vec::new(), &settings()).is_err());

        let engine = MotionEngine::new(world.bounds(), MotionParams::default()).unwrap();
        let bad = SimulationSettings {
            search_radius: 0.0,
            ..settings()
        };
        assert!(FleetSimulation::with_entities(world, engine, Vec::new(), &bad).is_err());
    }
}
