//! Index lifecycle: periodic full rebuilds and lock-light publication

use crate::error::{IndexError, IndexResult};
use crate::spatial::{IndexEntry, NodeStats, SpatialIndex};
use crate::store::EntityStore;
use crate::types::{Bounds, EntityId, Point};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Weight given to the newest sample in the query latency average.
pub const LATENCY_SMOOTHING: f64 = 0.1;

/// Running query counters, kept for observability only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryStats {
    /// Total queries served
    pub total_queries: u64,
    /// Total entries returned across all queries
    pub total_entries_returned: u64,
    /// Exponentially weighted average query time
    pub avg_query_time: Duration,
}

impl QueryStats {
    /// Folds one query into the counters.
    ///
    /// The first sample seeds the average; later samples are blended in
    /// with weight [`LATENCY_SMOOTHING`].
    pub fn record(&mut self, returned: usize, elapsed: Duration) {
        self.total_queries += 1;
        self.total_entries_returned += returned as u64;

        if self.total_queries == 1 {
            self.avg_query_time = elapsed;
        } else {
            let blended = self.avg_query_time.as_secs_f64() * (1.0 - LATENCY_SMOOTHING)
                + elapsed.as_secs_f64() * LATENCY_SMOOTHING;
            self.avg_query_time = Duration::from_secs_f64(blended);
        }
    }

    /// Mean number of entries returned per query.
    pub fn avg_entries_per_query(&self) -> f64 {
        if self.total_queries == 0 {
            0.0
        } else {
            self.total_entries_returned as f64 / self.total_queries as f64
        }
    }
}

/// Outcome of a raw index query.
#[derive(Debug, Clone)]
pub struct IndexQuery {
    pub entries: Vec<IndexEntry>,
    /// Time spent inside the index
    pub elapsed: Duration,
}

/// Summary of one completed rebuild.
#[derive(Debug, Clone)]
pub struct RebuildReport {
    /// Entries in the newly published index
    pub indexed: usize,
    /// Entities whose position fell outside the world bounds
    pub skipped: Vec<EntityId>,
    pub duration: Duration,
    pub node_stats: NodeStats,
}

#[derive(Debug)]
struct RebuildState {
    count: u64,
    last_rebuild: Instant,
}

/// Owns the published index.
///
/// Readers clone the current `Arc<SpatialIndex>` under a momentary read
/// lock and then query without holding any lock, so a rebuild never waits
/// on a slow query and a query never sees a half-built index. A superseded
/// index is dropped once its last in-flight query finishes.
pub struct IndexCoordinator {
    bounds: Bounds,
    capacity: usize,
    published: RwLock<Arc<SpatialIndex>>,
    query_stats: Mutex<QueryStats>,
    rebuilds: Mutex<RebuildState>,
    /// Serializes rebuilds so two callers cannot interleave publications
    rebuild_lock: Mutex<()>,
}

impl IndexCoordinator {
    /// Creates a coordinator with an empty index published.
    pub fn new(bounds: Bounds, capacity: usize) -> IndexResult<Self> {
        let empty = SpatialIndex::new(bounds, capacity)?;
        Ok(Self {
            bounds,
            capacity,
            published: RwLock::new(Arc::new(empty)),
            query_stats: Mutex::new(QueryStats::default()),
            rebuilds: Mutex::new(RebuildState {
                count: 0,
                last_rebuild: Instant::now(),
            }),
            rebuild_lock: Mutex::new(()),
        })
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Builds a fresh index from the store's current positions and
    /// publishes it.
    ///
    /// Entities outside the world bounds are skipped and reported. A
    /// subdivision failure aborts the rebuild; the previous index stays
    /// published and the fatal error is returned.
    ///
    /// Concurrent callers are serialized, so publications never interleave.
    ///
    /// # Arguments
    ///
    /// * `store` - Source of the position snapshot
    ///
    /// # Returns
    ///
    /// A [`RebuildReport`] describing the published index.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fleet_index::{Bounds, DriverStatus, Entity, EntityId, EntityStore, IndexCoordinator, Point};
    ///
    /// let store = EntityStore::new(vec![Entity {
    ///     id: EntityId(1),
    ///     position: Point::new(2.0, 3.0),
    ///     heading: 0.0,
    ///     speed: 0.0,
    ///     status: DriverStatus::Busy,
    /// }])
    /// .unwrap();
    /// let coordinator = IndexCoordinator::new(Bounds::new(0.0, 0.0, 10.0, 10.0), 8).unwrap();
    ///
    /// let report = coordinator.rebuild(&store).unwrap();
    /// assert_eq!(report.indexed, 1);
    /// assert_eq!(coordinator.rebuild_count(), 1);
    /// ```
    pub fn rebuild(&self, store: &EntityStore) -> IndexResult<RebuildReport> {
        let _guard = self.rebuild_lock.lock();
        let started = Instant::now();

        let snapshot = store.positions();
        let mut index = SpatialIndex::new(self.bounds, self.capacity)?;
        let mut skipped = Vec::new();

        for (id, position) in snapshot {
            match index.insert(id, position) {
                Ok(true) => {}
                Ok(false) => {
                    warn!("Entity {} at {} is outside the index bounds, skipping", id, position);
                    skipped.push(id);
                }
                Err(e) => {
                    error!("Index rebuild aborted: {}", e);
                    return Err(e);
                }
            }
        }

        let report = RebuildReport {
            indexed: index.len(),
            skipped,
            duration: started.elapsed(),
            node_stats: index.node_stats(),
        };
        self.publish(index);

        debug!(
            "Rebuilt index: {} entries, {} skipped, depth {}, {} leaves in {:?}",
            report.indexed,
            report.skipped.len(),
            report.node_stats.max_depth,
            report.node_stats.leaf_nodes,
            report.duration
        );
        Ok(report)
    }

    /// Atomically replaces the published index.
    pub fn publish(&self, index: SpatialIndex) {
        let next = Arc::new(index);
        let previous = std::mem::replace(&mut *self.published.write(), next);
        // Dropped outside the lock; readers still holding it keep it alive.
        drop(previous);

        let mut rebuilds = self.rebuilds.lock();
        rebuilds.count += 1;
        rebuilds.last_rebuild = Instant::now();
    }

    /// The currently published index.
    pub fn current(&self) -> Arc<SpatialIndex> {
        self.published.read().clone()
    }

    /// Entries within the square of half-width `radius` around `center`.
    ///
    /// Rejects a negative or non-finite radius and a non-finite center with
    /// [`IndexError::InvalidArgument`]. A zero radius is allowed and matches
    /// only points exactly at `center`.
    ///
    /// # Returns
    ///
    /// The matching entries and the time spent in the index. Each successful
    /// call is folded into [`query_stats`](Self::query_stats).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fleet_index::{Bounds, IndexCoordinator, Point};
    ///
    /// let coordinator = IndexCoordinator::new(Bounds::new(0.0, 0.0, 10.0, 10.0), 8).unwrap();
    /// let result = coordinator.query(Point::new(5.0, 5.0), 2.0).unwrap();
    /// assert!(result.entries.is_empty());
    /// assert!(coordinator.query(Point::new(5.0, 5.0), f64::NAN).is_err());
    /// ```
    pub fn query(&self, center: Point, radius: f64) -> IndexResult<IndexQuery> {
        if !center.is_finite() {
            return Err(IndexError::InvalidArgument(format!(
                "query center must be finite, got {center}"
            )));
        }
        if !(radius.is_finite() && radius >= 0.0) {
            return Err(IndexError::InvalidArgument(format!(
                "query radius must be a finite non-negative number, got {radius}"
            )));
        }

        let area = Bounds::around(center, radius);
        let index = self.current();

        let started = Instant::now();
        let entries = index.query(&area);
        let elapsed = started.elapsed();

        self.query_stats.lock().record(entries.len(), elapsed);

        Ok(IndexQuery { entries, elapsed })
    }

    pub fn query_stats(&self) -> QueryStats {
        self.query_stats.lock().clone()
    }

    /// Number of indexes published since construction.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds.lock().count
    }

    /// Time since the last publication (or since construction).
    pub fn last_rebuild_age(&self) -> Duration {
        self.rebuilds.lock().last_rebuild.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DriverStatus, Entity};

    fn store_with(points: &[(f64, f64)]) -> EntityStore {
        EntityStore::new(points.iter().enumerate().map(|(i, &(x, y))| Entity {
            id: EntityId(i as u64 + 1),
            position: Point::new(x, y),
            heading: 0.0,
            speed: 0.0,
            status: DriverStatus::Available,
        }))
        .unwrap()
    }

    fn coordinator() -> IndexCoordinator {
        IndexCoordinator::new(Bounds::new(0.0, 0.0, 10.0, 10.0), 4).unwrap()
    }

    #[test]
    fn test_starts_with_empty_index() {
        let coordinator = coordinator();
        assert!(coordinator.current().is_empty());
        assert_eq!(coordinator.rebuild_count(), 0);
        let result = coordinator.query(Point::new(5.0, 5.0), 100.0).unwrap();
        assert!(result.entries.is_empty());
    }

    #[test]
    fn test_rebuild_publishes_new_snapshot() {
        let coordinator = coordinator();
        let store = store_with(&[(1.0, 1.0), (2.0, 2.0), (3.0, 3.0), (4.0, 4.0), (5.0, 5.0)]);

        let report = coordinator.rebuild(&store).unwrap();
        assert_eq!(report.indexed, 5);
        assert!(report.skipped.is_empty());
        // Root plus its south-west child, which overflows on (5, 5)
        assert_eq!(report.node_stats.internal_nodes, 2);
        assert_eq!(report.node_stats.leaf_nodes, 7);
        assert_eq!(coordinator.rebuild_count(), 1);

        let before = coordinator.current();
        store.set_position(EntityId(1), Point::new(9.0, 9.0)).unwrap();

        // Published index is a snapshot: store changes are invisible until rebuild
        let hits = coordinator.query(Point::new(1.0, 1.0), 0.0).unwrap();
        assert_eq!(hits.entries.len(), 1);

        coordinator.rebuild(&store).unwrap();
        let hits = coordinator.query(Point::new(1.0, 1.0), 0.0).unwrap();
        assert!(hits.entries.is_empty());
        let hits = coordinator.query(Point::new(9.0, 9.0), 0.0).unwrap();
        assert_eq!(hits.entries[0].id, EntityId(1));

        // The superseded instance is untouched
        assert_eq!(before.query(&Bounds::around(Point::new(1.0, 1.0), 0.0)).len(), 1);
        assert!(!Arc::ptr_eq(&before, &coordinator.current()));
    }

    #[test]
    fn test_rebuild_skips_out_of_bounds_entities() {
        let coordinator = coordinator();
        let store = store_with(&[(1.0, 1.0), (11.0, 1.0), (5.0, -3.0)]);

        let report = coordinator.rebuild(&store).unwrap();
        assert_eq!(report.indexed, 1);
        assert_eq!(report.skipped, vec![EntityId(2), EntityId(3)]);
        assert_eq!(coordinator.current().len(), 1);
    }

    #[test]
    fn test_query_rejects_bad_arguments() {
        let coordinator = coordinator();
        for radius in [-0.1, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                coordinator.query(Point::new(5.0, 5.0), radius),
                Err(IndexError::InvalidArgument(_))
            ));
        }
        assert!(matches!(
            coordinator.query(Point::new(f64::NAN, 5.0), 1.0),
            Err(IndexError::InvalidArgument(_))
        ));
        assert_eq!(coordinator.query_stats().total_queries, 0);
    }

    #[test]
    fn test_query_uses_square_area() {
        let coordinator = coordinator();
        // (6, 6) is outside the unit circle around (5, 5) but inside the square
        let store = store_with(&[(6.0, 6.0), (6.0, 6.01)]);
        coordinator.rebuild(&store).unwrap();

        let result = coordinator.query(Point::new(5.0, 5.0), 1.0).unwrap();
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].id, EntityId(1));
    }

    #[test]
    fn test_query_stats_smoothing() {
        let mut stats = QueryStats::default();
        stats.record(4, Duration::from_micros(100));
        assert_eq!(stats.avg_query_time, Duration::from_micros(100));

        stats.record(2, Duration::from_micros(200));
        let avg = stats.avg_query_time.as_secs_f64() * 1e6;
        assert!((avg - 110.0).abs() < 1e-3, "avg {avg}");

        assert_eq!(stats.total_queries, 2);
        assert_eq!(stats.total_entries_returned, 6);
        assert_eq!(stats.avg_entries_per_query(), 3.0);
        assert_eq!(QueryStats::default().avg_entries_per_query(), 0.0);
    }

    #[test]
    fn test_queries_update_stats() {
        let coordinator = coordinator();
        let store = store_with(&[(1.0, 1.0), (2.0, 2.0)]);
        coordinator.rebuild(&store).unwrap();

        coordinator.query(Point::new(1.5, 1.5), 1.0).unwrap();
        coordinator.query(Point::new(1.0, 1.0), 0.0).unwrap();

        let stats = coordinator.query_stats();
        assert_eq!(stats.total_queries, 2);
        assert_eq!(stats.total_entries_returned, 3);
    }
}
