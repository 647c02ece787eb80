//! Authoritative entity state.
//!
//! The store owns every entity's kinematic state behind its own
//! [`parking_lot::RwLock`]. The motion engine is the single writer; index
//! rebuilds, query correlation and statistics are readers. Readers never
//! block each other, and a writer holds one entity's lock for one update
//! only, so nobody waits longer than a single entity step.
//!
//! The set of entities is fixed at construction. There is no cross-entity
//! locking: a pass over the store sees each entity consistently, but the
//! pass as a whole is not a point-in-time view.

use crate::error::{IndexError, IndexResult};
use crate::types::{DriverStatus, Entity, EntityId, EntityState, Point, StatusCounts};
use parking_lot::RwLock;
use rayon::prelude::*;
use std::collections::HashMap;

/// One entity: immutable identity plus lock-guarded state.
#[derive(Debug)]
struct EntitySlot {
    id: EntityId,
    state: RwLock<EntityState>,
}

/// Thread-safe container for all tracked entities.
#[derive(Debug)]
pub struct EntityStore {
    slots: Vec<EntitySlot>,
    /// Entity id -> position in `slots`; never changes after construction
    lookup: HashMap<EntityId, usize>,
}

impl EntityStore {
    /// Creates a store holding `entities`.
    ///
    /// Fails with [`IndexError::InvalidArgument`] if two entities share an id.
    pub fn new(entities: impl IntoIterator<Item = Entity>) -> IndexResult<Self> {
        let mut slots = Vec::new();
        let mut lookup = HashMap::new();

        for entity in entities {
            if lookup.insert(entity.id, slots.len()).is_some() {
                return Err(IndexError::InvalidArgument(format!(
                    "duplicate entity id {}",
                    entity.id
                )));
            }
            slots.push(EntitySlot {
                id: entity.id,
                state: RwLock::new(entity.state()),
            });
        }

        Ok(Self { slots, lookup })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.lookup.contains_key(&id)
    }

    /// Ids in population order.
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.slots.iter().map(|slot| slot.id)
    }

    fn slot(&self, id: EntityId) -> IndexResult<&EntitySlot> {
        self.lookup
            .get(&id)
            .map(|&i| &self.slots[i])
            .ok_or(IndexError::EntityNotFound(id))
    }

    /// Consistent snapshot of one entity.
    pub fn get(&self, id: EntityId) -> IndexResult<Entity> {
        let slot = self.slot(id)?;
        let state = *slot.state.read();
        Ok(Entity::new(id, state))
    }

    pub fn position(&self, id: EntityId) -> IndexResult<Point> {
        Ok(self.slot(id)?.state.read().position)
    }

    pub fn status(&self, id: EntityId) -> IndexResult<DriverStatus> {
        Ok(self.slot(id)?.state.read().status)
    }

    pub fn set_position(&self, id: EntityId, position: Point) -> IndexResult<()> {
        self.update(id, |state| state.position = position)
    }

    pub fn set_heading(&self, id: EntityId, heading: f64) -> IndexResult<()> {
        self.update(id, |state| state.heading = heading)
    }

    pub fn set_speed(&self, id: EntityId, speed: f64) -> IndexResult<()> {
        self.update(id, |state| state.speed = speed)
    }

    pub fn set_status(&self, id: EntityId, status: DriverStatus) -> IndexResult<()> {
        self.update(id, |state| state.status = status)
    }

    /// Runs `f` with exclusive access to one entity's state.
    pub fn update<R>(&self, id: EntityId, f: impl FnOnce(&mut EntityState) -> R) -> IndexResult<R> {
        let slot = self.slot(id)?;
        let mut state = slot.state.write();
        Ok(f(&mut state))
    }

    /// Visits a snapshot of every entity in population order.
    pub fn for_each(&self, mut visit: impl FnMut(Entity)) {
        for slot in &self.slots {
            let state = *slot.state.read();
            visit(Entity::new(slot.id, state));
        }
    }

    /// Current positions of every entity, in population order.
    pub fn positions(&self) -> Vec<(EntityId, Point)> {
        let mut positions = Vec::with_capacity(self.slots.len());
        self.for_each(|entity| positions.push((entity.id, entity.position)));
        positions
    }

    /// Applies `f` to every entity in turn, each under its own write lock.
    pub fn update_all(&self, mut f: impl FnMut(EntityId, &mut EntityState)) {
        for slot in &self.slots {
            let mut state = slot.state.write();
            f(slot.id, &mut state);
        }
    }

    /// Parallel form of [`update_all`](Self::update_all).
    ///
    /// `init` builds per-worker scratch data (for example an RNG) that is
    /// handed to every call on that worker.
    pub fn par_update_all<T, INIT, F>(&self, init: INIT, f: F)
    where
        INIT: Fn() -> T + Sync + Send,
        F: Fn(&mut T, EntityId, &mut EntityState) + Sync + Send,
    {
        self.slots.par_iter().for_each_init(init, |scratch, slot| {
            let mut state = slot.state.write();
            f(scratch, slot.id, &mut state);
        });
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for slot in &self.slots {
            counts.record(slot.state.read().status);
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn entity(id: u64, x: f64, y: f64) -> Entity {
        Entity {
            id: EntityId(id),
            position: Point::new(x, y),
            heading: 0.0,
            speed: 1.0,
            status: DriverStatus::Available,
        }
    }

    #[test]
    fn test_get_and_setters() {
        let store = EntityStore::new(vec![entity(1, 1.0, 1.0), entity(2, 2.0, 2.0)]).unwrap();
        assert_eq!(store.len(), 2);

        store.set_position(EntityId(2), Point::new(3.0, 4.0)).unwrap();
        store.set_heading(EntityId(2), 1.5).unwrap();
        store.set_speed(EntityId(2), 0.5).unwrap();
        store.set_status(EntityId(2), DriverStatus::Offline).unwrap();

        let snapshot = store.get(EntityId(2)).unwrap();
        assert_eq!(snapshot.position, Point::new(3.0, 4.0));
        assert_eq!(snapshot.heading, 1.5);
        assert_eq!(snapshot.speed, 0.5);
        assert_eq!(snapshot.status, DriverStatus::Offline);

        // Untouched entity is unaffected
        assert_eq!(store.get(EntityId(1)).unwrap(), entity(1, 1.0, 1.0));
    }

    #[test]
    fn test_unknown_and_duplicate_ids() {
        let store = EntityStore::new(vec![entity(1, 0.0, 0.0)]).unwrap();
        assert_eq!(
            store.get(EntityId(9)).unwrap_err(),
            IndexError::EntityNotFound(EntityId(9))
        );
        assert!(store.set_speed(EntityId(9), 1.0).is_err());

        let err = EntityStore::new(vec![entity(1, 0.0, 0.0), entity(1, 1.0, 1.0)]).unwrap_err();
        assert!(matches!(err, IndexError::InvalidArgument(_)));
    }

    #[test]
    fn test_for_each_and_counts() {
        let store =
            EntityStore::new((1..=10).map(|i| entity(i, i as f64, i as f64))).unwrap();
        store.set_status(EntityId(3), DriverStatus::Busy).unwrap();
        store.set_status(EntityId(4), DriverStatus::Offline).unwrap();

        let mut seen = Vec::new();
        store.for_each(|e| seen.push(e.id.0));
        assert_eq!(seen, (1..=10).collect::<Vec<_>>());

        let counts = store.status_counts();
        assert_eq!(counts.available, 8);
        assert_eq!(counts.busy, 1);
        assert_eq!(counts.offline, 1);
    }

    #[test]
    fn test_par_update_visits_every_entity_once() {
        let store = EntityStore::new((1..=1000).map(|i| entity(i, 0.0, 0.0))).unwrap();
        store.par_update_all(|| 0u32, |calls, _, state| {
            *calls += 1;
            state.position.x += 1.0;
        });
        store.for_each(|e| assert_eq!(e.position.x, 1.0));
    }

    #[test]
    fn test_readers_never_observe_torn_state() {
        let store = Arc::new(EntityStore::new(vec![entity(1, 0.0, 0.0)]).unwrap());

        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for i in 1..=10_000 {
                    let v = i as f64;
                    store
                        .update(EntityId(1), |state| {
                            state.position = Point::new(v, v);
                            state.heading = v;
                            state.speed = v;
                        })
                        .unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        let e = store.get(EntityId(1)).unwrap();
                        assert_eq!(e.position.x, e.position.y);
                        assert_eq!(e.position.x, e.heading);
                        if e.heading > 0.0 {
                            assert_eq!(e.heading, e.speed);
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
