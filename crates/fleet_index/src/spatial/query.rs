//! Index entries and correlated query results.

use crate::types::{DriverStatus, Entity, EntityId, Point, KM_PER_DEGREE};
use serde::{Deserialize, Serialize};

/// A point stored in the index, tagged with the entity it belongs to.
///
/// Carrying the id lets query results be joined back to the store by exact
/// key instead of by coordinate proximity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: EntityId,
    pub point: Point,
}

impl IndexEntry {
    pub fn new(id: EntityId, point: Point) -> Self {
        Self { id, point }
    }
}

/// Result of a radius query, joined with the entity's current state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryHit {
    /// Entity identifier
    pub id: EntityId,
    /// Position as captured by the index rebuild that served the query
    pub position: Point,
    /// Heading in radians
    pub heading: f64,
    pub speed: f64,
    pub status: DriverStatus,
    /// Planar distance from the query center, in coordinate units
    pub distance: f64,
}

impl QueryHit {
    /// Builds a hit from an index entry and a live snapshot of its entity.
    pub fn new(entry: IndexEntry, entity: &Entity, center: Point) -> Self {
        Self {
            id: entry.id,
            position: entry.point,
            heading: entity.heading,
            speed: entity.speed,
            status: entity.status,
            distance: center.distance(entry.point),
        }
    }

    /// Distance converted with the rough one-degree-is-111-km rule.
    pub fn distance_km(&self) -> f64 {
        self.distance * KM_PER_DEGREE
    }

    /// Heading in degrees, normalized to `[0, 360)`.
    pub fn heading_degrees(&self) -> f64 {
        let degrees = self.heading.to_degrees().rem_euclid(360.0);
        // rem_euclid can round up to exactly 360.0 for tiny negative inputs
        if degrees >= 360.0 {
            0.0
        } else {
            degrees
        }
    }
}
