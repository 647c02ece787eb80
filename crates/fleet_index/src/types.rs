//! # Core Type Definitions
//!
//! The fundamental value types shared by every component of the fleet index:
//! planar points and rectangles, entity identity and status, and the
//! per-entity kinematic state owned by the [`EntityStore`](crate::store::EntityStore).
//!
//! ## Key Types
//!
//! - [`Point`] - A planar location (longitude as `x`, latitude as `y`)
//! - [`Bounds`] - Axis-aligned rectangle, inclusive on every edge
//! - [`EntityId`] - Stable integer identity of a tracked entity
//! - [`DriverStatus`] - Availability of an entity
//! - [`Entity`] - A consistent snapshot of one entity
//!
//! Distances are planar: longitude and latitude are treated as Cartesian
//! coordinates. This is an approximation and is kept deliberately.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rough conversion from one degree of arc to kilometres.
pub const KM_PER_DEGREE: f64 = 111.0;

// ============================================================================
// Geometry
// ============================================================================

/// A location in the planar coordinate space.
///
/// # Examples
///
/// ```rust
/// use fleet_index::Point;
///
/// let erbil = Point::new(44.009167, 36.191113);
/// assert_eq!(erbil.distance(erbil), 0.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate (longitude)
    pub x: f64,
    /// Y coordinate (latitude)
    pub y: f64,
}

impl Point {
    /// Creates a new point.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`, treating both axes as Cartesian.
    pub fn distance(&self, other: Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Whether both coordinates are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.x, self.y)
    }
}

/// Axis-aligned rectangle `(min_x, min_y) - (max_x, max_y)`.
///
/// Both the containment and the intersection tests treat every edge as
/// closed, so a point lying exactly on an edge belongs to the rectangle and
/// two rectangles that merely touch are considered intersecting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Western edge
    pub min_x: f64,
    /// Southern edge
    pub min_y: f64,
    /// Eastern edge
    pub max_x: f64,
    /// Northern edge
    pub max_y: f64,
}

impl Bounds {
    /// Creates a new rectangle.
    ///
    /// The caller is responsible for `min_x <= max_x` and `min_y <= max_y`;
    /// see [`Bounds::is_valid`].
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Square of half-width `radius` centred on `center`.
    pub fn around(center: Point, radius: f64) -> Self {
        Self::new(
            center.x - radius,
            center.y - radius,
            center.x + radius,
            center.y + radius,
        )
    }

    /// Whether the corners are ordered and finite.
    pub fn is_valid(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }

    /// Inclusive point containment.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.min_x
            && point.x <= self.max_x
            && point.y >= self.min_y
            && point.y <= self.max_y
    }

    /// Closed-interval overlap test (separating axis).
    pub fn intersects(&self, other: &Bounds) -> bool {
        !(other.max_x < self.min_x
            || other.min_x > self.max_x
            || other.max_y < self.min_y
            || other.min_y > self.max_y)
    }

    /// Midpoint of the rectangle.
    pub fn center(&self) -> Point {
        Point::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Pulls `point` onto the nearest location inside the rectangle.
    pub fn clamp(&self, point: Point) -> Point {
        Point::new(
            point.x.clamp(self.min_x, self.max_x),
            point.y.clamp(self.min_y, self.max_y),
        )
    }
}

// ============================================================================
// Entities
// ============================================================================

/// Stable identity of a tracked entity.
///
/// Ids are assigned once at population time and never change; they are the
/// only key used to correlate index entries with store records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current availability of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriverStatus {
    Available,
    Busy,
    /// Offline entities keep their position and never change status again.
    Offline,
}

impl DriverStatus {
    pub const ALL: [DriverStatus; 3] = [
        DriverStatus::Available,
        DriverStatus::Busy,
        DriverStatus::Offline,
    ];
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverStatus::Available => "Available",
            DriverStatus::Busy => "Busy",
            DriverStatus::Offline => "Offline",
        };
        f.write_str(name)
    }
}

/// Mutable kinematic state of one entity.
///
/// Always read and written as a unit under the entity's own lock, so a
/// reader can never observe a position from one update paired with a
/// heading from another.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub position: Point,
    /// Heading in radians, `0` pointing north, growing clockwise
    pub heading: f64,
    /// Speed in coordinate units per second
    pub speed: f64,
    pub status: DriverStatus,
}

/// Snapshot of an entity: its identity plus a copy of its state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub position: Point,
    pub heading: f64,
    pub speed: f64,
    pub status: DriverStatus,
}

impl Entity {
    pub fn new(id: EntityId, state: EntityState) -> Self {
        Self {
            id,
            position: state.position,
            heading: state.heading,
            speed: state.speed,
            status: state.status,
        }
    }

    /// The mutable part of the snapshot.
    pub fn state(&self) -> EntityState {
        EntityState {
            position: self.position,
            heading: self.heading,
            speed: self.speed,
            status: self.status,
        }
    }
}

/// Number of entities in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub available: usize,
    pub busy: usize,
    pub offline: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: DriverStatus) {
        match status {
            DriverStatus::Available => self.available += 1,
            DriverStatus::Busy => self.busy += 1,
            DriverStatus::Offline => self.offline += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.available + self.busy + self.offline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_contains_is_inclusive() {
        let bounds = Bounds::new(0.0, 0.0, 10.0, 10.0);
        assert!(bounds.contains(Point::new(0.0, 0.0)));
        assert!(bounds.contains(Point::new(10.0, 10.0)));
        assert!(bounds.contains(Point::new(10.0, 0.0)));
        assert!(!bounds.contains(Point::new(10.000001, 5.0)));
        assert!(!bounds.contains(Point::new(5.0, -0.000001)));
    }

    #[test]
    fn test_bounds_touching_edges_intersect() {
        let a = Bounds::new(0.0, 0.0, 5.0, 5.0);
        let b = Bounds::new(5.0, 5.0, 10.0, 10.0);
        let c = Bounds::new(5.1, 0.0, 10.0, 5.0);
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
        assert!(!c.intersects(&a));
    }

    #[test]
    fn test_bounds_around_and_degenerate_radius() {
        let square = Bounds::around(Point::new(5.0, 5.0), 0.0);
        assert!(square.is_valid());
        assert!(square.contains(Point::new(5.0, 5.0)));
        assert!(!square.contains(Point::new(5.0, 5.0000001)));

        assert!(!Bounds::around(Point::new(5.0, 5.0), -1.0).is_valid());
        assert!(!Bounds::new(0.0, f64::NAN, 1.0, 1.0).is_valid());
    }

    #[test]
    fn test_clamp_keeps_point_inside() {
        let bounds = Bounds::new(42.5, 35.5, 44.5, 37.5);
        let clamped = bounds.clamp(Point::new(45.0, 35.0));
        assert_eq!(clamped, Point::new(44.5, 35.5));
        assert!(bounds.contains(clamped));
    }

    #[test]
    fn test_status_counts() {
        let mut counts = StatusCounts::default();
        for status in DriverStatus::ALL {
            counts.record(status);
        }
        counts.record(DriverStatus::Busy);
        assert_eq!(counts.available, 1);
        assert_eq!(counts.busy, 2);
        assert_eq!(counts.offline, 1);
        assert_eq!(counts.total(), 4);
    }
}
