//! Spatial indexing for the fleet
//!
//! A fixed-capacity point quadtree plus the entry/result types that carry
//! entity identity through it.

mod query;
mod quadtree;

pub use quadtree::{NodeStats, QuadNode, SpatialIndex, MAX_QUADTREE_DEPTH};
pub use query::{IndexEntry, QueryHit};
