//! Error types for the fleet index.

use crate::types::EntityId;
use thiserror::Error;

/// Errors surfaced by the index, the store and the query boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    /// A caller-supplied argument was rejected at the query boundary.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A point inside a parent node fitted none of its children while the
    /// node was being split. Correct operation never produces this.
    #[error("Subdivision invariant violated: point ({x}, {y}) fits no child quadrant")]
    SubdivisionInvariant { x: f64, y: f64 },

    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl IndexError {
    /// Whether the error signals a broken internal invariant rather than a
    /// bad request. Fatal errors should stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IndexError::SubdivisionInvariant { .. })
    }
}

pub type IndexResult<T> = Result<T, IndexError>;
