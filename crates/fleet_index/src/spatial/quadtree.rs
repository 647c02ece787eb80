//! Fixed-capacity point quadtree used as the published spatial index.
//! Nodes split on overflow and never rebalance; the whole tree is rebuilt
//! from scratch on every index refresh.

use super::query::IndexEntry;
use crate::error::{IndexError, IndexResult};
use crate::types::{Bounds, EntityId, Point};

/// Depth at which leaves stop splitting and accept entries past capacity.
/// Only reachable when more than `capacity` entries share (nearly) the same
/// coordinates, where further splitting would never separate them.
pub const MAX_QUADTREE_DEPTH: u8 = 32;

/// A node in the quadtree.
///
/// A node holds entries directly iff it is not divided. Once divided it
/// holds none, and every entry it ever held lives in exactly one child.
#[derive(Debug)]
pub struct QuadNode {
    /// Area covered by this node, inclusive on every edge
    bounds: Bounds,
    /// Split threshold inherited by every child
    capacity: usize,
    /// Entries in insertion order (only while undivided)
    entries: Vec<IndexEntry>,
    /// Child nodes (NW, NE, SW, SE) - None while undivided
    children: Option<Box<[QuadNode; 4]>>,
    depth: u8,
}

impl QuadNode {
    /// Creates an empty, undivided node.
    pub fn new(bounds: Bounds, capacity: usize, depth: u8) -> Self {
        Self {
            bounds,
            capacity,
            entries: Vec::with_capacity(capacity),
            children: None,
            depth,
        }
    }

    /// Inserts an entry into this subtree.
    ///
    /// Returns `Ok(false)` when the point lies outside the node's bounds.
    /// An undivided node below capacity keeps the entry itself; otherwise
    /// the node splits (if it has not already) and the entry descends into
    /// exactly one child.
    pub fn insert(&mut self, entry: IndexEntry) -> IndexResult<bool> {
        if !self.bounds.contains(entry.point) {
            return Ok(false);
        }

        if self.children.is_none() {
            if self.entries.len() < self.capacity || self.depth >= MAX_QUADTREE_DEPTH {
                self.entries.push(entry);
                return Ok(true);
            }
            self.subdivide()?;
        }

        self.insert_into_child(entry)
    }

    /// Routes an entry to the child chosen by the midpoint tie-break.
    fn insert_into_child(&mut self, entry: IndexEntry) -> IndexResult<bool> {
        let index = self.child_index(entry.point);
        match &mut self.children {
            Some(children) => children[index].insert(entry),
            None => Ok(false),
        }
    }

    /// Splits this node into four quadrants and moves its entries down.
    ///
    /// Every held entry was verified against this node's bounds on the way
    /// in, so each must land in a child. One that does not is reported as
    /// [`IndexError::SubdivisionInvariant`].
    fn subdivide(&mut self) -> IndexResult<()> {
        let Bounds {
            min_x,
            min_y,
            max_x,
            max_y,
        } = self.bounds;
        let mid = self.bounds.center();
        let child_depth = self.depth + 1;
        let capacity = self.capacity;

        self.children = Some(Box::new([
            // NW (0)
            QuadNode::new(Bounds::new(min_x, mid.y, mid.x, max_y), capacity, child_depth),
            // NE (1)
            QuadNode::new(Bounds::new(mid.x, mid.y, max_x, max_y), capacity, child_depth),
            // SW (2)
            QuadNode::new(Bounds::new(min_x, min_y, mid.x, mid.y), capacity, child_depth),
            // SE (3)
            QuadNode::new(Bounds::new(mid.x, min_y, max_x, mid.y), capacity, child_depth),
        ]));

        let entries = std::mem::take(&mut self.entries);
        for entry in entries {
            if !self.insert_into_child(entry)? {
                return Err(IndexError::SubdivisionInvariant {
                    x: entry.point.x,
                    y: entry.point.y,
                });
            }
        }
        Ok(())
    }

    /// Gets the child index (0-3) for a point.
    ///
    /// `x <= mid_x` selects the west half and `y <= mid_y` the south half,
    /// so points on a dividing line always go west/south.
    fn child_index(&self, point: Point) -> usize {
        let mid = self.bounds.center();
        let west = point.x <= mid.x;
        let south = point.y <= mid.y;

        match (south, west) {
            (false, true) => 0,  // NW
            (false, false) => 1, // NE
            (true, true) => 2,   // SW
            (true, false) => 3,  // SE
        }
    }

    /// Appends every entry in this subtree that lies inside `area`.
    ///
    /// Node intersection only prunes whole subtrees; each candidate is
    /// then checked with the inclusive containment test.
    pub fn query(&self, area: &Bounds, results: &mut Vec<IndexEntry>) {
        if !self.bounds.intersects(area) {
            return;
        }

        results.extend(self.entries.iter().filter(|e| area.contains(e.point)));

        if let Some(children) = &self.children {
            for child in children.iter() {
                child.query(area, results);
            }
        }
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn is_divided(&self) -> bool {
        self.children.is_some()
    }

    /// Entries held directly by this node (empty once divided).
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// The four children in NW, NE, SW, SE order, if divided.
    pub fn children(&self) -> Option<&[QuadNode; 4]> {
        self.children.as_deref()
    }

    /// Gets statistics about this subtree
    pub fn stats(&self) -> NodeStats {
        let mut stats = NodeStats {
            total_entries: self.entries.len(),
            max_depth: self.depth,
            leaf_nodes: 0,
            internal_nodes: 0,
        };

        match &self.children {
            None => stats.leaf_nodes = 1,
            Some(children) => {
                stats.internal_nodes = 1;
                for child in children.iter() {
                    let child_stats = child.stats();
                    stats.total_entries += child_stats.total_entries;
                    stats.max_depth = stats.max_depth.max(child_stats.max_depth);
                    stats.leaf_nodes += child_stats.leaf_nodes;
                    stats.internal_nodes += child_stats.internal_nodes;
                }
            }
        }

        stats
    }
}

/// Shape statistics for a quadtree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStats {
    pub total_entries: usize,
    pub max_depth: u8,
    pub leaf_nodes: usize,
    pub internal_nodes: usize,
}

/// A complete point index over a fixed world rectangle.
///
/// Built once, then shared read-only: the coordinator wraps each finished
/// index in an `Arc` and never mutates it again.
#[derive(Debug)]
pub struct SpatialIndex {
    root: QuadNode,
    bounds: Bounds,
    capacity: usize,
    len: usize,
}

impl SpatialIndex {
    /// Creates an empty index over `bounds` whose nodes split past `capacity`.
    pub fn new(bounds: Bounds, capacity: usize) -> IndexResult<Self> {
        if !bounds.is_valid() {
            return Err(IndexError::InvalidConfig(format!(
                "index bounds are not an ordered finite rectangle: {bounds:?}"
            )));
        }
        if capacity == 0 {
            return Err(IndexError::InvalidConfig(
                "node capacity must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            root: QuadNode::new(bounds, capacity, 0),
            bounds,
            capacity,
            len: 0,
        })
    }

    /// Inserts an entity's point.
    ///
    /// `Ok(false)` means the point is outside the world bounds and was not
    /// stored; callers skip it and carry on.
    pub fn insert(&mut self, id: EntityId, point: Point) -> IndexResult<bool> {
        let inserted = self.root.insert(IndexEntry::new(id, point))?;
        if inserted {
            self.len += 1;
        }
        Ok(inserted)
    }

    /// All entries inside `area`, inclusive on every edge.
    pub fn query(&self, area: &Bounds) -> Vec<IndexEntry> {
        let mut results = Vec::new();
        self.root.query(area, &mut results);
        results
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn root(&self) -> &QuadNode {
        &self.root
    }

    pub fn node_stats(&self) -> NodeStats {
        self.root.stats()
    }
}
