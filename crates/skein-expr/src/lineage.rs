//! Graph identity for ownership checks.
//!
//! Handles are plain indices, so a function must only be differentiated
//! or expanded against the graph its handles came from. Cloning a graph
//! forks its identity: the clone shares the parent's node prefix but not
//! anything either side adds afterwards.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_GRAPH: AtomicU64 = AtomicU64::new(0);

/// Unique identity of one graph instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GraphId(u64);

impl GraphId {
    fn fresh() -> Self {
        Self(NEXT_GRAPH.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug)]
pub(crate) struct Lineage {
    id: GraphId,
    /// Graphs this one was cloned from, with the node count at the fork.
    ancestors: Vec<(GraphId, usize)>,
}

impl Lineage {
    pub fn new() -> Self {
        Self {
            id: GraphId::fresh(),
            ancestors: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> GraphId {
        self.id
    }

    /// Identity for a clone taken while the graph holds `len` nodes.
    pub fn fork(&self, len: usize) -> Self {
        let mut ancestors = self.ancestors.clone();
        ancestors.push((self.id, len));
        Self {
            id: GraphId::fresh(),
            ancestors,
        }
    }

    /// Whether node indices `0..=max` of graph `owner` denote the same
    /// nodes here.
    pub fn shares(&self, owner: GraphId, max: u32) -> bool {
        owner == self.id
            || self
                .ancestors
                .iter()
                .any(|&(id, len)| id == owner && (max as usize) < len)
    }
}

/// Where a function's handles live: owning graph and largest node index.
#[derive(Clone, Copy, Debug)]
pub(crate) struct GraphRef {
    pub id: GraphId,
    pub max: u32,
}
