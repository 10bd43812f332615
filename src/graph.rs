//! Weighted association graph
//!
//! Symmetric adjacency between item ids, independent of any region. The
//! graph never owns items: endpoint existence is checked by the owning
//! [`SemanticMemory`](crate::memory::SemanticMemory) before an edge is
//! created, and edges left dangling by eviction are filtered lazily at read
//! time rather than eagerly deleted.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{MemoryError, Result};
use crate::item::MemoryId;
use crate::persistence::GraphSnapshot;

/// Weighted, undirected adjacency over memory item ids
#[derive(Default)]
pub struct AssociationGraph {
    edges: RwLock<HashMap<MemoryId, HashMap<MemoryId, f32>>>,
}

impl AssociationGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or overwrite) the symmetric edge `a <-> b`.
    ///
    /// `strength` must lie in `(0, 1]`; out-of-range values fail without
    /// mutating the graph. Endpoint existence is the caller's concern.
    pub fn insert(&self, a: MemoryId, b: MemoryId, strength: f32) -> Result<()> {
        if !(strength > 0.0 && strength <= 1.0) {
            return Err(MemoryError::InvalidStrength(strength));
        }
        let mut edges = self.edges.write();
        edges.entry(a).or_default().insert(b, strength);
        edges.entry(b).or_default().insert(a, strength);
        Ok(())
    }

    /// All neighbors of `id` with strength at least `min_strength`, sorted
    /// descending by strength. Unknown ids yield an empty list.
    ///
    /// May include ids whose items have since been evicted; callers that
    /// need live items filter against their regions after this returns.
    pub fn neighbors(&self, id: MemoryId, min_strength: f32) -> Vec<(MemoryId, f32)> {
        let edges = self.edges.read();
        let mut result: Vec<(MemoryId, f32)> = match edges.get(&id) {
            Some(adjacent) => adjacent
                .iter()
                .filter(|(_, s)| **s >= min_strength)
                .map(|(n, s)| (*n, *s))
                .collect(),
            None => Vec::new(),
        };
        result.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        result
    }

    /// Strength of the edge `a <-> b`, if present
    pub fn strength(&self, a: MemoryId, b: MemoryId) -> Option<f32> {
        self.edges.read().get(&a).and_then(|adj| adj.get(&b)).copied()
    }

    /// Number of undirected edges
    pub fn edge_count(&self) -> usize {
        let directed: usize = self.edges.read().values().map(|adj| adj.len()).sum();
        directed / 2
    }

    /// Drop every edge
    pub fn clear(&self) {
        self.edges.write().clear();
    }

    /// Capture the adjacency for persistence
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            edges: self.edges.read().clone(),
        }
    }

    /// Rebuild a graph from a snapshot
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        Self {
            edges: RwLock::new(snapshot.edges),
        }
    }
}
