//! Bounded memory regions
//!
//! A region owns a set of [`MemoryItem`]s behind a single reader/writer lock,
//! deduplicates stores by content fingerprint, and evicts low-value items
//! when the item count approaches capacity. Eviction is synchronous inside
//! `store`; there is no background pass.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::{MemoryError, Result};
use crate::item::{fingerprint, MemoryId, MemoryItem, DEFAULT_DECAY_SECS};
use crate::persistence::RegionSnapshot;
use crate::similarity::SimilarityEstimator;

/// Eviction tuning knobs
///
/// The pass triggers once the item count reaches `trigger_ratio × capacity`
/// and keeps the top `floor(keep_ratio × capacity)` items by eviction score.
#[derive(Debug, Clone, Copy)]
pub struct EvictionPolicy {
    /// Fraction of capacity at which a store triggers eviction
    pub trigger_ratio: f64,
    /// Fraction of capacity retained after an eviction pass
    pub keep_ratio: f64,
    /// Recency decay constant, in seconds
    pub decay_secs: f64,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            trigger_ratio: 0.9,
            keep_ratio: 0.8,
            decay_secs: DEFAULT_DECAY_SECS,
        }
    }
}

struct RegionInner {
    items: HashMap<MemoryId, MemoryItem>,
    // fingerprint -> item id, for dedup on store
    fingerprints: HashMap<u64, MemoryId>,
}

/// A bounded, independently locked collection of memory items
pub struct Region {
    id: String,
    capacity: usize,
    dimension: usize,
    policy: EvictionPolicy,
    estimator: Arc<dyn SimilarityEstimator>,
    inner: RwLock<RegionInner>,
}

impl Region {
    /// Create an empty region
    pub fn new(
        id: impl Into<String>,
        capacity: usize,
        dimension: usize,
        policy: EvictionPolicy,
        estimator: Arc<dyn SimilarityEstimator>,
    ) -> Self {
        Self {
            id: id.into(),
            capacity: capacity.max(1),
            dimension,
            policy,
            estimator,
            inner: RwLock::new(RegionInner {
                items: HashMap::new(),
                fingerprints: HashMap::new(),
            }),
        }
    }

    /// Region name
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Soft item-count limit
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Configured vector length
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of items currently held
    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    /// Whether the region holds no items
    pub fn is_empty(&self) -> bool {
        self.inner.read().items.is_empty()
    }

    /// Store a new item, or touch and return the existing one if an item
    /// with the same `(vector, content)` fingerprint is already present.
    ///
    /// The dedup check, insert, and any eviction pass all happen under one
    /// write-lock section, so concurrent stores of the same fingerprint
    /// cannot race into duplicates.
    pub fn store(
        &self,
        vector: Vec<f32>,
        content: serde_json::Value,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<MemoryId> {
        if vector.len() != self.dimension {
            return Err(MemoryError::invalid_vector(self.dimension, vector.len()));
        }

        let fp = fingerprint(&vector, &content);
        let mut inner = self.inner.write();

        if let Some(&existing) = inner.fingerprints.get(&fp) {
            if let Some(item) = inner.items.get_mut(&existing) {
                item.access();
                log::debug!("region {}: dedup hit for item {}", self.id, existing);
                return Ok(existing);
            }
            // index entry survived an eviction of its item
            inner.fingerprints.remove(&fp);
        }

        let item = MemoryItem::new(vector, content, metadata);
        let id = item.id;
        inner.items.insert(id, item);
        inner.fingerprints.insert(fp, id);

        if inner.items.len() as f64 >= self.policy.trigger_ratio * self.capacity as f64 {
            self.evict_locked(&mut inner, Utc::now());
        }

        Ok(id)
    }

    /// Look up an item by id, recording the access on a hit
    pub fn retrieve(&self, id: MemoryId) -> Option<MemoryItem> {
        let mut inner = self.inner.write();
        let item = inner.items.get_mut(&id)?;
        item.access();
        Some(item.clone())
    }

    /// Look up an item without touching its usage statistics
    pub fn peek(&self, id: MemoryId) -> Option<MemoryItem> {
        self.inner.read().items.get(&id).cloned()
    }

    /// Whether an item with this id is present
    pub fn contains(&self, id: MemoryId) -> bool {
        self.inner.read().items.contains_key(&id)
    }

    /// Score every item against `query` and return the best `top_k` as
    /// `(id, score)`, descending.
    ///
    /// Ties are broken by more recent `last_access_at`. Exactly the returned
    /// items get their access recorded. An empty region or `top_k == 0`
    /// yields an empty list without invoking the estimator.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<(MemoryId, f32)>> {
        if query.len() != self.dimension {
            return Err(MemoryError::invalid_vector(self.dimension, query.len()));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut inner = self.inner.write();
        if inner.items.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(MemoryId, f32, DateTime<Utc>)> = inner
            .items
            .values()
            .map(|item| {
                (
                    item.id,
                    self.estimator.score(query, &item.vector),
                    item.last_access_at,
                )
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.2.cmp(&a.2))
        });
        scored.truncate(top_k);

        for (id, _, _) in &scored {
            if let Some(item) = inner.items.get_mut(id) {
                item.access();
            }
        }

        Ok(scored.into_iter().map(|(id, score, _)| (id, score)).collect())
    }

    /// Drop every item, leaving the region configured but empty
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.items.clear();
        inner.fingerprints.clear();
    }

    /// One eviction pass: rank by eviction score at the single instant
    /// `now`, keep the top `floor(keep_ratio × capacity)`, never loop.
    /// Equal scores lose in `created_at` order (older items are evicted
    /// first).
    fn evict_locked(&self, inner: &mut RegionInner, now: DateTime<Utc>) {
        let keep = (self.policy.keep_ratio * self.capacity as f64).floor() as usize;
        if inner.items.len() <= keep {
            return;
        }

        let mut ranked: Vec<(MemoryId, f64, DateTime<Utc>)> = inner
            .items
            .values()
            .map(|item| {
                (
                    item.id,
                    item.eviction_score(now, self.policy.decay_secs),
                    item.created_at,
                )
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.2.cmp(&a.2))
        });

        let evicted = ranked.split_off(keep);
        for (id, score, _) in &evicted {
            inner.items.remove(id);
            log::debug!(
                "region {}: evicted item {} (score {:.3})",
                self.id,
                id,
                score
            );
        }

        let RegionInner {
            items,
            fingerprints,
        } = inner;
        fingerprints.retain(|_, id| items.contains_key(id));

        log::info!(
            "region {}: eviction pass removed {} items, {} remain",
            self.id,
            evicted.len(),
            items.len()
        );
    }

    /// Capture the region's persistent state
    pub fn snapshot(&self) -> RegionSnapshot {
        let inner = self.inner.read();
        RegionSnapshot {
            id: self.id.clone(),
            capacity: self.capacity,
            dimension: self.dimension,
            items: inner.items.values().cloned().collect(),
        }
    }

    /// Rebuild a region from a snapshot, preserving item ids and usage
    /// statistics; fingerprints are recomputed
    pub fn from_snapshot(
        snapshot: RegionSnapshot,
        policy: EvictionPolicy,
        estimator: Arc<dyn SimilarityEstimator>,
    ) -> Self {
        let region = Self::new(
            snapshot.id,
            snapshot.capacity,
            snapshot.dimension,
            policy,
            estimator,
        );
        {
            let mut inner = region.inner.write();
            for item in snapshot.items {
                let fp = fingerprint(&item.vector, &item.content);
                inner.fingerprints.insert(fp, item.id);
                inner.items.insert(item.id, item);
            }
        }
        region
    }
}
