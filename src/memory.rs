//! Semantic memory orchestration
//!
//! [`SemanticMemory`] owns a named set of regions plus one association
//! graph, and exposes cross-region store/retrieve/search along with
//! similarity-seeded, graph-expanded associative recall.
//!
//! Lock ordering: region locks are taken and released for existence checks
//! before the graph lock is acquired, never while holding it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{MemoryError, Result};
use crate::graph::AssociationGraph;
use crate::item::{MemoryId, MemoryItem};
use crate::persistence::PersistenceGateway;
use crate::region::{EvictionPolicy, Region};
use crate::similarity::{CosineEstimator, SimilarityEstimator};

/// Name of the region that always exists
pub const DEFAULT_REGION: &str = "default";

// Fixed seed width for associative recall, independent of the caller's top_k
const SEED_WIDTH: usize = 3;

// Minimum edge strength followed during recall expansion
const RECALL_MIN_STRENGTH: f32 = 0.5;

/// Construction-time configuration
///
/// `region_capacity` and `dimension` seed the `default` region and any
/// region created implicitly by `store`.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Vector length every region enforces
    pub dimension: usize,
    /// Soft item-count limit per region
    pub region_capacity: usize,
    /// Eviction thresholds and recency decay
    pub eviction: EvictionPolicy,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            dimension: 256,
            region_capacity: 1000,
            eviction: EvictionPolicy::default(),
        }
    }
}

/// One search or recall result
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Matched item id
    pub id: MemoryId,
    /// Region holding the item
    pub region: String,
    /// Estimator score against the query vector
    pub score: f32,
    /// The item's payload
    pub content: serde_json::Value,
}

/// Multi-region semantic memory with an association graph
pub struct SemanticMemory {
    config: MemoryConfig,
    estimator: Arc<dyn SimilarityEstimator>,
    regions: DashMap<String, Arc<Region>>,
    graph: AssociationGraph,
}

impl std::fmt::Debug for SemanticMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticMemory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SemanticMemory {
    /// Create a memory with the deterministic cosine estimator
    pub fn new(config: MemoryConfig) -> Self {
        Self::with_estimator(config, Arc::new(CosineEstimator))
    }

    /// Create a memory with a caller-chosen estimator
    pub fn with_estimator(config: MemoryConfig, estimator: Arc<dyn SimilarityEstimator>) -> Self {
        let memory = Self {
            config,
            estimator,
            regions: DashMap::new(),
            graph: AssociationGraph::new(),
        };
        memory.region(DEFAULT_REGION);
        memory
    }

    /// Resolve a region by name, creating it with the default configuration
    /// if unseen
    pub fn region(&self, name: &str) -> Arc<Region> {
        self.regions
            .entry(name.to_string())
            .or_insert_with(|| {
                log::debug!("creating region {}", name);
                Arc::new(Region::new(
                    name,
                    self.config.region_capacity,
                    self.config.dimension,
                    self.config.eviction,
                    self.estimator.clone(),
                ))
            })
            .clone()
    }

    /// Create a region with a custom capacity. Returns the existing region
    /// unchanged if the name is already taken.
    pub fn add_region(&self, name: &str, capacity: usize) -> Arc<Region> {
        self.regions
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(Region::new(
                    name,
                    capacity,
                    self.config.dimension,
                    self.config.eviction,
                    self.estimator.clone(),
                ))
            })
            .clone()
    }

    /// Remove a region and all its items. The `default` region is cleared
    /// instead of removed and the call returns `false`.
    pub fn remove_region(&self, name: &str) -> bool {
        if name == DEFAULT_REGION {
            self.region(DEFAULT_REGION).clear();
            return false;
        }
        self.regions.remove(name).is_some()
    }

    /// Drop every item and every association, keeping region configuration
    pub fn clear(&self) {
        for entry in self.regions.iter() {
            entry.value().clear();
        }
        self.graph.clear();
    }

    /// Store into the named region (`default` if omitted), creating the
    /// region if needed. Delegates dedup and eviction to the region.
    pub fn store(
        &self,
        vector: Vec<f32>,
        content: serde_json::Value,
        region_name: Option<&str>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<MemoryId> {
        self.region(region_name.unwrap_or(DEFAULT_REGION))
            .store(vector, content, metadata)
    }

    /// Retrieve an item's content by id, recording the access.
    ///
    /// With a region name the lookup is scoped to that region; otherwise
    /// regions are scanned in lexicographic name order and the first match
    /// wins.
    pub fn retrieve(&self, id: MemoryId, region_name: Option<&str>) -> Option<serde_json::Value> {
        match region_name {
            Some(name) => self
                .regions
                .get(name)
                .and_then(|r| r.retrieve(id))
                .map(|item| item.content),
            None => {
                for name in self.region_names() {
                    if let Some(region) = self.regions.get(&name) {
                        if let Some(item) = region.retrieve(id) {
                            return Some(item.content);
                        }
                    }
                }
                None
            }
        }
    }

    /// Similarity search, scoped to one region or fanned out over all of
    /// them. Per-region results are merged and re-sorted globally by score;
    /// no cross-region normalization is applied.
    pub fn search(
        &self,
        query: &[f32],
        region_name: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        let mut hits = Vec::new();
        match region_name {
            Some(name) => {
                if let Some(region) = self.regions.get(name) {
                    self.collect_hits(&region, query, top_k, &mut hits)?;
                }
            }
            None => {
                for name in self.region_names() {
                    if let Some(region) = self.regions.get(&name) {
                        self.collect_hits(&region, query, top_k, &mut hits)?;
                    }
                }
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    fn collect_hits(
        &self,
        region: &Arc<Region>,
        query: &[f32],
        top_k: usize,
        hits: &mut Vec<SearchHit>,
    ) -> Result<()> {
        for (id, score) in region.search(query, top_k)? {
            if let Some(item) = region.peek(id) {
                hits.push(SearchHit {
                    id,
                    region: region.id().to_string(),
                    score,
                    content: item.content,
                });
            }
        }
        Ok(())
    }

    /// Create (or overwrite) a symmetric association between two stored
    /// items. Fails with `UnknownItem` if either id resolves to no item and
    /// `InvalidStrength` if `strength` is outside `(0, 1]`; neither failure
    /// mutates the graph.
    pub fn create_association(&self, a: MemoryId, b: MemoryId, strength: f32) -> Result<()> {
        if !(strength > 0.0 && strength <= 1.0) {
            return Err(MemoryError::InvalidStrength(strength));
        }
        if !self.contains_item(a) {
            return Err(MemoryError::UnknownItem(a));
        }
        if !self.contains_item(b) {
            return Err(MemoryError::UnknownItem(b));
        }
        // region locks are released by now; only the graph lock is taken here
        self.graph.insert(a, b, strength)
    }

    /// Neighbors of `id` with strength at least `min_strength`, strongest
    /// first. Edges whose far end no longer resolves to a stored item are
    /// skipped, not deleted.
    pub fn get_associated(&self, id: MemoryId, min_strength: f32) -> Vec<(MemoryId, f32)> {
        self.graph
            .neighbors(id, min_strength)
            .into_iter()
            .filter(|(neighbor, _)| self.contains_item(*neighbor))
            .collect()
    }

    /// Whether any region holds an item with this id
    pub fn contains_item(&self, id: MemoryId) -> bool {
        self.regions.iter().any(|entry| entry.value().contains(id))
    }

    /// Similarity-seeded, graph-expanded retrieval.
    ///
    /// Seeds with the top 3 search hits, expands breadth-first over
    /// associations of strength ≥ 0.5 for `depth` rounds, then ranks every
    /// discovered (non-seed) item by similarity to the query. With
    /// `depth == 0` the seed hits themselves are returned, truncated to
    /// `top_k`.
    pub fn associative_recall(
        &self,
        query: &[f32],
        depth: usize,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        let seeds = self.search(query, None, SEED_WIDTH)?;
        if seeds.is_empty() {
            return Ok(Vec::new());
        }
        if depth == 0 {
            let mut hits = seeds;
            hits.truncate(top_k);
            return Ok(hits);
        }

        let seed_ids: HashSet<MemoryId> = seeds.iter().map(|h| h.id).collect();
        let mut visited: HashSet<MemoryId> = HashSet::new();
        let mut frontier: Vec<MemoryId> = seeds.iter().map(|h| h.id).collect();

        for _ in 0..depth {
            let mut next: Vec<MemoryId> = Vec::new();
            for id in &frontier {
                for (neighbor, _) in self.get_associated(*id, RECALL_MIN_STRENGTH) {
                    if !visited.contains(&neighbor)
                        && !frontier.contains(&neighbor)
                        && !next.contains(&neighbor)
                    {
                        next.push(neighbor);
                    }
                }
            }
            visited.extend(frontier.iter().copied());
            frontier = next;
            if frontier.is_empty() {
                break;
            }
        }
        // the last frontier was discovered but not yet expanded; it still
        // counts as recalled
        visited.extend(frontier);

        let mut hits = Vec::new();
        for id in visited {
            if seed_ids.contains(&id) {
                continue;
            }
            if let Some((region, item)) = self.find_item(id) {
                hits.push(SearchHit {
                    id,
                    region,
                    score: self.estimator.score(query, &item.vector),
                    content: item.content,
                });
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    /// Region names in the stable (lexicographic) enumeration order
    pub fn region_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.regions.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Total items across all regions
    pub fn item_count(&self) -> usize {
        self.regions.iter().map(|e| e.value().len()).sum()
    }

    /// Usage report: per-region counts plus association totals
    pub fn stats(&self) -> serde_json::Value {
        let mut regions = serde_json::Map::new();
        for name in self.region_names() {
            if let Some(region) = self.regions.get(&name) {
                regions.insert(
                    name.clone(),
                    serde_json::json!({
                        "items": region.len(),
                        "capacity": region.capacity(),
                    }),
                );
            }
        }
        serde_json::json!({
            "totalItems": self.item_count(),
            "regions": regions,
            "associations": self.graph.edge_count(),
        })
    }

    /// Persist every region and the graph through the gateway
    pub fn save_to(&self, gateway: &dyn PersistenceGateway) -> Result<()> {
        for name in self.region_names() {
            if let Some(region) = self.regions.get(&name) {
                gateway.save_region(&region.snapshot())?;
            }
        }
        gateway.save_graph(&self.graph.snapshot())?;
        log::info!("saved {} regions", self.regions.len());
        Ok(())
    }

    /// Rebuild a memory from the gateway's persisted state. Item ids are
    /// preserved, so loaded association edges stay valid.
    pub fn load_from(
        gateway: &dyn PersistenceGateway,
        config: MemoryConfig,
        estimator: Arc<dyn SimilarityEstimator>,
    ) -> Result<Self> {
        let memory = Self::with_estimator(config, estimator);
        for name in gateway.list_regions()? {
            if let Some(snapshot) = gateway.load_region(&name)? {
                let region = Region::from_snapshot(
                    snapshot,
                    memory.config.eviction,
                    memory.estimator.clone(),
                );
                memory.regions.insert(name, Arc::new(region));
            }
        }
        if let Some(snapshot) = gateway.load_graph()? {
            for (id, adjacent) in snapshot.edges {
                for (neighbor, strength) in adjacent {
                    // snapshots are symmetric; insert re-links both sides
                    memory.graph.insert(id, neighbor, strength)?;
                }
            }
        }
        log::info!("loaded {} regions", memory.regions.len());
        Ok(memory)
    }

    fn find_item(&self, id: MemoryId) -> Option<(String, MemoryItem)> {
        for name in self.region_names() {
            if let Some(region) = self.regions.get(&name) {
                if let Some(item) = region.peek(id) {
                    return Some((name, item));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{FileGateway, GraphSnapshot, RegionSnapshot};
    use serde_json::json;

    fn memory(dimension: usize, capacity: usize) -> SemanticMemory {
        SemanticMemory::new(MemoryConfig {
            dimension,
            region_capacity: capacity,
            ..Default::default()
        })
    }

    fn put(mem: &SemanticMemory, v: Vec<f32>, tag: &str, region: Option<&str>) -> MemoryId {
        mem.store(v, json!(tag), region, HashMap::new()).unwrap()
    }

    #[test]
    fn test_default_region_exists() {
        let mem = memory(2, 10);
        assert_eq!(mem.region_names(), vec!["default"]);
    }

    #[test]
    fn test_store_and_retrieve_across_regions() {
        let mem = memory(2, 10);
        let a = put(&mem, vec![1.0, 0.0], "a", None);
        let b = put(&mem, vec![0.0, 1.0], "b", Some("episodic"));

        // implicit region creation
        assert_eq!(mem.region_names(), vec!["default", "episodic"]);

        // unscoped retrieve scans regions
        assert_eq!(mem.retrieve(a, None), Some(json!("a")));
        assert_eq!(mem.retrieve(b, None), Some(json!("b")));

        // scoped retrieve misses the wrong region
        assert_eq!(mem.retrieve(b, Some("default")), None);
        assert_eq!(mem.retrieve(b, Some("episodic")), Some(json!("b")));
    }

    #[test]
    fn test_search_merges_regions_by_score() {
        let mem = memory(2, 10);
        put(&mem, vec![0.0, 1.0], "far", None);
        let near = put(&mem, vec![1.0, 0.0], "near", Some("other"));

        let hits = mem.search(&[1.0, 0.0], None, 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, near);
        assert_eq!(hits[0].region, "other");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn test_search_unknown_region_is_empty() {
        let mem = memory(2, 10);
        put(&mem, vec![1.0, 0.0], "a", None);
        assert!(mem.search(&[1.0, 0.0], Some("nope"), 5).unwrap().is_empty());
        // search never creates regions
        assert_eq!(mem.region_names(), vec!["default"]);
    }

    #[test]
    fn test_association_requires_known_items() {
        let mem = memory(2, 10);
        let a = put(&mem, vec![1.0, 0.0], "a", None);
        let ghost = MemoryId::new();

        assert!(matches!(
            mem.create_association(a, ghost, 0.5),
            Err(MemoryError::UnknownItem(_))
        ));
        assert!(matches!(
            mem.create_association(a, ghost, 2.0),
            Err(MemoryError::InvalidStrength(_))
        ));
        assert!(mem.get_associated(a, 0.0).is_empty());
    }

    #[test]
    fn test_association_symmetry() {
        let mem = memory(2, 10);
        let a = put(&mem, vec![1.0, 0.0], "a", None);
        let b = put(&mem, vec![0.0, 1.0], "b", Some("other"));

        mem.create_association(a, b, 0.8).unwrap();

        let from_a = mem.get_associated(a, 0.8);
        let from_b = mem.get_associated(b, 0.8);
        assert_eq!(from_a, vec![(b, 0.8)]);
        assert_eq!(from_b, vec![(a, 0.8)]);
    }

    #[test]
    fn test_get_associated_filters_dangling_edges() {
        let mem = memory(2, 10);
        let a = put(&mem, vec![1.0, 0.0], "a", None);
        let gone = put(&mem, vec![0.0, 1.0], "gone", Some("scratch"));
        mem.create_association(a, gone, 0.9).unwrap();

        assert!(mem.remove_region("scratch"));
        // the stale edge is skipped, not an error
        assert!(mem.get_associated(a, 0.0).is_empty());
    }

    #[test]
    fn test_remove_region_keeps_default() {
        let mem = memory(2, 10);
        put(&mem, vec![1.0, 0.0], "a", None);
        assert!(!mem.remove_region("default"));
        assert_eq!(mem.region_names(), vec!["default"]);
        assert_eq!(mem.item_count(), 0);
    }

    #[test]
    fn test_recall_empty_memory() {
        let mem = memory(2, 10);
        assert!(mem.associative_recall(&[1.0, 0.0], 3, 5).unwrap().is_empty());
    }

    #[test]
    fn test_recall_depth_zero_matches_seed_search() {
        let mem = memory(2, 10);
        put(&mem, vec![1.0, 0.0], "a", None);
        put(&mem, vec![0.9, 0.1], "b", None);
        put(&mem, vec![0.0, 1.0], "c", None);
        put(&mem, vec![-1.0, 0.0], "d", None);

        let recalled = mem.associative_recall(&[1.0, 0.0], 0, 3).unwrap();
        let searched = mem.search(&[1.0, 0.0], None, 3).unwrap();

        let recalled_ids: Vec<MemoryId> = recalled.iter().map(|h| h.id).collect();
        let searched_ids: Vec<MemoryId> = searched.iter().map(|h| h.id).collect();
        assert_eq!(recalled_ids, searched_ids);
    }

    #[test]
    fn test_recall_follows_associations_two_hops() {
        let mem = memory(4, 20);
        let x = put(&mem, vec![1.0, 0.0, 0.0, 0.0], "x", None);
        put(&mem, vec![0.95, 0.05, 0.0, 0.0], "a", None);
        put(&mem, vec![0.9, 0.1, 0.0, 0.0], "b", None);
        let y = put(&mem, vec![0.0, 1.0, 0.0, 0.0], "y", None);
        let z = put(&mem, vec![0.0, 0.0, 1.0, 0.0], "z", None);
        let stray = put(&mem, vec![0.0, 0.0, 0.0, 1.0], "stray", None);

        mem.create_association(x, y, 0.9).unwrap();
        mem.create_association(y, z, 0.6).unwrap();

        let hits = mem.associative_recall(&[1.0, 0.0, 0.0, 0.0], 2, 10).unwrap();
        let ids: HashSet<MemoryId> = hits.iter().map(|h| h.id).collect();

        // y is one hop from the seed set, z two hops; stray has no path
        assert!(ids.contains(&y));
        assert!(ids.contains(&z));
        assert!(!ids.contains(&stray));
        assert!(!ids.contains(&x));
    }

    #[test]
    fn test_recall_ignores_weak_edges() {
        let mem = memory(4, 20);
        let x = put(&mem, vec![1.0, 0.0, 0.0, 0.0], "x", None);
        put(&mem, vec![0.95, 0.05, 0.0, 0.0], "a", None);
        put(&mem, vec![0.9, 0.1, 0.0, 0.0], "b", None);
        let weakly = put(&mem, vec![0.0, 1.0, 0.0, 0.0], "weak", None);

        mem.create_association(x, weakly, 0.3).unwrap();

        let hits = mem.associative_recall(&[1.0, 0.0, 0.0, 0.0], 2, 10).unwrap();
        assert!(hits.iter().all(|h| h.id != weakly));
    }

    #[test]
    fn test_stats_shape() {
        let mem = memory(2, 10);
        let a = put(&mem, vec![1.0, 0.0], "a", None);
        let b = put(&mem, vec![0.0, 1.0], "b", Some("other"));
        mem.create_association(a, b, 0.5).unwrap();

        let stats = mem.stats();
        assert_eq!(stats["totalItems"], 2);
        assert_eq!(stats["associations"], 1);
        assert_eq!(stats["regions"]["default"]["items"], 1);
        assert_eq!(stats["regions"]["other"]["capacity"], 10);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = FileGateway::new(dir.path()).unwrap();

        let mem = memory(2, 10);
        let a = put(&mem, vec![1.0, 0.0], "a", None);
        let b = put(&mem, vec![0.0, 1.0], "b", Some("episodic"));
        mem.create_association(a, b, 0.7).unwrap();
        mem.save_to(&gateway).unwrap();

        let loaded = SemanticMemory::load_from(
            &gateway,
            MemoryConfig {
                dimension: 2,
                region_capacity: 10,
                ..Default::default()
            },
            Arc::new(CosineEstimator),
        )
        .unwrap();

        assert_eq!(loaded.retrieve(a, None), Some(json!("a")));
        assert_eq!(loaded.retrieve(b, Some("episodic")), Some(json!("b")));
        assert_eq!(loaded.get_associated(a, 0.5), vec![(b, 0.7)]);
        assert_eq!(loaded.region(DEFAULT_REGION).capacity(), 10);
    }

    struct FailingGateway;

    impl PersistenceGateway for FailingGateway {
        fn save_region(&self, _snapshot: &RegionSnapshot) -> Result<()> {
            Err(MemoryError::persistence("backing store unavailable"))
        }
        fn load_region(&self, _region_id: &str) -> Result<Option<RegionSnapshot>> {
            Err(MemoryError::persistence("backing store unavailable"))
        }
        fn list_regions(&self) -> Result<Vec<String>> {
            Err(MemoryError::persistence("backing store unavailable"))
        }
        fn save_graph(&self, _snapshot: &GraphSnapshot) -> Result<()> {
            Err(MemoryError::persistence("backing store unavailable"))
        }
        fn load_graph(&self) -> Result<Option<GraphSnapshot>> {
            Err(MemoryError::persistence("backing store unavailable"))
        }
    }

    #[test]
    fn test_gateway_failure_propagates_unchanged() {
        let mem = memory(2, 10);
        put(&mem, vec![1.0, 0.0], "a", None);

        let err = mem.save_to(&FailingGateway).unwrap_err();
        assert!(matches!(
            err,
            MemoryError::Persistence(ref msg) if msg == "backing store unavailable"
        ));

        let err = SemanticMemory::load_from(
            &FailingGateway,
            MemoryConfig::default(),
            Arc::new(CosineEstimator),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            MemoryError::Persistence(ref msg) if msg == "backing store unavailable"
        ));
    }

    #[test]
    fn test_concurrent_store_and_search() {
        let mem = Arc::new(memory(2, 100));
        let mut handles = Vec::new();
        for t in 0..4 {
            let mem = mem.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..25 {
                    let v = vec![t as f32, i as f32];
                    mem.store(v.clone(), json!([t, i]), None, HashMap::new()).unwrap();
                    mem.search(&v, None, 3).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(mem.item_count() <= 100);
        assert!(mem.item_count() > 0);
    }
}
