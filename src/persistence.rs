//! Persistence gateway boundary
//!
//! The engine consumes durable storage through [`PersistenceGateway`] rather
//! than owning it: snapshots go out, snapshots come back, and item ids
//! survive the round trip so association edges stay valid. Gateway failures
//! propagate unchanged; the engine never retries.
//!
//! [`FileGateway`] is a bundled adapter writing one JSON file per region
//! plus one for the graph under a root directory. JSON is used because the
//! item payload is a self-describing `serde_json::Value`, which
//! non-self-describing binary formats cannot deserialize.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::item::{MemoryId, MemoryItem};

/// Serializable state of a region
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionSnapshot {
    /// Region name
    pub id: String,
    /// Soft item-count limit
    pub capacity: usize,
    /// Configured vector length
    pub dimension: usize,
    /// Every stored item, ids and usage statistics intact
    pub items: Vec<MemoryItem>,
}

/// Serializable state of the association graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Full adjacency, symmetric
    pub edges: HashMap<MemoryId, HashMap<MemoryId, f32>>,
}

/// Durable load/save of region and graph snapshots
pub trait PersistenceGateway: Send + Sync {
    /// Persist a region snapshot, replacing any prior state for its id
    fn save_region(&self, snapshot: &RegionSnapshot) -> Result<()>;

    /// Load the snapshot for a region id, `None` if never saved
    fn load_region(&self, region_id: &str) -> Result<Option<RegionSnapshot>>;

    /// Ids of every persisted region
    fn list_regions(&self) -> Result<Vec<String>>;

    /// Persist the association graph
    fn save_graph(&self, snapshot: &GraphSnapshot) -> Result<()>;

    /// Load the association graph, `None` if never saved
    fn load_graph(&self) -> Result<Option<GraphSnapshot>>;
}

const REGION_EXT: &str = "region";
const GRAPH_FILE: &str = "graph.json";

/// File-per-region JSON adapter
pub struct FileGateway {
    root: PathBuf,
}

impl FileGateway {
    /// Open (and create if needed) a gateway rooted at `root`
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        log::info!("FileGateway opened at: {}", root.display());
        Ok(Self { root })
    }

    fn region_path(&self, region_id: &str) -> PathBuf {
        self.root.join(format!("{}.{}", region_id, REGION_EXT))
    }
}

impl PersistenceGateway for FileGateway {
    fn save_region(&self, snapshot: &RegionSnapshot) -> Result<()> {
        let bytes = serde_json::to_vec(snapshot)?;
        fs::write(self.region_path(&snapshot.id), bytes)?;
        log::debug!(
            "saved region {} ({} items)",
            snapshot.id,
            snapshot.items.len()
        );
        Ok(())
    }

    fn load_region(&self, region_id: &str) -> Result<Option<RegionSnapshot>> {
        let path = self.region_path(region_id);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn list_regions(&self) -> Result<Vec<String>> {
        let mut regions = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(REGION_EXT) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    regions.push(stem.to_string());
                }
            }
        }
        regions.sort();
        Ok(regions)
    }

    fn save_graph(&self, snapshot: &GraphSnapshot) -> Result<()> {
        let bytes = serde_json::to_vec(snapshot)?;
        fs::write(self.root.join(GRAPH_FILE), bytes)?;
        Ok(())
    }

    fn load_graph(&self) -> Result<Option<GraphSnapshot>> {
        let path = self.root.join(GRAPH_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(id: &str, items: Vec<MemoryItem>) -> RegionSnapshot {
        RegionSnapshot {
            id: id.to_string(),
            capacity: 10,
            dimension: 2,
            items,
        }
    }

    #[test]
    fn test_region_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = FileGateway::new(dir.path()).unwrap();

        let item = MemoryItem::new(vec![1.0, -2.0], json!({"k": "v"}), HashMap::new());
        let id = item.id;
        gateway.save_region(&snapshot("default", vec![item])).unwrap();

        let loaded = gateway.load_region("default").unwrap().unwrap();
        assert_eq!(loaded.id, "default");
        assert_eq!(loaded.capacity, 10);
        assert_eq!(loaded.items.len(), 1);
        assert_eq!(loaded.items[0].id, id);
        assert_eq!(loaded.items[0].vector, vec![1.0, -2.0]);
    }

    #[test]
    fn test_missing_region_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = FileGateway::new(dir.path()).unwrap();
        assert!(gateway.load_region("nope").unwrap().is_none());
        assert!(gateway.load_graph().unwrap().is_none());
    }

    #[test]
    fn test_list_regions() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = FileGateway::new(dir.path()).unwrap();
        gateway.save_region(&snapshot("beta", vec![])).unwrap();
        gateway.save_region(&snapshot("alpha", vec![])).unwrap();
        assert_eq!(gateway.list_regions().unwrap(), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_graph_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = FileGateway::new(dir.path()).unwrap();

        let (a, b) = (MemoryId::new(), MemoryId::new());
        let mut edges: HashMap<MemoryId, HashMap<MemoryId, f32>> = HashMap::new();
        edges.entry(a).or_default().insert(b, 0.75);
        edges.entry(b).or_default().insert(a, 0.75);

        gateway.save_graph(&GraphSnapshot { edges }).unwrap();
        let loaded = gateway.load_graph().unwrap().unwrap();
        assert_eq!(loaded.edges[&a][&b], 0.75);
        assert_eq!(loaded.edges[&b][&a], 0.75);
    }
}
