//! Engram Semantic Memory Engine
//!
//! In-process memory store for vector-keyed items with similarity search,
//! capacity-bounded regions, and a weighted association graph for multi-hop
//! recall.
//!
//! ## Features
//!
//! - **Bounded regions** - each region evicts low-value items by an
//!   importance/recency/age ranking once it approaches capacity
//! - **Pluggable similarity** - deterministic cosine or seeded statistical
//!   sampling, chosen at construction
//! - **Associative recall** - similarity-seeded breadth-first expansion over
//!   weighted item associations
//! - **Gateway persistence** - lossless region/graph snapshots through a
//!   caller-supplied storage adapter
//!
//! ## Example
//!
//! ```
//! use engram::{MemoryConfig, SemanticMemory};
//! use std::collections::HashMap;
//!
//! let memory = SemanticMemory::new(MemoryConfig {
//!     dimension: 4,
//!     region_capacity: 100,
//!     ..Default::default()
//! });
//!
//! let id = memory
//!     .store(
//!         vec![0.1, 0.9, 0.0, 0.2],
//!         serde_json::json!("nginx body size fix"),
//!         None,
//!         HashMap::new(),
//!     )
//!     .unwrap();
//!
//! let hits = memory.search(&[0.1, 0.9, 0.0, 0.2], None, 5).unwrap();
//! assert_eq!(hits[0].id, id);
//! ```

pub mod error;
pub mod graph;
pub mod item;
pub mod memory;
pub mod persistence;
pub mod region;
pub mod similarity;

// Re-exports for convenience
pub use error::{MemoryError, Result};
pub use graph::AssociationGraph;
pub use item::{MemoryId, MemoryItem};
pub use memory::{MemoryConfig, SearchHit, SemanticMemory, DEFAULT_REGION};
pub use persistence::{FileGateway, GraphSnapshot, PersistenceGateway, RegionSnapshot};
pub use region::{EvictionPolicy, Region};
pub use similarity::{CosineEstimator, SampledProjectionEstimator, SimilarityEstimator};
