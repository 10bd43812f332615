//! Memory item types and derived scoring
//!
//! Core value type for records held by a region, plus the usage-statistics
//! scores (importance, recency, age) that drive eviction ranking.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default recency decay constant: one day, in seconds.
pub const DEFAULT_DECAY_SECS: f64 = 86_400.0;

/// Unique identifier for memory items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    /// Create a new random MemoryId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for MemoryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A stored memory record
///
/// The vector and content are immutable after creation; only the usage
/// statistics (`access_count`, `last_access_at`) change, via [`access`].
///
/// [`access`]: MemoryItem::access
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Unique identifier
    pub id: MemoryId,
    /// Embedding vector, fixed length per region
    pub vector: Vec<f32>,
    /// Opaque payload
    pub content: serde_json::Value,
    /// Arbitrary key/value annotations; a numeric `importance` entry
    /// contributes to the eviction ranking
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Creation time, immutable
    pub created_at: DateTime<Utc>,
    /// Number of times this item has been accessed
    pub access_count: u64,
    /// Time of the most recent access; starts equal to `created_at`
    pub last_access_at: DateTime<Utc>,
}

impl MemoryItem {
    /// Create a new item with zeroed usage statistics
    pub fn new(
        vector: Vec<f32>,
        content: serde_json::Value,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: MemoryId::new(),
            vector,
            content,
            metadata,
            created_at: now,
            access_count: 0,
            last_access_at: now,
        }
    }

    /// Record an access: bump the counter and refresh `last_access_at`
    pub fn access(&mut self) {
        self.access_count += 1;
        self.last_access_at = Utc::now();
    }

    /// Importance: log-scaled access count plus the caller-supplied
    /// `importance` metadata hint (0 if absent or non-numeric)
    pub fn importance(&self) -> f64 {
        let hint = self
            .metadata
            .get("importance")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        ((self.access_count + 1) as f64).ln() + hint
    }

    /// Recency: exponential decay since the last access, with the default
    /// one-day decay constant
    pub fn recency(&self) -> f64 {
        self.recency_at(Utc::now(), DEFAULT_DECAY_SECS)
    }

    /// Age since creation, in days
    pub fn age_days(&self) -> f64 {
        self.age_days_at(Utc::now())
    }

    pub(crate) fn recency_at(&self, now: DateTime<Utc>, decay_secs: f64) -> f64 {
        let elapsed = (now - self.last_access_at).num_milliseconds() as f64 / 1000.0;
        (-elapsed.max(0.0) / decay_secs).exp()
    }

    pub(crate) fn age_days_at(&self, now: DateTime<Utc>) -> f64 {
        let elapsed = (now - self.created_at).num_milliseconds() as f64 / 1000.0;
        elapsed.max(0.0) / 86_400.0
    }

    /// Composite ranking used by eviction: importance + recency − 0.1 × age.
    /// The clock is passed in so one pass ranks every item at the same
    /// instant.
    pub(crate) fn eviction_score(&self, now: DateTime<Utc>, decay_secs: f64) -> f64 {
        self.importance() + self.recency_at(now, decay_secs) - 0.1 * self.age_days_at(now)
    }
}

/// Deduplication fingerprint over `(vector, content)`.
///
/// Deliberately excludes timestamps and metadata so that storing the same
/// vector/content pair twice resolves to the existing item.
pub(crate) fn fingerprint(vector: &[f32], content: &serde_json::Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    for v in vector {
        v.to_bits().hash(&mut hasher);
    }
    // serde_json orders object keys, so this rendering is canonical
    content.to_string().hash(&mut hasher);
    hasher.finish()
}
