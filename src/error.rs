//! Error types for engram

use thiserror::Error;

use crate::item::MemoryId;

/// Errors that can occur in the memory engine
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Vector length does not match the region's configured dimensionality
    #[error("Invalid vector: expected {expected} dimensions, got {actual}")]
    InvalidVector { expected: usize, actual: usize },

    /// Association strength outside (0, 1]
    #[error("Invalid association strength: {0} (must be in (0, 1])")]
    InvalidStrength(f32),

    /// Association references an id that resolves to no stored item
    #[error("Unknown item: {0}")]
    UnknownItem(MemoryId),

    /// Failure reported by a persistence gateway
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MemoryError {
    /// Create an invalid-vector error
    pub fn invalid_vector(expected: usize, actual: usize) -> Self {
        Self::InvalidVector { expected, actual }
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }
}

/// Result type for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;
