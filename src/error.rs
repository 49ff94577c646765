//! Error types for cache operations
//!
//! Errors never cross the producer-facing boundary (`store`/`discard`);
//! they are returned by the lower layers and logged by the caches.

use std::path::PathBuf;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur inside the cache layer
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cache directory is inaccessible: {}", .0.display())]
    DirectoryInvalid(PathBuf),

    #[error("invalid envelope id: {0:?}")]
    InvalidEnvelopeId(String),

    #[error("crash marker corrupted: {0}")]
    CrashMarker(String),
}
