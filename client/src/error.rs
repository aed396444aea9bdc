//! Error types for the Tether client.

use crate::transport::TransportError;
use tether_engine::EntityId;
use thiserror::Error;

/// All possible errors from the repository.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The operation referenced an id absent from the mirror.
    #[error("entity not found: {0}")]
    NotFound(EntityId),

    /// Validation or expression parsing failed; nothing was mutated.
    #[error(transparent)]
    Engine(#[from] tether_engine::Error),

    /// A remote write failed; the cache was rolled back to its last
    /// known-good state for the affected entity.
    #[error("write not persisted: {0}")]
    Transport(#[from] TransportError),

    /// A full refresh failed; the cache was left untouched.
    #[error("refresh failed: {0}")]
    Sync(TransportError),
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, Error>;
