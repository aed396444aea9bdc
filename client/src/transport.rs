//! The remote transport capability.
//!
//! The backing store is a flat mapping from entity id to document,
//! reachable only over HTTP with key-level operations; it cannot execute
//! queries. The repository depends on this narrow interface and is
//! agnostic to its implementation — production code plugs in an HTTP
//! client, tests plug in an in-memory mock.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tether_engine::{Entity, EntityId};
use thiserror::Error;

/// A transport-level failure. The repository treats every variant
/// uniformly as "the read/write did not happen".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport request failed: {0}")]
    Failed(String),

    #[error("transport request timed out after {0:?}")]
    Timeout(Duration),
}

/// The four remote operations the repository depends on.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Fetch the entire collection as an id-to-entity mapping.
    async fn fetch_all(&self) -> Result<HashMap<EntityId, Entity>, TransportError>;

    /// Create or replace the document at `id`.
    async fn put(&self, id: &str, entity: &Entity) -> Result<(), TransportError>;

    /// Apply a partial update to the document at `id`.
    async fn patch(&self, id: &str, partial: &Map<String, Value>) -> Result<(), TransportError>;

    /// Delete the document at `id`.
    async fn remove(&self, id: &str) -> Result<(), TransportError>;
}
