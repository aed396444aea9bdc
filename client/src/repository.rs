//! The entity repository: CRUD, queries, and remote synchronization.
//!
//! Every write follows the same two-phase shape: compute the new value,
//! stage it in the cache, attempt remote persistence, then commit or
//! revert based on the outcome. A failed write leaves both the cache and
//! the remote exactly as they were before the call. The repository never
//! retries on its own.

use crate::cache::EntityCache;
use crate::config::RepositoryConfig;
use crate::error::{Error, Result};
use crate::transport::{RemoteTransport, TransportError};
use serde_json::{Map, Value};
use std::future::Future;
use std::time::{SystemTime, UNIX_EPOCH};
use tether_engine::{query, Entity, Pipeline, ProjectionExpr, QueryExpr, Timestamp};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// A strongly-typed, queryable view of one remote collection.
///
/// Owns the cache exclusively; one repository per collection, never a
/// shared cache.
pub struct Repository<T: RemoteTransport> {
    transport: T,
    config: RepositoryConfig,
    cache: RwLock<EntityCache>,
}

impl<T: RemoteTransport> Repository<T> {
    /// Create a repository over an injected transport. The mirror starts
    /// empty; call [`Repository::refresh`] to populate it.
    pub fn new(transport: T, config: RepositoryConfig) -> Self {
        Self {
            transport,
            config,
            cache: RwLock::new(EntityCache::new()),
        }
    }

    /// Replace the entire mirror from a full remote fetch.
    ///
    /// All-or-nothing: on transport failure the cache is left untouched
    /// and [`Error::Sync`] is returned. Holds the write lock for the whole
    /// call, so a refresh never interleaves with an in-flight mutation.
    pub async fn refresh(&self) -> Result<usize> {
        let mut cache = self.cache.write().await;
        let entities = self
            .bounded(self.transport.fetch_all())
            .await
            .map_err(Error::Sync)?;
        cache.replace_all(entities);
        debug!(count = cache.len(), "mirror refreshed");
        Ok(cache.len())
    }

    /// Validate, stamp, and persist a new entity.
    ///
    /// Reserved fields in the payload are stripped; `id` is a fresh UUID
    /// and `created_at == updated_at`. On persistence failure the staged
    /// entry is removed again and the error surfaced.
    pub async fn create(&self, mut fields: Map<String, Value>) -> Result<Entity> {
        Entity::strip_reserved(&mut fields);
        if self.config.validation {
            self.config.shape.validate(&fields)?;
        }

        let entity = Entity::new(Uuid::new_v4().to_string(), fields, now_millis());

        let mut cache = self.cache.write().await;
        cache.insert(entity.clone());
        if let Err(err) = self.bounded(self.transport.put(&entity.id, &entity)).await {
            cache.remove(&entity.id);
            warn!(id = %entity.id, error = %err, "create rolled back");
            return Err(err.into());
        }

        Ok(entity)
    }

    /// Merge a patch onto a mirrored entity and persist it.
    ///
    /// Reserved fields are stripped from the patch; the merged result is
    /// validated before anything is staged, so a validation failure has no
    /// effect at all. On persistence failure the cache entry reverts to
    /// its pre-merge value.
    pub async fn update(&self, id: &str, mut patch: Map<String, Value>) -> Result<Entity> {
        Entity::strip_reserved(&mut patch);

        let mut cache = self.cache.write().await;
        let previous = cache
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let mut merged = previous.clone();
        merged.apply_patch(patch.clone(), now_millis());
        if self.config.validation {
            self.config.shape.validate(&merged.fields)?;
        }

        cache.insert(merged.clone());

        // The wire patch carries only what changed, plus the stamp.
        let mut wire = patch;
        wire.insert("updated_at".into(), Value::from(merged.updated_at));
        if let Err(err) = self.bounded(self.transport.patch(id, &wire)).await {
            cache.insert(previous);
            warn!(id, error = %err, "update rolled back");
            return Err(err.into());
        }

        Ok(merged)
    }

    /// Remove an entity locally and remotely.
    ///
    /// On persistence failure the removed entity is restored.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut cache = self.cache.write().await;
        let removed = cache
            .remove(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if let Err(err) = self.bounded(self.transport.remove(id)).await {
            cache.insert(removed);
            warn!(id, error = %err, "delete rolled back");
            return Err(err.into());
        }

        Ok(())
    }

    /// Borrow the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Look up a single entity in the mirror.
    pub async fn get(&self, id: &str) -> Option<Entity> {
        self.cache.read().await.get(id).cloned()
    }

    /// Filter and project the mirror. Never touches the remote store and
    /// never mutates the cache.
    pub async fn find(
        &self,
        query_expr: Option<&QueryExpr>,
        projection: Option<&ProjectionExpr>,
    ) -> Vec<Value> {
        let docs = self.cache.read().await.snapshot();
        let filtered = match query_expr {
            Some(expr) => query::filter(&docs, expr),
            None => docs,
        };
        match projection {
            Some(expr) => filtered.iter().map(|d| expr.project(d)).collect(),
            None => filtered,
        }
    }

    /// Run an aggregation pipeline over a snapshot of the mirror.
    pub async fn aggregate(&self, pipeline: &Pipeline) -> Vec<Value> {
        pipeline.run(self.cache.read().await.snapshot())
    }

    /// Count of mirrored entities.
    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Whether the mirror is empty.
    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    /// Apply the configured timeout to a transport call. An overrun is a
    /// transport failure like any other: the caller rolls back.
    async fn bounded<F, O>(&self, call: F) -> std::result::Result<O, TransportError>
    where
        F: Future<Output = std::result::Result<O, TransportError>>,
    {
        match self.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => Err(TransportError::Timeout(limit)),
            },
            None => call.await,
        }
    }
}

fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
