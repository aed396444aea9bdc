//! The in-memory mirror of one remote collection.
//!
//! The cache is the authoritative read path: a complete mirror, not a
//! partial cache. There is no TTL and no eviction — entries leave only
//! through an explicit `remove` or a full `replace_all`. A `BTreeMap`
//! keeps iteration (and therefore snapshots) deterministically ordered
//! by entity id.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tether_engine::{Entity, EntityId};

/// Mapping from entity id to entity for exactly one collection.
///
/// Owned exclusively by one repository; nothing outside this crate can
/// reach the map mutably.
#[derive(Debug, Clone, Default)]
pub struct EntityCache {
    entries: BTreeMap<EntityId, Entity>,
}

impl EntityCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Get an entity by id.
    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entries.get(id)
    }

    /// Check whether an id is mirrored.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Insert or replace an entity.
    pub fn insert(&mut self, entity: Entity) {
        self.entries.insert(entity.id.clone(), entity);
    }

    /// Remove an entity, returning it for possible restoration.
    pub fn remove(&mut self, id: &str) -> Option<Entity> {
        self.entries.remove(id)
    }

    /// Replace the entire mirror with a freshly fetched collection.
    pub fn replace_all(&mut self, entities: HashMap<EntityId, Entity>) {
        self.entries = entities.into_iter().collect();
    }

    /// Clone the current entities as JSON documents, ordered by id.
    ///
    /// This is the read-only snapshot the query engine evaluates against;
    /// it shares nothing with the live map.
    pub fn snapshot(&self) -> Vec<Value> {
        self.entries.values().map(Entity::to_document).collect()
    }

    /// Count of mirrored entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the mirror is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
