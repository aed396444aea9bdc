//! Integration tests for the repository against an in-memory transport
//! with failure injection.

use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tether_client::{
    Entity, EntityId, EntityShape, Error, FieldDef, FieldKind, Pipeline, ProjectionExpr,
    QueryExpr, RemoteTransport, Repository, RepositoryConfig, TransportError,
};

/// In-memory stand-in for the HTTP transport. Writes mutate `remote`;
/// the failure flags make any class of call fail without touching it.
#[derive(Default)]
struct MockTransport {
    remote: Mutex<HashMap<EntityId, Entity>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MockTransport {
    fn with_remote(entities: Vec<Entity>) -> Self {
        let transport = Self::default();
        *transport.remote.lock().unwrap() = entities
            .into_iter()
            .map(|e| (e.id.clone(), e))
            .collect();
        transport
    }

    fn fail_writes(&self, flag: bool) {
        self.fail_writes.store(flag, Ordering::SeqCst);
    }

    fn fail_reads(&self, flag: bool) {
        self.fail_reads.store(flag, Ordering::SeqCst);
    }

    fn delay_calls(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    fn remote_snapshot(&self) -> HashMap<EntityId, Entity> {
        self.remote.lock().unwrap().clone()
    }

    async fn maybe_delay(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait::async_trait]
impl RemoteTransport for MockTransport {
    async fn fetch_all(&self) -> Result<HashMap<EntityId, Entity>, TransportError> {
        self.maybe_delay().await;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(TransportError::Failed("injected read failure".into()));
        }
        Ok(self.remote_snapshot())
    }

    async fn put(&self, id: &str, entity: &Entity) -> Result<(), TransportError> {
        self.maybe_delay().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Failed("injected write failure".into()));
        }
        self.remote
            .lock()
            .unwrap()
            .insert(id.to_string(), entity.clone());
        Ok(())
    }

    async fn patch(&self, id: &str, partial: &Map<String, Value>) -> Result<(), TransportError> {
        self.maybe_delay().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Failed("injected write failure".into()));
        }
        let mut remote = self.remote.lock().unwrap();
        if let Some(entity) = remote.get_mut(id) {
            for (key, value) in partial {
                if key == "updated_at" {
                    entity.updated_at = value.as_u64().unwrap_or(entity.updated_at);
                } else {
                    entity.fields.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), TransportError> {
        self.maybe_delay().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Failed("injected write failure".into()));
        }
        self.remote.lock().unwrap().remove(id);
        Ok(())
    }
}

fn test_shape() -> EntityShape {
    EntityShape::new(vec![
        FieldDef::required("name", FieldKind::String),
        FieldDef::optional("score", FieldKind::Int),
        FieldDef::optional("tags", FieldKind::Array),
    ])
}

fn repository() -> Repository<MockTransport> {
    Repository::new(
        MockTransport::default(),
        RepositoryConfig::new(test_shape()),
    )
}

fn fields(value: Value) -> Map<String, Value> {
    value.as_object().unwrap().clone()
}

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn create_then_find_reads_own_write() {
    let repo = repository();
    let created = repo
        .create(fields(json!({"name": "Alice", "score": 5})))
        .await
        .unwrap();

    let all = repo.find(None, None).await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0]["id"], json!(created.id));
    assert_eq!(all[0]["name"], json!("Alice"));
}

#[tokio::test]
async fn create_assigns_fresh_metadata() {
    let repo = repository();
    let created = repo
        .create(fields(json!({"name": "Alice"})))
        .await
        .unwrap();

    assert!(!created.id.is_empty());
    assert_eq!(created.created_at, created.updated_at);
}

#[tokio::test]
async fn create_strips_reserved_fields() {
    let repo = repository();
    let created = repo
        .create(fields(json!({"name": "Alice", "id": "forged", "created_at": 1})))
        .await
        .unwrap();

    assert_ne!(created.id, "forged");
    assert_ne!(created.created_at, 1);
    assert!(!created.fields.contains_key("id"));
}

#[tokio::test]
async fn create_rolls_back_on_put_failure() {
    let repo = repository();
    repo.transport().fail_writes(true);

    let err = repo
        .create(fields(json!({"name": "Alice"})))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Transport(_)));
    assert!(repo.is_empty().await);
    assert!(repo.transport().remote_snapshot().is_empty());
}

#[tokio::test]
async fn create_validation_failure_has_no_effect() {
    let repo = repository();

    let err = repo.create(fields(json!({"score": 5}))).await.unwrap_err();

    let Error::Engine(tether_engine::Error::Validation(violations)) = err else {
        panic!("expected validation error");
    };
    assert_eq!(violations[0].path, "name");
    assert!(repo.is_empty().await);
    assert!(repo.transport().remote_snapshot().is_empty());
}

#[tokio::test]
async fn validation_disabled_accepts_anything() {
    let repo = Repository::new(
        MockTransport::default(),
        RepositoryConfig::new(test_shape()).without_validation(),
    );

    assert!(repo.create(fields(json!({"score": "nonsense"}))).await.is_ok());
}

// ============================================================================
// Update
// ============================================================================

#[tokio::test]
async fn update_merges_and_persists() {
    let repo = repository();
    let created = repo
        .create(fields(json!({"name": "Alice", "score": 5})))
        .await
        .unwrap();

    let updated = repo
        .update(&created.id, fields(json!({"score": 9})))
        .await
        .unwrap();

    assert_eq!(updated.fields["name"], json!("Alice"));
    assert_eq!(updated.fields["score"], json!(9));

    let remote = repo.transport().remote_snapshot();
    assert_eq!(remote[&created.id].fields["score"], json!(9));
}

#[tokio::test]
async fn update_unknown_id_is_not_found() {
    let repo = repository();
    let err = repo
        .update("ghost", fields(json!({"score": 1})))
        .await
        .unwrap_err();
    assert_eq!(err, Error::NotFound("ghost".into()));
}

#[tokio::test]
async fn empty_patch_touches_only_updated_at() {
    let repo = repository();
    let created = repo
        .create(fields(json!({"name": "Alice", "score": 5})))
        .await
        .unwrap();

    let updated = repo.update(&created.id, Map::new()).await.unwrap();

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.created_at, created.created_at);
    assert_eq!(updated.fields, created.fields);
    assert!(updated.updated_at >= created.updated_at);
}

#[tokio::test]
async fn update_strips_reserved_fields() {
    let repo = repository();
    let created = repo.create(fields(json!({"name": "Alice"}))).await.unwrap();

    let updated = repo
        .update(&created.id, fields(json!({"id": "forged", "created_at": 1})))
        .await
        .unwrap();

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.created_at, created.created_at);
}

#[tokio::test]
async fn update_rolls_back_on_patch_failure() {
    let repo = repository();
    let created = repo
        .create(fields(json!({"name": "Alice", "score": 5})))
        .await
        .unwrap();

    repo.transport().fail_writes(true);
    let err = repo
        .update(&created.id, fields(json!({"score": 9})))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Transport(_)));
    // Post-call cache value equals the pre-call value.
    assert_eq!(repo.get(&created.id).await.unwrap(), created);
}

#[tokio::test]
async fn update_validation_failure_is_atomic() {
    let repo = repository();
    let created = repo
        .create(fields(json!({"name": "Alice", "score": 5})))
        .await
        .unwrap();

    let err = repo
        .update(&created.id, fields(json!({"score": "nonsense"})))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Engine(_)));
    assert_eq!(repo.get(&created.id).await.unwrap(), created);
    assert_eq!(
        repo.transport().remote_snapshot()[&created.id].fields["score"],
        json!(5)
    );
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn delete_removes_locally_and_remotely() {
    let repo = repository();
    let created = repo.create(fields(json!({"name": "Alice"}))).await.unwrap();

    repo.delete(&created.id).await.unwrap();

    assert!(repo.get(&created.id).await.is_none());
    assert!(repo.transport().remote_snapshot().is_empty());
}

#[tokio::test]
async fn delete_restores_entity_on_failure() {
    let repo = repository();
    let created = repo.create(fields(json!({"name": "Alice"}))).await.unwrap();

    repo.transport().fail_writes(true);
    let err = repo.delete(&created.id).await.unwrap_err();

    assert!(matches!(err, Error::Transport(_)));
    assert_eq!(repo.get(&created.id).await.unwrap(), created);
}

#[tokio::test]
async fn delete_unknown_id_is_not_found() {
    let repo = repository();
    assert_eq!(
        repo.delete("ghost").await.unwrap_err(),
        Error::NotFound("ghost".into())
    );
}

// ============================================================================
// Refresh
// ============================================================================

#[tokio::test]
async fn refresh_replaces_the_mirror() {
    let seeded = vec![
        Entity::new("a", fields(json!({"name": "Alice"})), 1000),
        Entity::new("b", fields(json!({"name": "Bob"})), 1000),
    ];
    let repo = Repository::new(
        MockTransport::with_remote(seeded),
        RepositoryConfig::new(test_shape()),
    );

    assert_eq!(repo.refresh().await.unwrap(), 2);
    assert!(repo.get("a").await.is_some());
    assert!(repo.get("b").await.is_some());
}

#[tokio::test]
async fn refresh_failure_leaves_cache_untouched() {
    let repo = repository();
    let created = repo.create(fields(json!({"name": "Alice"}))).await.unwrap();
    let before = repo.find(None, None).await;

    repo.transport().fail_reads(true);
    let err = repo.refresh().await.unwrap_err();

    assert!(matches!(err, Error::Sync(_)));
    assert_eq!(repo.find(None, None).await, before);
    assert_eq!(repo.get(&created.id).await.unwrap(), created);
}

// ============================================================================
// Timeout
// ============================================================================

#[tokio::test]
async fn timed_out_write_is_rolled_back() {
    let transport = MockTransport::default();
    transport.delay_calls(Duration::from_millis(50));
    let repo = Repository::new(
        transport,
        RepositoryConfig::new(test_shape()).with_timeout(Duration::from_millis(5)),
    );

    let err = repo
        .create(fields(json!({"name": "Alice"})))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Transport(TransportError::Timeout(_))
    ));
    assert!(repo.is_empty().await);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn concurrent_updates_to_one_id_serialize() {
    let repo = Arc::new(repository());
    let created = repo
        .create(fields(json!({"name": "Alice", "score": 0})))
        .await
        .unwrap();

    // Slow the transport down so the two updates genuinely overlap.
    repo.transport().delay_calls(Duration::from_millis(20));

    let first = {
        let repo = Arc::clone(&repo);
        let id = created.id.clone();
        tokio::spawn(async move { repo.update(&id, fields(json!({"score": 1}))).await })
    };
    let second = {
        let repo = Arc::clone(&repo);
        let id = created.id.clone();
        tokio::spawn(async move { repo.update(&id, fields(json!({"tags": ["x"]}))).await })
    };
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    // Whichever update ran second started from the other's outcome, so the
    // final state carries both patches.
    let entity = repo.get(&created.id).await.unwrap();
    assert_eq!(entity.fields["score"], json!(1));
    assert_eq!(entity.fields["tags"], json!(["x"]));

    let remote = repo.transport().remote_snapshot();
    assert_eq!(remote[&created.id].fields["score"], json!(1));
    assert_eq!(remote[&created.id].fields["tags"], json!(["x"]));
}

#[tokio::test]
async fn reads_never_observe_a_half_applied_write() {
    let repo = Arc::new(repository());
    let created = repo
        .create(fields(json!({"name": "Alice", "score": 0, "tags": []})))
        .await
        .unwrap();

    repo.transport().delay_calls(Duration::from_millis(30));
    let writer = {
        let repo = Arc::clone(&repo);
        let id = created.id.clone();
        tokio::spawn(async move {
            repo.update(&id, fields(json!({"score": 1, "tags": ["x"]}))).await
        })
    };

    // Read while the write is in flight: the result is the document either
    // wholly before or wholly after the patch, never a mix of the two.
    tokio::time::sleep(Duration::from_millis(5)).await;
    let seen = repo.get(&created.id).await.unwrap();
    let observed = (seen.fields["score"].clone(), seen.fields["tags"].clone());
    let before = (json!(0), json!([]));
    let after = (json!(1), json!(["x"]));
    assert!(observed == before || observed == after, "torn read: {observed:?}");

    writer.await.unwrap().unwrap();
    let settled = repo.get(&created.id).await.unwrap();
    assert_eq!(settled.fields["score"], json!(1));
    assert_eq!(settled.fields["tags"], json!(["x"]));
}

// ============================================================================
// Queries
// ============================================================================

#[tokio::test]
async fn find_with_query_and_projection() {
    let repo = repository();
    repo.create(fields(json!({"name": "Alice", "score": 5, "tags": ["x", "y"]})))
        .await
        .unwrap();
    repo.create(fields(json!({"name": "Bob", "score": 12, "tags": ["z"]})))
        .await
        .unwrap();

    let query = QueryExpr::parse(&json!({"tags": {"$elemMatch": {"$eq": "y"}}})).unwrap();
    let projection = ProjectionExpr::parse(&json!({"score": 1})).unwrap();

    let hits = repo.find(Some(&query), Some(&projection)).await;
    assert_eq!(hits, vec![json!({"score": 5})]);
}

#[tokio::test]
async fn find_never_touches_the_remote() {
    let repo = repository();
    repo.create(fields(json!({"name": "Alice"}))).await.unwrap();

    // A dead transport does not matter for reads.
    repo.transport().fail_reads(true);
    repo.transport().fail_writes(true);
    assert_eq!(repo.find(None, None).await.len(), 1);
}

#[tokio::test]
async fn aggregate_over_the_mirror() {
    let repo = repository();
    for (name, score) in [("a", 5), ("b", 9), ("c", 2)] {
        repo.create(fields(json!({"name": name, "score": score})))
            .await
            .unwrap();
    }

    let pipeline = Pipeline::parse(&json!([
        {"$match": {"score": {"$gte": 5}}},
        {"$sort": {"score": -1}},
        {"$limit": 1},
        {"$project": {"score": 1}}
    ]))
    .unwrap();

    assert_eq!(repo.aggregate(&pipeline).await, vec![json!({"score": 9})]);
}
