//! # Tether Client
//!
//! The async façade over [`tether_engine`]: an entity [`Repository`] that
//! mirrors one remote collection in an in-memory [`EntityCache`] and
//! serves reads and MongoDB-style queries entirely from that mirror.
//!
//! The remote store is reached only through the injected
//! [`RemoteTransport`] capability; the repository owns no transport logic
//! of its own. Writes are applied optimistically to the cache, persisted,
//! and rolled back if the remote write fails, so a read immediately after
//! a successful write always observes it without a round trip.
//!
//! Concurrency model: the cache sits behind a `tokio::sync::RwLock`.
//! Mutations hold the write lock across the transport call, which
//! linearizes writes per collection; `find`/`aggregate`/`get` take a
//! read-lock snapshot and never block each other.

pub mod cache;
pub mod config;
pub mod error;
pub mod repository;
pub mod transport;

pub use cache::EntityCache;
pub use config::RepositoryConfig;
pub use error::{Error, Result};
pub use repository::Repository;
pub use transport::{RemoteTransport, TransportError};

// Re-export the engine types callers need to talk to the repository.
pub use tether_engine::{
    Entity, EntityId, EntityShape, FieldDef, FieldKind, Pipeline, ProjectionExpr, QueryExpr,
    Timestamp,
};
