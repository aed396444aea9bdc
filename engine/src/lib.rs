//! # Tether Engine
//!
//! The pure, synchronous core of Tether: a client-side data-access layer
//! that mirrors a remote, schemaless JSON document store and answers
//! MongoDB-style queries against that mirror.
//!
//! The remote store only supports key lookups, so every filter, projection,
//! and aggregation is evaluated here, over already-resident documents.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine has no knowledge of network or platform
//! - **Deterministic**: same inputs always produce same outputs
//! - **Parse, then evaluate**: expressions are parsed into tagged variants
//!   up front; unknown operators are rejected before any evaluation, and
//!   evaluation itself never fails
//!
//! ## Core Concepts
//!
//! ### Entities
//!
//! Data is stored as entities: JSON documents with three reserved fields
//! (`id`, `created_at`, `updated_at`) managed by the repository, plus
//! arbitrary caller-defined fields.
//!
//! ### Queries
//!
//! [`QueryExpr`] is a predicate tree parsed from MongoDB-style JSON:
//! comparison operators (`$eq`, `$gt`, `$in`, ...), logical combinators
//! (`$and`, `$or`, `$not`), existence checks, regex matching, and
//! `$elemMatch` for array elements.
//!
//! ### Projections
//!
//! [`ProjectionExpr`] selects fields by inclusion or exclusion (never both)
//! and can truncate an array field to its first element matching a nested
//! condition.
//!
//! ### Pipelines
//!
//! [`Pipeline`] threads documents through an ordered sequence of
//! `$match` / `$project` / `$sort` / `$group` / `$limit` / `$skip` stages.
//!
//! ### Validation
//!
//! [`EntityShape`] declares required/optional fields and their kinds;
//! [`EntityShape::validate`] reports every violation at once.
//!
//! ## Quick Start
//!
//! ```rust
//! use tether_engine::{query, QueryExpr};
//! use serde_json::json;
//!
//! let docs = vec![
//!     json!({"id": "a", "score": 5, "tags": ["x", "y"]}),
//!     json!({"id": "b", "score": 12, "tags": []}),
//! ];
//!
//! let expr = QueryExpr::parse(&json!({"score": {"$gte": 10}})).unwrap();
//! let hits = query::filter(&docs, &expr);
//!
//! assert_eq!(hits.len(), 1);
//! assert_eq!(hits[0]["id"], "b");
//! ```

pub mod entity;
pub mod error;
pub mod path;
pub mod pipeline;
pub mod projection;
pub mod query;
pub mod schema;

// Re-export main types at crate root
pub use entity::{Entity, RESERVED_FIELDS};
pub use error::{Error, Violation};
pub use pipeline::{Pipeline, Reducer, SortDirection, Stage};
pub use projection::ProjectionExpr;
pub use query::{ElemMatchBody, FieldCond, QueryExpr};
pub use schema::{EntityShape, FieldDef, FieldKind};

/// Type aliases for clarity
pub type EntityId = String;
pub type Timestamp = u64;
