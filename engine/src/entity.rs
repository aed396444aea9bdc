//! Entity model shared by the engine and the client.

use crate::{EntityId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field names managed by the repository. Callers can never set these
/// through a create payload or a patch; they are silently stripped.
pub const RESERVED_FIELDS: [&str; 3] = ["id", "created_at", "updated_at"];

/// A document in the mirrored collection.
///
/// The reserved metadata fields are first-class struct members; everything
/// else lives in `fields` and is flattened on the wire, so the serialized
/// form is one flat JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier, immutable once assigned
    pub id: EntityId,
    /// When the entity was created (milliseconds since epoch), set once
    pub created_at: Timestamp,
    /// When the entity was last mutated, stamped by the repository
    pub updated_at: Timestamp,
    /// All caller-defined fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Entity {
    /// Create a new entity. `created_at` and `updated_at` start equal.
    ///
    /// Reserved keys in `fields` are stripped rather than shadowing the
    /// metadata members.
    pub fn new(id: impl Into<EntityId>, mut fields: Map<String, Value>, timestamp: Timestamp) -> Self {
        Self::strip_reserved(&mut fields);
        Self {
            id: id.into(),
            created_at: timestamp,
            updated_at: timestamp,
            fields,
        }
    }

    /// Remove reserved keys from a caller-supplied payload or patch.
    pub fn strip_reserved(fields: &mut Map<String, Value>) {
        for key in RESERVED_FIELDS {
            fields.remove(key);
        }
    }

    /// Shallow-merge a patch over this entity's fields and stamp
    /// `updated_at`.
    ///
    /// Top-level keys replace existing values; a `null` value sets the
    /// field to null, it does not remove it. The patch is sanitized first,
    /// so reserved keys can never leak through.
    pub fn apply_patch(&mut self, mut patch: Map<String, Value>, timestamp: Timestamp) {
        Self::strip_reserved(&mut patch);
        for (key, value) in patch {
            self.fields.insert(key, value);
        }
        self.updated_at = timestamp;
    }

    /// The full JSON document, reserved fields included. This is the form
    /// queries and projections evaluate against.
    pub fn to_document(&self) -> Value {
        let mut doc = self.fields.clone();
        doc.insert("id".into(), Value::String(self.id.clone()));
        doc.insert("created_at".into(), Value::from(self.created_at));
        doc.insert("updated_at".into(), Value::from(self.updated_at));
        Value::Object(doc)
    }
}
