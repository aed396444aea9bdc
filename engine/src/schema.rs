//! Declarative entity shapes and validation.
//!
//! A shape describes the required/optional fields of a collection and
//! their expected kinds. Validation checks every declared field and
//! reports all violations at once, so a caller can fix everything in a
//! single pass. The remote store is schemaless, so undeclared extra
//! fields are always allowed.

use crate::error::{Error, Result, Violation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field kinds supported in shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Int,
    Float,
    Bool,
    Timestamp,
    Object,
    Array,
    /// Arbitrary nested JSON
    Json,
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldKind::String => "String",
            FieldKind::Int => "Int",
            FieldKind::Float => "Float",
            FieldKind::Bool => "Bool",
            FieldKind::Timestamp => "Timestamp",
            FieldKind::Object => "Object",
            FieldKind::Array => "Array",
            FieldKind::Json => "Json",
        };
        write!(f, "{name}")
    }
}

/// Definition of a single field in a shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Expected kind
    pub kind: FieldKind,
    /// Whether the field must be present and non-null
    pub required: bool,
}

impl FieldDef {
    /// Create a new required field definition.
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    /// Create a new optional field definition.
    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }

    /// Check a candidate value, returning the violation if any.
    fn check(&self, value: Option<&Value>) -> Option<Violation> {
        match value {
            None | Some(Value::Null) if self.required => Some(Violation {
                path: self.name.clone(),
                expected: self.kind.to_string(),
                got: if value.is_none() { "absent" } else { "Null" }.to_string(),
            }),
            None | Some(Value::Null) => None,
            Some(v) => self.check_kind(v),
        }
    }

    fn check_kind(&self, value: &Value) -> Option<Violation> {
        let valid = match self.kind {
            FieldKind::String => value.is_string(),
            FieldKind::Int => value.is_i64() || value.is_u64(),
            FieldKind::Float => value.is_f64() || value.is_i64() || value.is_u64(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Timestamp => value.is_u64() || value.is_i64(),
            FieldKind::Object => value.is_object(),
            FieldKind::Array => value.is_array(),
            FieldKind::Json => true,
        };

        if valid {
            None
        } else {
            Some(Violation {
                path: self.name.clone(),
                expected: self.kind.to_string(),
                got: json_type_name(value).to_string(),
            })
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "Int",
        Value::Number(_) => "Float",
        Value::String(_) => "String",
        Value::Array(_) => "Array",
        Value::Object(_) => "Object",
    }
}

/// Declared shape of one collection's entities.
///
/// The reserved metadata fields (`id`, `created_at`, `updated_at`) are
/// managed by the repository and never part of a shape.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityShape {
    /// Field definitions
    pub fields: Vec<FieldDef>,
}

impl EntityShape {
    /// Create a shape from field definitions.
    pub fn new(fields: Vec<FieldDef>) -> Self {
        Self { fields }
    }

    /// A shape with no declared fields; every candidate passes.
    pub fn empty() -> Self {
        Self { fields: Vec::new() }
    }

    /// Validate a candidate's fields against this shape.
    ///
    /// Collects every violation rather than stopping at the first. The
    /// candidate passes through unchanged on success; no coercion is
    /// performed.
    pub fn validate(&self, candidate: &Map<String, Value>) -> Result<()> {
        let violations: Vec<Violation> = self
            .fields
            .iter()
            .filter_map(|field| field.check(candidate.get(&field.name)))
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(violations))
        }
    }
}
