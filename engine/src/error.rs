//! Error types for the Tether engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single schema violation: which field, what was expected, what arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Field path that failed validation
    pub path: String,
    /// Expected kind, e.g. "Int"
    pub expected: String,
    /// Description of the received value, e.g. "String" or "absent"
    pub got: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: expected {}, got {}", self.path, self.expected, self.got)
    }
}

fn render_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(Violation::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// All possible errors from the Tether engine.
///
/// Every variant is raised while parsing an expression or validating a
/// candidate document; evaluation of an already-parsed expression never
/// fails.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("unknown query operator: {0}")]
    UnknownOperator(String),

    #[error("malformed query: {0}")]
    MalformedQuery(String),

    #[error("malformed projection: {0}")]
    MalformedProjection(String),

    #[error("malformed pipeline stage {stage}: {reason}")]
    MalformedPipeline { stage: usize, reason: String },

    #[error("validation failed: {}", render_violations(.0))]
    Validation(Vec<Violation>),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
