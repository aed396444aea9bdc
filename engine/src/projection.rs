//! Projection expression parsing and application.
//!
//! A projection maps field paths to directives: `1`/`true` includes a
//! path, `0`/`false` excludes one, and `{"$elemMatch": <cond>}` includes
//! an array path truncated to its first matching element. Inclusion and
//! exclusion cannot be mixed, mirroring the ambiguity rule of the query
//! language this is modeled on.

use crate::error::{Error, Result};
use crate::path;
use crate::query::{self, ElemMatchBody};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Include,
    Exclude,
}

/// A parsed projection expression.
///
/// Policy: `id` is not implicitly included. An inclusion projection
/// returns exactly the requested paths, nothing more.
#[derive(Debug, Clone)]
pub struct ProjectionExpr {
    mode: Mode,
    paths: Vec<String>,
    elem_match: Vec<(String, ElemMatchBody)>,
}

impl ProjectionExpr {
    /// Parse a projection object.
    ///
    /// `{}` is the identity projection. Mixing inclusion and exclusion
    /// fails with [`Error::MalformedProjection`] before any evaluation;
    /// `$elemMatch` counts as an inclusion.
    pub fn parse(raw: &Value) -> Result<Self> {
        let obj = raw
            .as_object()
            .ok_or_else(|| Error::MalformedProjection("projection must be an object".into()))?;

        let mut includes = Vec::new();
        let mut excludes = Vec::new();
        let mut elem_match = Vec::new();

        for (key, directive) in obj {
            if key.starts_with('$') {
                return Err(Error::UnknownOperator(key.to_string()));
            }
            match directive {
                Value::Bool(true) => includes.push(key.clone()),
                Value::Bool(false) => excludes.push(key.clone()),
                Value::Number(n) if n.as_i64() == Some(1) => includes.push(key.clone()),
                Value::Number(n) if n.as_i64() == Some(0) => excludes.push(key.clone()),
                Value::Object(map) if map.len() == 1 && map.contains_key("$elemMatch") => {
                    let body = query::parse_elem_match(&map["$elemMatch"])?;
                    elem_match.push((key.clone(), body));
                }
                other => {
                    return Err(Error::MalformedProjection(format!(
                        "invalid directive for '{key}': {other}"
                    )))
                }
            }
        }

        if !excludes.is_empty() && (!includes.is_empty() || !elem_match.is_empty()) {
            return Err(Error::MalformedProjection(
                "cannot mix inclusion and exclusion".into(),
            ));
        }

        let mode = if excludes.is_empty() && (!includes.is_empty() || !elem_match.is_empty()) {
            Mode::Include
        } else {
            // Pure exclusions, or the empty (identity) projection.
            Mode::Exclude
        };

        Ok(Self {
            mode,
            paths: if mode == Mode::Include { includes } else { excludes },
            elem_match,
        })
    }

    /// Apply the projection to a document, building a new document.
    ///
    /// Absent included paths are omitted. An `$elemMatch` path whose value
    /// is not an array, or whose array has no matching element, is omitted
    /// as well.
    pub fn project(&self, doc: &Value) -> Value {
        let Some(source) = doc.as_object() else {
            return doc.clone();
        };

        match self.mode {
            Mode::Include => {
                let mut out = Map::new();
                for p in &self.paths {
                    if let Some(value) = path::resolve(doc, p) {
                        path::insert_at(&mut out, p, value.clone());
                    }
                }
                for (p, body) in &self.elem_match {
                    if let Some(Value::Array(items)) = path::resolve(doc, p) {
                        if let Some(first) = items.iter().find(|e| body.matches_element(e)) {
                            path::insert_at(&mut out, p, Value::Array(vec![first.clone()]));
                        }
                    }
                }
                Value::Object(out)
            }
            Mode::Exclude => {
                let mut out = source.clone();
                for p in &self.paths {
                    path::remove_at(&mut out, p);
                }
                Value::Object(out)
            }
        }
    }
}
