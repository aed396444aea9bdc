//! Aggregation pipelines.
//!
//! A pipeline is an ordered sequence of stages; the output of stage N is
//! the input of stage N+1, evaluated left to right with no implicit
//! reordering. Stages are parsed up front — a malformed stage fails with
//! [`Error::MalformedPipeline`] naming the stage index — and running a
//! parsed pipeline never fails.

use crate::error::{Error, Result};
use crate::path;
use crate::projection::ProjectionExpr;
use crate::query::{self, compare_values, QueryExpr};
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

/// Sort direction for a `$sort` stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Reducer applied to each group of a `$group` stage.
#[derive(Debug, Clone)]
pub enum Reducer {
    /// Number of documents in the group
    Count,
    /// Sum of numeric values at a path (non-numeric values are skipped)
    Sum(String),
    /// Mean of numeric values at a path; null for an empty numeric set
    Avg(String),
    /// Smallest comparable value at a path; null if none
    Min(String),
    /// Largest comparable value at a path; null if none
    Max(String),
}

/// A single pipeline stage.
#[derive(Debug, Clone)]
pub enum Stage {
    Match(QueryExpr),
    Project(ProjectionExpr),
    Sort {
        field: String,
        direction: SortDirection,
    },
    Group {
        key: String,
        reducer: Reducer,
    },
    Limit(usize),
    Skip(usize),
}

/// An ordered sequence of stages.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Build a pipeline from already-parsed stages.
    pub fn from_stages(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// Parse a pipeline from a JSON array of single-key stage objects,
    /// e.g. `[{"$match": {...}}, {"$sort": {"score": -1}}, {"$limit": 1}]`.
    pub fn parse(raw: &Value) -> Result<Self> {
        let items = raw
            .as_array()
            .ok_or_else(|| Error::MalformedPipeline {
                stage: 0,
                reason: "pipeline must be an array of stages".into(),
            })?;

        let stages = items
            .iter()
            .enumerate()
            .map(|(index, item)| parse_stage(index, item))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { stages })
    }

    /// The parsed stages, in order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Thread a sequence of documents through every stage.
    pub fn run(&self, mut docs: Vec<Value>) -> Vec<Value> {
        for stage in &self.stages {
            docs = stage.apply(docs);
        }
        docs
    }
}

fn parse_stage(index: usize, raw: &Value) -> Result<Stage> {
    let malformed = |reason: String| Error::MalformedPipeline {
        stage: index,
        reason,
    };

    let obj = raw
        .as_object()
        .ok_or_else(|| malformed("stage must be an object".into()))?;
    let (op, body) = match obj.iter().next() {
        Some(entry) if obj.len() == 1 => entry,
        _ => return Err(malformed("stage must have exactly one operator".into())),
    };

    match op.as_str() {
        "$match" => QueryExpr::parse(body)
            .map(Stage::Match)
            .map_err(|e| malformed(e.to_string())),
        "$project" => ProjectionExpr::parse(body)
            .map(Stage::Project)
            .map_err(|e| malformed(e.to_string())),
        "$sort" => {
            let (field, dir) = body
                .as_object()
                .filter(|m| m.len() == 1)
                .and_then(|m| m.iter().next())
                .ok_or_else(|| malformed("$sort expects exactly one field".into()))?;
            let direction = match dir.as_i64() {
                Some(1) => SortDirection::Ascending,
                Some(-1) => SortDirection::Descending,
                _ => return Err(malformed("sort direction must be 1 or -1".into())),
            };
            Ok(Stage::Sort {
                field: field.clone(),
                direction,
            })
        }
        "$group" => parse_group(body).map_err(|reason| malformed(reason)),
        "$limit" | "$skip" => {
            let n = body
                .as_u64()
                .ok_or_else(|| malformed(format!("{op} expects a non-negative integer")))?
                as usize;
            Ok(if op == "$limit" {
                Stage::Limit(n)
            } else {
                Stage::Skip(n)
            })
        }
        other => Err(malformed(format!("unknown stage operator: {other}"))),
    }
}

/// Parse a `$group` body: `{"key": <path>, <reducer>}` with exactly one
/// reducer of `$count`, `$sum`, `$avg`, `$min`, `$max`.
fn parse_group(body: &Value) -> std::result::Result<Stage, String> {
    let obj = body
        .as_object()
        .ok_or_else(|| "$group expects an object".to_string())?;

    let key = obj
        .get("key")
        .and_then(Value::as_str)
        .ok_or_else(|| "$group requires a string 'key'".to_string())?
        .to_string();

    let mut reducer = None;
    for (name, arg) in obj {
        if name == "key" {
            continue;
        }
        let parsed = match name.as_str() {
            "$count" => Reducer::Count,
            "$sum" | "$avg" | "$min" | "$max" => {
                let field = arg
                    .as_str()
                    .ok_or_else(|| format!("{name} expects a field path"))?
                    .to_string();
                match name.as_str() {
                    "$sum" => Reducer::Sum(field),
                    "$avg" => Reducer::Avg(field),
                    "$min" => Reducer::Min(field),
                    _ => Reducer::Max(field),
                }
            }
            other => return Err(format!("unknown reducer: {other}")),
        };
        if reducer.replace(parsed).is_some() {
            return Err("$group expects exactly one reducer".to_string());
        }
    }

    let reducer = reducer.ok_or_else(|| "$group requires a reducer".to_string())?;
    Ok(Stage::Group { key, reducer })
}

impl Stage {
    fn apply(&self, docs: Vec<Value>) -> Vec<Value> {
        match self {
            Stage::Match(expr) => query::filter(&docs, expr),
            Stage::Project(expr) => docs.iter().map(|d| expr.project(d)).collect(),
            Stage::Sort { field, direction } => sort_docs(docs, field, *direction),
            Stage::Group { key, reducer } => group_docs(docs, key, reducer),
            Stage::Limit(n) => docs.into_iter().take(*n).collect(),
            Stage::Skip(n) => docs.into_iter().skip(*n).collect(),
        }
    }
}

fn sort_docs(mut docs: Vec<Value>, field: &str, direction: SortDirection) -> Vec<Value> {
    docs.sort_by(|a, b| {
        let ordering = sort_cmp(path::resolve(a, field), path::resolve(b, field));
        match direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });
    docs
}

/// Total order over resolved sort keys.
///
/// Rank: absent < null < number < string < bool < array < object. Within
/// a rank, scalars compare naturally; arrays and objects compare equal,
/// so the stable sort preserves their relative order.
fn sort_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::Bool(_)) => 4,
            Some(Value::Array(_)) => 5,
            Some(Value::Object(_)) => 6,
        }
    }

    match rank(a).cmp(&rank(b)) {
        Ordering::Equal => match (a, b) {
            (Some(left), Some(right)) => compare_values(left, right).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
        unequal => unequal,
    }
}

fn group_docs(docs: Vec<Value>, key: &str, reducer: &Reducer) -> Vec<Value> {
    // Groups appear in first-seen order; an absent key groups under null.
    let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
    for doc in docs {
        let group_key = path::resolve(&doc, key).cloned().unwrap_or(Value::Null);
        match groups.iter_mut().find(|(k, _)| query::values_equal(k, &group_key)) {
            Some((_, members)) => members.push(doc),
            None => groups.push((group_key, vec![doc])),
        }
    }

    groups
        .into_iter()
        .map(|(group_key, members)| {
            let mut out = Map::new();
            out.insert("key".into(), group_key);
            out.insert("value".into(), reduce(&members, reducer));
            Value::Object(out)
        })
        .collect()
}

fn reduce(members: &[Value], reducer: &Reducer) -> Value {
    match reducer {
        Reducer::Count => Value::from(members.len() as u64),
        Reducer::Sum(field) => numeric_value(numeric_values(members, field).iter().sum()),
        Reducer::Avg(field) => {
            let values = numeric_values(members, field);
            if values.is_empty() {
                Value::Null
            } else {
                numeric_value(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
        Reducer::Min(field) => extremum(members, field, Ordering::Less),
        Reducer::Max(field) => extremum(members, field, Ordering::Greater),
    }
}

fn numeric_values(members: &[Value], field: &str) -> Vec<f64> {
    members
        .iter()
        .filter_map(|doc| path::resolve(doc, field))
        .filter_map(Value::as_f64)
        .collect()
}

/// Emit integral results as JSON integers so `$sum` over integers stays
/// an integer on the wire.
fn numeric_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn extremum(members: &[Value], field: &str, wanted: Ordering) -> Value {
    let mut best: Option<&Value> = None;
    for doc in members {
        let Some(candidate) = path::resolve(doc, field) else {
            continue;
        };
        best = match best {
            None => Some(candidate),
            Some(current) => {
                if compare_values(candidate, current) == Some(wanted) {
                    Some(candidate)
                } else {
                    Some(current)
                }
            }
        };
    }
    best.cloned().unwrap_or(Value::Null)
}
