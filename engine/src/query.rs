//! Query expression parsing and evaluation.
//!
//! Expressions arrive as MongoDB-style JSON and are parsed into tagged
//! variants before any document is touched. Unknown operators fail at
//! parse time with [`Error::UnknownOperator`]; evaluation of a parsed
//! expression is pure and never fails.

use crate::error::{Error, Result};
use crate::path;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;

/// A parsed query expression: a predicate tree over JSON documents.
#[derive(Debug, Clone)]
pub enum QueryExpr {
    /// All children must match. `And(vec![])` matches every document.
    And(Vec<QueryExpr>),
    /// At least one child must match.
    Or(Vec<QueryExpr>),
    /// Child must not match.
    Not(Box<QueryExpr>),
    /// All conditions must hold for the value at `path`.
    Field {
        path: String,
        conditions: Vec<FieldCond>,
    },
}

/// A single condition applied to a resolved field value.
#[derive(Debug, Clone)]
pub enum FieldCond {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Regex(Regex),
    Exists(bool),
    ElemMatch(ElemMatchBody),
}

/// The body of an `$elemMatch`: either operator conditions applied to each
/// array element directly (`{$elemMatch: {$eq: "y"}}`) or a nested query
/// applied to each element as a document (`{$elemMatch: {qty: {$gt: 5}}}`).
#[derive(Debug, Clone)]
pub enum ElemMatchBody {
    Conditions(Vec<FieldCond>),
    Query(Box<QueryExpr>),
}

impl QueryExpr {
    /// Parse a MongoDB-style query object.
    ///
    /// Multiple top-level keys combine as an implicit AND; `{}` matches
    /// everything. Any unrecognized `$`-operator is rejected here, before
    /// evaluation.
    pub fn parse(raw: &Value) -> Result<Self> {
        let obj = raw
            .as_object()
            .ok_or_else(|| Error::MalformedQuery("query must be an object".into()))?;

        let mut clauses = Vec::with_capacity(obj.len());
        for (key, value) in obj {
            clauses.push(Self::parse_clause(key, value)?);
        }

        Ok(if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            QueryExpr::And(clauses)
        })
    }

    fn parse_clause(key: &str, value: &Value) -> Result<QueryExpr> {
        match key {
            "$and" | "$or" => {
                let items = value.as_array().ok_or_else(|| {
                    Error::MalformedQuery(format!("{key} expects an array of queries"))
                })?;
                let children = items.iter().map(Self::parse).collect::<Result<Vec<_>>>()?;
                Ok(if key == "$and" {
                    QueryExpr::And(children)
                } else {
                    QueryExpr::Or(children)
                })
            }
            "$not" => Ok(QueryExpr::Not(Box::new(Self::parse(value)?))),
            _ if key.starts_with('$') => Err(Error::UnknownOperator(key.to_string())),
            _ => Ok(QueryExpr::Field {
                path: key.to_string(),
                conditions: parse_conditions(value)?,
            }),
        }
    }

    /// Evaluate this expression against a document.
    ///
    /// Pure: the document is never mutated and the same inputs always
    /// produce the same output.
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            QueryExpr::And(children) => children.iter().all(|c| c.matches(doc)),
            QueryExpr::Or(children) => children.iter().any(|c| c.matches(doc)),
            QueryExpr::Not(inner) => !inner.matches(doc),
            QueryExpr::Field { path, conditions } => {
                let resolved = path::resolve(doc, path);
                conditions.iter().all(|c| c.matches(resolved))
            }
        }
    }
}

/// Apply an expression to a sequence of documents, preserving relative
/// order (stable filter).
pub fn filter(docs: &[Value], expr: &QueryExpr) -> Vec<Value> {
    docs.iter().filter(|d| expr.matches(d)).cloned().collect()
}

/// Parse the value side of a field clause: an operator object or a bare
/// literal (implicit `$eq`).
fn parse_conditions(value: &Value) -> Result<Vec<FieldCond>> {
    match value {
        Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => {
            if !map.keys().all(|k| k.starts_with('$')) {
                return Err(Error::MalformedQuery(
                    "cannot mix operators and literal fields in one condition".into(),
                ));
            }
            map.iter().map(|(op, arg)| parse_operator(op, arg)).collect()
        }
        other => Ok(vec![FieldCond::Eq(other.clone())]),
    }
}

fn parse_operator(op: &str, arg: &Value) -> Result<FieldCond> {
    match op {
        "$eq" => Ok(FieldCond::Eq(arg.clone())),
        "$ne" => Ok(FieldCond::Ne(arg.clone())),
        "$gt" => Ok(FieldCond::Gt(arg.clone())),
        "$gte" => Ok(FieldCond::Gte(arg.clone())),
        "$lt" => Ok(FieldCond::Lt(arg.clone())),
        "$lte" => Ok(FieldCond::Lte(arg.clone())),
        "$in" | "$nin" => {
            let items = arg
                .as_array()
                .ok_or_else(|| Error::MalformedQuery(format!("{op} expects an array")))?
                .clone();
            Ok(if op == "$in" {
                FieldCond::In(items)
            } else {
                FieldCond::Nin(items)
            })
        }
        "$regex" => {
            let pattern = arg
                .as_str()
                .ok_or_else(|| Error::MalformedQuery("$regex expects a string pattern".into()))?;
            let regex = Regex::new(pattern)
                .map_err(|e| Error::MalformedQuery(format!("invalid regex: {e}")))?;
            Ok(FieldCond::Regex(regex))
        }
        "$exists" => {
            let flag = arg
                .as_bool()
                .ok_or_else(|| Error::MalformedQuery("$exists expects a boolean".into()))?;
            Ok(FieldCond::Exists(flag))
        }
        "$elemMatch" => Ok(FieldCond::ElemMatch(parse_elem_match(arg)?)),
        _ => Err(Error::UnknownOperator(op.to_string())),
    }
}

/// Parse an `$elemMatch` body. Shared with the projection parser.
pub(crate) fn parse_elem_match(arg: &Value) -> Result<ElemMatchBody> {
    let obj = arg
        .as_object()
        .ok_or_else(|| Error::MalformedQuery("$elemMatch expects an object".into()))?;

    if !obj.is_empty() && obj.keys().all(|k| k.starts_with('$')) {
        let conditions = obj
            .iter()
            .map(|(op, value)| parse_operator(op, value))
            .collect::<Result<Vec<_>>>()?;
        Ok(ElemMatchBody::Conditions(conditions))
    } else {
        Ok(ElemMatchBody::Query(Box::new(QueryExpr::parse(arg)?)))
    }
}

impl FieldCond {
    /// Evaluate against a resolved value, where `None` means the field is
    /// absent.
    ///
    /// Policy: only `$exists` sees absence; every comparison on an absent
    /// field is a non-match, including `$ne` and `$nin`. `$eq: null`
    /// matches only a field that is present and null.
    pub(crate) fn matches(&self, value: Option<&Value>) -> bool {
        match (self, value) {
            (FieldCond::Exists(expected), _) => value.is_some() == *expected,
            (_, None) => false,
            (FieldCond::Eq(target), Some(v)) => values_equal(v, target),
            (FieldCond::Ne(target), Some(v)) => !values_equal(v, target),
            (FieldCond::Gt(target), Some(v)) => {
                compare_values(v, target) == Some(Ordering::Greater)
            }
            (FieldCond::Gte(target), Some(v)) => matches!(
                compare_values(v, target),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            (FieldCond::Lt(target), Some(v)) => {
                compare_values(v, target) == Some(Ordering::Less)
            }
            (FieldCond::Lte(target), Some(v)) => matches!(
                compare_values(v, target),
                Some(Ordering::Less | Ordering::Equal)
            ),
            (FieldCond::In(items), Some(v)) => items.iter().any(|t| values_equal(v, t)),
            (FieldCond::Nin(items), Some(v)) => !items.iter().any(|t| values_equal(v, t)),
            (FieldCond::Regex(regex), Some(v)) => {
                v.as_str().is_some_and(|s| regex.is_match(s))
            }
            (FieldCond::ElemMatch(body), Some(v)) => match v {
                Value::Array(items) => items.iter().any(|e| body.matches_element(e)),
                _ => false,
            },
        }
    }
}

impl ElemMatchBody {
    pub(crate) fn matches_element(&self, element: &Value) -> bool {
        match self {
            ElemMatchBody::Conditions(conditions) => {
                conditions.iter().all(|c| c.matches(Some(element)))
            }
            ElemMatchBody::Query(query) => query.matches(element),
        }
    }
}

/// Equality across JSON values. Scalars compare numerically where possible
/// (`5 == 5.0`); arrays and objects compare structurally.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match compare_values(left, right) {
        Some(ordering) => ordering == Ordering::Equal,
        None => left == right,
    }
}

/// Compare two JSON values, returning an ordering if the types are
/// comparable.
///
/// - Numbers: compared as f64
/// - Strings: compared lexicographically
/// - Booleans: false < true
/// - Null == Null
/// - Mismatched or non-scalar types: returns `None` (never a match, never
///   an error)
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Number(a), Value::Number(b)) => {
            let fa = a.as_f64()?;
            let fb = b.as_f64()?;
            fa.partial_cmp(&fb)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
