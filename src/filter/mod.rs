// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Filter DSL.
//!
//! One filter AST, two executable forms:
//!
//! - [`Filter::matches`] evaluates it against an in-memory record (cache side)
//! - [`sql::SqlTranslator`] turns it into a parameterised SQL condition
//!
//! Both must select exactly the same records from the same data.
//!
//! # JSON syntax
//!
//! ```text
//! { "age": { "$gt": 18, "$lte": 65 }, "name": "alice" }
//! { "$or": [ { "role": "admin" }, { "age": { "$gte": 21 } } ] }
//! { "$not": { "deletedAt": { "$exists": true } } }
//! ```
//!
//! A plain value is implicit `$eq`. All top-level entries are ANDed.
//! Unknown operators are dropped with a warning; they never degrade into
//! equality.
//!
//! # Builder
//!
//! ```rust
//! use dbflow::filter::Filter;
//!
//! let adults = Filter::new().gt("age", 18).lte("age", 65);
//! let parsed = Filter::parse(&serde_json::json!({"age": {"$gt": 18, "$lte": 65}})).unwrap();
//! assert_eq!(adults, parsed);
//! ```

pub mod predicate;
pub mod sql;
pub mod update;

use crate::record::to_epoch_millis;
use crate::schema::{AttributeKind, Model};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// Key stripped from every filter before translation. Accepted for
/// compatibility, has no effect.
pub const TRANSFORM_KEY: &str = "$transform";

/// Comparison operators. Closed set; anything else is rejected at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Exists,
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
}

impl Operator {
    pub const ALL: [Operator; 8] = [
        Operator::Exists,
        Operator::Eq,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
        Operator::In,
        Operator::Nin,
    ];

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.symbol() == symbol)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Exists => "$exists",
            Self::Eq => "$eq",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
            Self::In => "$in",
            Self::Nin => "$nin",
        }
    }

    fn is_ordering(&self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub op: Operator,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    /// Every condition must hold for the field.
    Field {
        field: String,
        conditions: Vec<Condition>,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

/// A conjunction of nodes. The empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    nodes: Vec<FilterNode>,
}

/// Malformed filter shape. Unknown operators are not errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("filter must be an object, got {0}")]
    NotAnObject(String),
    #[error("'{key}' expects an array")]
    ExpectedArray { key: String },
    #[error("'{key}' expects an object")]
    ExpectedObject { key: String },
    #[error("field '{field}': $exists expects a boolean")]
    ExpectedBool { field: String },
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the JSON form. `null` is the empty filter.
    pub fn parse(value: &Value) -> Result<Self, FilterError> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => Self::parse_object(map),
            other => Err(FilterError::NotAnObject(kind_name(other).to_string())),
        }
    }

    fn parse_object(map: &Map<String, Value>) -> Result<Self, FilterError> {
        let mut nodes = Vec::with_capacity(map.len());

        for (key, value) in map {
            match key.as_str() {
                TRANSFORM_KEY => debug!("Ignoring $transform in filter"),
                "$and" => nodes.push(FilterNode::And(Self::parse_group(key, value)?)),
                "$or" => nodes.push(FilterNode::Or(Self::parse_group(key, value)?)),
                "$not" => match value {
                    Value::Object(inner) => nodes.push(FilterNode::Not(Box::new(Self::parse_object(inner)?))),
                    _ => return Err(FilterError::ExpectedObject { key: key.clone() }),
                },
                k if k.starts_with('$') => warn!(operator = %k, "Unknown logical operator dropped from filter"),
                field => {
                    if let Some(node) = Self::parse_field(field, value)? {
                        nodes.push(node);
                    }
                }
            }
        }

        Ok(Self { nodes })
    }

    /// `$and` / `$or` operands: an array of filters, or an object whose
    /// entries each become one operand.
    fn parse_group(key: &str, value: &Value) -> Result<Vec<Filter>, FilterError> {
        match value {
            Value::Array(items) => items.iter().map(Self::parse).collect(),
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| {
                    let mut single = Map::new();
                    single.insert(k.clone(), v.clone());
                    Self::parse_object(&single)
                })
                .collect(),
            _ => Err(FilterError::ExpectedArray { key: key.to_string() }),
        }
    }

    fn parse_field(field: &str, value: &Value) -> Result<Option<FilterNode>, FilterError> {
        let ops = match value {
            Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => map,
            literal => {
                return Ok(Some(FilterNode::Field {
                    field: field.to_string(),
                    conditions: vec![Condition {
                        op: Operator::Eq,
                        value: literal.clone(),
                    }],
                }))
            }
        };

        let mut conditions = Vec::with_capacity(ops.len());
        for (symbol, operand) in ops {
            let Some(op) = Operator::from_symbol(symbol) else {
                warn!(field = %field, operator = %symbol, "Unknown operator dropped from filter");
                continue;
            };
            match op {
                Operator::Exists if !operand.is_boolean() => {
                    return Err(FilterError::ExpectedBool { field: field.to_string() })
                }
                Operator::In | Operator::Nin if !operand.is_array() => {
                    return Err(FilterError::ExpectedArray {
                        key: format!("{field}.{symbol}"),
                    })
                }
                _ => {}
            }
            conditions.push(Condition {
                op,
                value: operand.clone(),
            });
        }

        if conditions.is_empty() {
            return Ok(None);
        }
        Ok(Some(FilterNode::Field {
            field: field.to_string(),
            conditions,
        }))
    }

    pub fn nodes(&self) -> &[FilterNode] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Copy prepared for evaluation against `model`, shared by the cache
    /// scan and the SQL translator.
    ///
    /// Condition values on date attributes become epoch milliseconds (values
    /// that do not parse as timestamps are left alone). Then every condition
    /// on a known attribute is fitted to the column type:
    ///
    /// - `$eq` or an ordering operator with a value of the wrong type matches
    ///   nothing
    /// - `$in` / `$nin` entries of the wrong type are dropped
    /// - ordering on a JSON attribute matches nothing
    ///
    /// `null` operands and `$exists` pass through unchanged.
    pub fn normalized(&self, model: &Model) -> Filter {
        let nodes = self
            .nodes
            .iter()
            .map(|node| match node {
                FilterNode::Field { field, conditions } => match model.kind_of(field) {
                    Some(kind) => FilterNode::Field {
                        field: field.clone(),
                        conditions: conditions.iter().map(|c| c.fitted(kind)).collect(),
                    },
                    None => node.clone(),
                },
                FilterNode::And(parts) => FilterNode::And(parts.iter().map(|f| f.normalized(model)).collect()),
                FilterNode::Or(parts) => FilterNode::Or(parts.iter().map(|f| f.normalized(model)).collect()),
                FilterNode::Not(inner) => FilterNode::Not(Box::new(inner.normalized(model))),
            })
            .collect();
        Filter { nodes }
    }

    fn push_condition(mut self, field: &str, op: Operator, value: Value) -> Self {
        let existing = self.nodes.iter_mut().find_map(|node| match node {
            FilterNode::Field { field: f, conditions } if f == field => Some(conditions),
            _ => None,
        });
        let condition = Condition { op, value };
        match existing {
            Some(conditions) => conditions.push(condition),
            None => self.nodes.push(FilterNode::Field {
                field: field.to_string(),
                conditions: vec![condition],
            }),
        }
        self
    }

    #[must_use]
    pub fn eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.push_condition(field, Operator::Eq, value.into())
    }

    #[must_use]
    pub fn gt(self, field: &str, value: impl Into<Value>) -> Self {
        self.push_condition(field, Operator::Gt, value.into())
    }

    #[must_use]
    pub fn gte(self, field: &str, value: impl Into<Value>) -> Self {
        self.push_condition(field, Operator::Gte, value.into())
    }

    #[must_use]
    pub fn lt(self, field: &str, value: impl Into<Value>) -> Self {
        self.push_condition(field, Operator::Lt, value.into())
    }

    #[must_use]
    pub fn lte(self, field: &str, value: impl Into<Value>) -> Self {
        self.push_condition(field, Operator::Lte, value.into())
    }

    #[must_use]
    pub fn is_in<V: Into<Value>>(self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let list = values.into_iter().map(Into::into).collect();
        self.push_condition(field, Operator::In, Value::Array(list))
    }

    #[must_use]
    pub fn not_in<V: Into<Value>>(self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let list = values.into_iter().map(Into::into).collect();
        self.push_condition(field, Operator::Nin, Value::Array(list))
    }

    #[must_use]
    pub fn exists(self, field: &str, present: bool) -> Self {
        self.push_condition(field, Operator::Exists, Value::Bool(present))
    }

    #[must_use]
    pub fn and(mut self, filters: Vec<Filter>) -> Self {
        self.nodes.push(FilterNode::And(filters));
        self
    }

    #[must_use]
    pub fn or(mut self, filters: Vec<Filter>) -> Self {
        self.nodes.push(FilterNode::Or(filters));
        self
    }

    #[must_use]
    pub fn not(mut self, filter: Filter) -> Self {
        self.nodes.push(FilterNode::Not(Box::new(filter)));
        self
    }
}

impl Condition {
    /// `$in` over an empty list: matches no row on either backend.
    fn never() -> Self {
        Condition {
            op: Operator::In,
            value: Value::Array(Vec::new()),
        }
    }

    fn fitted(&self, kind: AttributeKind) -> Condition {
        let value = match kind {
            AttributeKind::Date => normalize_temporal(self.op, &self.value),
            _ => self.value.clone(),
        };
        let fits = |v: &Value| v.is_null() || fits_kind(kind, self.op, v);
        match self.op {
            Operator::Exists => self.clone(),
            Operator::In | Operator::Nin => Condition {
                op: self.op,
                value: match value {
                    Value::Array(items) => Value::Array(items.into_iter().filter(|v| fits(v)).collect()),
                    other => other,
                },
            },
            op if fits(&value) => Condition { op, value },
            _ => Condition::never(),
        }
    }
}

fn fits_kind(kind: AttributeKind, op: Operator, value: &Value) -> bool {
    match kind {
        AttributeKind::Integer | AttributeKind::Float | AttributeKind::Date => value.is_number(),
        AttributeKind::Text => value.is_string(),
        AttributeKind::Boolean => value.is_boolean(),
        AttributeKind::Json => !op.is_ordering(),
    }
}

fn normalize_temporal(op: Operator, value: &Value) -> Value {
    let convert = |v: &Value| match v {
        Value::String(_) => to_epoch_millis(v).map(|ms| Value::Number(ms.into())).unwrap_or_else(|| v.clone()),
        other => other.clone(),
    };
    match (op, value) {
        (Operator::In | Operator::Nin, Value::Array(items)) => Value::Array(items.iter().map(convert).collect()),
        (op, v) if op.is_ordering() || op == Operator::Eq => convert(v),
        (_, v) => v.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, AttributeKind, ModelDecl, ModelRegistry};
    use serde_json::json;

    #[test]
    fn test_literal_is_implicit_eq() {
        let filter = Filter::parse(&json!({"name": "alice", "meta": {"a": 1}})).unwrap();
        assert_eq!(filter, Filter::new().eq("meta", json!({"a": 1})).eq("name", "alice"));
    }

    #[test]
    fn test_unknown_operator_is_dropped_not_equality() {
        let filter = Filter::parse(&json!({"age": {"$like": "%3", "$gt": 1}})).unwrap();
        assert_eq!(filter, Filter::new().gt("age", 1));

        let only_unknown = Filter::parse(&json!({"age": {"$regex": "x"}})).unwrap();
        assert!(only_unknown.is_empty());
    }

    #[test]
    fn test_transform_is_stripped() {
        let filter = Filter::parse(&json!({"$transform": {"x": 1}, "id": 3})).unwrap();
        assert_eq!(filter, Filter::new().eq("id", 3));
    }

    #[test]
    fn test_logical_groups() {
        let filter = Filter::parse(&json!({
            "$or": [{"role": "admin"}, {"age": {"$gte": 21}}],
            "$not": {"banned": true}
        }))
        .unwrap();
        assert_eq!(filter.nodes().len(), 2);
        assert!(filter.nodes().iter().any(|n| matches!(n, FilterNode::Or(parts) if parts.len() == 2)));
        assert!(filter.nodes().iter().any(|n| matches!(n, FilterNode::Not(_))));

        let object_form = Filter::parse(&json!({"$or": {"a": 1, "b": 2}})).unwrap();
        assert!(matches!(&object_form.nodes()[0], FilterNode::Or(parts) if parts.len() == 2));
    }

    #[test]
    fn test_malformed_shapes_are_errors() {
        assert_eq!(Filter::parse(&json!([1])), Err(FilterError::NotAnObject("array".into())));
        assert!(matches!(
            Filter::parse(&json!({"x": {"$in": 3}})),
            Err(FilterError::ExpectedArray { .. })
        ));
        assert!(matches!(
            Filter::parse(&json!({"x": {"$exists": "yes"}})),
            Err(FilterError::ExpectedBool { .. })
        ));
        assert!(Filter::parse(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_normalized_converts_dates_only() {
        let registry = ModelRegistry::register(vec![ModelDecl::new("event")
            .attribute(Attribute::new("startsAt", AttributeKind::Date))
            .attribute(Attribute::new("title", AttributeKind::Text))]);
        let model = registry.model("event").unwrap();

        let filter = Filter::new()
            .gte("startsAt", "2024-01-01T00:00:00Z")
            .is_in("startsAt", ["2024-01-01T00:00:00Z"])
            .eq("title", "2024-01-01T00:00:00Z");
        let normalized = filter.normalized(model);

        let expected = Filter::new()
            .gte("startsAt", 1_704_067_200_000i64)
            .is_in("startsAt", [1_704_067_200_000i64])
            .eq("title", "2024-01-01T00:00:00Z");
        assert_eq!(normalized, expected);
    }

    #[test]
    fn test_normalized_fits_column_types() {
        let registry = ModelRegistry::register(vec![ModelDecl::new("item")
            .attribute(Attribute::new("n", AttributeKind::Integer))
            .attribute(Attribute::new("s", AttributeKind::Text))
            .attribute(Attribute::new("on", AttributeKind::Boolean))
            .attribute(Attribute::new("doc", AttributeKind::Json))]);
        let model = registry.model("item").unwrap();
        let never = Filter::new().is_in("n", Vec::<Value>::new());

        assert_eq!(Filter::new().eq("n", "30").normalized(model), never);
        assert_eq!(Filter::new().gt("n", true).normalized(model), never);
        assert_eq!(
            Filter::new().gt("s", 5).normalized(model),
            Filter::new().is_in("s", Vec::<Value>::new())
        );
        assert_eq!(
            Filter::new().eq("on", 1).normalized(model),
            Filter::new().is_in("on", Vec::<Value>::new())
        );
        assert_eq!(
            Filter::new().lt("doc", 3).normalized(model),
            Filter::new().is_in("doc", Vec::<Value>::new())
        );

        // wrong-typed list entries are dropped, nulls stay
        assert_eq!(
            Filter::new().is_in("n", [json!("30"), json!(2), Value::Null]).normalized(model),
            Filter::new().is_in("n", [json!(2), Value::Null])
        );
        assert_eq!(
            Filter::new().not_in("s", [json!(1), json!("a")]).normalized(model),
            Filter::new().not_in("s", ["a"])
        );

        // fitting values, null operands and unknown fields pass through
        let untouched = Filter::new()
            .eq("n", 30)
            .gt("n", Value::Null)
            .eq("doc", json!({"k": 1}))
            .exists("s", false)
            .eq("other", "x");
        assert_eq!(untouched.normalized(model), untouched);
    }
}
