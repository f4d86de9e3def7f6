// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL Translator
//!
//! Translates a [`Filter`] into a [`SqlCondition`] tree for one model, and
//! renders that tree as a parameterised `WHERE` clause.
//!
//! # SQL Generated
//!
//! ```sql
//! ("age" IS NOT NULL AND "age" > ?)             -- $gt
//! ("tag" IS NOT NULL AND "tag" IN (?, ?))       -- $in
//! ("tag" IS NOT NULL AND "tag" NOT IN (?))      -- $nin
//! "nick" IS NULL                                -- null literal, $exists: false
//! 1=0                                           -- empty $in, comparison with null
//! ```
//!
//! Every comparison carries its own `IS NOT NULL` guard so that no
//! sub-expression ever evaluates to SQL `NULL`. That keeps `NOT (...)` two-valued
//! and lets the in-memory predicate reproduce the result exactly.
//!
//! Placeholders are `?` for SQLite and `$n` for Postgres.

use super::{Condition, Filter, FilterNode, Operator};
use crate::record::{canonical_json, to_epoch_millis};
use crate::schema::{AttributeKind, Model};
use serde_json::Value;

/// SQL parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SqlParam {
    /// Convert a JSON value for a column of `kind`. `None` for null.
    pub fn from_value(value: &Value, kind: Option<AttributeKind>) -> Option<Self> {
        match (kind, value) {
            (_, Value::Null) => None,
            (Some(AttributeKind::Date), v) => match to_epoch_millis(v) {
                Some(ms) => Some(Self::Int(ms)),
                None => Self::from_value(v, None),
            },
            (Some(AttributeKind::Json), v) => Some(Self::Text(canonical_json(v))),
            (_, Value::Bool(b)) => Some(Self::Bool(*b)),
            (_, Value::Number(n)) => Some(match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            }),
            (_, Value::String(s)) => Some(Self::Text(s.clone())),
            (_, v @ (Value::Array(_) | Value::Object(_))) => Some(Self::Text(canonical_json(v))),
        }
    }

    fn inline(&self) -> String {
        match self {
            Self::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    fn sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

/// Native condition tree for the relational store.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlCondition {
    True,
    False,
    IsNull(String),
    IsNotNull(String),
    Compare {
        column: String,
        op: CompareOp,
        value: SqlParam,
    },
    InList {
        column: String,
        values: Vec<SqlParam>,
        negated: bool,
    },
    And(Vec<SqlCondition>),
    Or(Vec<SqlCondition>),
    Not(Box<SqlCondition>),
}

impl SqlCondition {
    /// Conjunction with constant folding.
    pub fn all(parts: impl IntoIterator<Item = SqlCondition>) -> Self {
        let mut kept = Vec::new();
        for part in parts {
            match part {
                Self::True => {}
                Self::False => return Self::False,
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Self::True,
            1 => kept.remove(0),
            _ => Self::And(kept),
        }
    }

    /// Disjunction with constant folding.
    pub fn any(parts: impl IntoIterator<Item = SqlCondition>) -> Self {
        let mut kept = Vec::new();
        for part in parts {
            match part {
                Self::False => {}
                Self::True => return Self::True,
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Self::False,
            1 => kept.remove(0),
            _ => Self::Or(kept),
        }
    }

    pub fn negate(inner: SqlCondition) -> Self {
        match inner {
            Self::True => Self::False,
            Self::False => Self::True,
            Self::IsNull(c) => Self::IsNotNull(c),
            Self::IsNotNull(c) => Self::IsNull(c),
            other => Self::Not(Box::new(other)),
        }
    }

    /// Render as a parameterised clause (without the `WHERE` keyword),
    /// continuing the numbering of `writer`.
    pub fn render(&self, writer: &mut SqlWriter) -> String {
        match self {
            Self::True => "1=1".to_string(),
            Self::False => "1=0".to_string(),
            Self::IsNull(column) => format!("{} IS NULL", quote_ident(column)),
            Self::IsNotNull(column) => format!("{} IS NOT NULL", quote_ident(column)),
            Self::Compare { column, op, value } => {
                let col = quote_ident(column);
                let p = writer.push(value.clone());
                format!("({col} IS NOT NULL AND {col} {} {p})", op.sql())
            }
            Self::InList { column, values, negated } => {
                let col = quote_ident(column);
                let list: Vec<String> = values.iter().map(|v| writer.push(v.clone())).collect();
                let not = if *negated { "NOT " } else { "" };
                format!("({col} IS NOT NULL AND {col} {not}IN ({}))", list.join(", "))
            }
            Self::And(parts) => {
                let parts: Vec<String> = parts.iter().map(|p| p.render(writer)).collect();
                format!("({})", parts.join(" AND "))
            }
            Self::Or(parts) => {
                let parts: Vec<String> = parts.iter().map(|p| p.render(writer)).collect();
                format!("({})", parts.join(" OR "))
            }
            Self::Not(inner) => format!("NOT ({})", inner.render(writer)),
        }
    }

    /// Render with a fresh parameter list.
    pub fn to_sql(&self, dialect: Dialect) -> SqlQuery {
        let mut writer = SqlWriter::new(dialect);
        let clause = self.render(&mut writer);
        SqlQuery {
            clause,
            params: writer.into_params(),
        }
    }

    /// Render with inline values.
    ///
    /// Only for logging; never execute the result.
    pub fn to_inline(&self) -> String {
        let query = self.to_sql(Dialect::Sqlite);
        let mut result = query.clause;
        for param in &query.params {
            result = result.replacen('?', &param.inline(), 1);
        }
        result
    }
}

/// SQL query result with parameterized placeholders
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    /// The WHERE clause (without "WHERE" keyword)
    pub clause: String,
    /// The parameter values in order
    pub params: Vec<SqlParam>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("sqlite:") {
            Some(Self::Sqlite)
        } else if url.starts_with("postgres:") || url.starts_with("postgresql:") {
            Some(Self::Postgres)
        } else {
            None
        }
    }
}

/// Accumulates parameters and hands out dialect-specific placeholders.
#[derive(Debug)]
pub struct SqlWriter {
    dialect: Dialect,
    params: Vec<SqlParam>,
}

impl SqlWriter {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            params: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Record a parameter, returning its placeholder.
    pub fn push(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        match self.dialect {
            Dialect::Sqlite => "?".to_string(),
            Dialect::Postgres => format!("${}", self.params.len()),
        }
    }

    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }

    pub fn into_params(self) -> Vec<SqlParam> {
        self.params
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Filter → SQL condition translator.
pub struct SqlTranslator;

impl SqlTranslator {
    pub fn translate(filter: &Filter, model: &Model) -> SqlCondition {
        let normalized = filter.normalized(model);
        Self::translate_filter(&normalized, model)
    }

    fn translate_filter(filter: &Filter, model: &Model) -> SqlCondition {
        SqlCondition::all(filter.nodes().iter().map(|node| Self::translate_node(node, model)))
    }

    fn translate_node(node: &FilterNode, model: &Model) -> SqlCondition {
        match node {
            FilterNode::Field { field, conditions } => match model.attribute(field) {
                Some(attr) => SqlCondition::all(conditions.iter().map(|c| Self::translate_condition(field, attr.kind, c))),
                // Not a column: every row behaves as if the field were absent.
                None if conditions.iter().all(|c| c.holds(None)) => SqlCondition::True,
                None => SqlCondition::False,
            },
            FilterNode::And(parts) => SqlCondition::all(parts.iter().map(|f| Self::translate_filter(f, model))),
            FilterNode::Or(parts) => SqlCondition::any(parts.iter().map(|f| Self::translate_filter(f, model))),
            FilterNode::Not(inner) => SqlCondition::negate(Self::translate_filter(inner, model)),
        }
    }

    fn translate_condition(column: &str, kind: AttributeKind, condition: &Condition) -> SqlCondition {
        let compare = |op: CompareOp| match SqlParam::from_value(&condition.value, Some(kind)) {
            Some(value) => SqlCondition::Compare {
                column: column.to_string(),
                op,
                value,
            },
            None => SqlCondition::False,
        };
        let list = || -> Vec<SqlParam> {
            condition
                .value
                .as_array()
                .map(|items| items.iter().filter_map(|v| SqlParam::from_value(v, Some(kind))).collect())
                .unwrap_or_default()
        };

        match condition.op {
            Operator::Exists => {
                if condition.value.as_bool().unwrap_or(true) {
                    SqlCondition::IsNotNull(column.to_string())
                } else {
                    SqlCondition::IsNull(column.to_string())
                }
            }
            Operator::Eq if condition.value.is_null() => SqlCondition::IsNull(column.to_string()),
            Operator::Eq => compare(CompareOp::Eq),
            Operator::Gt => compare(CompareOp::Gt),
            Operator::Gte => compare(CompareOp::Gte),
            Operator::Lt => compare(CompareOp::Lt),
            Operator::Lte => compare(CompareOp::Lte),
            Operator::In => {
                let values = list();
                if values.is_empty() {
                    SqlCondition::False
                } else {
                    SqlCondition::InList {
                        column: column.to_string(),
                        values,
                        negated: false,
                    }
                }
            }
            Operator::Nin => {
                let values = list();
                if values.is_empty() {
                    SqlCondition::IsNotNull(column.to_string())
                } else {
                    SqlCondition::InList {
                        column: column.to_string(),
                        values,
                        negated: true,
                    }
                }
            }
        }
    }
}
