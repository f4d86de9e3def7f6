// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory evaluation of a [`Filter`] against a [`Record`].
//!
//! Mirrors SQL semantics so the cache and the primary store select the same
//! rows:
//!
//! - an absent field and a `null` field are the same thing
//! - `null` (or `$eq: null`) matches only absent fields, like `IS NULL`
//! - ordering operators and `$nin` never match an absent field
//! - `null` entries inside `$in` / `$nin` lists are ignored
//!
//! Temporal fields must already be normalised to epoch millis on both sides
//! (see [`Filter::normalized`]).

use super::{Condition, Filter, FilterNode, Operator};
use crate::record::{compare_values, field, loose_eq, Record};
use serde_json::Value;
use std::cmp::Ordering;

impl Filter {
    /// True when every node holds for `record`.
    pub fn matches(&self, record: &Record) -> bool {
        self.nodes().iter().all(|node| node.matches(record))
    }

    /// Owned closure form, for iterator adapters.
    pub fn predicate(&self) -> impl Fn(&Record) -> bool + '_ {
        move |record| self.matches(record)
    }
}

impl FilterNode {
    fn matches(&self, record: &Record) -> bool {
        match self {
            FilterNode::Field { field: name, conditions } => {
                let value = field(record, name);
                conditions.iter().all(|c| c.holds(value))
            }
            FilterNode::And(parts) => parts.iter().all(|f| f.matches(record)),
            FilterNode::Or(parts) => parts.iter().any(|f| f.matches(record)),
            FilterNode::Not(inner) => !inner.matches(record),
        }
    }
}

impl Condition {
    /// `value` is `None` when the field is absent or null.
    pub(crate) fn holds(&self, value: Option<&Value>) -> bool {
        match self.op {
            Operator::Exists => {
                let want = self.value.as_bool().unwrap_or(true);
                value.is_some() == want
            }
            Operator::Eq => match (&self.value, value) {
                (Value::Null, v) => v.is_none(),
                (expected, Some(actual)) => loose_eq(actual, expected),
                (_, None) => false,
            },
            Operator::Gt => self.ordered(value, |o| o == Ordering::Greater),
            Operator::Gte => self.ordered(value, |o| o != Ordering::Less),
            Operator::Lt => self.ordered(value, |o| o == Ordering::Less),
            Operator::Lte => self.ordered(value, |o| o != Ordering::Greater),
            Operator::In => match value {
                Some(actual) => list_items(&self.value).any(|candidate| loose_eq(actual, candidate)),
                None => false,
            },
            Operator::Nin => match value {
                Some(actual) => !list_items(&self.value).any(|candidate| loose_eq(actual, candidate)),
                None => false,
            },
        }
    }

    fn ordered(&self, value: Option<&Value>, accept: impl Fn(Ordering) -> bool) -> bool {
        match value {
            Some(actual) if !self.value.is_null() => compare_values(actual, &self.value).is_some_and(accept),
            _ => false,
        }
    }
}

fn list_items(list: &Value) -> impl Iterator<Item = &Value> {
    list.as_array()
        .map(|items| items.as_slice())
        .unwrap_or_default()
        .iter()
        .filter(|v| !v.is_null())
}
