// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Include resolver.
//!
//! Requests for related rows are expressed as a tree of [`Include`]s, built
//! either with the fluent constructor or parsed from a flat token list:
//!
//! ```rust
//! use dbflow::include::{parse_tokens, Include};
//! use dbflow::filter::Filter;
//! use serde_json::json;
//!
//! let typed = Include::new("post")
//!     .attributes(["title"])
//!     .filter(Filter::new().eq("published", true))
//!     .include(Include::new("comment"));
//!
//! let parsed = parse_tokens(&[
//!     json!("post"),
//!     json!(["*", "title"]),
//!     json!({"published": true}),
//!     json!(["comment"]),
//! ]);
//! assert_eq!(parsed, vec![typed]);
//! ```
//!
//! [`resolve`] binds the tree to the registry's relation graph and shapes
//! each node's filter for one backend ([`CacheShape`] or [`PrimaryShape`]).
//! The parse and the binding are shared; only the leaf shaping differs.

use crate::filter::sql::{SqlCondition, SqlTranslator};
use crate::filter::Filter;
use crate::record::{field, loose_eq, project, Record};
use crate::schema::{Model, ModelRegistry};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Marker opening an attribute projection inside an array token.
pub const PROJECTION_MARKER: &str = "*";

/// A request to attach related rows under `relation`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Include {
    pub relation: String,
    /// `None` keeps every attribute.
    pub attributes: Option<Vec<String>>,
    pub filter: Option<Filter>,
    pub children: Vec<Include>,
}

impl Include {
    pub fn new(relation: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn attributes<S: Into<String>>(mut self, attributes: impl IntoIterator<Item = S>) -> Self {
        self.attributes = Some(attributes.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn include(mut self, child: Include) -> Self {
        self.children.push(child);
        self
    }
}

/// Parse a flat token list, left to right.
///
/// - a string opens a new node for that relation
/// - an array starting with `"*"` is the current node's projection; any
///   other array is a nested token list for the current node's children
/// - an object is the current node's filter
///
/// Anything else, or a modifier with no open node, is reported and skipped.
pub fn parse_tokens(tokens: &[Value]) -> Vec<Include> {
    let mut includes: Vec<Include> = Vec::new();

    for (position, token) in tokens.iter().enumerate() {
        match token {
            Value::String(relation) => includes.push(Include::new(relation.clone())),
            Value::Array(items) => {
                let Some(current) = includes.last_mut() else {
                    warn!(position, "Include array with no preceding relation ignored");
                    continue;
                };
                match items.split_first() {
                    Some((Value::String(marker), rest)) if marker == PROJECTION_MARKER => {
                        let mut attributes = Vec::with_capacity(rest.len());
                        for item in rest {
                            match item.as_str() {
                                Some(name) => attributes.push(name.to_string()),
                                None => warn!(position, relation = %current.relation, "Non-string projection entry ignored"),
                            }
                        }
                        current.attributes = Some(attributes);
                    }
                    _ => current.children.extend(parse_tokens(items)),
                }
            }
            Value::Object(_) => {
                let Some(current) = includes.last_mut() else {
                    warn!(position, "Include filter with no preceding relation ignored");
                    continue;
                };
                match Filter::parse(token) {
                    Ok(filter) => current.filter = Some(filter),
                    Err(e) => warn!(position, relation = %current.relation, error = %e, "Malformed include filter ignored"),
                }
            }
            other => warn!(position, token = %other, "Unsupported include token ignored"),
        }
    }

    includes
}

/// How a backend wants each node's filter.
pub trait IncludeShape {
    type Filter;

    fn shape(filter: Option<&Filter>, target: &Model) -> Self::Filter;
}

/// Cache side: the DSL filter itself, evaluated in memory.
pub struct CacheShape;

impl IncludeShape for CacheShape {
    type Filter = Filter;

    fn shape(filter: Option<&Filter>, _target: &Model) -> Filter {
        filter.cloned().unwrap_or_default()
    }
}

/// Primary side: a native SQL condition on the target table.
pub struct PrimaryShape;

impl IncludeShape for PrimaryShape {
    type Filter = SqlCondition;

    fn shape(filter: Option<&Filter>, target: &Model) -> SqlCondition {
        filter
            .map(|f| SqlTranslator::translate(f, target))
            .unwrap_or(SqlCondition::True)
    }
}

/// A resolved include node.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludePlan<F> {
    /// Relation name; children are attached under this key.
    pub relation: String,
    pub target: Arc<Model>,
    pub this_key: String,
    pub other_key: String,
    /// Parents with no matching child are dropped.
    pub required: bool,
    pub attributes: Option<Vec<String>>,
    pub filter: F,
    pub children: Vec<IncludePlan<F>>,
}

pub type CacheInclude = IncludePlan<Filter>;
pub type PrimaryInclude = IncludePlan<SqlCondition>;

impl<F> IncludePlan<F> {
    /// Apply the attribute projection to a child row, keeping the keys of
    /// its own nested includes.
    pub fn project(&self, record: &Record) -> Record {
        match &self.attributes {
            None => record.clone(),
            Some(attributes) => project(record, attributes, |key| {
                self.children.iter().any(|child| child.relation == key)
            }),
        }
    }
}

/// Join loaded children into their parents.
///
/// `children[i]` holds the rows loaded for `plans[i]`. A child matches a
/// parent when `child[other_key] == parent[this_key]`; matches are attached
/// as an array under the relation name. Parents left without a match on a
/// required relation are dropped.
pub fn join_children<F>(parents: Vec<Record>, plans: &[IncludePlan<F>], children: Vec<Vec<Record>>) -> Vec<Record> {
    parents
        .into_iter()
        .filter_map(|mut parent| {
            for (plan, rows) in plans.iter().zip(&children) {
                let matched: Vec<Value> = match field(&parent, &plan.this_key) {
                    Some(key) => rows
                        .iter()
                        .filter(|child| field(child, &plan.other_key).is_some_and(|v| loose_eq(v, key)))
                        .map(|child| Value::Object(plan.project(child)))
                        .collect(),
                    None => Vec::new(),
                };
                if plan.required && matched.is_empty() {
                    return None;
                }
                parent.insert(plan.relation.clone(), Value::Array(matched));
            }
            Some(parent)
        })
        .collect()
}

/// Bind includes to the relation graph starting at `model`. Unknown
/// relations are reported and skipped along with their subtree.
pub fn resolve<S: IncludeShape>(
    registry: &ModelRegistry,
    model: &str,
    includes: &[Include],
) -> Vec<IncludePlan<S::Filter>> {
    let mut plans = Vec::with_capacity(includes.len());

    for include in includes {
        let Some(relation) = registry.relation(model, &include.relation) else {
            warn!(model = %model, relation = %include.relation, "Unknown relation in include, skipped");
            continue;
        };
        let Some(target) = registry.model(&relation.model) else {
            warn!(model = %model, relation = %include.relation, "Relation target is not registered, skipped");
            continue;
        };

        plans.push(IncludePlan {
            relation: relation.name.clone(),
            target: Arc::clone(target),
            this_key: relation.this_key.clone(),
            other_key: relation.other_key.clone(),
            required: relation.inner_join,
            attributes: include.attributes.clone(),
            filter: S::shape(include.filter.as_ref(), target),
            children: resolve::<S>(registry, &relation.model, &include.children),
        });
    }

    plans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, AttributeKind, ModelDecl, RelationDecl};
    use serde_json::json;

    fn registry() -> ModelRegistry {
        ModelRegistry::register(vec![
            ModelDecl::new("user")
                .attribute(Attribute::new("id", AttributeKind::Integer).primary_key())
                .relation("post", RelationDecl::new("hasMany", "id", "userId")),
            ModelDecl::new("post")
                .attribute(Attribute::new("id", AttributeKind::Integer).primary_key())
                .attribute(Attribute::new("userId", AttributeKind::Integer))
                .attribute(Attribute::new("title", AttributeKind::Text))
                .relation("comment", RelationDecl::new("hasMany", "id", "postId").optional()),
            ModelDecl::new("comment")
                .attribute(Attribute::new("id", AttributeKind::Integer).primary_key())
                .attribute(Attribute::new("postId", AttributeKind::Integer)),
        ])
    }

    #[test]
    fn test_parse_flat_tokens() {
        let parsed = parse_tokens(&[
            json!("post"),
            json!(["*", "title", 7]),
            json!({"title": {"$exists": true}}),
            json!(["comment", {"id": 1}]),
            json!("other"),
        ]);
        assert_eq!(parsed.len(), 2);
        let post = &parsed[0];
        assert_eq!(post.attributes, Some(vec!["title".to_string()]));
        assert_eq!(post.filter, Some(Filter::new().exists("title", true)));
        assert_eq!(post.children, vec![Include::new("comment").filter(Filter::new().eq("id", 1))]);
        assert_eq!(parsed[1], Include::new("other"));
    }

    #[test]
    fn test_stray_tokens_are_skipped() {
        let parsed = parse_tokens(&[json!(["*", "x"]), json!({"a": 1}), json!(3), json!(null), json!("post")]);
        assert_eq!(parsed, vec![Include::new("post")]);

        let bad_filter = parse_tokens(&[json!("post"), json!({"a": {"$in": 1}})]);
        assert_eq!(bad_filter, vec![Include::new("post")]);
    }

    #[test]
    fn test_resolve_binds_relations_and_requiredness() {
        let registry = registry();
        let includes = vec![Include::new("post").include(Include::new("comment")), Include::new("ghost")];
        let plans = resolve::<CacheShape>(&registry, "user", &includes);

        assert_eq!(plans.len(), 1);
        let post = &plans[0];
        assert_eq!(post.target.name(), "post");
        assert_eq!((post.this_key.as_str(), post.other_key.as_str()), ("id", "userId"));
        assert!(post.required);
        assert!(post.filter.is_empty());
        assert_eq!(post.children.len(), 1);
        assert!(!post.children[0].required);
    }

    #[test]
    fn test_join_children_requiredness_and_projection() {
        let registry = registry();
        let plans = resolve::<CacheShape>(&registry, "user", &[Include::new("post").attributes(["title"])]);
        let rec = |v: Value| v.as_object().cloned().unwrap_or_default();
        let parents = vec![rec(json!({"id": 1})), rec(json!({"id": 2})), rec(json!({"name": "no id"}))];
        let posts = vec![
            rec(json!({"id": 10, "userId": 1, "title": "a"})),
            rec(json!({"id": 11, "userId": 1.0, "title": "b"})),
            rec(json!({"id": 12, "userId": 3, "title": "c"})),
        ];

        let joined = join_children(parents.clone(), &plans, vec![posts.clone()]);
        assert_eq!(joined, vec![rec(json!({"id": 1, "post": [{"title": "a"}, {"title": "b"}]}))]);

        let mut optional = plans.clone();
        optional[0].required = false;
        let joined = join_children(parents, &optional, vec![posts]);
        assert_eq!(joined.len(), 3);
        assert_eq!(joined[1]["post"], json!([]));
        assert_eq!(joined[2]["post"], json!([]));
    }

    #[test]
    fn test_primary_shape_translates_filters() {
        let registry = registry();
        let includes = vec![Include::new("post").filter(Filter::new().eq("title", "hi"))];
        let plans = resolve::<PrimaryShape>(&registry, "user", &includes);
        assert_eq!(plans[0].filter.to_inline(), "(\"title\" IS NOT NULL AND \"title\" = 'hi')");

        let unfiltered = resolve::<PrimaryShape>(&registry, "user", &[Include::new("post")]);
        assert_eq!(unfiltered[0].filter, SqlCondition::True);
    }
}
