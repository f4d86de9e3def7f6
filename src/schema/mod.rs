// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Model registry: attribute definitions and the relation graph.
//!
//! Built once at startup from [`ModelDecl`]s and immutable afterwards. Every
//! component receives it by reference (usually behind an `Arc`).
//!
//! # Example
//!
//! ```rust
//! use dbflow::schema::{Attribute, AttributeKind, ModelDecl, ModelRegistry, RelationDecl};
//!
//! let registry = ModelRegistry::register(vec![
//!     ModelDecl::new("user")
//!         .attribute(Attribute::new("id", AttributeKind::Integer).primary_key().auto_increment())
//!         .attribute(Attribute::new("name", AttributeKind::Text))
//!         .relation("post", RelationDecl::new("hasMany", "id", "userId")),
//!     ModelDecl::new("post")
//!         .attribute(Attribute::new("id", AttributeKind::Integer).primary_key().auto_increment())
//!         .attribute(Attribute::new("userId", AttributeKind::Integer)),
//! ]);
//!
//! let rel = registry.relation("user", "post").unwrap();
//! assert_eq!(rel.other_key, "userId");
//! assert!(rel.inner_join);
//! ```
//!
//! # Validation
//!
//! A relation is dropped (with an `error!` diagnostic, never a panic) when its
//! kind is not one of `hasOne`, `hasMany`, `belongsTo`, `belongsToMany`, when
//! its target model is unknown, or when `thisKey` / `otherKey` do not name
//! attributes of the owning / target model. The rest of the registry is built
//! regardless. Rejections stay inspectable through [`ModelRegistry::rejected`].

use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

/// Column type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttributeKind {
    Integer,
    Float,
    Text,
    Boolean,
    /// Exchanged as RFC 3339, stored as epoch millis in the primary store.
    Date,
    /// Arbitrary JSON, stored as text in the primary store.
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AttributeKind,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub auto_increment: bool,
}

impl Attribute {
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            primary_key: false,
            auto_increment: false,
        }
    }

    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }
}

/// Association kinds understood by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    HasOne,
    HasMany,
    BelongsTo,
    BelongsToMany,
}

impl RelationKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "hasOne" => Some(Self::HasOne),
            "hasMany" => Some(Self::HasMany),
            "belongsTo" => Some(Self::BelongsTo),
            "belongsToMany" => Some(Self::BelongsToMany),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HasOne => "hasOne",
            Self::HasMany => "hasMany",
            Self::BelongsTo => "belongsTo",
            Self::BelongsToMany => "belongsToMany",
        }
    }

    /// Deleting a parent deletes the related rows (`has*` kinds).
    pub fn cascades(&self) -> bool {
        matches!(self, Self::HasOne | Self::HasMany)
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_inner_join() -> bool {
    true
}

/// A relation as declared, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationDecl {
    #[serde(rename = "type")]
    pub kind: String,
    pub this_key: String,
    pub other_key: String,
    #[serde(default = "default_inner_join")]
    pub inner_join: bool,
    /// Target model; defaults to the relation name.
    #[serde(default)]
    pub model: Option<String>,
}

impl RelationDecl {
    pub fn new(kind: impl Into<String>, this_key: impl Into<String>, other_key: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            this_key: this_key.into(),
            other_key: other_key.into(),
            inner_join: true,
            model: None,
        }
    }

    /// Parents without related rows are kept (outer join).
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.inner_join = false;
        self
    }

    #[must_use]
    pub fn target(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// A model as declared.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelDecl {
    pub name: String,
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub relations: BTreeMap<String, RelationDecl>,
}

impl ModelDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            relations: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    #[must_use]
    pub fn relation(mut self, name: impl Into<String>, relation: RelationDecl) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }
}

/// A validated edge of the relation graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Relation name; included rows are attached under this key.
    pub name: String,
    pub kind: RelationKind,
    /// Target model name.
    pub model: String,
    /// Join key on the owning model.
    pub this_key: String,
    /// Join key on the target model.
    pub other_key: String,
    /// Required (inner join) when true.
    pub inner_join: bool,
}

/// A registered model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    name: String,
    attributes: Vec<Attribute>,
    relations: BTreeMap<String, Relation>,
}

impl Model {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn kind_of(&self, name: &str) -> Option<AttributeKind> {
        self.attribute(name).map(|a| a.kind)
    }

    pub fn is_date(&self, name: &str) -> bool {
        self.kind_of(name) == Some(AttributeKind::Date)
    }

    pub fn primary_key(&self) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.primary_key)
    }

    pub fn relations(&self) -> &BTreeMap<String, Relation> {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }
}

/// Why a declaration (or part of one) was not registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("model '{0}' is declared more than once")]
    DuplicateModel(String),
    #[error("model '{model}': invalid relation \"{kind}\" for '{relation}'")]
    InvalidRelationKind {
        model: String,
        relation: String,
        kind: String,
    },
    #[error("model '{model}': relation '{relation}' targets unknown model '{target}'")]
    UnknownTarget {
        model: String,
        relation: String,
        target: String,
    },
    #[error("model '{model}': relation '{relation}' key '{key}' is not an attribute of '{owner}'")]
    UnknownKey {
        model: String,
        relation: String,
        key: String,
        owner: String,
    },
}

/// Immutable registry of models and their relations.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, Arc<Model>>,
    rejected: Vec<SchemaError>,
}

impl ModelRegistry {
    /// Build the registry and its relation graph.
    pub fn register(decls: impl IntoIterator<Item = ModelDecl>) -> Self {
        let mut accepted: Vec<ModelDecl> = Vec::new();
        let mut rejected = Vec::new();

        for decl in decls {
            if accepted.iter().any(|d| d.name == decl.name) {
                let err = SchemaError::DuplicateModel(decl.name.clone());
                error!(error = %err, "Model declaration ignored");
                rejected.push(err);
                continue;
            }
            accepted.push(decl);
        }

        let mut models = BTreeMap::new();
        for decl in &accepted {
            let mut relations = BTreeMap::new();
            for (name, rel) in &decl.relations {
                match Self::validate_relation(decl, name, rel, &accepted) {
                    Ok(relation) => {
                        debug!(model = %decl.name, relation = %name, kind = %relation.kind, "Relation registered");
                        relations.insert(name.clone(), relation);
                    }
                    Err(err) => {
                        error!(error = %err, "Relation ignored");
                        crate::metrics::record_rejected_relation(&decl.name);
                        rejected.push(err);
                    }
                }
            }
            models.insert(
                decl.name.clone(),
                Arc::new(Model {
                    name: decl.name.clone(),
                    attributes: decl.attributes.clone(),
                    relations,
                }),
            );
        }

        crate::metrics::set_registered_models(models.len());
        Self { models, rejected }
    }

    fn validate_relation(
        owner: &ModelDecl,
        name: &str,
        rel: &RelationDecl,
        all: &[ModelDecl],
    ) -> Result<Relation, SchemaError> {
        let kind = RelationKind::parse(&rel.kind).ok_or_else(|| SchemaError::InvalidRelationKind {
            model: owner.name.clone(),
            relation: name.to_string(),
            kind: rel.kind.clone(),
        })?;

        let target_name = rel.model.clone().unwrap_or_else(|| name.to_string());
        let target = all
            .iter()
            .find(|d| d.name == target_name)
            .ok_or_else(|| SchemaError::UnknownTarget {
                model: owner.name.clone(),
                relation: name.to_string(),
                target: target_name.clone(),
            })?;

        for (key, decl) in [(&rel.this_key, owner), (&rel.other_key, target)] {
            if !decl.attributes.iter().any(|a| &a.name == key) {
                return Err(SchemaError::UnknownKey {
                    model: owner.name.clone(),
                    relation: name.to_string(),
                    key: key.clone(),
                    owner: decl.name.clone(),
                });
            }
        }

        Ok(Relation {
            name: name.to_string(),
            kind,
            model: target_name,
            this_key: rel.this_key.clone(),
            other_key: rel.other_key.clone(),
            inner_join: rel.inner_join,
        })
    }

    pub fn model(&self, name: &str) -> Option<&Arc<Model>> {
        self.models.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn models(&self) -> impl Iterator<Item = &Arc<Model>> {
        self.models.values()
    }

    pub fn relations_of(&self, model: &str) -> Option<&BTreeMap<String, Relation>> {
        self.models.get(model).map(|m| m.relations())
    }

    pub fn relation(&self, model: &str, relation: &str) -> Option<&Relation> {
        self.models.get(model).and_then(|m| m.relation(relation))
    }

    pub fn attributes_of(&self, model: &str) -> Option<&[Attribute]> {
        self.models.get(model).map(|m| m.attributes())
    }

    /// Key of an embedded relation on `model`: any model name, or one of the
    /// model's relation names.
    pub fn is_embedded_key(&self, model: &str, key: &str) -> bool {
        self.models.contains_key(key)
            || self.models.get(model).is_some_and(|m| m.relations.contains_key(key))
    }

    /// Declarations that were dropped during registration.
    pub fn rejected(&self) -> &[SchemaError] {
        &self.rejected
    }
}
