// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use crate::filter::sql::SqlCondition;
use crate::filter::update::{UpdateError, UpdateSpec};
use crate::include::PrimaryInclude;
use crate::record::Record;
use crate::schema::Model;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Unknown model '{0}'")]
    UnknownModel(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Unsupported database URL '{0}' (expected sqlite: or postgres:)")]
    UnsupportedDialect(String),
    #[error("Cache update for '{model}' removed {removed} records but could not re-create them: {cause}")]
    TornUpdate {
        model: String,
        removed: usize,
        cause: String,
    },
    #[error(transparent)]
    Update(#[from] UpdateError),
}

/// Outcome of an update on one store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateCounts {
    /// Records matching the filter.
    pub found: u64,
    /// Records written back.
    pub updated: u64,
    /// Old and new versions may now coexist in the cache.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

impl UpdateCounts {
    pub fn new(found: u64, updated: u64) -> Self {
        Self {
            found,
            updated,
            degraded: false,
        }
    }
}

/// Unordered sets of strings addressed by name (Redis SADD / SREM / SMEMBERS).
#[async_trait]
pub trait SetStore: Send + Sync {
    /// Returns how many members were not already present.
    async fn add_members(&self, set: &str, members: &[String]) -> Result<usize, StorageError>;
    /// Returns how many members were actually removed.
    async fn remove_members(&self, set: &str, members: &[String]) -> Result<usize, StorageError>;
    async fn list_members(&self, set: &str) -> Result<Vec<String>, StorageError>;
}

/// Relational source of truth.
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// Rows of `model` matching `condition`, with `includes` attached as
    /// arrays under each relation name.
    async fn query(
        &self,
        model: &Model,
        condition: &SqlCondition,
        includes: &[PrimaryInclude],
    ) -> Result<Vec<Record>, StorageError>;

    /// Insert one row, returning it as stored (generated keys included).
    async fn insert(&self, model: &Model, record: &Record) -> Result<Record, StorageError>;

    /// Insert all rows or none.
    async fn bulk_insert(&self, model: &Model, records: &[Record]) -> Result<Vec<Record>, StorageError>;

    async fn update(
        &self,
        model: &Model,
        spec: &UpdateSpec,
        condition: &SqlCondition,
    ) -> Result<UpdateCounts, StorageError>;

    /// Returns the number of rows removed.
    async fn destroy(&self, model: &Model, condition: &SqlCondition) -> Result<u64, StorageError>;
}
