// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Flow orchestrator.
//!
//! The [`Flow`] ties the two stores together behind four operations:
//!
//! | operation | policy                                                           |
//! |-----------|------------------------------------------------------------------|
//! | `get`     | cache first; on failure or empty result, primary store, then refill the cache |
//! | `save`    | primary store, then mirror the stored rows into the cache        |
//! | `update`  | primary store and cache independently; both outcomes reported    |
//! | `delete`  | cascade through `has*` relations, destroy rows, then clear the cache |
//!
//! Errors never escape: each store step reports through the [`Outcome`]
//! tri-state (`null` / `false` / `true` when serialized) and the correlation
//! sink.
//!
//! # Example
//!
//! ```rust,no_run
//! use dbflow::{Attributes, Filter, Flow, FlowConfig, ModelRegistry};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(ModelRegistry::register(Vec::new()));
//! let config = FlowConfig {
//!     redis_url: Some("redis://localhost:6379".into()),
//!     sql_url: Some("sqlite:flow.db?mode=rwc".into()),
//!     create_tables: true,
//!     ..Default::default()
//! };
//! let flow = Flow::connect(config, registry).await?;
//!
//! let users = flow.get("user", &Filter::new().eq("id", 1), &Attributes::All, &[]).await;
//! # Ok(())
//! # }
//! ```

mod delete;
mod read;
mod types;
mod write;

pub use types::{Attributes, DeleteReport, Outcome, SaveReport, UpdateReport};

use std::sync::Arc;
use tracing::info;

use crate::config::FlowConfig;
use crate::correlation::{Correlation, CorrelationSink, TracingSink};
use crate::record::{project, Record};
use crate::schema::{Model, ModelRegistry};
use crate::storage::cache::CacheAdapter;
use crate::storage::primary::PrimaryAdapter;
use crate::storage::redis::RedisSetStore;
use crate::storage::sql::SqlStore;
use crate::storage::traits::{PrimaryStore, SetStore, StorageError};

/// Dual-store orchestrator.
///
/// `Flow` is `Send + Sync`; share it behind an `Arc`. It holds no locks:
/// concurrent updates or deletes with overlapping filters on the same model
/// race in the cache and must be serialized by the caller if that matters.
pub struct Flow {
    pub(super) registry: Arc<ModelRegistry>,
    pub(super) cache: CacheAdapter,
    pub(super) primary: PrimaryAdapter,
    pub(super) sink: Arc<dyn CorrelationSink>,
    pub(super) config: FlowConfig,
}

impl Flow {
    /// Build from already-connected stores.
    pub fn new(
        registry: Arc<ModelRegistry>,
        cache_store: Arc<dyn SetStore>,
        primary_store: Arc<dyn PrimaryStore>,
        sink: Arc<dyn CorrelationSink>,
        config: FlowConfig,
    ) -> Self {
        Self {
            cache: CacheAdapter::new(cache_store, Arc::clone(&registry)),
            primary: PrimaryAdapter::new(primary_store),
            registry,
            sink,
            config,
        }
    }

    /// Connect Redis and the SQL store described by `config`.
    ///
    /// With `create_tables` set, every registered model gets a
    /// `CREATE TABLE IF NOT EXISTS`.
    pub async fn connect(config: FlowConfig, registry: Arc<ModelRegistry>) -> Result<Self, StorageError> {
        let redis_url = config
            .redis_url
            .clone()
            .ok_or_else(|| StorageError::Config("redis_url is not set".into()))?;
        let database_url = config
            .database_url()
            .ok_or_else(|| StorageError::Config("neither sql_url nor sql_connection is set".into()))?;

        let prefix = Some(config.redis_key_prefix.as_str()).filter(|p| !p.is_empty());
        let cache_store = if config.announce_connect {
            RedisSetStore::connect_announced(&redis_url, prefix).await?
        } else {
            RedisSetStore::with_prefix(&redis_url, prefix).await?
        };

        let sql = SqlStore::with_max_connections(&database_url, config.sql_max_connections).await?;
        if config.create_tables {
            sql.create_tables(registry.models().map(|m| m.as_ref())).await?;
        }

        info!(
            models = registry.models().count(),
            dialect = ?sql.dialect(),
            "Flow connected"
        );

        Ok(Self::new(
            registry,
            Arc::new(cache_store),
            Arc::new(sql),
            Arc::new(TracingSink),
            config,
        ))
    }

    #[must_use]
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    #[must_use]
    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub(super) fn open(&self, operation: &str, model: &str) -> Correlation {
        Correlation::open(Arc::clone(&self.sink), operation, model)
    }

    /// The registered model, or an error diagnostic.
    pub(super) fn lookup(&self, ctx: &Correlation, model: &str) -> Option<Arc<Model>> {
        match self.registry.model(model) {
            Some(found) => Some(Arc::clone(found)),
            None => {
                ctx.error(format!("Model '{}' is not registered", model));
                None
            }
        }
    }

    /// Apply a projection. Embedded relations always survive it.
    pub(super) fn project(&self, model: &str, rows: Vec<Record>, attributes: &Attributes) -> Vec<Record> {
        match attributes {
            Attributes::All => rows,
            Attributes::Only(names) => rows
                .iter()
                .map(|row| project(row, names, |key| self.registry.is_embedded_key(model, key)))
                .collect(),
        }
    }
}
