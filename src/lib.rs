// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # dbflow
//!
//! Keeps a relational store (source of truth) and a Redis set cache (read
//! accelerator) consistent behind one query/mutation API, emulating joins
//! and cascading deletes over a cache that has no query language of its own.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Flow orchestrator                      │
//! │  • get: cache first, primary store on miss, refill cache    │
//! │  • save / update: primary store, then cache                 │
//! │  • delete: cascade through has* relations, both stores      │
//! └─────────────────────────────────────────────────────────────┘
//!          │                                     │
//!          ▼                                     ▼
//! ┌──────────────────────────┐      ┌──────────────────────────┐
//! │      Cache adapter       │      │     Primary adapter      │
//! │  • one SET per model     │      │  • filters → SQL WHERE   │
//! │  • in-memory predicate   │      │  • batched IN (...) joins│
//! │  • hand-rolled joins     │      │  • RETURNING inserts     │
//! └──────────────────────────┘      └──────────────────────────┘
//!          │                                     │
//!          ▼                                     ▼
//!   Redis (SADD/SREM/SMEMBERS)          SQLite / Postgres (sqlx)
//! ```
//!
//! Both adapters are driven by the same inputs: a [`Filter`] (operator DSL),
//! an [`UpdateSpec`] and a tree of [`Include`]s, bound to the relation graph
//! held by the [`ModelRegistry`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dbflow::{Attribute, AttributeKind, Attributes, Filter, Flow, FlowConfig, ModelDecl, ModelRegistry, RelationDecl};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = Arc::new(ModelRegistry::register(vec![
//!         ModelDecl::new("user")
//!             .attribute(Attribute::new("id", AttributeKind::Integer).primary_key().auto_increment())
//!             .attribute(Attribute::new("name", AttributeKind::Text))
//!             .relation("post", RelationDecl::new("hasMany", "id", "userId")),
//!         ModelDecl::new("post")
//!             .attribute(Attribute::new("id", AttributeKind::Integer).primary_key().auto_increment())
//!             .attribute(Attribute::new("userId", AttributeKind::Integer)),
//!     ]));
//!
//!     let config = FlowConfig {
//!         redis_url: Some("redis://localhost:6379".into()),
//!         sql_url: Some("sqlite:flow.db?mode=rwc".into()),
//!         create_tables: true,
//!         ..Default::default()
//!     };
//!     let flow = Flow::connect(config, registry).await.expect("Failed to connect");
//!
//!     let saved = flow.save_json("user", &json!({"name": "alice"})).await;
//!     println!("saved: {}", serde_json::to_string(&saved).unwrap());
//!
//!     let users = flow.get("user", &Filter::new().eq("name", "alice"), &Attributes::All, &[]).await;
//!     println!("users: {:?}", users);
//!
//!     let deleted = flow.delete("user", &Filter::new().eq("name", "alice")).await;
//!     println!("deleted: {}", serde_json::to_string(&deleted).unwrap());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`]: the [`Flow`] and its result types
//! - [`schema`]: model declarations and the relation graph
//! - [`filter`]: filter / update DSL, in-memory predicate, SQL translation
//! - [`include`]: include trees, token parsing, per-backend shaping
//! - [`storage`]: Redis, in-memory and SQL stores plus the two adapters
//! - [`correlation`]: per-operation correlation context and sinks
//! - [`resilience`]: retry with backoff
//! - [`metrics`]: `metrics` crate instrumentation

pub mod config;
pub mod record;
pub mod schema;
pub mod filter;
pub mod include;
pub mod storage;
pub mod correlation;
pub mod coordinator;
pub mod resilience;
pub mod metrics;

pub use config::{FlowConfig, SqlConnection};
pub use coordinator::{Attributes, DeleteReport, Flow, Outcome, SaveReport, UpdateReport};
pub use correlation::{Correlation, CorrelationId, CorrelationSink, MemorySink, TracingSink};
pub use filter::update::{DateUnit, Operand, UpdateError, UpdateSpec};
pub use filter::{Filter, FilterError, Operator};
pub use include::Include;
pub use record::Record;
pub use schema::{Attribute, AttributeKind, ModelDecl, ModelRegistry, RelationDecl, RelationKind, SchemaError};
pub use storage::memory::InMemorySetStore;
pub use storage::redis::RedisSetStore;
pub use storage::sql::SqlStore;
pub use storage::traits::{PrimaryStore, SetStore, StorageError, UpdateCounts};
pub use resilience::retry::RetryConfig;
pub use metrics::LatencyTimer;
