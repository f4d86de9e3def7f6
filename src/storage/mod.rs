// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Store clients and the adapters built on them.
//!
//! - [`traits`]: the two collaborator interfaces, [`SetStore`](traits::SetStore)
//!   (cache) and [`PrimaryStore`](traits::PrimaryStore) (relational)
//! - [`redis`], [`memory`]: set store implementations
//! - [`sql`]: primary store over SQLite / Postgres
//! - [`cache`], [`primary`]: adapters the orchestrator talks to

pub mod cache;
pub mod memory;
pub mod primary;
pub mod redis;
pub mod sql;
pub mod traits;
