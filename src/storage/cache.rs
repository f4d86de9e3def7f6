// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache store adapter.
//!
//! Emulates filtered reads, joins and updates on top of a [`SetStore`] that
//! only knows how to add, remove and list set members. Each model owns one
//! set; each member is the canonical JSON of one record.
//!
//! # Update is not atomic
//!
//! ```text
//! find ──► apply spec in memory ──► SREM old forms ──► SADD new forms
//! ```
//!
//! | SREM | SADD | result                                             |
//! |------|------|----------------------------------------------------|
//! | ok   | ok   | `{found, updated}`                                 |
//! | fail | ok   | `{found, updated, degraded: true}` (old and new coexist) |
//! | ok   | fail | [`StorageError::TornUpdate`] (records are gone)    |
//! | fail | fail | [`StorageError::Backend`]                          |
//!
//! Concurrent updates or deletes with overlapping filters on the same model
//! race; callers needing stronger guarantees must serialize them.

use super::traits::{SetStore, StorageError, UpdateCounts};
use crate::correlation::Correlation;
use crate::filter::update::UpdateSpec;
use crate::filter::Filter;
use crate::include::{join_children, CacheInclude};
use crate::record::{canonical_json, to_epoch_millis, Record};
use crate::schema::{Model, ModelRegistry};
use futures::future::{join_all, BoxFuture};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// A cached record together with the exact member string it is stored as.
struct Member {
    raw: String,
    record: Record,
}

#[derive(Clone)]
pub struct CacheAdapter {
    store: Arc<dyn SetStore>,
    registry: Arc<ModelRegistry>,
}

impl CacheAdapter {
    pub fn new(store: Arc<dyn SetStore>, registry: Arc<ModelRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn store(&self) -> &Arc<dyn SetStore> {
        &self.store
    }

    /// Records of `model` matching `filter`, with `includes` joined in.
    ///
    /// An error means the cache could not be searched; an empty vector means
    /// it was searched and nothing matched.
    pub fn find<'a>(
        &'a self,
        ctx: &'a Correlation,
        model: &'a Model,
        filter: &'a Filter,
        includes: &'a [CacheInclude],
    ) -> BoxFuture<'a, Result<Vec<Record>, StorageError>> {
        Box::pin(async move {
            ctx.reuse("cache_find");
            let parents: Vec<Record> = self
                .scan(ctx, model, filter)
                .await?
                .into_iter()
                .map(|m| m.record)
                .collect();

            if includes.is_empty() || parents.is_empty() {
                return Ok(parents);
            }

            let loads = includes
                .iter()
                .map(|include| self.find(ctx, &include.target, &include.filter, &include.children));
            let children = join_all(loads).await.into_iter().collect::<Result<Vec<_>, _>>()?;

            Ok(join_children(parents, includes, children))
        })
    }

    /// Add `records` to the model's set, minus any embedded relation keys.
    ///
    /// Byte-identical records collapse into one member. Returns how many
    /// members were new.
    pub async fn create(&self, ctx: &Correlation, model: &Model, records: &[Record]) -> Result<usize, StorageError> {
        ctx.reuse("cache_create");
        if records.is_empty() {
            return Ok(0);
        }

        let members: Vec<String> = records.iter().map(|r| self.serialize(model, r)).collect();
        let added = self.store.add_members(model.name(), &members).await?;

        if added == 0 {
            ctx.info(format!("Cache: record(s) already exist in '{}'", model.name()));
        } else {
            ctx.debug(format!("Cache: created {} record(s) in '{}'", added, model.name()));
        }
        Ok(added)
    }

    /// Remove every record matching `filter`. `Ok(false)` when none matched.
    pub async fn delete(&self, ctx: &Correlation, model: &Model, filter: &Filter) -> Result<bool, StorageError> {
        ctx.reuse("cache_delete");
        let matched = self.scan(ctx, model, filter).await?;
        if matched.is_empty() {
            return Ok(false);
        }

        let raws: Vec<String> = matched.into_iter().map(|m| m.raw).collect();
        let removed = self.store.remove_members(model.name(), &raws).await?;
        ctx.debug(format!("Cache: removed {} record(s) from '{}'", removed, model.name()));
        Ok(true)
    }

    /// Delete-then-recreate update. See the module docs for the failure table.
    pub async fn update(
        &self,
        ctx: &Correlation,
        model: &Model,
        spec: &UpdateSpec,
        filter: &Filter,
    ) -> Result<UpdateCounts, StorageError> {
        ctx.reuse("cache_update");
        let matched = self.scan(ctx, model, filter).await?;
        let found = matched.len();
        if found == 0 {
            ctx.warn(format!("Cache: no records of '{}' matched the update filter", model.name()));
            return Ok(UpdateCounts::new(0, 0));
        }

        let mut raws = Vec::with_capacity(found);
        let mut next = Vec::with_capacity(found);
        for member in matched {
            let mut record = member.record;
            spec.apply(&mut record, model)?;
            raws.push(member.raw);
            next.push(record);
        }

        // SREM must settle before SADD: a re-created member equal to an old
        // one would otherwise be removed again.
        let removed = self.store.remove_members(model.name(), &raws).await;
        let created = self.create(ctx, model, &next).await;

        match (removed, created) {
            (Ok(_), Ok(added)) => {
                if added < found {
                    ctx.warn(format!(
                        "Cache: only {} of {} matched records of '{}' were re-created as distinct members",
                        added,
                        found,
                        model.name()
                    ));
                }
                ctx.info(format!("Cache: updated {} / {} records of '{}'", added, found, model.name()));
                Ok(UpdateCounts::new(found as u64, added as u64))
            }
            (Err(e), Ok(added)) => {
                ctx.warn(format!(
                    "Cache: old records of '{}' were not removed ({}); old and new versions now coexist",
                    model.name(),
                    e
                ));
                crate::metrics::record_divergence(model.name(), "cache_update_degraded");
                Ok(UpdateCounts {
                    found: found as u64,
                    updated: added as u64,
                    degraded: true,
                })
            }
            (Ok(removed), Err(e)) => {
                ctx.error(format!(
                    "Cache: removed {} old records of '{}' but could not re-create them",
                    removed,
                    model.name()
                ));
                crate::metrics::record_divergence(model.name(), "cache_update_torn");
                Err(StorageError::TornUpdate {
                    model: model.name().to_string(),
                    removed,
                    cause: e.to_string(),
                })
            }
            (Err(remove_err), Err(create_err)) => {
                ctx.warn(format!("Cache: update of '{}' failed", model.name()));
                Err(StorageError::Backend(format!(
                    "cache update failed: remove: {remove_err}; create: {create_err}"
                )))
            }
        }
    }

    /// List the model's set and keep members matching `filter`.
    async fn scan(&self, ctx: &Correlation, model: &Model, filter: &Filter) -> Result<Vec<Member>, StorageError> {
        let raws = self.store.list_members(model.name()).await?;
        let filter = filter.normalized(model);
        let total = raws.len();

        let mut matched = Vec::new();
        for raw in raws {
            let record = match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(record)) => record,
                _ => {
                    ctx.warn(format!("Cache: skipping undecodable member of '{}'", model.name()));
                    continue;
                }
            };
            if filter.is_empty() || filter.matches(&normalize_dates(&record, model)) {
                matched.push(Member { raw, record });
            }
        }

        debug!(model = %model.name(), total, matched = matched.len(), "Cache scan");
        Ok(matched)
    }

    fn serialize(&self, model: &Model, record: &Record) -> String {
        let stripped: Record = record
            .iter()
            .filter(|(key, _)| !self.registry.is_embedded_key(model.name(), key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        canonical_json(&Value::Object(stripped))
    }
}

/// Copy of `record` with date attributes as epoch milliseconds.
fn normalize_dates(record: &Record, model: &Model) -> Record {
    record
        .iter()
        .map(|(key, value)| {
            let value = if model.is_date(key) {
                to_epoch_millis(value).map(Value::from).unwrap_or_else(|| value.clone())
            } else {
                value.clone()
            };
            (key.clone(), value)
        })
        .collect()
}
