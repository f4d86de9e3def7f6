// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Delete with cascade.
//!
//! ```text
//! primary.query(filter) ─► rows
//!     │
//!     ├─► for each has* relation (concurrently):
//!     │       delete(target, {otherKey: {$in: rows[thisKey]}})    (recursive)
//!     │
//!     ├─► destroy each row by primary key (concurrently)
//!     └─► cache.delete(filter)
//! ```
//!
//! A relation whose target is already being deleted further up the chain is
//! not followed again. A child delete that fails on a store makes the
//! parent's report `Failed` for that store too.

use futures::future::{join_all, BoxFuture};
use serde_json::Value;
use std::sync::Arc;

use crate::correlation::Correlation;
use crate::filter::Filter;
use crate::metrics::{self, LatencyTimer};
use crate::record::{field, Record};
use crate::schema::Model;

use super::{DeleteReport, Flow, Outcome};

impl Flow {
    /// Delete rows matching `filter` from both stores, cascading through
    /// every `hasOne` / `hasMany` relation first.
    ///
    /// # Returns
    /// For each store: `Failed` on error, `NotFound` when nothing matched,
    /// `Done` otherwise. Any row the primary store failed to destroy makes
    /// the primary side `Failed`. So does a cascaded delete that failed on
    /// the primary store, and likewise for the cache.
    #[tracing::instrument(skip_all, fields(model = %model))]
    pub async fn delete(&self, model: &str, filter: &Filter) -> DeleteReport {
        let _timer = LatencyTimer::new("delete");
        let ctx = self.open("delete", model);
        let Some(model) = self.lookup(&ctx, model) else {
            return DeleteReport::failed();
        };
        let path = vec![model.name().to_string()];
        self.delete_in(&ctx, model, filter.clone(), path).await
    }

    /// [`delete`](Self::delete) from a JSON filter.
    pub async fn delete_json(&self, model: &str, filter: &Value) -> DeleteReport {
        match Filter::parse(filter) {
            Ok(filter) => self.delete(model, &filter).await,
            Err(e) => {
                self.open("delete", model).error(format!("Malformed filter for '{}': {}", model, e));
                DeleteReport::failed()
            }
        }
    }

    fn delete_in<'a>(
        &'a self,
        ctx: &'a Correlation,
        model: Arc<Model>,
        filter: Filter,
        path: Vec<String>,
    ) -> BoxFuture<'a, DeleteReport> {
        Box::pin(async move {
            let name = model.name();
            let rows = match self.primary.query(ctx, &model, &filter, &[]).await {
                Ok(rows) => rows,
                Err(e) => {
                    metrics::record_operation("primary", "delete", "error");
                    ctx.error(format!("Primary: could not find rows of '{}' to delete: {}", name, e));
                    return DeleteReport::failed();
                }
            };

            let children = if rows.is_empty() {
                ctx.info(format!("Primary: no rows of '{}' matched the delete filter", name));
                CascadeFailures::default()
            } else {
                ctx.info(format!("Primary: found {} row(s) of '{}' to delete", rows.len(), name));
                self.cascade(ctx, &model, &rows, &path).await
            };

            let mut primary = self.destroy_rows(ctx, &model, &rows, &filter).await;
            if children.primary && !primary.is_failed() {
                ctx.error(format!("Primary: cascaded delete under '{}' failed", name));
                primary = Outcome::Failed;
            }
            metrics::record_operation("primary", "delete", primary.label());

            let mut cache = match self.cache.delete(ctx, &model, &filter).await {
                Ok(true) => Outcome::Done,
                Ok(false) => Outcome::NotFound,
                Err(e) => {
                    ctx.error(format!("Cache: could not delete records of '{}': {}", name, e));
                    Outcome::Failed
                }
            };
            if children.cache && !cache.is_failed() {
                ctx.error(format!("Cache: cascaded delete under '{}' failed", name));
                cache = Outcome::Failed;
            }
            metrics::record_operation("cache", "delete", cache.label());

            if primary == Outcome::Done && cache.is_failed() {
                metrics::record_divergence(name, "delete_cache_failed");
            }

            DeleteReport { primary, cache }
        })
    }

    async fn cascade(&self, ctx: &Correlation, model: &Model, rows: &[Record], path: &[String]) -> CascadeFailures {
        let deletes = model
            .relations()
            .values()
            .filter(|relation| relation.kind.cascades())
            .filter_map(|relation| {
                if path.contains(&relation.model) {
                    ctx.warn(format!(
                        "Cascade from '{}' through '{}' skipped: '{}' is already being deleted",
                        model.name(),
                        relation.name,
                        relation.model
                    ));
                    return None;
                }
                let target = Arc::clone(self.registry.model(&relation.model)?);
                let keys = distinct_values(rows, &relation.this_key);
                if keys.is_empty() {
                    return None;
                }

                let filter = Filter::new().is_in(&relation.other_key, keys);
                let mut path = path.to_vec();
                path.push(relation.model.clone());
                Some(async move { (relation, self.delete_in(ctx, target, filter, path).await) })
            });

        let mut failures = CascadeFailures::default();
        for (relation, report) in join_all(deletes).await {
            metrics::record_cascade(model.name(), &relation.name);
            if report.primary.is_failed() || report.cache.is_failed() {
                ctx.warn(format!(
                    "Cascade from '{}' through '{}' did not fully succeed (primary: {}, cache: {})",
                    model.name(),
                    relation.name,
                    report.primary,
                    report.cache
                ));
            }
            failures.primary |= report.primary.is_failed();
            failures.cache |= report.cache.is_failed();
        }
        failures
    }

    /// Destroy each matched row on its own so one failure does not block the
    /// rest. Models without a primary key are destroyed by filter in one go.
    async fn destroy_rows(&self, ctx: &Correlation, model: &Model, rows: &[Record], filter: &Filter) -> Outcome {
        if rows.is_empty() {
            return Outcome::NotFound;
        }

        let Some(pk) = model.primary_key() else {
            return match self.primary.destroy(ctx, model, filter).await {
                Ok(0) => Outcome::NotFound,
                Ok(_) => Outcome::Done,
                Err(e) => {
                    ctx.error(format!("Primary: could not delete rows of '{}': {}", model.name(), e));
                    Outcome::Failed
                }
            };
        };

        let destroys = rows.iter().map(|row| {
            let key = row.get(&pk.name).cloned().unwrap_or(Value::Null);
            async move {
                let result = self.primary.destroy(ctx, model, &Filter::new().eq(&pk.name, key.clone())).await;
                (key, result)
            }
        });

        let mut failed = 0;
        for (key, result) in join_all(destroys).await {
            match result {
                Ok(_) => ctx.debug(format!("Primary: deleted '{}' {} = {}", model.name(), pk.name, key)),
                Err(e) => {
                    failed += 1;
                    ctx.error(format!(
                        "Primary: could not delete '{}' {} = {}: {}",
                        model.name(),
                        pk.name,
                        key,
                        e
                    ));
                }
            }
        }

        if failed == 0 {
            Outcome::Done
        } else {
            ctx.error(format!("Primary: {} of {} row(s) of '{}' not deleted", failed, rows.len(), model.name()));
            Outcome::Failed
        }
    }
}

/// Stores on which at least one cascaded child delete failed.
#[derive(Debug, Default, Clone, Copy)]
struct CascadeFailures {
    primary: bool,
    cache: bool,
}

/// Distinct present values of `key` across `rows`, in first-seen order.
fn distinct_values(rows: &[Record], key: &str) -> Vec<Value> {
    let mut values: Vec<Value> = Vec::new();
    for value in rows.iter().filter_map(|row| field(row, key)) {
        if !values.contains(value) {
            values.push(value.clone());
        }
    }
    values
}
