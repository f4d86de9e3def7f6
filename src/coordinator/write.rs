// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Save and update: primary store first, then the cache.

use serde_json::Value;

use crate::correlation::Correlation;
use crate::filter::update::UpdateSpec;
use crate::filter::Filter;
use crate::metrics::{self, LatencyTimer};
use crate::record::Record;

use super::{Flow, Outcome, SaveReport, UpdateReport};

impl Flow {
    /// Insert `records` into the primary store, then mirror the stored rows
    /// (generated keys included) into the cache.
    ///
    /// A primary failure short-circuits: the cache is not written and both
    /// sides report [`Outcome::Failed`]. A cache failure after a successful
    /// primary write is reported, not rolled back.
    #[tracing::instrument(skip_all, fields(model = %model, count = records.len()))]
    pub async fn save(&self, model: &str, records: Vec<Record>) -> SaveReport {
        let _timer = LatencyTimer::new("save");
        let ctx = self.open("save", model);
        self.save_in(&ctx, model, records).await
    }

    /// [`save`](Self::save) from a JSON object or array of objects.
    pub async fn save_json(&self, model: &str, records: &Value) -> SaveReport {
        let records = match records {
            Value::Object(record) => vec![record.clone()],
            Value::Array(items) if items.iter().all(Value::is_object) => {
                items.iter().filter_map(|v| v.as_object().cloned()).collect()
            }
            _ => {
                self.open("save", model)
                    .error(format!("Records for '{}' must be an object or an array of objects", model));
                return SaveReport::failed();
            }
        };
        self.save(model, records).await
    }

    async fn save_in(&self, ctx: &Correlation, name: &str, records: Vec<Record>) -> SaveReport {
        let Some(model) = self.lookup(ctx, name) else {
            return SaveReport::failed();
        };

        let created = match self.primary.create(ctx, &model, &records).await {
            Ok(created) => created,
            Err(e) => {
                metrics::record_operation("primary", "save", "error");
                ctx.error(format!("Primary: could not save record(s) of '{}': {}", name, e));
                return SaveReport::failed();
            }
        };
        if created.is_empty() {
            ctx.warn(format!("Nothing to save for '{}'", name));
            return SaveReport {
                primary: Outcome::NotFound,
                cache: Outcome::NotFound,
                records: Some(created),
            };
        }
        metrics::record_operation("primary", "save", "ok");

        let cache = match self.cache.create(ctx, &model, &created).await {
            Ok(_) => Outcome::Done,
            Err(e) => {
                metrics::record_divergence(name, "save_cache_failed");
                ctx.error(format!(
                    "Cache: record(s) of '{}' saved in the primary store but not cached: {}",
                    name, e
                ));
                Outcome::Failed
            }
        };
        metrics::record_operation("cache", "save", cache.label());

        SaveReport {
            primary: Outcome::Done,
            cache,
            records: Some(created),
        }
    }

    /// Apply `spec` to rows matching `filter` in both stores.
    ///
    /// The primary update and the cache's delete-then-recreate update run
    /// regardless of each other's outcome; each side reports on its own.
    #[tracing::instrument(skip_all, fields(model = %model))]
    pub async fn update(&self, model: &str, spec: &UpdateSpec, filter: &Filter) -> UpdateReport {
        let _timer = LatencyTimer::new("update");
        let ctx = self.open("update", model);
        self.update_in(&ctx, model, spec, filter).await
    }

    /// [`update`](Self::update) from a JSON update spec and filter.
    pub async fn update_json(&self, model: &str, spec: &Value, filter: &Value) -> UpdateReport {
        let parsed = UpdateSpec::parse(spec)
            .map_err(|e| e.to_string())
            .and_then(|spec| Filter::parse(filter).map(|f| (spec, f)).map_err(|e| e.to_string()));
        match parsed {
            Ok((spec, filter)) => self.update(model, &spec, &filter).await,
            Err(e) => {
                self.open("update", model).error(format!("Malformed update for '{}': {}", model, e));
                UpdateReport::default()
            }
        }
    }

    async fn update_in(&self, ctx: &Correlation, name: &str, spec: &UpdateSpec, filter: &Filter) -> UpdateReport {
        let Some(model) = self.lookup(ctx, name) else {
            return UpdateReport::default();
        };
        if spec.is_empty() {
            ctx.error(format!("Update spec for '{}' has no fields", name));
            return UpdateReport::default();
        }

        let primary = match self.primary.update(ctx, &model, spec, filter).await {
            Ok(counts) => Some(counts),
            Err(e) => {
                ctx.error(format!("Primary: could not update '{}': {}", name, e));
                None
            }
        };
        metrics::record_operation("primary", "update", if primary.is_some() { "ok" } else { "error" });

        let cache = match self.cache.update(ctx, &model, spec, filter).await {
            Ok(counts) => Some(counts),
            Err(e) => {
                ctx.error(format!("Cache: could not update '{}': {}", name, e));
                None
            }
        };
        metrics::record_operation("cache", "update", if cache.is_some() { "ok" } else { "error" });

        if primary.is_some() != cache.is_some() {
            metrics::record_divergence(name, "update_one_side_failed");
        }

        UpdateReport { primary, cache }
    }
}
