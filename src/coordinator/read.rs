// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Get: cache first, primary store on miss, then refill the cache.
//!
//! ```text
//! cache.find ──hit──► project ──► return
//!     │
//!  miss / error
//!     ▼
//! primary.query ──error──► None
//!     │
//!     ├──► project ──► return
//!     └──► refill cache (spawned; owns the correlation context)
//! ```
//!
//! The cache is refilled with whole rows, never projected ones, so a later
//! `Attributes::All` read served from the cache is still complete. Included
//! children are refilled too unless their include carried a projection.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, Instrument};

use crate::correlation::Correlation;
use crate::filter::Filter;
use crate::include::{parse_tokens, resolve, CacheShape, Include, PrimaryInclude, PrimaryShape};
use crate::metrics::{self, LatencyTimer};
use crate::record::Record;
use crate::schema::Model;

use super::{Attributes, Flow};

/// Rows to write back to the cache, per model.
type Refill = Vec<(Arc<Model>, Vec<Record>)>;

impl Flow {
    /// Records of `model` matching `filter`, with `includes` attached under
    /// their relation names.
    ///
    /// # Returns
    /// - `Some(rows)` → the search ran (rows may be empty)
    /// - `None` → unknown model, or both stores failed
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use dbflow::{Attributes, Filter, Flow, Include};
    /// # async fn example(flow: &Flow) {
    /// let users = flow
    ///     .get(
    ///         "user",
    ///         &Filter::new().gte("age", 18),
    ///         &Attributes::only(["id", "name"]),
    ///         &[Include::new("post").attributes(["title"])],
    ///     )
    ///     .await;
    /// # }
    /// ```
    #[tracing::instrument(skip_all, fields(model = %model))]
    pub async fn get(
        &self,
        model: &str,
        filter: &Filter,
        attributes: &Attributes,
        includes: &[Include],
    ) -> Option<Vec<Record>> {
        let _timer = LatencyTimer::new("get");
        let ctx = self.open("get", model);
        let (rows, refill) = self.get_in(&ctx, model, filter, attributes, includes).await;
        if let Some(refill) = refill {
            self.refill(ctx, refill).await;
        }
        rows
    }

    /// [`get`](Self::get) from untyped input: a JSON filter and a flat
    /// include token list (`"post", ["*", "title"], {"published": true}`).
    pub async fn get_json(
        &self,
        model: &str,
        filter: &Value,
        attributes: &Attributes,
        include_args: &[Value],
    ) -> Option<Vec<Record>> {
        let filter = match Filter::parse(filter) {
            Ok(filter) => filter,
            Err(e) => {
                self.open("get", model).error(format!("Malformed filter for '{}': {}", model, e));
                return None;
            }
        };
        self.get(model, &filter, attributes, &parse_tokens(include_args)).await
    }

    async fn get_in(
        &self,
        ctx: &Correlation,
        name: &str,
        filter: &Filter,
        attributes: &Attributes,
        includes: &[Include],
    ) -> (Option<Vec<Record>>, Option<Refill>) {
        let Some(model) = self.lookup(ctx, name) else {
            return (None, None);
        };

        let cache_plan = resolve::<CacheShape>(&self.registry, name, includes);
        match self.cache.find(ctx, &model, filter, &cache_plan).await {
            Ok(rows) if !rows.is_empty() => {
                metrics::record_cache_lookup(name, "hit");
                ctx.debug(format!("Cache: {} record(s) of '{}' found", rows.len(), name));
                return (Some(self.project(name, rows, attributes)), None);
            }
            Ok(_) => {
                metrics::record_cache_lookup(name, "miss");
                ctx.info(format!("Cache: no records of '{}' found, searching the primary store", name));
            }
            Err(e) => {
                metrics::record_cache_lookup(name, "error");
                ctx.error(format!(
                    "Cache: could not search '{}' ({}), searching the primary store",
                    name, e
                ));
            }
        }

        metrics::record_fallback(name);
        let primary_plan = resolve::<PrimaryShape>(&self.registry, name, includes);
        match self.primary.query(ctx, &model, filter, &primary_plan).await {
            Ok(rows) => {
                metrics::record_operation("primary", "get", "ok");
                let refill = (!rows.is_empty()).then(|| {
                    let mut refill = Vec::new();
                    collect_refill(&model, &rows, &primary_plan, &mut refill);
                    refill
                });
                (Some(self.project(name, rows, attributes)), refill)
            }
            Err(e) => {
                metrics::record_operation("primary", "get", "error");
                ctx.error(format!("Primary: could not query '{}': {}", name, e));
                (None, None)
            }
        }
    }

    /// Write fallback rows back to the cache. The context closes when this
    /// finishes, on the spawned task when repopulation runs in background.
    async fn refill(&self, ctx: Correlation, refill: Refill) {
        let cache = self.cache.clone();
        let span = ctx.span().clone();
        let task = async move {
            for (model, records) in &refill {
                match cache.create(&ctx, model, records).await {
                    Ok(added) => {
                        metrics::record_repopulation(model.name(), added);
                        debug!(model = %model.name(), added, "Cache repopulated");
                    }
                    Err(e) => {
                        ctx.warn(format!("Cache: could not repopulate '{}': {}", model.name(), e));
                    }
                }
            }
        };

        if self.config.background_repopulation {
            tokio::spawn(task.instrument(span));
        } else {
            task.instrument(span).await;
        }
    }
}

/// Parent rows plus, recursively, unprojected included children.
fn collect_refill(model: &Arc<Model>, rows: &[Record], plans: &[PrimaryInclude], out: &mut Refill) {
    out.push((Arc::clone(model), rows.to_vec()));

    for plan in plans.iter().filter(|p| p.attributes.is_none()) {
        let children: Vec<Record> = rows
            .iter()
            .filter_map(|row| row.get(&plan.relation).and_then(Value::as_array))
            .flatten()
            .filter_map(|child| child.as_object().cloned())
            .collect();
        if !children.is_empty() {
            collect_refill(&plan.target, &children, &plan.children, out);
        }
    }
}
