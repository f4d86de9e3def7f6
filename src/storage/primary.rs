// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Primary store adapter: DSL filters in, native conditions out.

use super::traits::{PrimaryStore, StorageError, UpdateCounts};
use crate::correlation::Correlation;
use crate::filter::sql::SqlTranslator;
use crate::filter::update::UpdateSpec;
use crate::filter::Filter;
use crate::include::PrimaryInclude;
use crate::record::Record;
use crate::schema::Model;
use std::sync::Arc;

#[derive(Clone)]
pub struct PrimaryAdapter {
    store: Arc<dyn PrimaryStore>,
}

impl PrimaryAdapter {
    pub fn new(store: Arc<dyn PrimaryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn PrimaryStore> {
        &self.store
    }

    pub async fn query(
        &self,
        ctx: &Correlation,
        model: &Model,
        filter: &Filter,
        includes: &[PrimaryInclude],
    ) -> Result<Vec<Record>, StorageError> {
        ctx.reuse("primary_query");
        let condition = SqlTranslator::translate(filter, model);
        let rows = self.store.query(model, &condition, includes).await?;
        ctx.debug(format!("Primary: {} row(s) of '{}' matched", rows.len(), model.name()));
        Ok(rows)
    }

    /// One record is a single insert; several go in one all-or-nothing batch.
    pub async fn create(&self, ctx: &Correlation, model: &Model, records: &[Record]) -> Result<Vec<Record>, StorageError> {
        ctx.reuse("primary_create");
        let created = match records {
            [] => Vec::new(),
            [single] => vec![self.store.insert(model, single).await?],
            many => self.store.bulk_insert(model, many).await?,
        };
        ctx.info(format!("Primary: created {} row(s) in '{}'", created.len(), model.name()));
        Ok(created)
    }

    pub async fn update(
        &self,
        ctx: &Correlation,
        model: &Model,
        spec: &UpdateSpec,
        filter: &Filter,
    ) -> Result<UpdateCounts, StorageError> {
        ctx.reuse("primary_update");
        let condition = SqlTranslator::translate(filter, model);
        let counts = self.store.update(model, spec, &condition).await?;
        ctx.info(format!(
            "Primary: updated {} / {} row(s) of '{}'",
            counts.updated,
            counts.found,
            model.name()
        ));
        Ok(counts)
    }

    pub async fn destroy(&self, ctx: &Correlation, model: &Model, filter: &Filter) -> Result<u64, StorageError> {
        ctx.reuse("primary_destroy");
        self.store.destroy(model, &SqlTranslator::translate(filter, model)).await
    }
}
