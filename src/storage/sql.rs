// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL primary store (SQLite or Postgres through the sqlx `Any` driver).
//!
//! One table per model, one column per attribute:
//!
//! | attribute kind | column type        | notes                          |
//! |----------------|--------------------|--------------------------------|
//! | integer        | `BIGINT`           | `BIGSERIAL` / `AUTOINCREMENT` for auto-increment keys |
//! | float          | `DOUBLE PRECISION` |                                |
//! | text           | `TEXT`             |                                |
//! | boolean        | `BOOLEAN`          | SQLite stores 0/1              |
//! | date           | `BIGINT`           | epoch milliseconds, UTC        |
//! | json           | `TEXT`             | canonical JSON                 |
//!
//! Rows come back as [`Record`]s with dates as RFC 3339 strings.
//!
//! Included relations are batch loaded: one `IN (...)` query per relation
//! per level, issued concurrently for sibling relations.
//!
//! ## Retry policy
//!
//! Reads and deletes are retried on transient errors (I/O, pool timeouts).
//! Inserts and updates run once; retrying a write whose reply was lost could
//! apply it twice.

use super::traits::{PrimaryStore, StorageError, UpdateCounts};
use crate::filter::sql::{quote_ident, Dialect, SqlCondition, SqlParam, SqlWriter};
use crate::filter::update::UpdateSpec;
use crate::include::{join_children, PrimaryInclude};
use crate::record::{from_epoch_millis, Record};
use crate::resilience::retry::{retry, retry_when, RetryConfig};
use crate::schema::{AttributeKind, Model};
use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use serde_json::Value;
use sqlx::any::{AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyPool, Row};
use std::sync::Once;
use std::time::Duration;
use tracing::{debug, info};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

fn backend(context: &'static str) -> impl Fn(sqlx::Error) -> StorageError {
    move |e| StorageError::Backend(format!("{context}: {e}"))
}

fn is_transient(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed
    )
}

fn bind_params<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    params: &[SqlParam],
) -> Query<'q, Any, AnyArguments<'q>> {
    for param in params {
        query = match param {
            SqlParam::Bool(b) => query.bind(*b),
            SqlParam::Int(i) => query.bind(*i),
            SqlParam::Float(f) => query.bind(*f),
            SqlParam::Text(s) => query.bind(s.clone()),
        };
    }
    query
}

pub struct SqlStore {
    pool: AnyPool,
    dialect: Dialect,
}

impl SqlStore {
    /// Connect with the default pool size (10).
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        Self::with_max_connections(connection_string, 10).await
    }

    pub async fn with_max_connections(connection_string: &str, max_connections: u32) -> Result<Self, StorageError> {
        install_drivers();

        let dialect = Dialect::from_url(connection_string)
            .ok_or_else(|| StorageError::UnsupportedDialect(connection_string.to_string()))?;

        let pool = retry("sql_connect", &RetryConfig::connect(), || async {
            AnyPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(300))
                .connect(connection_string)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        let store = Self { pool, dialect };

        if dialect == Dialect::Sqlite {
            store.enable_wal_mode().await?;
        }

        Ok(store)
    }

    /// Get a clone of the connection pool.
    pub fn pool(&self) -> AnyPool {
        self.pool.clone()
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Readers don't block the writer; lets concurrent cascades proceed.
    async fn enable_wal_mode(&self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(backend("Failed to enable WAL mode"))?;
        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await
            .map_err(backend("Failed to set synchronous mode"))?;
        Ok(())
    }

    /// `CREATE TABLE IF NOT EXISTS` for one model. Not a migration: an
    /// existing table is left as it is.
    pub async fn create_table(&self, model: &Model) -> Result<(), StorageError> {
        let sql = create_table_sql(model, self.dialect);
        debug!(model = %model.name(), sql = %sql, "Creating table");
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(backend("Failed to create table"))?;
        Ok(())
    }

    pub async fn create_tables<'a>(&self, models: impl IntoIterator<Item = &'a Model>) -> Result<(), StorageError> {
        let mut count = 0;
        for model in models {
            self.create_table(model).await?;
            count += 1;
        }
        info!(count, "Tables ensured");
        Ok(())
    }

    fn column_list(model: &Model) -> String {
        model
            .attributes()
            .iter()
            .map(|a| quote_ident(&a.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn select_sql(&self, model: &Model, condition: &SqlCondition) -> (String, Vec<SqlParam>) {
        let query = condition.to_sql(self.dialect);
        let mut sql = format!(
            "SELECT {} FROM {} WHERE {}",
            Self::column_list(model),
            quote_ident(model.name()),
            query.clause
        );
        if let Some(pk) = model.primary_key() {
            sql.push_str(&format!(" ORDER BY {}", quote_ident(&pk.name)));
        }
        (sql, query.params)
    }

    fn insert_sql(&self, model: &Model, record: &Record) -> (String, Vec<SqlParam>) {
        let mut writer = SqlWriter::new(self.dialect);
        let mut columns = Vec::new();
        let mut placeholders = Vec::new();
        for attr in model.attributes() {
            let Some(value) = record.get(&attr.name) else { continue };
            if let Some(param) = SqlParam::from_value(value, Some(attr.kind)) {
                columns.push(quote_ident(&attr.name));
                placeholders.push(writer.push(param));
            }
        }
        let table = quote_ident(model.name());
        let returning = Self::column_list(model);
        let sql = if columns.is_empty() {
            format!("INSERT INTO {table} DEFAULT VALUES RETURNING {returning}")
        } else {
            format!(
                "INSERT INTO {table} ({}) VALUES ({}) RETURNING {returning}",
                columns.join(", "),
                placeholders.join(", ")
            )
        };
        (sql, writer.into_params())
    }

    /// Plain rows, no includes.
    async fn fetch(&self, model: &Model, condition: &SqlCondition) -> Result<Vec<Record>, StorageError> {
        if *condition == SqlCondition::False {
            return Ok(Vec::new());
        }
        let (sql, params) = self.select_sql(model, condition);
        debug!(model = %model.name(), sql = %sql, "SQL select");

        let rows = retry_when(
            "sql_select",
            &RetryConfig::command(),
            || bind_params(sqlx::query(&sql), &params).fetch_all(&self.pool),
            is_transient,
        )
        .await
        .map_err(backend("Select failed"))?;

        rows.iter().map(|row| decode_row(row, model)).collect()
    }

    /// Load `includes` for `parents` and join them in.
    fn attach_includes<'a>(
        &'a self,
        parents: Vec<Record>,
        includes: &'a [PrimaryInclude],
    ) -> BoxFuture<'a, Result<Vec<Record>, StorageError>> {
        Box::pin(async move {
            if includes.is_empty() || parents.is_empty() {
                return Ok(parents);
            }

            let loads = includes.iter().map(|include| {
                let keys = join_keys(&parents, include);
                self.load_children(include, keys)
            });
            let children = join_all(loads).await.into_iter().collect::<Result<Vec<_>, _>>()?;

            Ok(join_children(parents, includes, children))
        })
    }

    async fn load_children(&self, include: &PrimaryInclude, keys: Vec<SqlParam>) -> Result<Vec<Record>, StorageError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let condition = SqlCondition::all([
            include.filter.clone(),
            SqlCondition::InList {
                column: include.other_key.clone(),
                values: keys,
                negated: false,
            },
        ]);
        let rows = self.fetch(&include.target, &condition).await?;
        self.attach_includes(rows, &include.children).await
    }

    async fn update_fixed(
        &self,
        model: &Model,
        spec: &UpdateSpec,
        condition: &SqlCondition,
    ) -> Result<UpdateCounts, StorageError> {
        let table = quote_ident(model.name());
        let count = condition.to_sql(self.dialect);
        let count_sql = format!("SELECT COUNT(*) FROM {table} WHERE {}", count.clause);

        let mut writer = SqlWriter::new(self.dialect);
        let assignments = spec.to_sql(model, &mut writer)?;
        let clause = condition.render(&mut writer);
        let update_sql = format!("UPDATE {table} SET {assignments} WHERE {clause}");
        debug!(model = %model.name(), sql = %update_sql, "SQL update");

        let mut tx = self.pool.begin().await.map_err(backend("Failed to begin transaction"))?;
        let found: i64 = bind_params(sqlx::query(&count_sql), &count.params)
            .fetch_one(&mut *tx)
            .await
            .and_then(|row| row.try_get(0))
            .map_err(backend("Count failed"))?;
        let updated = bind_params(sqlx::query(&update_sql), writer.params())
            .execute(&mut *tx)
            .await
            .map_err(backend("Update failed"))?
            .rows_affected();
        tx.commit().await.map_err(backend("Commit failed"))?;

        Ok(UpdateCounts::new(found.max(0) as u64, updated))
    }

    /// Month / year arithmetic: compute each row in Rust, write back by key.
    async fn update_by_row(
        &self,
        model: &Model,
        spec: &UpdateSpec,
        condition: &SqlCondition,
    ) -> Result<UpdateCounts, StorageError> {
        let pk = model.primary_key().ok_or_else(|| {
            StorageError::Backend(format!(
                "'{}' has no primary key; calendar date arithmetic needs one",
                model.name()
            ))
        })?;
        let rows = self.fetch(model, condition).await?;
        let table = quote_ident(model.name());

        let mut tx = self.pool.begin().await.map_err(backend("Failed to begin transaction"))?;
        let mut updated = 0;
        for row in &rows {
            let mut next = row.clone();
            spec.apply(&mut next, model)?;

            let literal = spec
                .fields()
                .iter()
                .fold(UpdateSpec::new(), |acc, (name, _)| {
                    acc.set(name, next.get(name).cloned().unwrap_or(Value::Null))
                });
            let mut writer = SqlWriter::new(self.dialect);
            let assignments = literal.to_sql(model, &mut writer)?;
            let key = row.get(&pk.name).and_then(|v| SqlParam::from_value(v, Some(pk.kind)));
            let Some(key) = key else { continue };
            let placeholder = writer.push(key);
            let sql = format!(
                "UPDATE {table} SET {assignments} WHERE {} = {placeholder}",
                quote_ident(&pk.name)
            );
            updated += bind_params(sqlx::query(&sql), writer.params())
                .execute(&mut *tx)
                .await
                .map_err(backend("Update failed"))?
                .rows_affected();
        }
        tx.commit().await.map_err(backend("Commit failed"))?;

        Ok(UpdateCounts::new(rows.len() as u64, updated))
    }
}

fn create_table_sql(model: &Model, dialect: Dialect) -> String {
    let columns: Vec<String> = model
        .attributes()
        .iter()
        .map(|attr| {
            let name = quote_ident(&attr.name);
            let column_type = match attr.kind {
                AttributeKind::Integer | AttributeKind::Date => "BIGINT",
                AttributeKind::Float => "DOUBLE PRECISION",
                AttributeKind::Text | AttributeKind::Json => "TEXT",
                AttributeKind::Boolean => "BOOLEAN",
            };
            match (attr.primary_key, attr.auto_increment && attr.kind == AttributeKind::Integer, dialect) {
                (true, true, Dialect::Sqlite) => format!("{name} INTEGER PRIMARY KEY AUTOINCREMENT"),
                (true, true, Dialect::Postgres) => format!("{name} BIGSERIAL PRIMARY KEY"),
                (true, false, _) => format!("{name} {column_type} PRIMARY KEY"),
                (false, _, _) => format!("{name} {column_type}"),
            }
        })
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(model.name()),
        columns.join(", ")
    )
}

/// Distinct, non-null parent key values, typed for the child's column.
fn join_keys(parents: &[Record], include: &PrimaryInclude) -> Vec<SqlParam> {
    let kind = include.target.kind_of(&include.other_key);
    let mut keys: Vec<SqlParam> = Vec::new();
    for parent in parents {
        let Some(param) = parent
            .get(&include.this_key)
            .and_then(|v| SqlParam::from_value(v, kind))
        else {
            continue;
        };
        if !keys.contains(&param) {
            keys.push(param);
        }
    }
    keys
}

fn decode_row(row: &AnyRow, model: &Model) -> Result<Record, StorageError> {
    let mut record = Record::new();
    for attr in model.attributes() {
        let name = attr.name.as_str();
        let value = match attr.kind {
            AttributeKind::Integer => decode_number(row, name, false),
            AttributeKind::Float => decode_number(row, name, true),
            AttributeKind::Text => decode_text(row, name).map(|v| v.map(Value::String)),
            AttributeKind::Boolean => match row.try_get::<Option<bool>, _>(name) {
                Ok(v) => Ok(v.map(Value::Bool)),
                // SQLite hands booleans back as integers
                Err(_) => row
                    .try_get::<Option<i64>, _>(name)
                    .map(|v| v.map(|i| Value::Bool(i != 0))),
            },
            AttributeKind::Date => row
                .try_get::<Option<i64>, _>(name)
                .map(|v| v.map(from_epoch_millis)),
            AttributeKind::Json => decode_text(row, name)
                .map(|v| v.map(|text| serde_json::from_str(&text).unwrap_or(Value::String(text)))),
        }
        .map_err(|e| StorageError::Serialization(format!("column '{}.{}': {}", model.name(), name, e)))?;
        record.insert(attr.name.clone(), value.unwrap_or(Value::Null));
    }
    Ok(record)
}

fn decode_number(row: &AnyRow, name: &str, prefer_float: bool) -> Result<Option<Value>, sqlx::Error> {
    let as_int = || row.try_get::<Option<i64>, _>(name).map(|v| v.map(Value::from));
    let as_float = || row.try_get::<Option<f64>, _>(name).map(|v| v.map(Value::from));
    if prefer_float {
        as_float().or_else(|_| as_int())
    } else {
        as_int().or_else(|_| as_float())
    }
}

/// TEXT may arrive as bytes depending on the driver.
fn decode_text(row: &AnyRow, name: &str) -> Result<Option<String>, sqlx::Error> {
    match row.try_get::<Option<String>, _>(name) {
        Ok(v) => Ok(v),
        Err(_) => row
            .try_get::<Option<Vec<u8>>, _>(name)
            .map(|v| v.map(|bytes| String::from_utf8_lossy(&bytes).into_owned())),
    }
}

#[async_trait]
impl PrimaryStore for SqlStore {
    async fn query(
        &self,
        model: &Model,
        condition: &SqlCondition,
        includes: &[PrimaryInclude],
    ) -> Result<Vec<Record>, StorageError> {
        let rows = self.fetch(model, condition).await?;
        self.attach_includes(rows, includes).await
    }

    async fn insert(&self, model: &Model, record: &Record) -> Result<Record, StorageError> {
        let (sql, params) = self.insert_sql(model, record);
        debug!(model = %model.name(), sql = %sql, "SQL insert");
        let row = bind_params(sqlx::query(&sql), &params)
            .fetch_one(&self.pool)
            .await
            .map_err(backend("Insert failed"))?;
        decode_row(&row, model)
    }

    async fn bulk_insert(&self, model: &Model, records: &[Record]) -> Result<Vec<Record>, StorageError> {
        let mut tx = self.pool.begin().await.map_err(backend("Failed to begin transaction"))?;
        let mut created = Vec::with_capacity(records.len());
        for record in records {
            let (sql, params) = self.insert_sql(model, record);
            let row = bind_params(sqlx::query(&sql), &params)
                .fetch_one(&mut *tx)
                .await
                .map_err(backend("Bulk insert failed"))?;
            created.push(decode_row(&row, model)?);
        }
        tx.commit().await.map_err(backend("Commit failed"))?;
        debug!(model = %model.name(), count = created.len(), "SQL bulk insert");
        Ok(created)
    }

    async fn update(
        &self,
        model: &Model,
        spec: &UpdateSpec,
        condition: &SqlCondition,
    ) -> Result<UpdateCounts, StorageError> {
        if spec.has_calendar_units() {
            self.update_by_row(model, spec, condition).await
        } else {
            self.update_fixed(model, spec, condition).await
        }
    }

    async fn destroy(&self, model: &Model, condition: &SqlCondition) -> Result<u64, StorageError> {
        let query = condition.to_sql(self.dialect);
        let sql = format!("DELETE FROM {} WHERE {}", quote_ident(model.name()), query.clause);
        debug!(model = %model.name(), sql = %sql, "SQL delete");

        let result = retry_when(
            "sql_delete",
            &RetryConfig::command(),
            || bind_params(sqlx::query(&sql), &query.params).execute(&self.pool),
            is_transient,
        )
        .await
        .map_err(backend("Delete failed"))?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::sql::SqlTranslator;
    use crate::filter::Filter;
    use crate::include::{resolve, Include, PrimaryShape};
    use crate::schema::{Attribute, ModelDecl, ModelRegistry, RelationDecl};
    use serde_json::json;
    use std::path::PathBuf;

    fn temp_db_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("dbflow_sql_test_{}_{}.db", name, std::process::id()))
    }

    /// Clean up SQLite database and its WAL files
    fn cleanup_db(path: &PathBuf) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(format!("{}-wal", path.display()));
        let _ = std::fs::remove_file(format!("{}-shm", path.display()));
    }

    fn registry() -> ModelRegistry {
        ModelRegistry::register(vec![
            ModelDecl::new("user")
                .attribute(Attribute::new("id", AttributeKind::Integer).primary_key().auto_increment())
                .attribute(Attribute::new("name", AttributeKind::Text))
                .attribute(Attribute::new("active", AttributeKind::Boolean))
                .attribute(Attribute::new("score", AttributeKind::Float))
                .attribute(Attribute::new("prefs", AttributeKind::Json))
                .attribute(Attribute::new("joinedAt", AttributeKind::Date))
                .relation("post", RelationDecl::new("hasMany", "id", "userId")),
            ModelDecl::new("post")
                .attribute(Attribute::new("id", AttributeKind::Integer).primary_key().auto_increment())
                .attribute(Attribute::new("userId", AttributeKind::Integer))
                .attribute(Attribute::new("title", AttributeKind::Text)),
        ])
    }

    async fn open(name: &str, registry: &ModelRegistry) -> (SqlStore, PathBuf) {
        let db_path = temp_db_path(name);
        cleanup_db(&db_path);
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let store = SqlStore::new(&url).await.unwrap();
        store.create_tables(registry.models().map(|m| m.as_ref())).await.unwrap();
        (store, db_path)
    }

    fn rec(value: Value) -> Record {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_insert_returns_generated_key_and_typed_values() {
        let registry = registry();
        let (store, path) = open("insert", &registry).await;
        let user = registry.model("user").unwrap();

        let created = store
            .insert(
                user,
                &rec(json!({
                    "name": "alice",
                    "active": true,
                    "score": 1.5,
                    "prefs": {"theme": "dark"},
                    "joinedAt": "2024-05-01T10:00:00+02:00",
                    "post": [{"title": "ignored"}]
                })),
            )
            .await
            .unwrap();

        assert_eq!(
            Value::Object(created),
            json!({
                "id": 1,
                "name": "alice",
                "active": true,
                "score": 1.5,
                "prefs": {"theme": "dark"},
                "joinedAt": "2024-05-01T08:00:00.000Z"
            })
        );
        cleanup_db(&path);
    }

    #[tokio::test]
    async fn test_query_with_filter_and_include() {
        let registry = registry();
        let (store, path) = open("include", &registry).await;
        let user = registry.model("user").unwrap();
        let post = registry.model("post").unwrap();

        store
            .bulk_insert(user, &[rec(json!({"name": "a"})), rec(json!({"name": "b"}))])
            .await
            .unwrap();
        store
            .bulk_insert(
                post,
                &[
                    rec(json!({"userId": 1, "title": "one"})),
                    rec(json!({"userId": 1, "title": "two"})),
                ],
            )
            .await
            .unwrap();

        let includes = resolve::<PrimaryShape>(&registry, "user", &[Include::new("post").attributes(["title"])]);
        let rows = store.query(user, &SqlCondition::True, &includes).await.unwrap();

        // required relation: user "b" has no posts and is dropped
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], json!("a"));
        assert_eq!(rows[0]["post"], json!([{"title": "one"}, {"title": "two"}]));

        let filtered = SqlTranslator::translate(&Filter::new().eq("title", "two"), post);
        assert_eq!(store.query(post, &filtered, &[]).await.unwrap().len(), 1);
        cleanup_db(&path);
    }

    #[tokio::test]
    async fn test_update_counts_and_destroy() {
        let registry = registry();
        let (store, path) = open("update", &registry).await;
        let user = registry.model("user").unwrap();
        store
            .bulk_insert(user, &[rec(json!({"name": "a"})), rec(json!({"name": "b"}))])
            .await
            .unwrap();

        let spec = UpdateSpec::parse(&json!({"name": "z"})).unwrap();
        let cond = SqlTranslator::translate(&Filter::new().eq("id", 1), user);
        assert_eq!(store.update(user, &spec, &cond).await.unwrap(), UpdateCounts::new(1, 1));

        let none = SqlTranslator::translate(&Filter::new().eq("id", 99), user);
        assert_eq!(store.update(user, &spec, &none).await.unwrap(), UpdateCounts::new(0, 0));

        assert_eq!(store.destroy(user, &SqlCondition::True).await.unwrap(), 2);
        assert_eq!(store.destroy(user, &SqlCondition::True).await.unwrap(), 0);
        cleanup_db(&path);
    }

    #[tokio::test]
    async fn test_calendar_update_runs_row_wise() {
        let registry = registry();
        let (store, path) = open("calendar", &registry).await;
        let user = registry.model("user").unwrap();
        store
            .insert(user, &rec(json!({"name": "a", "joinedAt": "2024-01-31T00:00:00Z"})))
            .await
            .unwrap();

        let spec = UpdateSpec::parse(&json!({
            "joinedAt": {"$sumDate": {"date": "joinedAt", "number": 1, "unit": "month"}}
        }))
        .unwrap();
        let counts = store.update(user, &spec, &SqlCondition::True).await.unwrap();
        assert_eq!(counts, UpdateCounts::new(1, 1));

        let rows = store.query(user, &SqlCondition::True, &[]).await.unwrap();
        assert_eq!(rows[0]["joinedAt"], json!("2024-02-29T00:00:00.000Z"));
        cleanup_db(&path);
    }

    #[tokio::test]
    async fn test_bulk_insert_is_all_or_nothing() {
        let registry = registry();
        let (store, path) = open("bulk", &registry).await;
        let user = registry.model("user").unwrap();

        let result = store
            .bulk_insert(user, &[rec(json!({"id": 7, "name": "a"})), rec(json!({"id": 7, "name": "dup"}))])
            .await;
        assert!(result.is_err());
        assert!(store.query(user, &SqlCondition::True, &[]).await.unwrap().is_empty());
        cleanup_db(&path);
    }

    #[tokio::test]
    async fn test_unsupported_dialect() {
        assert!(matches!(
            SqlStore::new("mysql://localhost/db").await,
            Err(StorageError::UnsupportedDialect(_))
        ));
    }

    #[test]
    fn test_create_table_sql_per_dialect() {
        let registry = registry();
        let post = registry.model("post").unwrap();
        assert_eq!(
            create_table_sql(post, Dialect::Sqlite),
            "CREATE TABLE IF NOT EXISTS \"post\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT, \"userId\" BIGINT, \"title\" TEXT)"
        );
        assert_eq!(
            create_table_sql(post, Dialect::Postgres),
            "CREATE TABLE IF NOT EXISTS \"post\" (\"id\" BIGSERIAL PRIMARY KEY, \"userId\" BIGINT, \"title\" TEXT)"
        );
    }
}
