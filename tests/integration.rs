//! Integration tests against real backends (Redis, Postgres).
//!
//! Containers come from testcontainers, so no docker-compose is required.
//!
//! # Running Tests
//! ```bash
//! # Run all integration tests (requires Docker)
//! cargo test --test integration -- --ignored
//!
//! # Run only happy-path tests
//! cargo test --test integration happy -- --ignored
//! ```
//!
//! # Test Organization
//! - `happy_*` - normal operation through real Redis / Postgres
//! - `failure_*` - unreachable backends

use std::sync::Arc;

use serde_json::json;

use dbflow::storage::traits::SetStore;
use dbflow::{
    Attribute, AttributeKind, Attributes, Filter, Flow, FlowConfig, Include, ModelDecl, ModelRegistry, Outcome,
    RedisSetStore, RelationDecl, SqlConnection, StorageError, UpdateCounts, UpdateSpec,
};

use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage};

// =============================================================================
// Container Helpers
// =============================================================================

/// Create a Redis container with health check
fn redis_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(6379)
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"));
    docker.run(image)
}

/// Create a Postgres container (takes a few seconds to be ready)
fn postgres_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("postgres", "16-alpine")
        .with_env_var("POSTGRES_USER", "test")
        .with_env_var("POSTGRES_PASSWORD", "test")
        .with_env_var("POSTGRES_DB", "test")
        .with_exposed_port(5432)
        .with_wait_for(WaitFor::message_on_stderr("database system is ready to accept connections"));
    docker.run(image)
}

fn registry() -> Arc<ModelRegistry> {
    Arc::new(ModelRegistry::register(vec![
        ModelDecl::new("author")
            .attribute(Attribute::new("id", AttributeKind::Integer).primary_key().auto_increment())
            .attribute(Attribute::new("name", AttributeKind::Text))
            .relation("books", RelationDecl::new("hasMany", "id", "authorId").target("book").optional()),
        ModelDecl::new("book")
            .attribute(Attribute::new("id", AttributeKind::Integer).primary_key().auto_increment())
            .attribute(Attribute::new("authorId", AttributeKind::Integer))
            .attribute(Attribute::new("title", AttributeKind::Text))
            .attribute(Attribute::new("published", AttributeKind::Date)),
    ]))
}

fn sqlite_url(name: &str) -> String {
    let path = std::env::temp_dir().join(format!("dbflow_it_{}_{}.db", name, uuid::Uuid::new_v4()));
    format!("sqlite://{}?mode=rwc", path.display())
}

async fn exercise(flow: &Flow) {
    let saved = flow.save_json("author", &json!([{"name": "le guin"}, {"name": "banks"}])).await;
    assert_eq!((saved.primary, saved.cache), (Outcome::Done, Outcome::Done));
    let authors = saved.records.unwrap();
    let le_guin = authors[0]["id"].clone();

    let books = flow
        .save_json(
            "book",
            &json!([
                {"authorId": le_guin.clone(), "title": "the dispossessed", "published": "1974-05-01T00:00:00Z"},
                {"authorId": le_guin.clone(), "title": "lathe of heaven", "published": "1971-03-01T00:00:00Z"},
            ]),
        )
        .await;
    assert_eq!(books.cache, Outcome::Done);

    let with_books = flow
        .get(
            "author",
            &Filter::new().eq("id", le_guin.clone()),
            &Attributes::only(["name"]),
            &[Include::new("books").filter(Filter::new().lt("published", "1972-01-01T00:00:00Z"))],
        )
        .await
        .expect("get succeeds");
    assert_eq!(with_books.len(), 1);
    assert_eq!(with_books[0]["books"][0]["title"], json!("lathe of heaven"));

    let updated = flow
        .update(
            "book",
            &UpdateSpec::new().set("title", "the lathe of heaven"),
            &Filter::new().eq("title", "lathe of heaven"),
        )
        .await;
    assert_eq!(updated.primary, Some(UpdateCounts::new(1, 1)));
    assert_eq!(updated.cache, Some(UpdateCounts::new(1, 1)));

    let deleted = flow.delete("author", &Filter::new().eq("id", le_guin.clone())).await;
    assert_eq!((deleted.primary, deleted.cache), (Outcome::Done, Outcome::Done));

    let orphans = flow
        .get("book", &Filter::new().eq("authorId", le_guin), &Attributes::All, &[])
        .await;
    assert_eq!(orphans, Some(Vec::new()));
}

// =============================================================================
// Happy Path Tests
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_redis_set_commands() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let url = format!("redis://127.0.0.1:{}", redis.get_host_port_ipv4(6379));

    let store = RedisSetStore::with_prefix(&url, Some("it:")).await.expect("connect");
    let members = vec!["{\"a\":1}".to_string(), "{\"a\":2}".to_string()];

    assert_eq!(store.add_members("thing", &members).await.unwrap(), 2);
    assert_eq!(store.add_members("thing", &members[..1]).await.unwrap(), 0);
    assert_eq!(store.remove_members("thing", &members[1..]).await.unwrap(), 1);
    assert_eq!(store.list_members("thing").await.unwrap(), vec!["{\"a\":1}".to_string()]);
    assert!(store.list_members("nothing").await.unwrap().is_empty());

    // prefix namespaces the sets
    let other = RedisSetStore::new(&url).await.expect("connect");
    assert!(other.list_members("thing").await.unwrap().is_empty());
    assert_eq!(other.list_members("it:thing").await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_full_flow_redis_and_sqlite() {
    let docker = Cli::default();
    let redis = redis_container(&docker);

    let config = FlowConfig {
        redis_url: Some(format!("redis://127.0.0.1:{}", redis.get_host_port_ipv4(6379))),
        redis_key_prefix: "flow:".into(),
        sql_url: Some(sqlite_url("full")),
        create_tables: true,
        background_repopulation: false,
        ..Default::default()
    };
    let flow = Flow::connect(config, registry()).await.expect("connect");
    exercise(&flow).await;
}

#[tokio::test]
#[ignore] // Requires Docker, Postgres startup takes a few seconds
async fn happy_full_flow_redis_and_postgres() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let postgres = postgres_container(&docker);

    let config = FlowConfig {
        redis_url: Some(format!("redis://127.0.0.1:{}", redis.get_host_port_ipv4(6379))),
        sql_connection: Some(SqlConnection {
            user: "test".into(),
            pass: "test".into(),
            host: "127.0.0.1".into(),
            port: postgres.get_host_port_ipv4(5432),
            database: "test".into(),
        }),
        create_tables: true,
        ..Default::default()
    };
    let flow = Flow::connect(config, registry()).await.expect("connect");
    exercise(&flow).await;
}

// =============================================================================
// Failure Scenario Tests
// =============================================================================

#[tokio::test]
#[ignore] // Slow: waits out the connect retries
async fn failure_redis_unreachable_at_connect() {
    let config = FlowConfig {
        redis_url: Some("redis://127.0.0.1:1".into()),
        sql_url: Some(sqlite_url("unreachable")),
        ..Default::default()
    };
    let result = Flow::connect(config, registry()).await;
    assert!(matches!(result, Err(StorageError::Backend(_))));
}

#[tokio::test]
async fn failure_missing_urls_are_config_errors() {
    let no_redis = FlowConfig {
        sql_url: Some(sqlite_url("no_redis")),
        ..Default::default()
    };
    assert!(matches!(
        Flow::connect(no_redis, registry()).await,
        Err(StorageError::Config(_))
    ));

    let no_sql = FlowConfig {
        redis_url: Some("redis://127.0.0.1:6379".into()),
        ..Default::default()
    };
    assert!(matches!(Flow::connect(no_sql, registry()).await, Err(StorageError::Config(_))));
}
