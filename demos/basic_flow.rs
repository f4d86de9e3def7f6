// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic dbflow usage example.
//!
//! Demonstrates:
//! 1. Declaring models with a `hasMany` relation
//! 2. Connecting Redis (cache) and SQLite (primary store)
//! 3. Saving records and reading them back through the cache
//! 4. A cache miss falling back to the primary store
//! 5. A `$sumDate` update applied to both stores
//! 6. A cascading delete
//! 7. Displaying the recorded metrics
//!
//! # Prerequisites
//!
//! A local Redis:
//! ```bash
//! docker run --rm -p 6379:6379 redis:7-alpine
//! ```
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_flow
//! ```

use std::sync::Arc;
use std::time::Instant;

use dbflow::{
    Attribute, AttributeKind, Attributes, Filter, Flow, FlowConfig, Include, ModelDecl, ModelRegistry,
    RelationDecl,
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "dbflow=info".into()),
        )
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                dbflow: Basic Usage Example                    ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Declare models
    // ─────────────────────────────────────────────────────────────────────────
    let registry = Arc::new(ModelRegistry::register(vec![
        ModelDecl::new("user")
            .attribute(Attribute::new("id", AttributeKind::Integer).primary_key().auto_increment())
            .attribute(Attribute::new("name", AttributeKind::Text))
            .attribute(Attribute::new("age", AttributeKind::Integer))
            .relation("posts", RelationDecl::new("hasMany", "id", "userId").target("post").optional()),
        ModelDecl::new("post")
            .attribute(Attribute::new("id", AttributeKind::Integer).primary_key().auto_increment())
            .attribute(Attribute::new("userId", AttributeKind::Integer))
            .attribute(Attribute::new("title", AttributeKind::Text))
            .attribute(Attribute::new("publishAt", AttributeKind::Date)),
    ]));
    println!("📦 Registered {} models", registry.models().count());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Connect
    // ─────────────────────────────────────────────────────────────────────────
    let db_path = std::env::temp_dir().join(format!("dbflow_demo_{}.db", uuid::Uuid::new_v4()));
    let config = FlowConfig {
        redis_url: Some(std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into())),
        redis_key_prefix: format!("demo:{}:", uuid::Uuid::new_v4()),
        sql_url: Some(format!("sqlite://{}?mode=rwc", db_path.display())),
        create_tables: true,
        background_repopulation: false,
        ..Default::default()
    };

    println!("\n🚀 Connecting...");
    let flow = Flow::connect(config, registry).await?;
    println!("   ✅ Connected");

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Save and read back
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Saving users and posts...");
    let users = flow
        .save_json("user", &json!([{"name": "alice", "age": 34}, {"name": "bob", "age": 17}]))
        .await;
    println!("   └─ users: {}", serde_json::to_string(&users)?);

    let alice = users.records.as_ref().and_then(|r| r.first()).map(|r| r["id"].clone());
    let posts = flow
        .save_json(
            "post",
            &json!([
                {"userId": alice, "title": "hello", "publishAt": "2025-01-10T09:00:00Z"},
                {"userId": alice, "title": "again", "publishAt": "2025-02-01T09:00:00Z"},
            ]),
        )
        .await;
    println!("   └─ posts: primary={} cache={}", posts.primary, posts.cache);

    println!("\n🔍 Adults with their posts (served by the cache)...");
    let start = Instant::now();
    let adults = flow
        .get(
            "user",
            &Filter::new().gte("age", 18),
            &Attributes::only(["name"]),
            &[Include::new("posts").attributes(["title", "publishAt"])],
        )
        .await;
    println!("   └─ {} ({:?})", serde_json::to_string(&adults)?, start.elapsed());

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Cache miss
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔍 Searching for someone not in the cache...");
    let start = Instant::now();
    let nobody = flow.get_json("user", &json!({"name": "carol"}), &Attributes::All, &[]).await;
    println!("   └─ {:?} ({:?}, fell back to the primary store)", nobody, start.elapsed());

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Update
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n✏️  Postponing alice's posts by one month...");
    let report = flow
        .update_json(
            "post",
            &json!({"publishAt": {"$sumDate": {"date": "publishAt", "number": 1, "unit": "month"}}}),
            &json!({"userId": alice}),
        )
        .await;
    println!("   └─ {}", serde_json::to_string(&report)?);

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Cascading delete
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🗑️  Deleting alice (and her posts)...");
    let deleted = flow.delete_json("user", &json!({"name": "alice"})).await;
    println!("   └─ {}", serde_json::to_string(&deleted)?);
    let left = flow.get_json("post", &json!({}), &Attributes::All, &[]).await;
    println!("   └─ posts left: {}", left.map(|p| p.len()).unwrap_or_default());

    // ─────────────────────────────────────────────────────────────────────────
    // 7. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Metrics:");
    dump_metrics(&snapshotter);

    let _ = std::fs::remove_file(&db_path);
    println!("\n✅ Done\n");
    Ok(())
}

/// Print every captured metric, grouped by kind
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut counters = Vec::new();
    let mut gauges = Vec::new();
    let mut histograms = Vec::new();

    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let labels = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };
        let name = format!("{}{}", key.name(), labels);

        match value {
            DebugValue::Counter(v) => counters.push((name, v)),
            DebugValue::Gauge(v) => gauges.push((name, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                histograms.push((name, count, if count > 0 { sum / count as f64 } else { 0.0 }));
            }
        }
    }

    counters.sort();
    gauges.sort_by(|a, b| a.0.cmp(&b.0));
    histograms.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, value) in &counters {
        println!("   │  {} = {}", name, value);
    }
    for (name, value) in &gauges {
        println!("   │  {} = {:.0}", name, value);
    }
    for (name, count, avg) in &histograms {
        println!("   │  {} count={} avg={:.4}s", name, count, avg);
    }
    if counters.is_empty() && gauges.is_empty() && histograms.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
}
