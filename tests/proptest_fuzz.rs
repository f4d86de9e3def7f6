//! Property-based tests for the filter DSL and the two backends.
//!
//! - the parsers never panic on arbitrary JSON, only return clean errors
//! - the in-memory predicate (cache side) and the SQL translation (primary
//!   side) select exactly the same rows
//!
//! Run with: `cargo test --test proptest_fuzz`

use std::collections::BTreeSet;

use proptest::prelude::*;
use serde_json::{json, Map, Value};

use dbflow::filter::sql::{SqlCondition, SqlTranslator};
use dbflow::include::parse_tokens;
use dbflow::record::{canonical_json, parse_timestamp};
use dbflow::{
    Attribute, AttributeKind, Filter, ModelDecl, ModelRegistry, Operator, PrimaryStore, Record, SqlStore,
    UpdateSpec,
};

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Arbitrary JSON values (including structures no parser expects)
fn arbitrary_json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        prop_oneof![".*", Just("$in".to_string()), Just("$sumDate".to_string()), Just("$or".to_string())]
            .prop_map(Value::String),
    ];

    leaf.prop_recursive(
        4,  // depth
        64, // max nodes
        10, // items per collection
        |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..10).prop_map(Value::Array),
                prop::collection::hash_map(
                    prop_oneof![
                        "[a-z$]{0,8}",
                        Just("$and".to_string()),
                        Just("$not".to_string()),
                        Just("$exists".to_string()),
                        Just("$nin".to_string()),
                    ],
                    inner,
                    0..10
                )
                .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        },
    )
}

/// Rows of `item`: `n` an optional small integer, `s` an optional letter.
fn rows_strategy() -> impl Strategy<Value = Vec<(Option<i64>, Option<String>)>> {
    prop::collection::vec(
        (
            prop::option::of(-3i64..=3),
            prop::option::of(prop_oneof![Just("a".to_string()), Just("b".to_string()), Just("c".to_string())]),
        ),
        0..12,
    )
}

fn int_value() -> impl Strategy<Value = Value> {
    prop_oneof![4 => (-4i64..=4).prop_map(Value::from), 1 => Just(Value::Null)]
}

fn text_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        4 => prop_oneof![Just("a"), Just("b"), Just("c"), Just("d")].prop_map(Value::from),
        1 => Just(Value::Null),
    ]
}

/// Any scalar, regardless of column: numeric strings, booleans, letters.
fn mixed_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        (-4i64..=4).prop_map(Value::from),
        prop_oneof![Just("1"), Just("-2"), Just("30"), Just("a"), Just("")].prop_map(Value::from),
        any::<bool>().prop_map(Value::Bool),
        Just(Value::Null),
    ]
}

fn int_or_mixed() -> impl Strategy<Value = Value> {
    prop_oneof![3 => int_value(), 1 => mixed_value()]
}

fn text_or_mixed() -> impl Strategy<Value = Value> {
    prop_oneof![3 => text_value(), 1 => mixed_value()]
}

/// One condition on a single field. Values mostly match the column type;
/// the rest are of any type.
fn field_filter() -> impl Strategy<Value = Filter> {
    let op = prop::sample::select(Operator::ALL.to_vec());
    prop_oneof![
        (op.clone(), int_or_mixed(), prop::collection::vec(int_or_mixed(), 0..4), any::<bool>())
            .prop_map(|(op, v, list, flag)| condition("n", op, v, list, flag)),
        (op, text_or_mixed(), prop::collection::vec(text_or_mixed(), 0..4), any::<bool>())
            .prop_map(|(op, v, list, flag)| condition("s", op, v, list, flag)),
    ]
}

fn condition(field: &str, op: Operator, value: Value, list: Vec<Value>, flag: bool) -> Filter {
    let filter = Filter::new();
    match op {
        Operator::Exists => filter.exists(field, flag),
        Operator::Eq => filter.eq(field, value),
        Operator::Gt => filter.gt(field, value),
        Operator::Gte => filter.gte(field, value),
        Operator::Lt => filter.lt(field, value),
        Operator::Lte => filter.lte(field, value),
        Operator::In => filter.is_in(field, list),
        Operator::Nin => filter.not_in(field, list),
    }
}

fn filter_strategy() -> impl Strategy<Value = Filter> {
    field_filter().prop_recursive(3, 24, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(|parts| Filter::new().and(parts)),
            prop::collection::vec(inner.clone(), 0..3).prop_map(|parts| Filter::new().or(parts)),
            inner.clone().prop_map(|f| Filter::new().not(f)),
            (inner.clone(), inner).prop_map(|(a, b)| {
                // two top-level nodes: implicit conjunction
                Filter::new().and(vec![a]).or(vec![b])
            }),
        ]
    })
}

// =============================================================================
// Parser Fuzz Tests
// =============================================================================

proptest! {
    /// Filter parsing should never panic; whatever parses can be evaluated
    /// and translated without panicking either
    #[test]
    fn fuzz_filter_parse(json in arbitrary_json_strategy(), record in arbitrary_json_strategy()) {
        if let Ok(filter) = Filter::parse(&json) {
            let record: Record = record.as_object().cloned().unwrap_or_default();
            let _ = filter.matches(&record);

            let registry = item_registry();
            let model = registry.model("item").unwrap();
            let _ = SqlTranslator::translate(&filter, model);
        }
    }

    /// Update parsing should never panic
    #[test]
    fn fuzz_update_spec_parse(json in arbitrary_json_strategy()) {
        let _ = UpdateSpec::parse(&json);
    }

    /// Include token lists are free-form; parsing never fails or panics
    #[test]
    fn fuzz_include_tokens(tokens in prop::collection::vec(arbitrary_json_strategy(), 0..8)) {
        let _ = parse_tokens(&tokens);
    }

    /// Timestamp parsing should reject garbage cleanly
    #[test]
    fn fuzz_parse_timestamp(text in ".*") {
        let _ = parse_timestamp(&text);
    }
}

// =============================================================================
// Canonical Encoding
// =============================================================================

proptest! {
    /// Key order never changes a record's cache member
    #[test]
    fn prop_canonical_json_ignores_key_order(
        entries in prop::collection::btree_map("[a-z]{1,6}", arbitrary_json_strategy(), 0..8),
    ) {
        let forward: Map<String, Value> = entries.clone().into_iter().collect();
        let mut reversed = Map::new();
        for (k, v) in entries.into_iter().rev() {
            reversed.insert(k, v);
        }
        prop_assert_eq!(
            canonical_json(&Value::Object(forward)),
            canonical_json(&Value::Object(reversed))
        );
    }
}

// =============================================================================
// Cache / Primary Equivalence
// =============================================================================

fn item_registry() -> ModelRegistry {
    ModelRegistry::register(vec![ModelDecl::new("item")
        .attribute(Attribute::new("id", AttributeKind::Integer).primary_key().auto_increment())
        .attribute(Attribute::new("n", AttributeKind::Integer))
        .attribute(Attribute::new("s", AttributeKind::Text))])
}

/// Ids selected by SQLite and by the in-memory predicate over the same rows.
fn select_both(rows: &[(Option<i64>, Option<String>)], filter: &Filter) -> (BTreeSet<i64>, BTreeSet<i64>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");

    runtime.block_on(async {
        let path = std::env::temp_dir().join(format!("dbflow_prop_{}.db", uuid::Uuid::new_v4()));
        let store = SqlStore::new(&format!("sqlite://{}?mode=rwc", path.display()))
            .await
            .expect("open sqlite");
        let registry = item_registry();
        let model = registry.model("item").unwrap();
        store.create_table(model).await.expect("create table");

        let records: Vec<Record> = rows
            .iter()
            .filter_map(|(n, s)| json!({"n": n, "s": s}).as_object().cloned())
            .collect();
        let stored = if records.is_empty() {
            Vec::new()
        } else {
            store.bulk_insert(model, &records).await.expect("insert")
        };

        let id = |r: &Record| r["id"].as_i64().unwrap_or_default();
        let in_memory = stored
            .iter()
            .filter(|r| filter.normalized(model).matches(r))
            .map(id)
            .collect();
        let condition = SqlTranslator::translate(filter, model);
        let in_sql = store
            .query(model, &condition, &[])
            .await
            .expect("query")
            .iter()
            .map(id)
            .collect();

        store.pool().close().await;
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(format!("{}-wal", path.display()));
        let _ = std::fs::remove_file(format!("{}-shm", path.display()));
        (in_memory, in_sql)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The cache and the primary store select the same rows for any filter
    #[test]
    fn prop_predicate_matches_sql(rows in rows_strategy(), filter in filter_strategy()) {
        let (in_memory, in_sql) = select_both(&rows, &filter);
        prop_assert_eq!(in_memory, in_sql, "filter: {:?}", filter);
    }
}

#[test]
fn test_null_handling_agrees_across_backends() {
    let rows = vec![(Some(1), None), (None, Some("a".to_string())), (None, None)];
    let cases = [
        Filter::new().eq("n", Value::Null),
        Filter::new().not(Filter::new().gt("n", 0)),
        Filter::new().not_in("n", [json!(null), json!(1)]),
        Filter::new().not(Filter::new().not_in("s", ["b"])),
        Filter::new().is_in("s", Vec::<Value>::new()),
    ];
    for filter in &cases {
        let (in_memory, in_sql) = select_both(&rows, filter);
        assert_eq!(in_memory, in_sql, "filter: {:?}", filter);
    }

    assert_eq!(select_both(&rows, &cases[0]).0, BTreeSet::from([2, 3]));
    assert!(SqlTranslator::translate(&cases[4], item_registry().model("item").unwrap()) == SqlCondition::False);
}

#[test]
fn test_mismatched_types_agree_across_backends() {
    let rows = vec![
        (Some(30), Some("bob".to_string())),
        (Some(1), Some("10".to_string())),
        (None, Some("a".to_string())),
    ];
    let cases = [
        Filter::parse(&json!({"n": "30"})).unwrap(),
        Filter::parse(&json!({"s": {"$gt": 5}})).unwrap(),
        Filter::parse(&json!({"n": {"$in": ["30"]}})).unwrap(),
        Filter::parse(&json!({"n": {"$nin": ["30", 1]}})).unwrap(),
        Filter::parse(&json!({"s": 10})).unwrap(),
        Filter::parse(&json!({"n": true})).unwrap(),
        Filter::parse(&json!({"$not": {"n": {"$lte": "1"}}})).unwrap(),
    ];
    for filter in &cases {
        let (in_memory, in_sql) = select_both(&rows, filter);
        assert_eq!(in_memory, in_sql, "filter: {:?}", filter);
    }

    assert!(select_both(&rows, &cases[0]).0.is_empty());
    assert_eq!(select_both(&rows, &cases[3]).1, BTreeSet::from([1]));
    assert_eq!(select_both(&rows, &cases[6]).1, BTreeSet::from([1, 2, 3]));
}
