//! End-to-end scenarios against a real MongoDB cluster.
//!
//! Requires a reachable MongoDB at `MODB_TEST_URL` (falls back to
//! `mongodb://localhost:27017/modb_test`). Every test is `#[ignore]`d by
//! default, matching `ouroboros-postgres`'s `DATABASE_URL`/`--ignored`
//! convention — run with `cargo test -- --ignored` against a live cluster.

use std::collections::HashSet;

use bson::{doc, oid::ObjectId, Bson};

use modb_engine::connection::PoolConfig;
use modb_engine::{converter, descriptor, ops, schema, security, validator};

fn test_url() -> String {
    std::env::var("MODB_TEST_URL").unwrap_or_else(|_| "mongodb://localhost:27017/modb_test".to_string())
}

async fn connect() -> std::sync::Arc<modb_engine::Connection> {
    modb_engine::get_or_connect(&test_url(), PoolConfig::default()).await.expect("test cluster must be reachable")
}

fn user_schema() -> serde_json::Value {
    serde_json::json!({
        "name": { "type": "string" },
        "age": { "type": "int64", "constraints": { "min": 0 } },
    })
}

/// Scenario 1: a minimal document survives an insert/find_by_id round trip
/// with every field intact.
#[tokio::test]
#[ignore]
async fn write_read_round_trip() {
    let conn = connect().await;
    let fields = vec![
        ("name".to_string(), converter::ExtractedValue::String("Ada".to_string())),
        ("age".to_string(), converter::ExtractedValue::Int64(30)),
    ];
    let encoded = converter::encode_batch(vec![fields]).unwrap().into_iter().next().unwrap();

    let id = ops::insert_one(&conn, "e2e_users", encoded, None).await.unwrap();
    let found = ops::find_by_id(&conn, "e2e_users", &id).await.unwrap().expect("document must be found");

    assert_eq!(found.get_str("name").unwrap(), "Ada");
    assert_eq!(found.get_i64("age").unwrap(), 30);

    ops::delete_one(&conn, "e2e_users", doc! { "_id": ObjectId::parse_str(&id).unwrap() }).await.unwrap();
}

/// Scenario 2: inserting a batch above the parallel threshold still
/// preserves input order in the returned ids.
#[tokio::test]
#[ignore]
async fn bulk_insert_above_threshold_preserves_order() {
    let conn = connect().await;
    let batch: Vec<_> = (0..(converter::PARALLEL_THRESHOLD + 10))
        .map(|i| vec![("seq".to_string(), converter::ExtractedValue::Int64(i as i64))])
        .collect();
    let count = batch.len();
    let encoded = converter::encode_batch(batch).unwrap();

    let ids = ops::insert_many(&conn, "e2e_bulk", encoded, None, false).await.unwrap();
    assert_eq!(ids.len(), count);

    for (i, id) in ids.iter().enumerate() {
        let doc = ops::find_by_id(&conn, "e2e_bulk", id).await.unwrap().expect("document must exist");
        assert_eq!(doc.get_i64("seq").unwrap(), i as i64);
    }

    let filter = doc! { "seq": { "$gte": 0 } };
    ops::delete_many(&conn, "e2e_bulk", filter).await.unwrap();
}

/// Scenario 3: a batch insert that fails schema validation reports every
/// violation across the batch and persists nothing.
#[tokio::test]
#[ignore]
async fn validation_failure_persists_nothing() {
    let conn = connect().await;
    schema::register_schema("e2e_validated_user", &user_schema()).unwrap();

    let valid = vec![
        ("name".to_string(), converter::ExtractedValue::String("Grace".to_string())),
        ("age".to_string(), converter::ExtractedValue::Int64(40)),
    ];
    // Missing "name" and a negative "age": two violations in one document.
    let invalid = vec![("age".to_string(), converter::ExtractedValue::Int64(-1))];
    let encoded = converter::encode_batch(vec![valid, invalid]).unwrap();

    let before = ops::count(&conn, "e2e_validated_user", doc! {}).await.unwrap();
    let result = ops::insert_many(&conn, "e2e_validated_user", encoded, Some("e2e_validated_user"), true).await;
    let after = ops::count(&conn, "e2e_validated_user", doc! {}).await.unwrap();

    assert!(result.is_err());
    assert_eq!(before, after, "a rejected batch must not persist any of its documents");

    schema::clear_schemas();
}

/// Scenario 4: a tracker that only saw `age` change produces the exact
/// `update_one({_id}, {$set: {age: 31}})` shape and nothing else.
#[tokio::test]
#[ignore]
async fn tracker_change_produces_minimal_update() {
    let conn = connect().await;
    let fields = vec![
        ("name".to_string(), converter::ExtractedValue::String("Linus".to_string())),
        ("age".to_string(), converter::ExtractedValue::Int64(30)),
    ];
    let encoded = converter::encode_batch(vec![fields]).unwrap().into_iter().next().unwrap();
    let id = ops::insert_one(&conn, "e2e_tracked", encoded, None).await.unwrap();

    let mut tracker = modb_engine::StateTracker::new();
    let mut data = doc! { "name": "Linus", "age": 30_i64 };
    tracker.track_change("age", Bson::Int64(30));
    data.insert("age", Bson::Int64(31));

    let changes = tracker.get_changes(&data);
    assert_eq!(changes, doc! { "age": 31_i64 }, "get_changes must report only the tracked field");

    let modified =
        ops::update_one(&conn, "e2e_tracked", doc! { "_id": ObjectId::parse_str(&id).unwrap() }, changes).await.unwrap();
    assert_eq!(modified, 1);

    let after = ops::find_by_id(&conn, "e2e_tracked", &id).await.unwrap().unwrap();
    assert_eq!(after.get_i64("age").unwrap(), 31);
    assert_eq!(after.get_str("name").unwrap(), "Linus", "untouched field must survive the minimal update");

    ops::delete_one(&conn, "e2e_tracked", doc! { "_id": ObjectId::parse_str(&id).unwrap() }).await.unwrap();
}

/// Scenario 5: a `$where` filter is rejected by the sanitiser before any
/// driver call is issued, and the collection stays untouched.
#[tokio::test]
#[ignore]
async fn where_operator_rejected_before_driver_call() {
    let conn = connect().await;
    let before = ops::count(&conn, "e2e_users", doc! {}).await.unwrap();

    let dangerous = doc! { "$where": "this.age > 0" };
    let result = ops::find(&conn, "e2e_users", dangerous, None, None, None).await;
    assert!(result.is_err());

    let after = ops::count(&conn, "e2e_users", doc! {}).await.unwrap();
    assert_eq!(before, after);
}

/// Scenario 6: resolving links for 100 referenced users issues exactly one
/// batched `find({_id: {$in: [...]}})` against the target collection.
#[tokio::test]
#[ignore]
async fn link_resolution_batches_into_one_query() {
    let conn = connect().await;
    let batch: Vec<_> = (0..100)
        .map(|i| vec![("seq".to_string(), converter::ExtractedValue::Int64(i))])
        .collect();
    let encoded = converter::encode_batch(batch).unwrap();
    let ids = ops::insert_many(&conn, "e2e_link_targets", encoded, None, false).await.unwrap();
    let oids: Vec<ObjectId> = ids.iter().map(|id| ObjectId::parse_str(id).unwrap()).collect();

    let mut seen = HashSet::new();
    let links = vec![ops::LinkField { target_collection: "e2e_link_targets".to_string(), ids: oids.clone() }];
    let resolved = ops::resolve_links(&conn, links, &mut seen).await.unwrap();

    let by_id = resolved.get("e2e_link_targets").expect("target collection must be present");
    assert_eq!(by_id.len(), 100, "every referenced id must resolve in the single batched call");
    assert_eq!(seen.len(), 100);

    ops::delete_many(&conn, "e2e_link_targets", doc! { "_id": { "$in": oids } }).await.unwrap();
}

/// Scenario 7: an aggregation pipeline groups inserted documents, and a
/// `$where` stage inside the pipeline is rejected before the driver call.
#[tokio::test]
#[ignore]
async fn aggregate_runs_pipeline_and_rejects_dangerous_stage() {
    let conn = connect().await;
    let batch: Vec<_> = [("a", 1_i64), ("a", 2), ("b", 3)]
        .into_iter()
        .map(|(group, value)| {
            vec![
                ("group".to_string(), converter::ExtractedValue::String(group.to_string())),
                ("value".to_string(), converter::ExtractedValue::Int64(value)),
            ]
        })
        .collect();
    let encoded = converter::encode_batch(batch).unwrap();
    let ids = ops::insert_many(&conn, "e2e_agg", encoded, None, false).await.unwrap();

    let pipeline = vec![
        doc! { "$match": { "group": "a" } },
        doc! { "$group": { "_id": "$group", "total": { "$sum": "$value" } } },
    ];
    let results = ops::aggregate(&conn, "e2e_agg", pipeline).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].get_i64("total").unwrap(), 3);

    let dangerous = vec![doc! { "$match": { "$where": "true" } }];
    assert!(ops::aggregate(&conn, "e2e_agg", dangerous).await.is_err());

    let oids: Vec<ObjectId> = ids.iter().map(|id| ObjectId::parse_str(id).unwrap()).collect();
    ops::delete_many(&conn, "e2e_agg", doc! { "_id": { "$in": oids } }).await.unwrap();
}

/// Sanity check that the pieces wired together above (descriptor parsing,
/// validator, security) agree on a document that should validate cleanly.
#[test]
fn schema_and_validator_agree_on_a_clean_document() {
    let schema = descriptor::parse_document_schema(&user_schema()).unwrap();
    let doc = doc! { "name": "Barbara", "age": 52_i64 };
    assert!(validator::validate(&doc, &schema).is_empty());
    assert!(security::validate_collection_name("e2e_users").is_ok());
}
