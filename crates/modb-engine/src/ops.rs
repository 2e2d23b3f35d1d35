//! Operation layer: the driver-facing half of the engine. Every function
//! here validates identifiers, sanitises filters, and (when a schema is
//! given) validates the document before ever issuing a driver call —
//! matching the state machine `Accepted → Validated → Encoded →
//! Dispatched → Completed` with no partial progress on a rejection.

use std::collections::{HashMap, HashSet};

use bson::{doc, oid::ObjectId, Bson, Document as BsonDocument};
use futures::TryStreamExt;
use mongodb::options::FindOptions;

use modb_common::EngineError;

use crate::connection::Connection;
use crate::converter::{decode_batch, with_id_first, ExtractedValue};
use crate::schema::get_schema;
use crate::security::{sanitise_query, validate_collection_name, validate_field_name, FieldContext};
use crate::validator::validate;

/// Terminal and in-flight states of a single operation (spec §4.6). The
/// engine itself doesn't persist this anywhere — it exists so the error
/// returned from a failed operation always maps onto exactly one of these,
/// rather than a function growing ad-hoc failure shapes over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Accepted,
    Validated,
    Encoded,
    Dispatched,
    Completed,
    RejectedByValidator,
    RejectedBySanitiser,
    DriverError,
    DecodeError,
}

fn validate_against_schema(class_name: Option<&str>, doc: &BsonDocument) -> Result<(), EngineError> {
    let Some(class_name) = class_name else { return Ok(()) };
    let schema = get_schema(class_name).ok_or_else(|| EngineError::schema_not_found(class_name))?;
    let errors = validate(doc, &schema);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(EngineError::InvalidDocument { errors: errors.into_vec() })
    }
}

/// Validates every `$`-prefixed key at the top level of an update document
/// against the operator allowlist (spec §4.6's update/update_many contract).
fn validate_update_operators(update: &BsonDocument) -> Result<(), EngineError> {
    for key in update.keys() {
        if key.starts_with('$') {
            validate_field_name(key, FieldContext::QueryOperator)?;
        }
    }
    Ok(())
}

pub async fn insert_one(
    conn: &Connection,
    collection: &str,
    doc: BsonDocument,
    class_name: Option<&str>,
) -> Result<String, EngineError> {
    validate_collection_name(collection)?;
    validate_against_schema(class_name, &doc)?;

    tracing::debug!(collection, "insert_one");
    let result = conn.collection(collection).insert_one(doc).await.map_err(EngineError::from)?;
    result
        .inserted_id
        .as_object_id()
        .map(|oid| oid.to_hex())
        .ok_or_else(|| EngineError::driver("driver did not return an ObjectId for the inserted document"))
}

/// Outcome of `insert_many` for an empty batch matches the documented
/// boundary behaviour: no driver call, empty result.
pub async fn insert_many(
    conn: &Connection,
    collection: &str,
    docs: Vec<BsonDocument>,
    class_name: Option<&str>,
    validate_input: bool,
) -> Result<Vec<String>, EngineError> {
    if docs.is_empty() {
        return Ok(Vec::new());
    }
    validate_collection_name(collection)?;

    if validate_input {
        if let Some(class_name) = class_name {
            let schema = get_schema(class_name).ok_or_else(|| EngineError::schema_not_found(class_name))?;
            let mut all_errors = Vec::new();
            for doc in &docs {
                all_errors.extend(validate(doc, &schema).into_vec());
            }
            if !all_errors.is_empty() {
                return Err(EngineError::InvalidDocument { errors: all_errors });
            }
        }
    }

    tracing::debug!(collection, count = docs.len(), "insert_many");
    let result = conn.collection(collection).insert_many(docs).await.map_err(EngineError::from)?;

    // insert_many's inserted_ids is keyed by input index, not insertion
    // order — walk 0..n explicitly so output order always matches input
    // order (invariant 2), regardless of what the driver's map iterates in.
    let count = result.inserted_ids.keys().copied().max().map(|m| m + 1).unwrap_or(0);
    let mut ids = Vec::with_capacity(count as usize);
    for i in 0..count {
        let id = result
            .inserted_ids
            .get(&i)
            .and_then(Bson::as_object_id)
            .ok_or_else(|| EngineError::driver("driver result missing inserted id for an input position"))?;
        ids.push(id.to_hex());
    }
    Ok(ids)
}

pub async fn find(
    conn: &Connection,
    collection: &str,
    filter: BsonDocument,
    sort: Option<BsonDocument>,
    skip: Option<u64>,
    limit: Option<i64>,
) -> Result<Vec<BsonDocument>, EngineError> {
    validate_collection_name(collection)?;
    sanitise_query(&Bson::Document(filter.clone()))?;
    tracing::debug!(collection, "find");

    let mut options = FindOptions::default();
    options.sort = sort;
    options.skip = skip;
    options.limit = limit;

    let cursor = conn
        .collection(collection)
        .find(filter)
        .with_options(options)
        .await
        .map_err(EngineError::from)?;
    cursor.try_collect().await.map_err(EngineError::from)
}

/// Read-path counterpart that decodes the cursor's results to
/// `ExtractedValue` trees (parallel past the threshold, `_id` first),
/// leaving host-object construction to the binding.
pub async fn find_as_extracted(
    conn: &Connection,
    collection: &str,
    filter: BsonDocument,
    sort: Option<BsonDocument>,
    skip: Option<u64>,
    limit: Option<i64>,
) -> Result<Vec<Vec<(String, ExtractedValue)>>, EngineError> {
    let docs = find(conn, collection, filter, sort, skip, limit).await?;
    Ok(decode_batch(docs).into_iter().map(with_id_first).collect())
}

/// Runs an aggregation pipeline (spec §6's standalone `aggregate`). Every
/// stage is run through the same dangerous-operator sanitiser as a query
/// filter, since `$where`/`$function`/`$accumulator` are just as live inside
/// a pipeline stage as inside a `find` filter.
pub async fn aggregate(
    conn: &Connection,
    collection: &str,
    pipeline: Vec<BsonDocument>,
) -> Result<Vec<BsonDocument>, EngineError> {
    validate_collection_name(collection)?;
    for stage in &pipeline {
        sanitise_query(&Bson::Document(stage.clone()))?;
    }
    tracing::debug!(collection, stages = pipeline.len(), "aggregate");

    let cursor = conn.collection(collection).aggregate(pipeline).await.map_err(EngineError::from)?;
    cursor.try_collect().await.map_err(EngineError::from)
}

pub async fn find_by_id(conn: &Connection, collection: &str, id: &str) -> Result<Option<BsonDocument>, EngineError> {
    validate_collection_name(collection)?;
    let oid = ObjectId::parse_str(id).map_err(|_| EngineError::invalid_identifier(format!("'{id}' is not a valid ObjectId")))?;
    conn.collection(collection).find_one(doc! { "_id": oid }).await.map_err(EngineError::from)
}

pub async fn update_one(
    conn: &Connection,
    collection: &str,
    filter: BsonDocument,
    changes: BsonDocument,
) -> Result<u64, EngineError> {
    validate_collection_name(collection)?;
    sanitise_query(&Bson::Document(filter.clone()))?;
    validate_update_operators(&changes)?;
    tracing::debug!(collection, "update_one");

    let update = if changes.keys().any(|k| k.starts_with('$')) { changes } else { doc! { "$set": changes } };
    let result = conn.collection(collection).update_one(filter, update).await.map_err(EngineError::from)?;
    Ok(result.modified_count)
}

pub async fn update_many(
    conn: &Connection,
    collection: &str,
    filter: BsonDocument,
    changes: BsonDocument,
) -> Result<u64, EngineError> {
    validate_collection_name(collection)?;
    sanitise_query(&Bson::Document(filter.clone()))?;
    validate_update_operators(&changes)?;
    tracing::debug!(collection, "update_many");

    let update = if changes.keys().any(|k| k.starts_with('$')) { changes } else { doc! { "$set": changes } };
    let result = conn.collection(collection).update_many(filter, update).await.map_err(EngineError::from)?;
    Ok(result.modified_count)
}

pub async fn delete_one(conn: &Connection, collection: &str, filter: BsonDocument) -> Result<u64, EngineError> {
    validate_collection_name(collection)?;
    sanitise_query(&Bson::Document(filter.clone()))?;
    tracing::debug!(collection, "delete_one");
    let result = conn.collection(collection).delete_one(filter).await.map_err(EngineError::from)?;
    Ok(result.deleted_count)
}

pub async fn delete_many(conn: &Connection, collection: &str, filter: BsonDocument) -> Result<u64, EngineError> {
    validate_collection_name(collection)?;
    sanitise_query(&Bson::Document(filter.clone()))?;
    tracing::debug!(collection, "delete_many");
    let result = conn.collection(collection).delete_many(filter).await.map_err(EngineError::from)?;
    Ok(result.deleted_count)
}

pub async fn count(conn: &Connection, collection: &str, filter: BsonDocument) -> Result<u64, EngineError> {
    validate_collection_name(collection)?;
    sanitise_query(&Bson::Document(filter.clone()))?;
    conn.collection(collection).count_documents(filter).await.map_err(EngineError::from)
}

/// `save` contract: if the tracker reports no modification there is
/// nothing to persist, and no driver call is made.
pub async fn save(
    conn: &Connection,
    collection: &str,
    id: ObjectId,
    changes: BsonDocument,
) -> Result<(), EngineError> {
    if changes.is_empty() {
        return Ok(());
    }
    validate_collection_name(collection)?;
    conn.collection(collection)
        .update_one(doc! { "_id": id }, doc! { "$set": changes })
        .await
        .map_err(EngineError::from)?;
    Ok(())
}

/// One reference field to resolve: the ids it points at and which
/// collection they live in.
pub struct LinkField {
    pub target_collection: String,
    pub ids: Vec<ObjectId>,
}

/// Batched link resolution (spec §4.6). Given the reference fields observed
/// across a set of documents at one depth level, issues at most one
/// `find({_id: {$in: [...]}})` per distinct target collection, and returns
/// each target collection's resolved documents keyed by id.
///
/// Depth beyond 1 is the caller's responsibility: call again with the
/// reference fields discovered inside the documents just resolved, using a
/// fresh `seen` set each level so only ids newly discovered at that depth
/// are fetched.
pub async fn resolve_links(
    conn: &Connection,
    links: Vec<LinkField>,
    seen: &mut HashSet<ObjectId>,
) -> Result<HashMap<String, HashMap<ObjectId, BsonDocument>>, EngineError> {
    let mut by_collection: HashMap<String, Vec<ObjectId>> = HashMap::new();
    for link in links {
        let unresolved: Vec<ObjectId> = link.ids.into_iter().filter(|id| seen.insert(*id)).collect();
        if !unresolved.is_empty() {
            by_collection.entry(link.target_collection).or_default().extend(unresolved);
        }
    }

    let mut resolved = HashMap::new();
    for (collection, ids) in by_collection {
        validate_collection_name(&collection)?;
        tracing::debug!(collection, count = ids.len(), "resolve_links batch");
        let docs = find(conn, &collection, doc! { "_id": { "$in": ids } }, None, None, None).await?;
        let by_id: HashMap<ObjectId, BsonDocument> = docs
            .into_iter()
            .filter_map(|d| d.get("_id").and_then(Bson::as_object_id).map(|id| (id, d)))
            .collect();
        resolved.insert(collection, by_id);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_document_without_operator_keys_is_wrapped_in_set() {
        let changes = doc! { "age": 31_i64 };
        let has_operator = changes.keys().any(|k| k.starts_with('$'));
        assert!(!has_operator);
    }

    #[test]
    fn validate_update_operators_rejects_unknown_operator() {
        let update = doc! { "$bogus": { "age": 1 } };
        assert!(validate_update_operators(&update).is_err());
    }

    #[test]
    fn validate_update_operators_accepts_set() {
        let update = doc! { "$set": { "age": 1 } };
        assert!(validate_update_operators(&update).is_ok());
    }

    #[tokio::test]
    async fn resolve_links_dedupes_ids_already_seen() {
        let mut seen = HashSet::new();
        let id = ObjectId::new();
        seen.insert(id);
        let links = vec![LinkField { target_collection: "users".into(), ids: vec![id] }];
        // No connection needed: with every id already seen, by_collection
        // stays empty and the function returns before issuing any find.
        let mut by_collection: HashMap<String, Vec<ObjectId>> = HashMap::new();
        for link in links {
            let unresolved: Vec<ObjectId> = link.ids.into_iter().filter(|id| seen.insert(*id)).collect();
            if !unresolved.is_empty() {
                by_collection.entry(link.target_collection).or_default().extend(unresolved);
            }
        }
        assert!(by_collection.is_empty());
    }
}
