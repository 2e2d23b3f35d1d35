//! Two-phase BSON conversion (spec §4.4), the performance-critical part of
//! the engine.
//!
//! `ExtractedValue` is the lock-free intermediate representation that lets
//! Phase 1 (host-lock held, walking host-runtime values) and Phase 2
//! (host-lock released, building BSON) run on either side of a lock
//! release. Building `ExtractedValue` from a specific host runtime's values
//! is necessarily host-specific and lives in the binding crate; everything
//! from `ExtractedValue` onward — encode, decode, and the parallel fan-out
//! — is host-agnostic and lives here.

use std::str::FromStr;

use bson::spec::BinarySubtype;
use bson::{Binary, Bson, Decimal128, Document as BsonDocument};
use rayon::prelude::*;

use modb_common::EngineError;

/// Batch size at or above which encode/decode parallelises across worker
/// threads. Below this, sequential conversion avoids scheduling overhead
/// that would outweigh the benefit.
pub const PARALLEL_THRESHOLD: usize = 50;

/// Lock-free intermediate value produced by Phase 1 extraction and consumed
/// by Phase 2 encoding (or vice versa on the read path). Carries no
/// references to host-runtime objects.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    /// An integer that didn't fit `i64`; encoded as `Decimal128`, never truncated.
    BigInt(String),
    Double(f64),
    String(String),
    /// A string already known (by the binding) to represent an ObjectId.
    ObjectIdString(String),
    /// Milliseconds since the Unix epoch.
    DateTimeMillis(i64),
    Bytes(Vec<u8>),
    /// Decimal value, carried as its canonical string form until encoding.
    Decimal(String),
    Array(Vec<ExtractedValue>),
    /// Field order is significant: it mirrors the order fields were extracted in.
    Document(Vec<(String, ExtractedValue)>),
}

/// Encodes one extracted document into BSON. No BSON is constructed during
/// extraction — only here, with the host-lock already released by the caller.
pub fn encode_one(value: ExtractedValue) -> Result<Bson, EngineError> {
    Ok(match value {
        ExtractedValue::Null => Bson::Null,
        ExtractedValue::Bool(b) => Bson::Boolean(b),
        ExtractedValue::Int32(i) => Bson::Int32(i),
        ExtractedValue::Int64(i) => Bson::Int64(i),
        ExtractedValue::BigInt(s) => Decimal128::from_str(&s)
            .map(Bson::Decimal128)
            .map_err(|_| EngineError::unconvertible_value(format!("integer literal '{s}'")))?,
        ExtractedValue::Double(f) => Bson::Double(f), // NaN and ±inf pass through untouched
        ExtractedValue::String(s) => Bson::String(s),
        ExtractedValue::ObjectIdString(s) => bson::oid::ObjectId::parse_str(&s)
            .map(Bson::ObjectId)
            .map_err(|_| EngineError::unconvertible_value(format!("objectid '{s}'")))?,
        ExtractedValue::DateTimeMillis(millis) => Bson::DateTime(bson::DateTime::from_millis(millis)),
        ExtractedValue::Bytes(bytes) => Bson::Binary(Binary { subtype: BinarySubtype::Generic, bytes }),
        ExtractedValue::Decimal(s) => Decimal128::from_str(&s)
            .map(Bson::Decimal128)
            .map_err(|_| EngineError::unconvertible_value(format!("decimal '{s}'")))?,
        ExtractedValue::Array(items) => {
            Bson::Array(items.into_iter().map(encode_one).collect::<Result<_, _>>()?)
        }
        ExtractedValue::Document(fields) => {
            let mut doc = BsonDocument::new();
            for (key, value) in fields {
                doc.insert(key, encode_one(value)?);
            }
            Bson::Document(doc)
        }
    })
}

/// Phase 2 of the write path: encodes a batch of extracted documents into
/// BSON documents, parallelising across worker threads once the batch is
/// large enough to pay for it. Output order always matches input order —
/// `rayon`'s indexed `map`/`collect` writes each slot by position, never
/// through an unordered concurrent collection.
pub fn encode_batch(documents: Vec<Vec<(String, ExtractedValue)>>) -> Result<Vec<BsonDocument>, EngineError> {
    let encode_fields = |fields: Vec<(String, ExtractedValue)>| -> Result<BsonDocument, EngineError> {
        let mut doc = BsonDocument::new();
        for (key, value) in fields {
            doc.insert(key, encode_one(value)?);
        }
        Ok(doc)
    };

    if documents.len() >= PARALLEL_THRESHOLD {
        documents.into_par_iter().map(encode_fields).collect()
    } else {
        documents.into_iter().map(encode_fields).collect()
    }
}

/// Decodes a single BSON value into its extracted form. Used on the read
/// path before the host-lock is re-acquired to materialise host values.
pub fn decode_one(value: &Bson) -> ExtractedValue {
    match value {
        Bson::Null => ExtractedValue::Null,
        Bson::Boolean(b) => ExtractedValue::Bool(*b),
        Bson::Int32(i) => ExtractedValue::Int32(*i),
        Bson::Int64(i) => ExtractedValue::Int64(*i),
        Bson::Double(f) => ExtractedValue::Double(*f),
        Bson::String(s) => ExtractedValue::String(s.clone()),
        Bson::ObjectId(oid) => ExtractedValue::ObjectIdString(oid.to_hex()),
        Bson::DateTime(dt) => ExtractedValue::DateTimeMillis(dt.timestamp_millis()),
        Bson::Binary(bin) => ExtractedValue::Bytes(bin.bytes.clone()),
        Bson::Decimal128(dec) => ExtractedValue::Decimal(dec.to_string()),
        Bson::Array(items) => ExtractedValue::Array(items.iter().map(decode_one).collect()),
        Bson::Document(doc) => {
            ExtractedValue::Document(doc.iter().map(|(k, v)| (k.clone(), decode_one(v))).collect())
        }
        other => ExtractedValue::String(other.to_string()),
    }
}

/// Decodes a batch of driver-returned documents, parallelising past the
/// same threshold as the write path. `_id` is not reordered here — the
/// caller (operation layer) re-inserts it first when materialising.
pub fn decode_batch(documents: Vec<BsonDocument>) -> Vec<Vec<(String, ExtractedValue)>> {
    let decode_doc = |doc: BsonDocument| -> Vec<(String, ExtractedValue)> {
        doc.into_iter().map(|(k, v)| (k, decode_one(&v))).collect()
    };

    if documents.len() >= PARALLEL_THRESHOLD {
        documents.into_par_iter().map(decode_doc).collect()
    } else {
        documents.into_iter().map(decode_doc).collect()
    }
}

/// Reorders a decoded document's fields so `_id` comes first, matching the
/// read-path contract: "`_id` is always emitted as the first entry".
pub fn with_id_first(mut fields: Vec<(String, ExtractedValue)>) -> Vec<(String, ExtractedValue)> {
    if let Some(pos) = fields.iter().position(|(k, _)| k == "_id") {
        if pos != 0 {
            let id_entry = fields.remove(pos);
            fields.insert(0, id_entry);
        }
    }
    fields
}
