//! Process-wide schema cache, keyed by fully-qualified class name.
//!
//! Read on every validated operation, written only by `register_schema`.
//! Registration is rare relative to reads, so a `RwLock` is the right
//! primitive: readers never block each other, writers get exclusive access
//! for the instant it takes to swap in a new `Arc<DocumentSchema>`.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde_json::Value as Json;

use crate::descriptor::{parse_document_schema, DocumentSchema};
use modb_common::EngineError;

static SCHEMA_CACHE: Lazy<RwLock<HashMap<String, Arc<DocumentSchema>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Parses `shape` and installs it under `class_name`, overwriting any prior
/// registration for that name. Idempotent by design — interactive
/// redefinition (e.g. a REPL reloading a class) is expected to re-register.
pub fn register_schema(class_name: &str, shape: &Json) -> Result<(), EngineError> {
    let schema = parse_document_schema(shape)?;
    SCHEMA_CACHE.write().insert(class_name.to_string(), Arc::new(schema));
    Ok(())
}

/// Looks up a previously registered schema. `None` means "no schema for
/// this class", which callers treat as "skip validation" unless they
/// require registration themselves.
pub fn get_schema(class_name: &str) -> Option<Arc<DocumentSchema>> {
    SCHEMA_CACHE.read().get(class_name).cloned()
}

/// Clears every registered schema. Used at process shutdown / test teardown
/// — the cache holds no state that needs to survive a restart.
pub fn clear_schemas() {
    SCHEMA_CACHE.write().clear();
}
