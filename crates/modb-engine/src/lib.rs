//! The engine core: schema registry/validator, two-phase BSON conversion,
//! copy-on-write change tracking, and a MongoDB operation layer, all
//! pyo3-agnostic.
//!
//! Binding crates (one per host language) extract dynamic host values into
//! `ExtractedValue` while holding their host-runtime lock, then call into
//! everything here with that lock released.

pub mod connection;
pub mod converter;
pub mod descriptor;
pub mod ops;
pub mod schema;
pub mod security;
pub mod state;
pub mod validator;

pub use connection::{disconnect, disconnect_all, get_or_connect, is_connected, Connection, PoolConfig};
pub use converter::{decode_batch, encode_batch, encode_one, with_id_first, ExtractedValue, PARALLEL_THRESHOLD};
pub use descriptor::{Constraints, Descriptor, DocumentSchema, FieldSchema, TypeDescriptor};
pub use modb_common::{EngineError, Result};
pub use ops::{resolve_links, LinkField, OperationState};
pub use schema::{clear_schemas, get_schema, register_schema};
pub use security::{
    parse_object_id, sanitise_query, validate_collection_name, validate_field_name, ExpectedType,
    FieldContext,
};
pub use state::StateTracker;
pub use validator::validate;

#[cfg(test)]
mod tests {
    #[test]
    fn it_works() {
        assert_eq!(2 + 2, 4);
    }
}
