//! Thin pyo3 binding over `modb-engine`. Every function here does exactly
//! two things the pure-Rust engine can't: hold/release the GIL around calls
//! into it, and translate between Python objects and `ExtractedValue`/BSON.
//! No MongoDB semantics live in this crate.

use pyo3::prelude::*;

pub mod config;
pub mod connection;
pub mod conversion;
pub mod document;
pub mod error_handling;
pub mod schema;

#[pymodule]
fn modb(py: Python, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    config::register_functions(m)?;
    schema::register_functions(m)?;

    let mongodb_module = PyModule::new(py, "mongodb")?;
    connection::register_functions(&mongodb_module)?;
    document::register_functions(&mongodb_module)?;
    m.add_submodule(&mongodb_module)?;

    Ok(())
}
