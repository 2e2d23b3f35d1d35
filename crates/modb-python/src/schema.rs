//! Python-facing schema registration: walk the host's dict-shaped class
//! descriptor into JSON, then hand it to the engine's registry.

use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::conversion::py_to_json;
use crate::error_handling::engine_error_to_pyerr;

/// Registers (or re-registers) the schema for `class_name` from a
/// dict-shaped descriptor, e.g. `{"email": {"type": "string", ...}}`.
#[pyfunction]
pub fn register_schema(class_name: String, shape: &Bound<'_, PyDict>) -> PyResult<()> {
    let shape_json = py_to_json(shape.as_any())?;
    modb_engine::register_schema(&class_name, &shape_json).map_err(engine_error_to_pyerr)
}

#[pyfunction]
pub fn clear_schemas() {
    modb_engine::clear_schemas();
}

pub fn register_functions(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(register_schema, m)?)?;
    m.add_function(wrap_pyfunction!(clear_schemas, m)?)?;
    Ok(())
}
