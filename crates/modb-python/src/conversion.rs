//! Phase 1 extraction (Python value → `ExtractedValue`, GIL held) and final
//! materialization (`ExtractedValue` → Python value, GIL re-acquired).
//! Everything between those two calls — encode, decode, the parallel
//! fan-out — runs in `modb-engine` with no Python object in sight.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyDict, PyList};

use bson::Document as BsonDocument;
use modb_engine::ExtractedValue;

use crate::config::{get_config, SecurityConfig};

/// Walks a Python value into `ExtractedValue`. Must be called with the GIL
/// held; the result carries no reference back into the interpreter.
pub fn extract_py_value(py: Python<'_>, value: &Bound<'_, PyAny>, config: &SecurityConfig) -> PyResult<ExtractedValue> {
    if value.is_none() {
        return Ok(ExtractedValue::Null);
    }
    if value.is_instance_of::<pyo3::types::PyBool>() {
        return Ok(ExtractedValue::Bool(value.extract::<bool>()?));
    }
    if let Ok(bytes) = value.downcast::<PyBytes>() {
        return Ok(ExtractedValue::Bytes(bytes.as_bytes().to_vec()));
    }

    let type_name = value.get_type().name().map(|s| s.to_string()).unwrap_or_default();

    if type_name == "datetime" {
        let millis = (value.call_method0("timestamp")?.extract::<f64>()? * 1000.0) as i64;
        return Ok(ExtractedValue::DateTimeMillis(millis));
    }
    if type_name == "date" {
        let datetime_mod = py.import("datetime")?;
        let datetime_cls = datetime_mod.getattr("datetime")?;
        let combined = datetime_cls.call_method1(
            "combine",
            (value, datetime_mod.getattr("time")?.call0()?),
        )?;
        let millis = (combined.call_method0("timestamp")?.extract::<f64>()? * 1000.0) as i64;
        return Ok(ExtractedValue::DateTimeMillis(millis));
    }
    if type_name == "Decimal" {
        return Ok(ExtractedValue::Decimal(value.str()?.to_string()));
    }
    if type_name == "ObjectId" {
        return Ok(ExtractedValue::ObjectIdString(value.str()?.to_string()));
    }

    if let Ok(i) = value.extract::<i64>() {
        return Ok(ExtractedValue::Int64(i));
    }
    // A Python int that overflows i64 still needs to round-trip without
    // truncation; carry its decimal text and let the engine encode it as
    // Decimal128.
    if type_name == "int" {
        return Ok(ExtractedValue::BigInt(value.str()?.to_string()));
    }
    if let Ok(f) = value.extract::<f64>() {
        return Ok(ExtractedValue::Double(f));
    }
    if let Ok(s) = value.extract::<String>() {
        let looks_like_oid = s.len() == 24 && s.chars().all(|c| c.is_ascii_hexdigit());
        if looks_like_oid && config.objectid_mode.auto_converts_bare_hex() {
            return Ok(ExtractedValue::ObjectIdString(s));
        }
        return Ok(ExtractedValue::String(s));
    }
    if let Ok(dict) = value.downcast::<PyDict>() {
        let mut fields = Vec::with_capacity(dict.len());
        for (key, value) in dict.iter() {
            fields.push((key.extract::<String>()?, extract_py_value(py, &value, config)?));
        }
        return Ok(ExtractedValue::Document(fields));
    }
    if let Ok(list) = value.downcast::<PyList>() {
        let mut items = Vec::with_capacity(list.len());
        for item in list.iter() {
            items.push(extract_py_value(py, &item, config)?);
        }
        return Ok(ExtractedValue::Array(items));
    }

    Err(PyValueError::new_err(format!("unsupported type for BSON conversion: {type_name}")))
}

/// Extracts every field of a dict, preserving iteration order (Phase 1 for
/// one document).
pub fn extract_dict_fields(py: Python<'_>, dict: &Bound<'_, PyDict>) -> PyResult<Vec<(String, ExtractedValue)>> {
    let config = get_config();
    let mut fields = Vec::with_capacity(dict.len());
    for (key, value) in dict.iter() {
        fields.push((key.extract::<String>()?, extract_py_value(py, &value, &config)?));
    }
    Ok(fields)
}

/// Materializes a decoded `ExtractedValue` back into a Python object. Called
/// after the GIL is re-acquired, once encode/decode is finished.
pub fn extracted_to_py(py: Python<'_>, value: ExtractedValue) -> PyResult<PyObject> {
    Ok(match value {
        ExtractedValue::Null => py.None(),
        ExtractedValue::Bool(b) => b.into_pyobject(py)?.to_owned().into_any().unbind(),
        ExtractedValue::Int32(i) => i.into_pyobject(py)?.to_owned().into_any().unbind(),
        ExtractedValue::Int64(i) => i.into_pyobject(py)?.to_owned().into_any().unbind(),
        ExtractedValue::BigInt(s) => {
            let builtins = py.import("builtins")?;
            builtins.call_method1("int", (s,))?.unbind()
        }
        ExtractedValue::Double(f) => f.into_pyobject(py)?.to_owned().into_any().unbind(),
        ExtractedValue::String(s) => s.into_pyobject(py)?.into_any().unbind(),
        ExtractedValue::ObjectIdString(s) => s.into_pyobject(py)?.into_any().unbind(),
        ExtractedValue::DateTimeMillis(millis) => {
            let datetime_mod = py.import("datetime")?;
            let datetime_cls = datetime_mod.getattr("datetime")?;
            let utc = datetime_mod.getattr("timezone")?.getattr("utc")?;
            datetime_cls
                .call_method1("fromtimestamp", (millis as f64 / 1000.0, utc))?
                .unbind()
        }
        ExtractedValue::Bytes(bytes) => PyBytes::new(py, &bytes).into_any().unbind(),
        ExtractedValue::Decimal(s) => {
            let decimal_mod = py.import("decimal")?;
            decimal_mod.getattr("Decimal")?.call1((s,))?.unbind()
        }
        ExtractedValue::Array(items) => {
            let list = PyList::empty(py);
            for item in items {
                list.append(extracted_to_py(py, item)?)?;
            }
            list.into_any().unbind()
        }
        ExtractedValue::Document(fields) => {
            let dict = PyDict::new(py);
            for (key, value) in fields {
                dict.set_item(key, extracted_to_py(py, value)?)?;
            }
            dict.into_any().unbind()
        }
    })
}

/// Converts a Python dict straight to a BSON document by running both
/// conversion phases back to back. Meant for small, one-off values
/// (filters, update documents) where splitting the GIL-held and
/// GIL-released phases isn't worth it; document bodies go through
/// `extract_dict_fields` + `modb_engine::encode_batch` instead so large
/// batches still parallelise.
pub fn py_dict_to_bson(py: Python<'_>, dict: &Bound<'_, PyDict>) -> PyResult<BsonDocument> {
    let config = get_config();
    let mut doc = BsonDocument::new();
    for (key, value) in dict.iter() {
        let key = key.extract::<String>()?;
        let extracted = extract_py_value(py, &value, &config)?;
        let bson_value = modb_engine::encode_one(extracted).map_err(crate::error_handling::engine_error_to_pyerr)?;
        doc.insert(key, bson_value);
    }
    Ok(doc)
}

/// Materializes a raw BSON document as a Python dict by routing it through
/// `decode_one`/`extracted_to_py`, so the read path has exactly one
/// materialization implementation regardless of whether the BSON came from
/// the driver directly (this function) or through the parallel decode batch
/// (`extracted_to_py` alone).
pub fn bson_document_to_py(py: Python<'_>, doc: &BsonDocument) -> PyResult<PyObject> {
    let extracted = modb_engine::ExtractedValue::Document(
        doc.iter().map(|(k, v)| (k.clone(), modb_engine::converter::decode_one(v))).collect(),
    );
    extracted_to_py(py, extracted)
}

/// Recursively converts a Python dict/list/scalar into `serde_json::Value`,
/// the neutral shape `modb_engine::register_schema` expects.
pub fn py_to_json(value: &Bound<'_, PyAny>) -> PyResult<serde_json::Value> {
    if value.is_none() {
        return Ok(serde_json::Value::Null);
    }
    if value.is_instance_of::<pyo3::types::PyBool>() {
        return Ok(serde_json::Value::Bool(value.extract::<bool>()?));
    }
    if let Ok(i) = value.extract::<i64>() {
        return Ok(serde_json::Value::from(i));
    }
    if let Ok(f) = value.extract::<f64>() {
        return Ok(serde_json::Number::from_f64(f).map(serde_json::Value::Number).unwrap_or(serde_json::Value::Null));
    }
    if let Ok(s) = value.extract::<String>() {
        return Ok(serde_json::Value::String(s));
    }
    if let Ok(dict) = value.downcast::<PyDict>() {
        let mut map = serde_json::Map::with_capacity(dict.len());
        for (key, value) in dict.iter() {
            map.insert(key.extract::<String>()?, py_to_json(&value)?);
        }
        return Ok(serde_json::Value::Object(map));
    }
    if let Ok(list) = value.downcast::<PyList>() {
        let mut items = Vec::with_capacity(list.len());
        for item in list.iter() {
            items.push(py_to_json(&item)?);
        }
        return Ok(serde_json::Value::Array(items));
    }
    Err(PyValueError::new_err(format!(
        "unsupported type in schema shape: {}",
        value.get_type().name()?
    )))
}
