//! CRUD surface and the per-document change tracker exposed to the host.
//! Every async function here does Phase 1 extraction with the GIL held,
//! then hands off to `modb_engine::ops` with the GIL released via
//! `future_into_py`.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock as StdRwLock};

use bson::oid::ObjectId;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use pyo3_async_runtimes::tokio::future_into_py;

use modb_engine::{ops, ExtractedValue, StateTracker};

use crate::connection::active_connection;
use crate::conversion::{extract_dict_fields, extracted_to_py, py_dict_to_bson};
use crate::error_handling::engine_error_to_pyerr;

/// Constructors registered per class name, used by `find_as_documents` and
/// `insert_many(return_kind="documents")` to build host document objects
/// directly from decoded fields instead of handing back a plain dict —
/// the "validation-skipping fast path" (spec §4.6): the schema was already
/// satisfied by an earlier write or is trusted driver output, so there is
/// nothing left to validate on the way back out.
static DOCUMENT_CLASSES: StdRwLock<Option<HashMap<String, Py<PyAny>>>> = StdRwLock::new(None);

/// Registers the callable the binding uses to build a `class_name` instance
/// from a dict of fields, e.g. a classmethod that skips `__init__`
/// validation. Re-registering overwrites, matching `register_schema`.
#[pyfunction]
pub fn register_document_class(class_name: String, constructor: Py<PyAny>) -> PyResult<()> {
    let mut classes = DOCUMENT_CLASSES.write().map_err(|e| PyRuntimeError::new_err(format!("document class registry lock poisoned: {e}")))?;
    classes.get_or_insert_with(HashMap::new).insert(class_name, constructor);
    Ok(())
}

fn document_constructor(class_name: &str) -> PyResult<Py<PyAny>> {
    let classes = DOCUMENT_CLASSES
        .read()
        .map_err(|e| PyRuntimeError::new_err(format!("document class registry lock poisoned: {e}")))?;
    classes
        .as_ref()
        .and_then(|m| m.get(class_name))
        .cloned()
        .ok_or_else(|| PyValueError::new_err(format!("no document class registered for '{class_name}'; call register_document_class first")))
}

/// Builds one host document object from its decoded fields by calling the
/// registered constructor with them as keyword arguments.
fn construct_document(py: Python<'_>, class_name: &str, fields: Vec<(String, ExtractedValue)>) -> PyResult<PyObject> {
    let constructor = document_constructor(class_name)?;
    let kwargs = PyDict::new(py);
    for (key, value) in fields {
        kwargs.set_item(key, extracted_to_py(py, value)?)?;
    }
    constructor.call(py, (), Some(&kwargs))
}

/// Python-visible wrapper around the engine's copy-on-write change tracker.
/// One instance per live document object on the host side.
#[pyclass(module = "modb")]
pub struct PyStateTracker {
    inner: Mutex<StateTracker>,
}

#[pymethods]
impl PyStateTracker {
    #[new]
    fn new() -> Self {
        Self { inner: Mutex::new(StateTracker::new()) }
    }

    /// Records that `name` is about to change from its current value in
    /// `current` (a dict). Must be called before the host mutates the field.
    fn track_change(&self, py: Python<'_>, current: &Bound<'_, PyDict>, name: String) -> PyResult<()> {
        let old_value = match current.get_item(&name)? {
            Some(value) => {
                let extracted = crate::conversion::extract_py_value(py, &value, &crate::config::get_config())?;
                modb_engine::encode_one(extracted).map_err(engine_error_to_pyerr)?
            }
            None => bson::Bson::Null,
        };
        self.inner.lock().expect("state tracker lock poisoned").track_change(&name, old_value);
        Ok(())
    }

    fn is_modified(&self) -> bool {
        self.inner.lock().expect("state tracker lock poisoned").is_modified()
    }

    /// Returns the `$set` payload as a dict, built against `current`'s
    /// present values.
    fn get_changes(&self, py: Python<'_>, current: &Bound<'_, PyDict>) -> PyResult<PyObject> {
        let data = py_dict_to_bson(py, current)?;
        let changes = self.inner.lock().expect("state tracker lock poisoned").get_changes(&data);
        crate::conversion::bson_document_to_py(py, &changes)
    }

    /// Restores `current`'s tracked fields to their pre-change values and
    /// returns the rolled-back dict.
    fn rollback(&self, py: Python<'_>, current: &Bound<'_, PyDict>) -> PyResult<PyObject> {
        let mut data = py_dict_to_bson(py, current)?;
        self.inner.lock().expect("state tracker lock poisoned").rollback(&mut data);
        crate::conversion::bson_document_to_py(py, &data)
    }

    fn reset(&self) {
        self.inner.lock().expect("state tracker lock poisoned").reset();
    }
}

fn parse_object_id(id: &str) -> PyResult<ObjectId> {
    ObjectId::parse_str(id).map_err(|_| PyValueError::new_err(format!("'{id}' is not a valid ObjectId")))
}

#[pyfunction]
#[pyo3(signature = (collection, document, class_name=None))]
pub fn insert_one<'py>(
    py: Python<'py>,
    collection: String,
    document: &Bound<'py, PyDict>,
    class_name: Option<String>,
) -> PyResult<Bound<'py, PyAny>> {
    let fields = extract_dict_fields(py, document)?;
    future_into_py(py, async move {
        let conn = active_connection()?;
        let encoded = modb_engine::encode_batch(vec![fields]).map_err(engine_error_to_pyerr)?;
        let doc = encoded.into_iter().next().unwrap_or_default();
        ops::insert_one(&conn, &collection, doc, class_name.as_deref())
            .await
            .map_err(engine_error_to_pyerr)
    })
}

/// `return_kind` of `"ids"` (default) returns the inserted ids as strings,
/// matching input order; `"documents"` additionally constructs a document
/// object per input via the registered `class_name` constructor, attaching
/// each returned id (spec §4.6) instead of making the host re-fetch or
/// re-wrap what was just inserted.
#[pyfunction]
#[pyo3(signature = (collection, documents, class_name=None, validate=true, return_kind="ids"))]
pub fn insert_many<'py>(
    py: Python<'py>,
    collection: String,
    documents: Vec<Bound<'py, PyDict>>,
    class_name: Option<String>,
    validate: bool,
    return_kind: &str,
) -> PyResult<Bound<'py, PyAny>> {
    if return_kind != "ids" && return_kind != "documents" {
        return Err(PyValueError::new_err(format!("return_kind must be 'ids' or 'documents', got '{return_kind}'")));
    }
    if return_kind == "documents" && class_name.is_none() {
        return Err(PyValueError::new_err("return_kind='documents' requires a class_name"));
    }
    let return_documents = return_kind == "documents";
    let fields: Vec<_> = documents.iter().map(|d| extract_dict_fields(py, d)).collect::<PyResult<_>>()?;
    future_into_py(py, async move {
        let conn = active_connection()?;
        // `encode_batch` consumes `fields`; keep a copy for document
        // construction so `return_kind="documents"` doesn't re-fetch.
        let fields_for_construction = if return_documents { fields.clone() } else { Vec::new() };
        let encoded = modb_engine::encode_batch(fields).map_err(engine_error_to_pyerr)?;
        let ids = ops::insert_many(&conn, &collection, encoded, class_name.as_deref(), validate)
            .await
            .map_err(engine_error_to_pyerr)?;

        if !return_documents {
            return Python::with_gil(|py| Ok(ids.into_pyobject(py)?.into_any().unbind()));
        }
        let class_name = class_name.expect("checked above");
        Python::with_gil(|py| {
            let out = pyo3::types::PyList::empty(py);
            for (mut fields, id) in fields_for_construction.into_iter().zip(ids) {
                fields.push(("_id".to_string(), ExtractedValue::ObjectIdString(id)));
                out.append(construct_document(py, &class_name, fields)?)?;
            }
            Ok(out.into_any().unbind())
        })
    })
}

/// Read path returning plain dicts (spec §6: `find_as_dicts`). Cheap when
/// the host only needs field access, not a live document instance.
#[pyfunction]
#[pyo3(signature = (collection, filter, sort=None, skip=None, limit=None))]
pub fn find_as_dicts<'py>(
    py: Python<'py>,
    collection: String,
    filter: &Bound<'py, PyDict>,
    sort: Option<Bound<'py, PyDict>>,
    skip: Option<u64>,
    limit: Option<i64>,
) -> PyResult<Bound<'py, PyAny>> {
    let filter = py_dict_to_bson(py, filter)?;
    let sort = sort.map(|s| py_dict_to_bson(py, &s)).transpose()?;
    future_into_py(py, async move {
        let conn = active_connection()?;
        let results = ops::find_as_extracted(&conn, &collection, filter, sort, skip, limit)
            .await
            .map_err(engine_error_to_pyerr)?;
        Python::with_gil(|py| {
            let out = pyo3::types::PyList::empty(py);
            for fields in results {
                let dict = PyDict::new(py);
                for (key, value) in fields {
                    dict.set_item(key, extracted_to_py(py, value)?)?;
                }
                out.append(dict)?;
            }
            Ok(out.unbind())
        })
    })
}

/// Read path returning native document objects (spec §6: `find_as_documents`;
/// §4.6 — constructing each instance here rather than handing the host a
/// dict it would then wrap itself is ~10x faster for large result sets,
/// since the per-element construction never bounces back through the
/// interpreter loop between decode and wrap).
#[pyfunction]
#[pyo3(signature = (collection, class_name, filter, sort=None, skip=None, limit=None))]
pub fn find_as_documents<'py>(
    py: Python<'py>,
    collection: String,
    class_name: String,
    filter: &Bound<'py, PyDict>,
    sort: Option<Bound<'py, PyDict>>,
    skip: Option<u64>,
    limit: Option<i64>,
) -> PyResult<Bound<'py, PyAny>> {
    let filter = py_dict_to_bson(py, filter)?;
    let sort = sort.map(|s| py_dict_to_bson(py, &s)).transpose()?;
    future_into_py(py, async move {
        let conn = active_connection()?;
        let results = ops::find_as_extracted(&conn, &collection, filter, sort, skip, limit)
            .await
            .map_err(engine_error_to_pyerr)?;
        Python::with_gil(|py| {
            let out = pyo3::types::PyList::empty(py);
            for fields in results {
                out.append(construct_document(py, &class_name, fields)?)?;
            }
            Ok(out.unbind())
        })
    })
}

#[pyfunction]
pub fn find_by_id<'py>(py: Python<'py>, collection: String, id: String) -> PyResult<Bound<'py, PyAny>> {
    future_into_py(py, async move {
        let conn = active_connection()?;
        let result = ops::find_by_id(&conn, &collection, &id).await.map_err(engine_error_to_pyerr)?;
        Python::with_gil(|py| match result {
            Some(doc) => crate::conversion::bson_document_to_py(py, &doc),
            None => Ok(py.None()),
        })
    })
}

#[pyfunction]
pub fn update_one<'py>(
    py: Python<'py>,
    collection: String,
    filter: &Bound<'py, PyDict>,
    changes: &Bound<'py, PyDict>,
) -> PyResult<Bound<'py, PyAny>> {
    let filter = py_dict_to_bson(py, filter)?;
    let changes = py_dict_to_bson(py, changes)?;
    future_into_py(py, async move {
        let conn = active_connection()?;
        ops::update_one(&conn, &collection, filter, changes).await.map_err(engine_error_to_pyerr)
    })
}

#[pyfunction]
pub fn update_many<'py>(
    py: Python<'py>,
    collection: String,
    filter: &Bound<'py, PyDict>,
    changes: &Bound<'py, PyDict>,
) -> PyResult<Bound<'py, PyAny>> {
    let filter = py_dict_to_bson(py, filter)?;
    let changes = py_dict_to_bson(py, changes)?;
    future_into_py(py, async move {
        let conn = active_connection()?;
        ops::update_many(&conn, &collection, filter, changes).await.map_err(engine_error_to_pyerr)
    })
}

#[pyfunction]
pub fn delete_one<'py>(py: Python<'py>, collection: String, filter: &Bound<'py, PyDict>) -> PyResult<Bound<'py, PyAny>> {
    let filter = py_dict_to_bson(py, filter)?;
    future_into_py(py, async move {
        let conn = active_connection()?;
        ops::delete_one(&conn, &collection, filter).await.map_err(engine_error_to_pyerr)
    })
}

#[pyfunction]
pub fn delete_many<'py>(py: Python<'py>, collection: String, filter: &Bound<'py, PyDict>) -> PyResult<Bound<'py, PyAny>> {
    let filter = py_dict_to_bson(py, filter)?;
    future_into_py(py, async move {
        let conn = active_connection()?;
        ops::delete_many(&conn, &collection, filter).await.map_err(engine_error_to_pyerr)
    })
}

/// Runs an aggregation pipeline, returning each resulting document as a
/// dict (spec §6's standalone `aggregate`; pipeline output shape varies
/// stage to stage, so there is no schema to construct a document type
/// against — `find_as_documents` is the constructor-backed sibling for
/// plain collection reads).
#[pyfunction]
pub fn aggregate<'py>(py: Python<'py>, collection: String, pipeline: Vec<Bound<'py, PyDict>>) -> PyResult<Bound<'py, PyAny>> {
    let pipeline = pipeline.iter().map(|stage| py_dict_to_bson(py, stage)).collect::<PyResult<Vec<_>>>()?;
    future_into_py(py, async move {
        let conn = active_connection()?;
        let results = ops::aggregate(&conn, &collection, pipeline).await.map_err(engine_error_to_pyerr)?;
        Python::with_gil(|py| {
            let out = pyo3::types::PyList::empty(py);
            for doc in results {
                out.append(crate::conversion::bson_document_to_py(py, &doc)?)?;
            }
            Ok(out.unbind())
        })
    })
}

#[pyfunction]
pub fn count<'py>(py: Python<'py>, collection: String, filter: &Bound<'py, PyDict>) -> PyResult<Bound<'py, PyAny>> {
    let filter = py_dict_to_bson(py, filter)?;
    future_into_py(py, async move {
        let conn = active_connection()?;
        ops::count(&conn, &collection, filter).await.map_err(engine_error_to_pyerr)
    })
}

/// Persists a tracked document's outstanding changes. `tracker.get_changes`
/// has already been called by the host to build `changes`; a tracker
/// reporting no modification is the host's cue to skip calling `save`
/// entirely, so this always issues a write when invoked.
#[pyfunction]
pub fn save<'py>(py: Python<'py>, collection: String, id: String, changes: &Bound<'py, PyDict>) -> PyResult<Bound<'py, PyAny>> {
    let id = parse_object_id(&id)?;
    let changes = py_dict_to_bson(py, changes)?;
    future_into_py(py, async move {
        let conn = active_connection()?;
        ops::save(&conn, &collection, id, changes).await.map_err(engine_error_to_pyerr)
    })
}

/// One reference field to resolve, as the host observed it on a batch of
/// documents: `(target_collection, [hex id, ...])`.
#[pyfunction]
pub fn fetch_links<'py>(
    py: Python<'py>,
    links: Vec<(String, Vec<String>)>,
) -> PyResult<Bound<'py, PyAny>> {
    let mut fields = Vec::with_capacity(links.len());
    for (collection, ids) in links {
        let ids = ids.iter().map(|id| parse_object_id(id)).collect::<PyResult<Vec<_>>>()?;
        fields.push(ops::LinkField { target_collection: collection, ids });
    }
    future_into_py(py, async move {
        let conn = active_connection()?;
        let mut seen = std::collections::HashSet::new();
        let resolved = ops::resolve_links(&conn, fields, &mut seen).await.map_err(engine_error_to_pyerr)?;
        Python::with_gil(|py| {
            let out = PyDict::new(py);
            for (collection, by_id) in resolved {
                let inner = PyDict::new(py);
                for (id, doc) in by_id {
                    inner.set_item(id.to_hex(), crate::conversion::bson_document_to_py(py, &doc)?)?;
                }
                out.set_item(collection, inner)?;
            }
            Ok(out.unbind())
        })
    })
}

pub fn register_functions(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyStateTracker>()?;
    m.add_function(wrap_pyfunction!(register_document_class, m)?)?;
    m.add_function(wrap_pyfunction!(insert_one, m)?)?;
    m.add_function(wrap_pyfunction!(insert_many, m)?)?;
    m.add_function(wrap_pyfunction!(find_as_dicts, m)?)?;
    m.add_function(wrap_pyfunction!(find_as_documents, m)?)?;
    m.add_function(wrap_pyfunction!(find_by_id, m)?)?;
    m.add_function(wrap_pyfunction!(update_one, m)?)?;
    m.add_function(wrap_pyfunction!(update_many, m)?)?;
    m.add_function(wrap_pyfunction!(delete_one, m)?)?;
    m.add_function(wrap_pyfunction!(delete_many, m)?)?;
    m.add_function(wrap_pyfunction!(count, m)?)?;
    m.add_function(wrap_pyfunction!(aggregate, m)?)?;
    m.add_function(wrap_pyfunction!(save, m)?)?;
    m.add_function(wrap_pyfunction!(fetch_links, m)?)?;
    Ok(())
}
