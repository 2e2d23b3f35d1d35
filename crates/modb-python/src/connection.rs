//! Connection lifecycle exposed to the host: `init`/`close`/`reset` around
//! the engine's URL-keyed pool registry.

use std::sync::{Arc, RwLock as StdRwLock};

use pyo3::exceptions::PyRuntimeError;
use pyo3::prelude::*;
use pyo3_async_runtimes::tokio::future_into_py;

use modb_engine::{Connection, PoolConfig};

use crate::config::get_config;
use crate::error_handling::sanitize_error;

/// The connection most recently established via `init()`. Operation
/// pyfunctions read this rather than threading a handle through every call,
/// matching the teacher's single-active-connection binding surface; the
/// underlying `modb_engine::connection` registry still supports multiple
/// pools for embedding contexts that want them directly.
static ACTIVE: StdRwLock<Option<(String, Arc<Connection>)>> = StdRwLock::new(None);

pub(crate) fn active_connection() -> PyResult<Arc<Connection>> {
    ACTIVE
        .read()
        .map_err(|e| PyRuntimeError::new_err(format!("connection lock poisoned: {e}")))?
        .as_ref()
        .map(|(_, conn)| conn.clone())
        .ok_or_else(|| PyRuntimeError::new_err("not connected; call init() first"))
}

#[pyfunction]
pub fn init<'py>(py: Python<'py>, url: String) -> PyResult<Bound<'py, PyAny>> {
    future_into_py(py, async move {
        {
            let existing = ACTIVE.read().map_err(|e| PyRuntimeError::new_err(format!("connection lock poisoned: {e}")))?;
            if existing.is_some() {
                return Err(PyRuntimeError::new_err("already connected; call close() first to reconnect"));
            }
        }

        let conn = modb_engine::get_or_connect(&url, PoolConfig::default()).await.map_err(|e| {
            let config = get_config();
            PyRuntimeError::new_err(sanitize_error(&e.to_string(), !config.sanitize_errors))
        })?;

        let mut active = ACTIVE.write().map_err(|e| PyRuntimeError::new_err(format!("connection lock poisoned: {e}")))?;
        *active = Some((url, conn));
        Ok(())
    })
}

#[pyfunction]
pub fn is_connected() -> bool {
    ACTIVE.read().map(|lock| lock.is_some()).unwrap_or(false)
}

#[pyfunction]
pub fn close<'py>(py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
    future_into_py(py, async move {
        let url = {
            let mut active = ACTIVE.write().map_err(|e| PyRuntimeError::new_err(format!("connection lock poisoned: {e}")))?;
            active.take().ok_or_else(|| PyRuntimeError::new_err("no active connection to close"))?.0
        };
        modb_engine::disconnect(&url);
        Ok(())
    })
}

#[pyfunction]
pub fn reset() -> PyResult<()> {
    let mut active = ACTIVE.write().map_err(|e| PyRuntimeError::new_err(format!("connection lock poisoned: {e}")))?;
    if let Some((url, _)) = active.take() {
        modb_engine::disconnect(&url);
    }
    Ok(())
}

#[pyfunction]
pub fn available_features() -> Vec<String> {
    vec!["mongodb".to_string()]
}

pub fn register_functions(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(init, m)?)?;
    m.add_function(wrap_pyfunction!(is_connected, m)?)?;
    m.add_function(wrap_pyfunction!(close, m)?)?;
    m.add_function(wrap_pyfunction!(reset, m)?)?;
    m.add_function(wrap_pyfunction!(available_features, m)?)?;
    Ok(())
}
