//! Global security configuration exposed to the host. Mirrors the engine's
//! identifier/query filters with one knob the pure-Rust engine has no
//! opinion on: how aggressively bare strings auto-convert to `ObjectId`.

use std::sync::RwLock;

use pyo3::prelude::*;

use modb_engine::ExpectedType;

/// Controls when a plain string is treated as an ObjectId during Phase 1
/// extraction.
///
/// `TypeHinted` is the default here (not `Lenient`): a bare 24-hex-char
/// string never auto-converts on its own, closing the all-zeros-ObjectId
/// injection some Beanie-style ORMs have shipped with. Callers that need an
/// ObjectId wrap the value in the host's `ObjectId` type explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[pyclass(module = "modb")]
pub enum ObjectIdConversionMode {
    TypeHinted = 0,
    Lenient = 1,
    Strict = 2,
}

#[pymethods]
impl ObjectIdConversionMode {
    #[classattr]
    const TYPE_HINTED: Self = Self::TypeHinted;
    #[classattr]
    const LENIENT: Self = Self::Lenient;
    #[classattr]
    const STRICT: Self = Self::Strict;

    fn __repr__(&self) -> &'static str {
        match self {
            Self::TypeHinted => "ObjectIdConversionMode.TYPE_HINTED",
            Self::Lenient => "ObjectIdConversionMode.LENIENT",
            Self::Strict => "ObjectIdConversionMode.STRICT",
        }
    }
}

impl ObjectIdConversionMode {
    /// Whether a bare string matching ObjectId's hex format should be
    /// treated as one at this position, absent an explicit type wrapper.
    pub fn auto_converts_bare_hex(self) -> bool {
        matches!(self, Self::Lenient)
    }

    pub fn expected_type_for_wrapped_value(self) -> ExpectedType {
        match self {
            Self::Strict => ExpectedType::Other,
            Self::TypeHinted | Self::Lenient => ExpectedType::ObjectId,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub objectid_mode: ObjectIdConversionMode,
    pub validate_queries: bool,
    pub sanitize_errors: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            objectid_mode: ObjectIdConversionMode::TypeHinted,
            validate_queries: true,
            sanitize_errors: true,
        }
    }
}

static GLOBAL_CONFIG: RwLock<Option<SecurityConfig>> = RwLock::new(None);

pub fn get_config() -> SecurityConfig {
    GLOBAL_CONFIG
        .read()
        .expect("security config lock poisoned")
        .clone()
        .unwrap_or_default()
}

pub fn set_config(config: SecurityConfig) {
    *GLOBAL_CONFIG.write().expect("security config lock poisoned") = Some(config);
}

#[pyfunction]
#[pyo3(signature = (objectid_mode=None, validate_queries=None, sanitize_errors=None))]
pub fn configure_security(
    objectid_mode: Option<ObjectIdConversionMode>,
    validate_queries: Option<bool>,
    sanitize_errors: Option<bool>,
) -> PyResult<()> {
    let mut config = get_config();
    if let Some(mode) = objectid_mode {
        if mode == ObjectIdConversionMode::Lenient {
            eprintln!(
                "WARNING: ObjectIdConversionMode.LENIENT auto-converts bare hex strings to \
                 ObjectId and is vulnerable to NoSQL injection via crafted id strings. Prefer \
                 TYPE_HINTED or STRICT."
            );
        }
        config.objectid_mode = mode;
    }
    if let Some(validate) = validate_queries {
        if !validate {
            eprintln!("WARNING: query validation disabled; dangerous operators will not be blocked.");
        }
        config.validate_queries = validate;
    }
    if let Some(sanitize) = sanitize_errors {
        config.sanitize_errors = sanitize;
    }
    set_config(config);
    Ok(())
}

#[pyfunction]
pub fn get_security_config() -> PyResult<(ObjectIdConversionMode, bool, bool)> {
    let config = get_config();
    Ok((config.objectid_mode, config.validate_queries, config.sanitize_errors))
}

pub fn register_functions(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<ObjectIdConversionMode>()?;
    m.add_function(wrap_pyfunction!(configure_security, m)?)?;
    m.add_function(wrap_pyfunction!(get_security_config, m)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_type_hinted() {
        assert_eq!(SecurityConfig::default().objectid_mode, ObjectIdConversionMode::TypeHinted);
    }

    #[test]
    fn only_lenient_auto_converts_bare_hex() {
        assert!(ObjectIdConversionMode::Lenient.auto_converts_bare_hex());
        assert!(!ObjectIdConversionMode::TypeHinted.auto_converts_bare_hex());
        assert!(!ObjectIdConversionMode::Strict.auto_converts_bare_hex());
    }
}
