//! Unified error type for the engine.
//!
//! No variant here is recovered internally — the engine fails the whole
//! operation at the first fatal error and lets the caller decide whether to
//! retry (spec §7's propagation policy).

use thiserror::Error;

/// Result type alias used throughout the engine crates.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Stable error taxonomy surfaced across the crate boundary.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// A collection or field name failed the security filter.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A query contained a blocklisted operator (`$where`, `$function`, `$accumulator`, ...).
    #[error("dangerous operator in query: {0}")]
    DangerousOperator(String),

    /// Validation against a registered schema failed; every violation is reported at once.
    #[error("document failed validation with {} error(s)", .errors.len())]
    InvalidDocument { errors: Vec<modb_validation::ValidationError> },

    /// A dynamic value could not be converted to or from BSON.
    #[error("unconvertible value at {path}")]
    UnconvertibleValue { path: String },

    /// An operation requested schema-backed validation but no schema was registered for the class.
    #[error("no schema registered for '{0}'")]
    SchemaNotFound(String),

    /// The MongoDB driver returned an error that isn't one of the more specific kinds below.
    #[error("driver error: {cause}")]
    DriverError { cause: String },

    /// The operation exceeded its deadline. Retryable.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// The operation was cancelled by the caller. Not retryable.
    #[error("operation cancelled")]
    OperationCancelled,

    /// A write violated a unique index.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// An update or delete matched zero documents while `required=true` was set.
    #[error("no document matched: {0}")]
    NotFound(String),
}

impl EngineError {
    /// Whether a caller may reasonably retry the operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Timeout(_) | EngineError::DriverError { .. })
    }

    pub fn invalid_identifier(reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier(reason.into())
    }

    pub fn dangerous_operator(operator: impl Into<String>) -> Self {
        Self::DangerousOperator(operator.into())
    }

    pub fn unconvertible_value(path: impl Into<String>) -> Self {
        Self::UnconvertibleValue { path: path.into() }
    }

    pub fn schema_not_found(class_name: impl Into<String>) -> Self {
        Self::SchemaNotFound(class_name.into())
    }

    pub fn driver(cause: impl std::fmt::Display) -> Self {
        Self::DriverError { cause: cause.to_string() }
    }
}

impl From<modb_validation::ValidationErrors> for EngineError {
    fn from(errors: modb_validation::ValidationErrors) -> Self {
        EngineError::InvalidDocument { errors: errors.into_vec() }
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<mongodb::error::Error> for EngineError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind as DriverKind;
        match err.kind.as_ref() {
            DriverKind::Write(write_failure) => {
                if is_duplicate_key(write_failure) {
                    EngineError::DuplicateKey(err.to_string())
                } else {
                    EngineError::DriverError { cause: err.to_string() }
                }
            }
            DriverKind::BulkWrite(_) => EngineError::DriverError { cause: err.to_string() },
            _ => {
                let is_timeout = matches!(
                    err.kind.as_ref(),
                    DriverKind::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::TimedOut
                );
                if is_timeout {
                    EngineError::Timeout(err.to_string())
                } else {
                    EngineError::DriverError { cause: err.to_string() }
                }
            }
        }
    }
}

#[cfg(feature = "mongodb-errors")]
fn is_duplicate_key(failure: &mongodb::error::WriteFailure) -> bool {
    use mongodb::error::WriteFailure;
    match failure {
        WriteFailure::WriteError(write_error) => write_error.code == 11000,
        _ => false,
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::ser::Error> for EngineError {
    fn from(err: bson::ser::Error) -> Self {
        EngineError::UnconvertibleValue { path: err.to_string() }
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::de::Error> for EngineError {
    fn from(err: bson::de::Error) -> Self {
        EngineError::UnconvertibleValue { path: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_invalid_identifier() {
        let err = EngineError::invalid_identifier("contains '$'");
        assert_eq!(err.to_string(), "invalid identifier: contains '$'");
    }

    #[test]
    fn display_invalid_document_counts_errors() {
        let errors = vec![
            modb_validation::ValidationError::field_required("email"),
            modb_validation::ValidationError::field_required("name"),
        ];
        let err = EngineError::InvalidDocument { errors };
        assert_eq!(err.to_string(), "document failed validation with 2 error(s)");
    }

    #[test]
    fn is_retryable() {
        assert!(EngineError::Timeout("slow".into()).is_retryable());
        assert!(EngineError::DriverError { cause: "x".into() }.is_retryable());
        assert!(!EngineError::NotFound("id".into()).is_retryable());
        assert!(!EngineError::OperationCancelled.is_retryable());
    }

    #[test]
    fn from_validation_errors() {
        let mut errors = modb_validation::ValidationErrors::new();
        errors.add(modb_validation::ValidationError::not_nullable("age"));
        let err: EngineError = errors.into();
        assert!(matches!(err, EngineError::InvalidDocument { errors } if errors.len() == 1));
    }
}
