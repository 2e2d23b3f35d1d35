//! Structured, path-tagged validation errors.
//!
//! The engine never raises on a single bad field: it walks the whole
//! document and returns every violation it found. Formatting the list into
//! something user-facing is left to the host binding (spec: "the engine
//! returns a structured error list; formatting is the binding's job").

use std::fmt;

/// Classification of a single validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Value's BSON type doesn't match the descriptor's declared type.
    TypeMismatch,
    /// Required field missing from the document.
    FieldRequired,
    /// Required field present but explicitly null.
    NotNullable,
    /// A `Constraints` check failed (length, range, format) after the type check passed.
    ConstraintViolation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch => write!(f, "type_mismatch"),
            Self::FieldRequired => write!(f, "field_required"),
            Self::NotNullable => write!(f, "not_nullable"),
            Self::ConstraintViolation => write!(f, "constraint_violation"),
        }
    }
}

/// A single, path-tagged validation error.
///
/// `field_path` uses dotted nesting for objects and `name[index]` for array
/// elements, e.g. `address.city`, `tags[2].label`.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field_path: String,
    pub kind: ErrorKind,
    pub expected: Option<String>,
    pub got: Option<String>,
    pub message: String,
}

impl ValidationError {
    pub fn new(field_path: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            field_path: field_path.into(),
            kind,
            expected: None,
            got: None,
            message: message.into(),
        }
    }

    pub fn type_mismatch(field_path: impl Into<String>, expected: impl Into<String>, got: impl Into<String>) -> Self {
        let expected = expected.into();
        let got = got.into();
        let field_path = field_path.into();
        Self {
            message: format!("field '{}' expected type '{}', got '{}'", field_path, expected, got),
            field_path,
            kind: ErrorKind::TypeMismatch,
            expected: Some(expected),
            got: Some(got),
        }
    }

    pub fn field_required(field_path: impl Into<String>) -> Self {
        let field_path = field_path.into();
        Self {
            message: format!("field '{}' is required", field_path),
            field_path,
            kind: ErrorKind::FieldRequired,
            expected: None,
            got: None,
        }
    }

    pub fn not_nullable(field_path: impl Into<String>) -> Self {
        let field_path = field_path.into();
        Self {
            message: format!("field '{}' is not nullable", field_path),
            field_path,
            kind: ErrorKind::NotNullable,
            expected: None,
            got: None,
        }
    }

    pub fn constraint(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(field_path, ErrorKind::ConstraintViolation, message)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.field_path, self.kind, self.message)
    }
}

/// Ordered collection of validation errors (pre-order: object fields in
/// schema order, array elements left-to-right).
#[derive(Debug, Clone, Default)]
pub struct ValidationErrors {
    pub errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = ValidationError>) {
        self.errors.extend(errors);
    }

    pub fn into_vec(self) -> Vec<ValidationError> {
        self.errors
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation error(s)", self.errors.len())
    }
}

impl std::error::Error for ValidationErrors {}
