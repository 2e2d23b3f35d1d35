//! Shared validation vocabulary: constraints, formats, and the structured
//! error list the engine's validator produces.
//!
//! This is a trimmed sibling of the teacher's `ouroboros-validation` crate —
//! it carries only the pieces `modb-engine`'s descriptor/validator need
//! (constraints, formats, path-tagged errors). The teacher's computed
//! fields, serializers, discriminated unions, JSON schema export, and
//! dataclass support back other consumers (HTTP request validation,
//! spreadsheet cells) that have no counterpart in this spec.

pub mod constraints;
pub mod errors;
pub mod formats;

pub use constraints::{ArrayConstraints, NumericConstraints, StringConstraints, StringFormat};
pub use errors::{ErrorKind, ValidationError, ValidationErrors};
