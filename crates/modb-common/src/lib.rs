//! Error taxonomy shared by every engine crate.

pub mod error;

pub use error::{EngineError, Result};
