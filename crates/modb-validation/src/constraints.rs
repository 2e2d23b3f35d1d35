//! Field-level constraints shared by every descriptor leaf.
//!
//! Evaluated only after the type check passes (spec §4.3).

/// String length and format constraints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringConstraints {
    /// Minimum length in code points (not bytes).
    pub min_length: Option<usize>,
    /// Maximum length in code points (not bytes).
    pub max_length: Option<usize>,
    pub format: Option<StringFormat>,
}

/// Predefined string format validators. Deliberately minimal — spec §9
/// flags adding further formats (e.g. `uuid`) as additive, each requiring
/// its own test matrix; we don't infer semantics from the regex alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFormat {
    Email,
    Url,
}

/// Numeric range constraints, generic over the descriptor's declared
/// numeric domain (i64 for Int64, f64 for Double) — comparisons never
/// widen across domains.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumericConstraints<T> {
    pub min: Option<T>,
    pub max: Option<T>,
}

/// Array element-count constraints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrayConstraints {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
}
