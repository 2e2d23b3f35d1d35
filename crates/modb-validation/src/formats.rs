//! Pre-compiled regex validators for the two string formats the engine
//! recognizes (spec §4.3). Additional formats are deliberately not added
//! here — see `constraints::StringFormat`.

use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap());

/// `format=email`: matches `^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$`.
pub fn validate_email(value: &str) -> bool {
    EMAIL_REGEX.is_match(value)
}

/// `format=url`: scheme is `http://` or `https://`.
pub fn validate_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}
