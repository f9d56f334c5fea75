//! Shared utility functions for parsing, text shaping and row iteration.

use std::fmt::Display;

// =============================================================================
// String Utilities
// =============================================================================

/// Capitalize the first character of a string.
#[inline]
pub fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

/// Truncate to at most `max_chars` characters, marking the cut with an ellipsis.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut truncated: String = s.chars().take(max_chars).collect();
    truncated.push('…');
    truncated
}

// =============================================================================
// Type Parsing
// =============================================================================

/// Trait for parsing strings into enum types with a default fallback.
/// Used for database values where invalid strings should fall back gracefully.
/// Logs a warning when an invalid value is encountered.
pub trait ParseWithDefault: Sized {
    /// The name of this type for logging purposes.
    fn type_name() -> &'static str;

    /// The default value to use when parsing fails.
    fn default_value() -> Self;

    /// Try to parse the string, returning None if invalid.
    fn try_parse(s: &str) -> Option<Self>;

    /// Parse a string into this type, returning a default value if parsing fails.
    fn parse_or_default(s: &str) -> Self {
        match Self::try_parse(s) {
            Some(v) => v,
            None => {
                tracing::warn!("Invalid {} value '{}', using default", Self::type_name(), s);
                Self::default_value()
            }
        }
    }
}

/// Filter an iterator of Results, logging errors at debug level before discarding.
pub fn log_filter_error<T, E: Display>(result: Result<T, E>, context: &str) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::debug!("{}: {}", context, e);
            None
        }
    }
}

/// Like log_filter_error but logs at warn level for more important operations.
pub fn log_filter_warn<T, E: Display>(result: Result<T, E>, context: &str) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("{}: {}", context, e);
            None
        }
    }
}
