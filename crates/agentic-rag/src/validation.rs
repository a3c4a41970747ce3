//! Stateless input validation helpers
//!
//! Every check returns `Error::InvalidArgument` naming the offending field,
//! so callers can either fail fast with `?` or gather several problems with
//! [`FieldCheck`].

use std::fmt::Display;
use uuid::Uuid;

use crate::error::{Error, FieldErrors, Result};

/// Lowest accepted sampling temperature
pub const MIN_TEMPERATURE: f32 = 0.0;
/// Highest accepted sampling temperature
pub const MAX_TEMPERATURE: f32 = 2.0;
/// Smallest accepted generation token budget
pub const MIN_MAX_TOKENS: u32 = 1;
/// Largest accepted generation token budget
pub const MAX_MAX_TOKENS: u32 = 100_000;

/// Reject empty or whitespace-only strings
pub fn require_non_blank(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::invalid_field(field, format!("{} cannot be empty", field)));
    }
    Ok(())
}

/// Reject strings longer than `max_chars` characters
pub fn validate_length(value: &str, field: &str, max_chars: usize) -> Result<()> {
    let len = value.chars().count();
    if len > max_chars {
        return Err(Error::invalid_field(
            field,
            format!("{} must be at most {} characters, but was {}", field, max_chars, len),
        ));
    }
    Ok(())
}

/// Inclusive range check. NaN is always out of range.
pub fn validate_range<T>(value: T, min: T, max: T, field: &str) -> Result<()>
where
    T: PartialOrd + Display + Copy,
{
    if !(value >= min && value <= max) {
        return Err(Error::invalid_field(
            field,
            format!("{} must be between {} and {}, but was {}", field, min, max, value),
        ));
    }
    Ok(())
}

/// Temperature must lie in `[0, 2]`
pub fn validate_temperature(temperature: f32) -> Result<()> {
    validate_range(temperature, MIN_TEMPERATURE, MAX_TEMPERATURE, "temperature")
}

/// Token budget must lie in `[1, 100000]`
pub fn validate_max_tokens(max_tokens: u32) -> Result<()> {
    validate_range(max_tokens, MIN_MAX_TOKENS, MAX_MAX_TOKENS, "max_tokens")
}

/// Parse a UUID, reporting the field on failure
pub fn parse_uuid(value: &str, field: &str) -> Result<Uuid> {
    require_non_blank(value, field)?;
    Uuid::parse_str(value.trim())
        .map_err(|_| Error::invalid_field(field, format!("{} must be a valid UUID format", field)))
}

/// Gathers field errors from several checks into one `InvalidArgument`
#[derive(Debug, Default)]
pub struct FieldCheck {
    errors: FieldErrors,
}

impl FieldCheck {
    /// Start an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one check.
    ///
    /// Non-validation errors are kept under the `_` key.
    pub fn check(&mut self, outcome: Result<()>) -> &mut Self {
        match outcome {
            Ok(()) => {}
            Err(Error::InvalidArgument {
                message,
                field_errors,
            }) => {
                if field_errors.is_empty() {
                    self.errors.entry("_".to_string()).or_insert(message);
                } else {
                    for (field, problem) in field_errors {
                        self.errors.entry(field).or_insert(problem);
                    }
                }
            }
            Err(other) => {
                self.errors.entry("_".to_string()).or_insert(other.to_string());
            }
        }
        self
    }

    /// Fail if any check failed
    pub fn finish(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(Error::invalid_fields(self.errors))
        }
    }
}
