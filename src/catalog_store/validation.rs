//! Validation for catalog inputs.
//!
//! Runs before any transaction is opened so that malformed input never
//! reaches the store.

use std::fmt;

pub const MAX_TITLE_LENGTH: usize = 255;

/// Validation error types
#[derive(Debug)]
pub enum ValidationError {
    EmptyField { field: &'static str },
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },
}

impl ValidationError {
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::EmptyField { field } | ValidationError::TooLong { field, .. } => field,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField { field } => {
                write!(f, "Field '{}' is required but was empty", field)
            }
            ValidationError::TooLong { field, max, actual } => {
                write!(
                    f,
                    "Field '{}' must be at most {} characters, got {}",
                    field, max, actual
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

fn require_non_empty(field: &'static str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    Ok(())
}

pub fn validate_title(title: &str) -> ValidationResult<()> {
    require_non_empty("title", title)?;
    let length = title.trim().chars().count();
    if length > MAX_TITLE_LENGTH {
        return Err(ValidationError::TooLong {
            field: "title",
            max: MAX_TITLE_LENGTH,
            actual: length,
        });
    }
    Ok(())
}

/// Media refs are opaque; the only local requirement is that one is given.
pub fn validate_media_ref(media_ref: &str) -> ValidationResult<()> {
    require_non_empty("media_ref", media_ref)
}

pub fn validate_reviewer_id(reviewer_id: &str) -> ValidationResult<()> {
    require_non_empty("reviewer_id", reviewer_id)
}
