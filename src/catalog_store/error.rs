use super::models::SuggestionStatus;
use super::validation::ValidationError;
use rusqlite::ErrorCode;
use thiserror::Error;

/// Failures surfaced by the catalog store, the ranking engine and the
/// managers built on top of them.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Invalid rank {0}: must be between 1 and 5")]
    InvalidRank(i64),

    #[error("Invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Suggestion not found: {0}")]
    SuggestionNotFound(String),

    #[error("Suggestion {id} was already reviewed ({status})")]
    AlreadyReviewed {
        id: String,
        status: SuggestionStatus,
    },

    #[error("Claiming rank {rank} would evict item {item_id}")]
    EvictionRejected { rank: u8, item_id: String },

    #[error("An active item already uses media ref {0}")]
    DuplicateMediaRef(String),

    #[error("Transaction conflict: {0}")]
    Conflict(String),

    #[error("{operation} gave up after {attempts} conflicting attempts")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

impl CatalogError {
    /// Only transaction conflicts are worth re-running with the same inputs.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CatalogError::Conflict(_))
    }

    /// Stable machine-readable code, used in HTTP error bodies and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            CatalogError::InvalidRank(_) => "invalid_rank",
            CatalogError::InvalidInput { .. } => "invalid_input",
            CatalogError::ItemNotFound(_) => "item_not_found",
            CatalogError::SuggestionNotFound(_) => "suggestion_not_found",
            CatalogError::AlreadyReviewed { .. } => "already_reviewed",
            CatalogError::EvictionRejected { .. } => "eviction_rejected",
            CatalogError::DuplicateMediaRef(_) => "duplicate_media_ref",
            CatalogError::Conflict(_) => "conflict",
            CatalogError::RetriesExhausted { .. } => "retries_exhausted",
            CatalogError::Storage(_) => "storage",
        }
    }

    /// Classifies a write failure that may have been caused by the active
    /// media ref uniqueness index.
    pub(crate) fn from_write(err: rusqlite::Error, media_ref: &str) -> Self {
        if constraint_message(&err).is_some_and(|m| m.contains("items.media_ref")) {
            CatalogError::DuplicateMediaRef(media_ref.to_string())
        } else {
            CatalogError::from(err)
        }
    }
}

fn constraint_message(err: &rusqlite::Error) -> Option<&str> {
    match err {
        rusqlite::Error::SqliteFailure(failure, message)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            Some(message.as_deref().unwrap_or(""))
        }
        _ => None,
    }
}

impl From<rusqlite::Error> for CatalogError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, _) = &err {
            if matches!(
                failure.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ) {
                return CatalogError::Conflict(err.to_string());
            }
        }
        // A racing writer took the slot between our read and our write
        if constraint_message(&err).is_some_and(|m| m.contains("items.rank")) {
            return CatalogError::Conflict(err.to_string());
        }
        CatalogError::Storage(anyhow::Error::new(err))
    }
}

impl From<ValidationError> for CatalogError {
    fn from(err: ValidationError) -> Self {
        CatalogError::InvalidInput {
            field: err.field(),
            reason: err.to_string(),
        }
    }
}
