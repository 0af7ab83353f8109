//! JSON error responses.

use crate::catalog_store::CatalogError;
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

/// Machine-readable error code attached to error responses, read back by
/// the request logging layer for the error metrics.
#[derive(Debug, Clone, Copy)]
pub struct ErrorCode(pub &'static str);

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        ApiError {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "storage", message)
    }
}

fn status_for(err: &CatalogError) -> StatusCode {
    match err {
        CatalogError::InvalidRank(_) | CatalogError::InvalidInput { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        CatalogError::ItemNotFound(_) | CatalogError::SuggestionNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        CatalogError::AlreadyReviewed { .. }
        | CatalogError::EvictionRejected { .. }
        | CatalogError::DuplicateMediaRef(_)
        | CatalogError::Conflict(_) => StatusCode::CONFLICT,
        CatalogError::RetriesExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        CatalogError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        let status = status_for(&err);
        let message = match &err {
            CatalogError::Storage(inner) => {
                error!("Storage failure: {:#}", inner);
                "internal storage error".to_string()
            }
            other => other.to_string(),
        };
        ApiError::new(status, err.code(), message)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(rejection.status(), "invalid_input", rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_input",
            rejection.body_text(),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code,
            message: &self.message,
        };
        let mut response = (self.status, Json(body)).into_response();
        response.extensions_mut().insert(ErrorCode(self.code));
        response
    }
}
