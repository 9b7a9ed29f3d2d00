//! Response envelope and error mapping shared by every handler

pub mod validated_json;

pub use validated_json::ValidatedJson;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::shared::errors::LedgerError;

/// Standard API response wrapper
///
/// Success: `{"success": true, "data": {...}}`,
/// failure: `{"success": false, "data": null, "error": "..."}`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    /// Payload. `null` on error
    pub data: Option<T>,
    /// Error description. Omitted on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Seconds a client should wait before resubmitting after a 503.
pub const RETRY_AFTER_SECS: &str = "1";

/// Ledger error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self(err)
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

pub fn status_for(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
        LedgerError::SlotUnavailable { .. }
        | LedgerError::AlreadyCancelled(_)
        | LedgerError::IdempotencyKeyReused(_) => StatusCode::CONFLICT,
        LedgerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::ReadOnly => StatusCode::FORBIDDEN,
        LedgerError::LockTimeout(_)
        | LedgerError::StaleWrite(_)
        | LedgerError::DuplicateIdempotencyKey(_)
        | LedgerError::DuplicateConfirmationCode(_) => StatusCode::SERVICE_UNAVAILABLE,
        LedgerError::InvariantViolation(_) | LedgerError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(kind = self.0.kind(), error = %self.0, "Request failed");
            "internal error".to_string()
        } else {
            debug!(kind = self.0.kind(), error = %self.0, status = status.as_u16(), "Request rejected");
            self.0.to_string()
        };

        let mut response = (status, Json(ApiResponse::<()>::error(message))).into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        }
        response
    }
}
