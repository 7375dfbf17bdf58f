//! Core-to-HTTP error mapping: every failure leaves the transport as the
//! envelope `{ success: false, error: { code, message }, requestId }`.

use app_core::{CoreError, ErrorKind};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{error, warn};
use uuid::Uuid;

pub struct ApiError {
    pub error: CoreError,
    pub request_id: Uuid,
}

impl From<CoreError> for ApiError {
    fn from(error: CoreError) -> Self {
        ApiError {
            error,
            request_id: Uuid::new_v4(),
        }
    }
}

fn status_of(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.error.kind();
        let status = status_of(kind);
        // Operational failures are expected; only internal ones get the
        // loud treatment.
        if self.error.is_operational() {
            warn!(request_id = %self.request_id, error = %self.error, "request_failed");
        } else {
            error!(request_id = %self.request_id, error = %self.error, "request_errored");
        }
        // Internal details never leave the process.
        let message = if kind == ErrorKind::Internal {
            "internal error".to_string()
        } else {
            self.error.to_string()
        };
        let body = json!({
            "success": false,
            "error": {
                "code": self.error.code(),
                "message": message,
            },
            "requestId": self.request_id,
        });
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
