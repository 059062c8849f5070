use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::mail::OutboxError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("validation failed: {0:?}")]
    Validation(Vec<String>),

    #[error("course access code required")]
    AccessDenied,

    #[error("{0}")]
    SeatCapReached(String),

    #[error("welcome email delivery failed")]
    EmailSendFailed,

    #[error("contact email delivery failed")]
    ContactSendFailed,

    #[error("cohort request could not be archived or emailed")]
    RequestNotRecorded,

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn http_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::AccessDenied => StatusCode::FORBIDDEN,
            Self::SeatCapReached(_) => StatusCode::CONFLICT,
            Self::EmailSendFailed => StatusCode::BAD_GATEWAY,
            Self::ContactSendFailed | Self::RequestNotRecorded => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn http_message(&self) -> String {
        match self {
            Self::BadRequest(msg) | Self::SeatCapReached(msg) => msg.clone(),
            Self::Validation(_) => "validation failed".to_string(),
            Self::AccessDenied => "Please sign in with the course access code.".to_string(),
            Self::EmailSendFailed => {
                "We couldn't send the confirmation email. Please try again later.".to_string()
            }
            Self::ContactSendFailed => {
                "We couldn't send your message right now. Please try again later.".to_string()
            }
            Self::RequestNotRecorded => {
                "We could not record your request right now. Please try again or email \
                 connect@aiforimpact.net."
                    .to_string()
            }
            Self::Internal(_) => "internal_error".to_string(),
        }
    }
}

impl From<OutboxError> for ApiError {
    fn from(e: OutboxError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Trace server errors since we don't return the detailed error in the response body
        if self.http_code().is_server_error() {
            tracing::error!("Error Status {}: {}", self.http_code(), self);
        }

        let body = match &self {
            Self::Validation(errors) => json!({"ok": false, "errors": errors}),
            Self::EmailSendFailed => json!({
                "ok": false,
                "error": "email_send_failed",
                "message": self.http_message(),
            }),
            _ => json!({"ok": false, "error": self.http_message()}),
        };

        (self.http_code(), Json(body)).into_response()
    }
}

/// `Err(ApiError::Validation)` when any message was collected.
pub fn reject_if_invalid(errors: Vec<String>) -> ApiResult<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}
