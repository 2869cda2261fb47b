use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures raised by a key-value store backend.
///
/// These never reach a capture caller: the idempotency gate logs them and
/// falls back to uncached, unlocked processing.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("TTL of {0}s is out of range")]
    InvalidTtl(u64),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the capture flow.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Empty or malformed batch, or one or more events failed validation.
    #[error("Invalid capture request: {}", .errors.join("; "))]
    InvalidInput { errors: Vec<String> },

    /// Another attempt with the same idempotency key holds the processing lock.
    #[error("A request with this idempotency key is already being processed")]
    AlreadyProcessing,

    /// Anything else. Details go to the log, never to the caller.
    #[error("Capture processing failed")]
    Internal,
}

impl CaptureError {
    pub fn invalid(message: impl Into<String>) -> Self {
        CaptureError::InvalidInput {
            errors: vec![message.into()],
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CaptureError::InvalidInput { .. } => "client",
            CaptureError::AlreadyProcessing => "conflict",
            CaptureError::Internal => "internal",
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// HTTP-facing error for the capture routes.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Missing or invalid header {0}")]
    BadHeader(&'static str),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::MalformedPayload(_) | AppError::BadHeader(_) => StatusCode::BAD_REQUEST,
            AppError::Capture(CaptureError::InvalidInput { .. }) => StatusCode::BAD_REQUEST,
            AppError::Capture(CaptureError::AlreadyProcessing) => StatusCode::CONFLICT,
            AppError::Capture(CaptureError::Internal) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::MalformedPayload(_) | AppError::BadHeader(_) => "client",
            AppError::Capture(e) => e.kind(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        if let AppError::Capture(CaptureError::InvalidInput { errors }) = &self {
            body["errors"] = json!(errors);
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_lists_every_error() {
        let err = CaptureError::InvalidInput {
            errors: vec!["event[0]: missing type".into(), "event[2]: not an object".into()],
        };
        assert_eq!(
            err.to_string(),
            "Invalid capture request: event[0]: missing type; event[2]: not an object"
        );
        assert_eq!(err.kind(), "client");
    }

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(
            AppError::from(CaptureError::invalid("empty")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(CaptureError::AlreadyProcessing).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(CaptureError::Internal).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::BadHeader("Idempotency-Key").status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn internal_error_does_not_leak_details() {
        assert_eq!(CaptureError::Internal.to_string(), "Capture processing failed");
    }
}
