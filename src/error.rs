//! Error types for formatter-relay
//!
//! `AppError` is the HTTP-facing error and implements `IntoResponse` for Axum
//! handlers. `AttemptError` and `CascadeError` describe what happened inside a
//! model cascade; `RelayError` is the mid-stream failure that aborts a response
//! body after streaming has started.

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use std::time::Duration;
use thiserror::Error;

/// Fixed body returned when a tool has no usable primary model
pub const NOT_CONFIGURED_MESSAGE: &str = "Server is not configured correctly.";

/// Fixed body returned when every configured model attempt failed
pub const CASCADE_EXHAUSTED_MESSAGE: &str = "Error communicating with AI.";

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file {path}: {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in {path}: {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("All model attempts failed: {0}")]
    CascadeExhausted(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Bodies are plain text; internal detail (provider names, models,
        // upstream messages) is logged, never returned.
        let (status, message) = match &self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Config(_)
            | Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                NOT_CONFIGURED_MESSAGE.to_string(),
            ),
            Self::CascadeExhausted(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                CASCADE_EXHAUSTED_MESSAGE.to_string(),
            ),
            Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error.".to_string(),
            ),
        };

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            message,
        )
            .into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;

/// Why a single model attempt did not establish a stream
///
/// Every variant is recoverable by the cascade: the next configured attempt
/// is tried. The same type is reused for failures after establishment, where
/// it ends the relay instead.
#[derive(Error, Debug, Clone)]
pub enum AttemptError {
    #[error("transport error talking to {provider}: {message}")]
    Transport { provider: String, message: String },

    #[error("{provider} rejected the request with HTTP {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{provider} reported an error: {message}")]
    Upstream { provider: String, message: String },

    #[error("could not decode stream from {provider}: {message}")]
    Decode { provider: String, message: String },

    #[error("{provider} did not start streaming within {timeout:?}")]
    Timeout { provider: String, timeout: Duration },
}

impl AttemptError {
    /// Short, bounded label for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Status { status, .. } if *status == 401 || *status == 403 => "auth",
            Self::Status { status, .. } if *status == 429 => "rate_limited",
            Self::Status { .. } => "status",
            Self::Upstream { .. } => "upstream",
            Self::Decode { .. } => "decode",
            Self::Timeout { .. } => "timeout",
        }
    }
}

/// Terminal failure of a model cascade
#[derive(Error, Debug)]
pub enum CascadeError {
    /// No primary model (or its credential) is configured; nothing was attempted
    #[error("no primary model configured for tool '{tool}'")]
    NotConfigured { tool: String },

    /// Every configured attempt failed before a stream was established
    #[error("all {attempts} model attempt(s) failed for tool '{tool}'; last error: {last}")]
    Exhausted {
        tool: String,
        attempts: usize,
        last: AttemptError,
    },
}

impl From<CascadeError> for AppError {
    fn from(err: CascadeError) -> Self {
        match err {
            CascadeError::NotConfigured { .. } => AppError::Config(err.to_string()),
            CascadeError::Exhausted { .. } => AppError::CascadeExhausted(err.to_string()),
        }
    }
}

/// Upstream stream failed after bytes were already relayed to the caller
///
/// Returned from the response body stream so hyper aborts the connection;
/// the caller observes a truncated body rather than an error payload.
#[derive(Error, Debug)]
#[error("upstream stream from {provider} failed after {bytes_relayed} bytes: {source}")]
pub struct RelayError {
    pub provider: String,
    pub bytes_relayed: usize,
    #[source]
    pub source: AttemptError,
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_validation_error_creates() {
        let err = AppError::Validation("invalid input".to_string());
        assert_eq!(err.to_string(), "Invalid request: invalid input");
    }

    #[tokio::test]
    async fn test_validation_error_response_is_400_with_reason() {
        let response = AppError::Validation("Query is required.".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_text(response).await, "Query is required.");
    }

    #[tokio::test]
    async fn test_config_error_response_uses_fixed_message() {
        let response = AppError::Config("OPTIMIZER_MODEL_PRIMARY unset".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, NOT_CONFIGURED_MESSAGE);
    }

    #[tokio::test]
    async fn test_exhausted_response_hides_upstream_detail() {
        let err: AppError = CascadeError::Exhausted {
            tool: "format".to_string(),
            attempts: 2,
            last: AttemptError::Status {
                provider: "openrouter".to_string(),
                status: 401,
                body: "invalid key sk-secret".to_string(),
            },
        }
        .into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_text(response).await;
        assert_eq!(body, CASCADE_EXHAUSTED_MESSAGE);
        assert!(!body.contains("sk-secret"));
    }

    #[test]
    fn test_not_configured_maps_to_config_error() {
        let err: AppError = CascadeError::NotConfigured {
            tool: "format".to_string(),
        }
        .into();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_attempt_error_kinds() {
        let status = |status| AttemptError::Status {
            provider: "p".to_string(),
            status,
            body: String::new(),
        };
        assert_eq!(status(401).kind(), "auth");
        assert_eq!(status(403).kind(), "auth");
        assert_eq!(status(429).kind(), "rate_limited");
        assert_eq!(status(503).kind(), "status");
        let timeout = AttemptError::Timeout {
            provider: "p".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(timeout.kind(), "timeout");
    }

    #[tokio::test]
    async fn test_internal_error_response_status() {
        let response = AppError::Internal("boom".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body_text(response).await.contains("boom"));
    }
}
