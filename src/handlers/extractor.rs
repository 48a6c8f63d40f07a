//! JSON extractor with plain-text rejections
//!
//! Wraps Axum's `Json` extractor so that malformed bodies, wrong shapes and
//! missing content types all surface as `AppError::Validation` (400 with a
//! plain-text reason), the same as payload validation failures.

use crate::error::AppError;
use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
};
use serde::de::DeserializeOwned;

/// Custom JSON extractor for tool payloads
pub struct ToolJson<T>(pub T);

fn rejection_message(rejection: &JsonRejection) -> String {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            "Content-Type must be application/json.".to_string()
        }
        JsonRejection::JsonSyntaxError(_) => {
            format!("Malformed JSON body: {}", rejection.body_text())
        }
        _ => rejection.body_text(),
    }
}

impl<S, T> FromRequest<S> for ToolJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ToolJson(value)),
            Err(rejection) => {
                tracing::debug!(
                    status = %rejection.status(),
                    error = %rejection.body_text(),
                    "Rejected request body"
                );
                Err(AppError::Validation(rejection_message(&rejection)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, header};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Payload {
        query: Option<String>,
    }

    fn request(content_type: Option<&str>, body: &'static str) -> Request {
        let mut builder = HttpRequest::builder().method("POST").uri("/");
        if let Some(ct) = content_type {
            builder = builder.header(header::CONTENT_TYPE, ct);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn test_valid_json_is_extracted() {
        let ToolJson(payload) = ToolJson::<Payload>::from_request(
            request(Some("application/json"), r#"{"query":"q"}"#),
            &(),
        )
        .await
        .unwrap_or_else(|_| panic!("valid body rejected"));
        assert_eq!(payload.query.as_deref(), Some("q"));
    }

    #[tokio::test]
    async fn test_malformed_json_is_validation_error() {
        let result =
            ToolJson::<Payload>::from_request(request(Some("application/json"), "{not json"), &())
                .await;
        match result {
            Err(AppError::Validation(msg)) => assert!(msg.starts_with("Malformed JSON body")),
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("malformed body accepted"),
        }
    }

    #[tokio::test]
    async fn test_missing_content_type_is_validation_error() {
        let result =
            ToolJson::<Payload>::from_request(request(None, r#"{"query":"q"}"#), &()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_wrong_shape_is_validation_error() {
        let result = ToolJson::<Payload>::from_request(
            request(Some("application/json"), r#"{"query":42}"#),
            &(),
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
