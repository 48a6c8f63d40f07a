//! Tool endpoints
//!
//! Every tool route is served by [`handle`]: validate, assemble the prompt,
//! run the tool's cascade and stream the winning attempt back as plain text.

use crate::error::AppError;
use crate::handlers::AppState;
use crate::handlers::extractor::ToolJson;
use crate::middleware::RequestId;
use crate::relay::{RelayContext, relay};
use crate::tools::{AssembleContext, Tool};
use axum::{
    Extension,
    body::Body,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::Response,
};

/// 1-based index of the cascade attempt serving the response
pub const CASCADE_ATTEMPT_HEADER: &str = "x-cascade-attempt";

/// POST handler shared by all tools
///
/// # Response
///
/// - `200 OK`, `text/plain`, body streamed as the model produces it
/// - `400 Bad Request` if the payload is malformed or misses its content field
/// - `500 Internal Server Error` if the tool has no configured model or every
///   model attempt failed
///
/// A provider failure after the 200 has been sent aborts the body; the caller
/// sees a truncated response.
pub async fn handle<T: Tool>(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    ToolJson(payload): ToolJson<T::Payload>,
) -> Result<Response, AppError> {
    let tool = T::KIND;

    let valid = T::validate(payload).inspect_err(|e| {
        tracing::info!(
            request_id = %request_id,
            tool = %tool,
            error = %e,
            "Rejected invalid payload"
        );
    })?;

    let runtime = state.tool(tool).ok_or_else(|| {
        AppError::Internal(format!("no runtime registered for tool '{tool}'"))
    })?;

    let request = T::assemble(&valid, &AssembleContext::now(runtime.settings));
    tracing::info!(
        request_id = %request_id,
        tool = %tool,
        approx_prompt_tokens = request.estimated_prompt_tokens(),
        "Request received"
    );

    let established = runtime
        .cascade
        .execute(&request, request_id, state.metrics())
        .await?;

    let attempt = established.attempt;
    let body = relay(
        established.stream,
        RelayContext {
            tool,
            request_id,
            provider: established.provider,
            model: established.model,
            metrics: state.metrics().clone(),
        },
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        )
        .header(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"))
        .header("x-accel-buffering", HeaderValue::from_static("no"))
        .header(CASCADE_ATTEMPT_HEADER, HeaderValue::from(attempt))
        .body(Body::from_stream(body))
        .map_err(|e| AppError::Internal(format!("failed to build streaming response: {e}")))
}
