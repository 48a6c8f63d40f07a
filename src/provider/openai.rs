//! OpenAI-compatible HTTP provider (OpenAI, OpenRouter, and friends)

use crate::config::ResolvedProvider;
use crate::error::{AppError, AppResult, AttemptError};
use crate::provider::{ChatProvider, ChunkStream, CompletionRequest, sse};
use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;

/// Longest upstream error body kept for logs
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Streaming client for one OpenAI-compatible provider
///
/// Holds its own connection pool; cloning the inner `reqwest::Client` is
/// cheap and shares it.
#[derive(Clone)]
pub struct OpenAiProvider {
    name: String,
    completions_url: String,
    api_key: String,
    headers: HeaderMap,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("name", &self.name)
            .field("completions_url", &self.completions_url)
            .finish_non_exhaustive()
    }
}

impl OpenAiProvider {
    /// Build a provider from resolved configuration
    ///
    /// # Errors
    /// Returns `AppError::Config` if a configured header name or value is not
    /// a valid HTTP header, or if the HTTP client cannot be built.
    pub fn new(resolved: &ResolvedProvider, connect_timeout: Duration) -> AppResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/event-stream"));
        for (name, value) in &resolved.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                AppError::Config(format!(
                    "providers.{}.headers: invalid header name '{name}': {e}",
                    resolved.name
                ))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                AppError::Config(format!(
                    "providers.{}.headers.{name}: invalid header value: {e}",
                    resolved.name
                ))
            })?;
            headers.insert(header_name, header_value);
        }

        // No overall request timeout: streams may legitimately run for minutes.
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| {
                AppError::Config(format!(
                    "failed to build HTTP client for provider {}: {e}",
                    resolved.name
                ))
            })?;

        Ok(Self {
            name: resolved.name.clone(),
            completions_url: format!("{}/chat/completions", resolved.base_url),
            api_key: resolved.api_key.clone(),
            headers,
            client,
        })
    }

    pub fn completions_url(&self) -> &str {
        &self.completions_url
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open_stream(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<ChunkStream, AttemptError> {
        let response = self
            .client
            .post(&self.completions_url)
            .bearer_auth(&self.api_key)
            .headers(self.headers.clone())
            .json(&request.to_wire(model))
            .send()
            .await
            .map_err(|e| AttemptError::Transport {
                provider: self.name.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Status {
                provider: self.name.clone(),
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        tracing::debug!(
            provider = %self.name,
            model = %model,
            status = status.as_u16(),
            "Provider accepted streaming request"
        );

        Ok(sse::chunk_stream(response.bytes_stream(), self.name.clone()))
    }
}
