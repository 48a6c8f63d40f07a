//! Stream relay from an established upstream to the HTTP response body
//!
//! The relay is pull-driven: a chunk is read from upstream only when the
//! server asks for the next body frame, so a slow caller applies backpressure
//! all the way to the provider connection. Dropping the relay (the caller
//! disconnected) drops the upstream stream and closes that connection.

use crate::error::RelayError;
use crate::metrics::{Metrics, RelayOutcome};
use crate::middleware::RequestId;
use crate::provider::ChunkStream;
use crate::tools::ToolKind;
use axum::body::Bytes;
use futures::{Stream, StreamExt, stream};

/// Who the relayed stream belongs to, for logs and metrics
#[derive(Clone)]
pub struct RelayContext {
    pub tool: ToolKind,
    pub request_id: RequestId,
    pub provider: String,
    pub model: String,
    pub metrics: Metrics,
}

struct RelayState {
    upstream: ChunkStream,
    ctx: RelayContext,
    bytes: usize,
    chunks: usize,
    outcome: Option<RelayOutcome>,
}

impl RelayState {
    async fn next(mut self) -> Option<(Result<Bytes, RelayError>, Self)> {
        if self.outcome.is_some() {
            return None;
        }

        loop {
            match self.upstream.next().await {
                Some(Ok(chunk)) => {
                    let Some(text) = chunk.into_text().filter(|t| !t.is_empty()) else {
                        continue;
                    };
                    self.bytes += text.len();
                    self.chunks += 1;
                    return Some((Ok(Bytes::from(text)), self));
                }
                Some(Err(source)) => {
                    self.outcome = Some(RelayOutcome::Truncated);
                    let error = RelayError {
                        provider: self.ctx.provider.clone(),
                        bytes_relayed: self.bytes,
                        source,
                    };
                    return Some((Err(error), self));
                }
                None => {
                    self.outcome = Some(RelayOutcome::Completed);
                    return None;
                }
            }
        }
    }
}

impl Drop for RelayState {
    fn drop(&mut self) {
        let outcome = self.outcome.unwrap_or(RelayOutcome::Cancelled);
        let ctx = &self.ctx;

        match outcome {
            RelayOutcome::Completed => tracing::info!(
                request_id = %ctx.request_id,
                tool = %ctx.tool,
                provider = %ctx.provider,
                model = %ctx.model,
                bytes = self.bytes,
                chunks = self.chunks,
                outcome = outcome.as_str(),
                "Relay finished"
            ),
            RelayOutcome::Truncated => tracing::warn!(
                request_id = %ctx.request_id,
                tool = %ctx.tool,
                provider = %ctx.provider,
                model = %ctx.model,
                bytes = self.bytes,
                chunks = self.chunks,
                outcome = outcome.as_str(),
                "Upstream failed mid-stream; response truncated"
            ),
            RelayOutcome::Cancelled => tracing::debug!(
                request_id = %ctx.request_id,
                tool = %ctx.tool,
                provider = %ctx.provider,
                model = %ctx.model,
                bytes = self.bytes,
                chunks = self.chunks,
                outcome = outcome.as_str(),
                "Caller disconnected; upstream stream released"
            ),
        }

        ctx.metrics.record_relay(ctx.tool, outcome, self.bytes as u64);
    }
}

/// Turn decoded upstream chunks into response body bytes
///
/// Text deltas are forwarded in arrival order; chunks without text are
/// skipped. An upstream error after establishment is yielded once as
/// `RelayError` and ends the stream, which makes the server abort the body.
pub fn relay(
    upstream: ChunkStream,
    ctx: RelayContext,
) -> impl Stream<Item = Result<Bytes, RelayError>> + Send + 'static {
    let state = RelayState {
        upstream,
        ctx,
        bytes: 0,
        chunks: 0,
        outcome: None,
    };
    stream::unfold(state, RelayState::next)
}
