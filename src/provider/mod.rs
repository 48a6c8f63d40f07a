//! Chat-completion providers
//!
//! [`ChatProvider`] is the seam between the model cascade and the network:
//! one call opens a streaming completion for a given model and either fails
//! or hands back a lazy stream of decoded chunks.

use crate::error::AttemptError;
use async_trait::async_trait;
use futures::stream::BoxStream;

pub mod openai;
pub mod sse;
pub mod types;

pub use openai::OpenAiProvider;
pub use types::{CompletionRequest, StreamChunk};

/// Decoded upstream chunks in arrival order
///
/// The stream ends normally when the provider signals completion and ends
/// right after yielding an error otherwise. Dropping it releases the
/// underlying connection.
pub type ChunkStream = BoxStream<'static, Result<StreamChunk, AttemptError>>;

/// A chat-completion backend reachable with a single credential
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name used in logs and metrics
    fn name(&self) -> &str;

    /// Send `request` to `model` with streaming enabled
    ///
    /// Returns once the provider has accepted the request (2xx status).
    /// Rejections, authentication failures and transport errors are returned
    /// as `Err`.
    async fn open_stream(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<ChunkStream, AttemptError>;
}
