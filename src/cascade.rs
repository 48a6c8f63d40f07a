//! Model-fallback cascade
//!
//! A [`Cascade`] holds the ordered model attempts of one tool. Executing it
//! tries the attempts strictly one after another and stops at the first one
//! that establishes a stream: the provider accepted the request and produced
//! its first event (or finished cleanly) within the establishment timeout.
//! Nothing is retried once a stream is established.

use crate::error::{AttemptError, CascadeError};
use crate::metrics::{AttemptOutcome, CascadeOutcome, Metrics};
use crate::middleware::RequestId;
use crate::provider::{ChatProvider, ChunkStream, CompletionRequest};
use crate::tools::ToolKind;
use futures::StreamExt;
use futures::stream;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One `(provider, model)` entry of a cascade
#[derive(Clone)]
pub struct ModelAttempt {
    provider: Arc<dyn ChatProvider>,
    model: String,
}

impl ModelAttempt {
    pub fn new(provider: Arc<dyn ChatProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for ModelAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelAttempt")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .finish()
    }
}

/// A stream that has passed establishment
pub struct Established {
    /// Upstream chunks, starting with the event that established the stream
    pub stream: ChunkStream,
    /// 1-based index of the serving attempt
    pub attempt: usize,
    pub provider: String,
    pub model: String,
}

impl std::fmt::Debug for Established {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Established")
            .field("attempt", &self.attempt)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Ordered model attempts for one tool
#[derive(Debug, Clone)]
pub struct Cascade {
    tool: ToolKind,
    attempts: Vec<ModelAttempt>,
    establish_timeout: Duration,
}

impl Cascade {
    pub fn new(tool: ToolKind, attempts: Vec<ModelAttempt>, establish_timeout: Duration) -> Self {
        Self {
            tool,
            attempts,
            establish_timeout,
        }
    }

    pub fn tool(&self) -> ToolKind {
        self.tool
    }

    pub fn attempts(&self) -> &[ModelAttempt] {
        &self.attempts
    }

    /// A cascade without attempts rejects every request
    pub fn is_configured(&self) -> bool {
        !self.attempts.is_empty()
    }

    pub fn establish_timeout(&self) -> Duration {
        self.establish_timeout
    }

    /// Run the attempts in order until one establishes a stream
    ///
    /// # Errors
    ///
    /// - `CascadeError::NotConfigured` when there are no attempts; no
    ///   provider is contacted.
    /// - `CascadeError::Exhausted` when every attempt failed before
    ///   establishment, carrying the last failure.
    pub async fn execute(
        &self,
        request: &CompletionRequest,
        request_id: RequestId,
        metrics: &Metrics,
    ) -> Result<Established, CascadeError> {
        if !self.is_configured() {
            tracing::error!(
                request_id = %request_id,
                tool = %self.tool,
                "No primary model configured; rejecting request"
            );
            metrics.record_cascade(self.tool, CascadeOutcome::NotConfigured);
            return Err(CascadeError::NotConfigured {
                tool: self.tool.to_string(),
            });
        }

        let started = Instant::now();
        let total = self.attempts.len();
        let mut last_error = None;

        for (index, attempt) in self.attempts.iter().enumerate() {
            let number = index + 1;
            tracing::info!(
                request_id = %request_id,
                tool = %self.tool,
                attempt = number,
                total_attempts = total,
                provider = %attempt.provider_name(),
                model = %attempt.model(),
                "Attempting model"
            );

            match establish(attempt, request, self.establish_timeout).await {
                Ok(stream) => {
                    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                    metrics.record_attempt(self.tool, AttemptOutcome::Established);
                    metrics.record_cascade(self.tool, CascadeOutcome::Streamed);
                    if let Err(e) = metrics.record_establish_duration(self.tool, elapsed_ms) {
                        tracing::error!(
                            request_id = %request_id,
                            error = %e,
                            "Metrics recording failed. Observability degraded but request continues."
                        );
                    }

                    tracing::info!(
                        request_id = %request_id,
                        tool = %self.tool,
                        attempt = number,
                        provider = %attempt.provider_name(),
                        model = %attempt.model(),
                        establish_ms = elapsed_ms,
                        "Stream established"
                    );

                    return Ok(Established {
                        stream,
                        attempt: number,
                        provider: attempt.provider_name().to_string(),
                        model: attempt.model().to_string(),
                    });
                }
                Err(error) => {
                    metrics.record_attempt(self.tool, AttemptOutcome::from_error(&error));
                    tracing::warn!(
                        request_id = %request_id,
                        tool = %self.tool,
                        attempt = number,
                        total_attempts = total,
                        provider = %attempt.provider_name(),
                        model = %attempt.model(),
                        error_kind = error.kind(),
                        error = %error,
                        "Model attempt failed"
                    );
                    last_error = Some(error);
                }
            }
        }

        metrics.record_cascade(self.tool, CascadeOutcome::Exhausted);
        let last = last_error.unwrap_or_else(|| AttemptError::Transport {
            provider: "none".to_string(),
            message: "no attempt was made".to_string(),
        });
        tracing::error!(
            request_id = %request_id,
            tool = %self.tool,
            attempts = total,
            last_error = %last,
            "All model attempts failed"
        );
        Err(CascadeError::Exhausted {
            tool: self.tool.to_string(),
            attempts: total,
            last,
        })
    }
}

/// Open the attempt's stream and wait for its first event
///
/// The first event is put back in front of the returned stream. A stream that
/// ends before any event counts as established and empty.
async fn establish(
    attempt: &ModelAttempt,
    request: &CompletionRequest,
    timeout: Duration,
) -> Result<ChunkStream, AttemptError> {
    let opening = async {
        let mut upstream = attempt.provider.open_stream(&attempt.model, request).await?;
        match upstream.next().await {
            None => Ok(stream::empty().boxed()),
            Some(Err(e)) => Err(e),
            Some(Ok(first)) => Ok(stream::once(async move { Ok(first) })
                .chain(upstream)
                .boxed()),
        }
    };

    tokio::time::timeout(timeout, opening)
        .await
        .map_err(|_elapsed| AttemptError::Timeout {
            provider: attempt.provider_name().to_string(),
            timeout,
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StreamChunk;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behavior {
        Chunks(Vec<&'static str>),
        Reject(u16),
        FirstEventError,
        NeverStarts,
    }

    struct FakeProvider {
        name: &'static str,
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                name,
                behavior,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatProvider for FakeProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn open_stream(
            &self,
            _model: &str,
            _request: &CompletionRequest,
        ) -> Result<ChunkStream, AttemptError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Chunks(parts) => {
                    let items: Vec<Result<StreamChunk, AttemptError>> =
                        parts.iter().map(|p| Ok(StreamChunk::text(*p))).collect();
                    Ok(stream::iter(items).boxed())
                }
                Behavior::Reject(status) => Err(AttemptError::Status {
                    provider: self.name.to_string(),
                    status: *status,
                    body: String::new(),
                }),
                Behavior::FirstEventError => Ok(stream::iter(vec![Err(AttemptError::Upstream {
                    provider: self.name.to_string(),
                    message: "overloaded".to_string(),
                })])
                .boxed()),
                Behavior::NeverStarts => Ok(stream::pending().boxed()),
            }
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new("system", "user", 0.0, 64)
    }

    fn cascade(providers: &[Arc<FakeProvider>]) -> Cascade {
        let attempts = providers
            .iter()
            .map(|p| {
                ModelAttempt::new(p.clone() as Arc<dyn ChatProvider>, format!("{}-model", p.name))
            })
            .collect();
        Cascade::new(ToolKind::Format, attempts, Duration::from_millis(200))
    }

    async fn collect_text(stream: ChunkStream) -> String {
        stream
            .map(|c| c.unwrap().into_text().unwrap_or_default())
            .collect::<Vec<_>>()
            .await
            .concat()
    }

    #[tokio::test]
    async fn test_first_attempt_wins_and_later_attempts_untouched() {
        let p1 = FakeProvider::new("p1", Behavior::Chunks(vec!["A", "B"]));
        let p2 = FakeProvider::new("p2", Behavior::Chunks(vec!["X"]));
        let p3 = FakeProvider::new("p3", Behavior::Chunks(vec!["Y"]));
        let metrics = Metrics::new().unwrap();

        let established = cascade(&[p1.clone(), p2.clone(), p3.clone()])
            .execute(&request(), RequestId::new(), &metrics)
            .await
            .unwrap();

        assert_eq!(established.attempt, 1);
        assert_eq!(established.provider, "p1");
        assert_eq!(established.model, "p1-model");
        assert_eq!(collect_text(established.stream).await, "AB");
        assert_eq!((p1.calls(), p2.calls(), p3.calls()), (1, 0, 0));
        assert_eq!(metrics.attempts_count(ToolKind::Format), 1);
    }

    #[tokio::test]
    async fn test_falls_back_in_order() {
        let p1 = FakeProvider::new("p1", Behavior::Reject(401));
        let p2 = FakeProvider::new("p2", Behavior::FirstEventError);
        let p3 = FakeProvider::new("p3", Behavior::Chunks(vec!["A", "B", "C"]));
        let metrics = Metrics::new().unwrap();

        let established = cascade(&[p1.clone(), p2.clone(), p3.clone()])
            .execute(&request(), RequestId::new(), &metrics)
            .await
            .unwrap();

        assert_eq!(established.attempt, 3);
        assert_eq!(collect_text(established.stream).await, "ABC");
        assert_eq!((p1.calls(), p2.calls(), p3.calls()), (1, 1, 1));
        assert_eq!(
            metrics.attempt_outcome_count(ToolKind::Format, AttemptOutcome::Auth),
            1
        );
        assert_eq!(
            metrics.attempt_outcome_count(ToolKind::Format, AttemptOutcome::Upstream),
            1
        );
    }

    #[tokio::test]
    async fn test_timeout_advances_to_next_attempt() {
        let p1 = FakeProvider::new("p1", Behavior::NeverStarts);
        let p2 = FakeProvider::new("p2", Behavior::Chunks(vec!["ok"]));
        let metrics = Metrics::new().unwrap();

        let established = cascade(&[p1.clone(), p2.clone()])
            .execute(&request(), RequestId::new(), &metrics)
            .await
            .unwrap();

        assert_eq!(established.attempt, 2);
        assert_eq!(
            metrics.attempt_outcome_count(ToolKind::Format, AttemptOutcome::Timeout),
            1
        );
    }

    #[tokio::test]
    async fn test_all_attempts_fail() {
        let p1 = FakeProvider::new("p1", Behavior::Reject(500));
        let p2 = FakeProvider::new("p2", Behavior::Reject(429));
        let metrics = Metrics::new().unwrap();

        let err = cascade(&[p1.clone(), p2.clone()])
            .execute(&request(), RequestId::new(), &metrics)
            .await
            .unwrap_err();

        match err {
            CascadeError::Exhausted { attempts, last, .. } => {
                assert_eq!(attempts, 2);
                assert_eq!(last.kind(), "rate_limited");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!((p1.calls(), p2.calls()), (1, 1));
        assert_eq!(
            metrics.cascade_outcome_count(ToolKind::Format, CascadeOutcome::Exhausted),
            1
        );
    }

    #[tokio::test]
    async fn test_empty_cascade_is_not_configured() {
        let metrics = Metrics::new().unwrap();
        let err = cascade(&[])
            .execute(&request(), RequestId::new(), &metrics)
            .await
            .unwrap_err();

        assert!(matches!(err, CascadeError::NotConfigured { .. }));
        assert_eq!(metrics.attempts_count(ToolKind::Format), 0);
    }

    #[tokio::test]
    async fn test_clean_empty_stream_is_established() {
        let p1 = FakeProvider::new("p1", Behavior::Chunks(vec![]));
        let p2 = FakeProvider::new("p2", Behavior::Chunks(vec!["unused"]));
        let metrics = Metrics::new().unwrap();

        let established = cascade(&[p1.clone(), p2.clone()])
            .execute(&request(), RequestId::new(), &metrics)
            .await
            .unwrap();

        assert_eq!(established.attempt, 1);
        assert_eq!(collect_text(established.stream).await, "");
        assert_eq!(p2.calls(), 0);
    }
}
