//! Shared helpers for integration tests
//!
//! `ScriptedProvider` stands in for a chat-completion backend: each instance
//! plays back one fixed behaviour and counts how often it was called.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, header},
};
use formatter_relay::cascade::{Cascade, ModelAttempt};
use formatter_relay::config::Config;
use formatter_relay::error::AttemptError;
use formatter_relay::handlers::{AppState, router};
use formatter_relay::provider::{ChatProvider, ChunkStream, CompletionRequest, StreamChunk};
use formatter_relay::tools::ToolKind;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a scripted provider does when asked to open a stream
#[derive(Clone)]
pub enum Script {
    /// Accept and stream these text chunks, then finish
    Chunks(Vec<&'static str>),
    /// Refuse with this HTTP status
    Reject(u16),
    /// Stream these chunks, then fail
    FailAfter(Vec<&'static str>),
    /// Stream these chunks, then wait forever; `dropped` flips when the
    /// stream is released
    Hang {
        chunks: Vec<&'static str>,
        dropped: Arc<AtomicBool>,
    },
    /// Accept, wait `delay` between chunks
    Slow {
        chunks: Vec<String>,
        delay: Duration,
    },
}

pub struct ScriptedProvider {
    name: String,
    script: Script,
    calls: AtomicUsize,
    requests: Mutex<Vec<(String, CompletionRequest)>>,
}

impl ScriptedProvider {
    pub fn new(name: &str, script: Script) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far as (model, request) pairs
    pub fn requests(&self) -> Vec<(String, CompletionRequest)> {
        self.requests.lock().unwrap().clone()
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn text_chunks(chunks: &[&'static str]) -> Vec<Result<StreamChunk, AttemptError>> {
    chunks.iter().map(|c| Ok(StreamChunk::text(*c))).collect()
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open_stream(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<ChunkStream, AttemptError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap()
            .push((model.to_string(), request.clone()));

        match &self.script {
            Script::Chunks(chunks) => Ok(futures::stream::iter(text_chunks(chunks)).boxed()),
            Script::Reject(status) => Err(AttemptError::Status {
                provider: self.name.clone(),
                status: *status,
                body: "rejected".to_string(),
            }),
            Script::FailAfter(chunks) => {
                let mut items = text_chunks(chunks);
                items.push(Err(AttemptError::Upstream {
                    provider: self.name.clone(),
                    message: "connection reset".to_string(),
                }));
                Ok(futures::stream::iter(items).boxed())
            }
            Script::Hang { chunks, dropped } => {
                let guard = DropFlag(dropped.clone());
                let head = futures::stream::iter(text_chunks(chunks));
                let tail = futures::stream::unfold(guard, |guard| async move {
                    futures::future::pending::<()>().await;
                    Some((Ok(StreamChunk::empty()), guard))
                });
                Ok(head.chain(tail).boxed())
            }
            Script::Slow { chunks, delay } => {
                let delay = *delay;
                let chunks = chunks.clone();
                Ok(futures::stream::iter(chunks)
                    .then(move |c| async move {
                        tokio::time::sleep(delay).await;
                        Ok::<_, AttemptError>(StreamChunk::text(c))
                    })
                    .boxed())
            }
        }
    }
}

/// Cascade for `tool` over `providers`, attempt `i` using model `model-{i+1}`
pub fn cascade(tool: ToolKind, providers: &[Arc<ScriptedProvider>]) -> Cascade {
    cascade_with_timeout(tool, providers, Duration::from_secs(5))
}

pub fn cascade_with_timeout(
    tool: ToolKind,
    providers: &[Arc<ScriptedProvider>],
    establish_timeout: Duration,
) -> Cascade {
    let attempts = providers
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let provider: Arc<dyn ChatProvider> = p.clone();
            ModelAttempt::new(provider, format!("model-{}", i + 1))
        })
        .collect();
    Cascade::new(tool, attempts, establish_timeout)
}

/// Application with the given cascades; every other tool is unconfigured
pub fn app(cascades: Vec<Cascade>) -> (Router, AppState) {
    let config = Arc::new(Config::builtin().expect("builtin config"));
    let state = AppState::from_parts(config, cascades).expect("app state");
    (router(state.clone()), state)
}

pub fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
