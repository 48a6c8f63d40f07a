//! Server-Sent Events decoding for chat-completion streams
//!
//! `SseDecoder` turns arbitrary network chunks into complete `data:` payloads.
//! `chunk_stream` wraps a byte stream and yields decoded [`StreamChunk`]s,
//! pulling from the network only when the consumer asks for the next chunk.

use crate::error::AttemptError;
use crate::provider::ChunkStream;
use crate::provider::types::{ChatCompletionChunk, StreamChunk};
use axum::body::Bytes;
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt::Display;
use thiserror::Error;

/// Terminal sentinel sent by OpenAI-compatible APIs
const DONE_SENTINEL: &str = "[DONE]";

/// A complete event from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Payload of one event (multiple `data:` lines joined by `\n`)
    Data(String),
    /// `data: [DONE]`
    Done,
}

/// Longest line, and longest joined event payload, the decoder accepts
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Why the byte stream could not be framed into events
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SseError {
    #[error("invalid UTF-8 in event stream: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("event stream line or event exceeds {limit} bytes")]
    TooLong { limit: usize },
}

/// Incremental SSE line decoder
///
/// Bytes may be split anywhere, including inside a multi-byte UTF-8
/// character; only complete lines are interpreted. Lines end in LF, CRLF or
/// a bare CR. Every byte is scanned once, and a line or event longer than
/// the limit fails the stream instead of growing the buffer.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Leading bytes of `buffer` already known to hold no line terminator
    scanned: usize,
    /// The previous line ended in CR; an LF right after it belongs to it
    skip_lf: bool,
    data: String,
    max_line_bytes: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line_bytes(MAX_LINE_BYTES)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            skip_lf: false,
            data: String::new(),
            max_line_bytes,
        }
    }

    /// Feed bytes and collect every event they complete
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<SseEvent>, SseError> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        let mut start = 0;
        let mut search_from = self.scanned;

        loop {
            if self.skip_lf && start < self.buffer.len() {
                if self.buffer[start] == b'\n' {
                    start += 1;
                }
                self.skip_lf = false;
                search_from = search_from.max(start);
            }

            let Some(offset) = self.buffer[search_from..]
                .iter()
                .position(|b| *b == b'\n' || *b == b'\r')
            else {
                break;
            };
            let end = search_from + offset;
            if end - start > self.max_line_bytes {
                return Err(SseError::TooLong {
                    limit: self.max_line_bytes,
                });
            }

            let line = std::str::from_utf8(&self.buffer[start..end])?;
            if let Some(event) = process_line(&mut self.data, line, self.max_line_bytes)? {
                events.push(event);
            }

            self.skip_lf = self.buffer[end] == b'\r';
            start = end + 1;
            search_from = start;
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        if self.buffer.len() > self.max_line_bytes {
            return Err(SseError::TooLong {
                limit: self.max_line_bytes,
            });
        }

        Ok(events)
    }

    /// Flush whatever is left once the byte stream has ended
    pub fn finish(&mut self) -> Result<Option<SseEvent>, SseError> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.scanned = 0;
            let line = std::str::from_utf8(&rest)?;
            if let Some(event) = process_line(&mut self.data, line, self.max_line_bytes)? {
                return Ok(Some(event));
            }
        }
        Ok(dispatch(&mut self.data))
    }
}

fn process_line(
    data: &mut String,
    line: &str,
    max_event_bytes: usize,
) -> Result<Option<SseEvent>, SseError> {
    if line.is_empty() {
        return Ok(dispatch(data));
    }
    if line.starts_with(':') {
        // comment / keep-alive
        return Ok(None);
    }
    if let Some(value) = line.strip_prefix("data:") {
        let value = value.strip_prefix(' ').unwrap_or(value);
        if data.len() + value.len() + 1 > max_event_bytes {
            return Err(SseError::TooLong {
                limit: max_event_bytes,
            });
        }
        if !data.is_empty() {
            data.push('\n');
        }
        data.push_str(value);
    }
    // event:, id: and retry: carry nothing we use
    Ok(None)
}

fn dispatch(data: &mut String) -> Option<SseEvent> {
    if data.is_empty() {
        return None;
    }
    let data = std::mem::take(data);
    if data.trim() == DONE_SENTINEL {
        Some(SseEvent::Done)
    } else {
        Some(SseEvent::Data(data))
    }
}

/// Decode one event payload into a chunk
///
/// An embedded `{"error": ...}` object is reported as an upstream error.
pub fn decode_event(provider: &str, data: &str) -> Result<StreamChunk, AttemptError> {
    let chunk: ChatCompletionChunk =
        serde_json::from_str(data).map_err(|e| AttemptError::Decode {
            provider: provider.to_string(),
            message: e.to_string(),
        })?;

    if let Some(error) = chunk.error {
        return Err(AttemptError::Upstream {
            provider: provider.to_string(),
            message: error
                .message
                .unwrap_or_else(|| "unspecified provider error".to_string()),
        });
    }

    Ok(chunk.into_stream_chunk())
}

struct DecodeState<S> {
    bytes: S,
    decoder: SseDecoder,
    pending: VecDeque<Result<StreamChunk, AttemptError>>,
    finished: bool,
    provider: String,
}

impl<S, E> DecodeState<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    async fn pull(&mut self) {
        match self.bytes.next().await {
            Some(Ok(bytes)) => match self.decoder.push(&bytes) {
                Ok(events) => {
                    for event in events {
                        self.handle(event);
                        if self.finished {
                            break;
                        }
                    }
                }
                Err(e) => self.fail(AttemptError::Decode {
                    provider: self.provider.clone(),
                    message: e.to_string(),
                }),
            },
            Some(Err(e)) => self.fail(AttemptError::Transport {
                provider: self.provider.clone(),
                message: e.to_string(),
            }),
            None => {
                match self.decoder.finish() {
                    Ok(Some(event)) => self.handle(event),
                    Ok(None) => {}
                    Err(e) => self.fail(AttemptError::Decode {
                        provider: self.provider.clone(),
                        message: e.to_string(),
                    }),
                }
                self.finished = true;
            }
        }
    }

    fn handle(&mut self, event: SseEvent) {
        match event {
            SseEvent::Done => self.finished = true,
            SseEvent::Data(data) => match decode_event(&self.provider, &data) {
                Ok(chunk) => self.pending.push_back(Ok(chunk)),
                Err(e) => self.fail(e),
            },
        }
    }

    fn fail(&mut self, error: AttemptError) {
        self.pending.push_back(Err(error));
        self.finished = true;
    }
}

/// Wrap a raw byte stream as a lazily decoded chunk stream
///
/// The stream ends after `[DONE]`, at end of input, or right after yielding
/// the first error.
pub fn chunk_stream<S, E>(bytes: S, provider: impl Into<String>) -> ChunkStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
        provider: provider.into(),
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            state.pull().await;
        }
    })
    .boxed()
}
