//! Server-Sent Events parsing for llama.cpp `/completion` streams
//!
//! The server answers a streaming completion with lines of the form
//! `data: {"content": "...", "stop": false}`, separated by blank lines.
//! The final chunk carries `"stop": true`. Errors may arrive in-band as
//! `data: {"error": {"code": 429, "message": "..."}}`.

use futures::Stream;
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, warn};

use crate::domain::errors::BackendError;
use crate::domain::ports::StreamFragment;

/// One decoded `data:` payload
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChunk {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub stop: bool,
    #[serde(default)]
    pub error: Option<ChunkError>,
}

/// In-band error payload
///
/// `code` is numeric on llama.cpp but some compatible servers send a
/// string such as `"429"` or `"RESOURCE_EXHAUSTED"`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkError {
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default)]
    pub message: String,
}

impl ChunkError {
    fn code_text(&self) -> Option<String> {
        match self.code.as_ref()? {
            Value::Number(number) => Some(number.to_string()),
            Value::String(text) => Some(text.clone()),
            _ => None,
        }
    }

    fn into_backend_error(self) -> BackendError {
        let code = self.code_text();
        let rate_limited = matches!(code.as_deref(), Some("429" | "RESOURCE_EXHAUSTED"))
            || self.message.contains("RESOURCE_EXHAUSTED");
        let detail = match code {
            Some(code) => format!("code {code}: {}", self.message),
            None => self.message,
        };
        if rate_limited {
            BackendError::RateLimited(detail)
        } else {
            BackendError::Stream(detail)
        }
    }
}

/// Decode one SSE line into zero or more fragments
///
/// Lines that are not `data:` fields (comments, `event:`, `id:`, blank
/// separators) produce nothing.
pub fn parse_sse_line(line: &str) -> Vec<Result<StreamFragment, BackendError>> {
    let line = line.trim_end_matches('\r');
    let Some(data) = line.strip_prefix("data:") else {
        return Vec::new();
    };
    let data = data.trim_start();

    if data.is_empty() {
        return Vec::new();
    }
    if data == "[DONE]" {
        return vec![Ok(StreamFragment::End)];
    }

    match serde_json::from_str::<CompletionChunk>(data) {
        Ok(CompletionChunk {
            error: Some(error), ..
        }) => vec![Err(error.into_backend_error())],
        Ok(chunk) => {
            let mut fragments = Vec::with_capacity(2);
            if !chunk.content.is_empty() {
                fragments.push(Ok(StreamFragment::Text(chunk.content)));
            }
            if chunk.stop {
                fragments.push(Ok(StreamFragment::End));
            }
            fragments
        }
        Err(err) => {
            debug!(error = %err, data = %data, "Undecodable SSE payload");
            vec![Ok(StreamFragment::Malformed(data.to_string()))]
        }
    }
}

/// Line-buffered SSE parser over a byte stream
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across network chunks decode correctly.
pub struct SseStreamParser<S> {
    inner: Pin<Box<S>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<StreamFragment, BackendError>>,
    finished: bool,
}

impl<S> SseStreamParser<S> {
    pub fn new(stream: S) -> Self {
        Self {
            inner: Box::pin(stream),
            buffer: Vec::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    fn drain_lines(&mut self) {
        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            self.pending.extend(parse_sse_line(&line));
        }
    }
}

impl<S, B, E> Stream for SseStreamParser<S>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    type Item = Result<StreamFragment, BackendError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if self.finished {
                return Poll::Ready(None);
            }

            if let Some(item) = self.pending.pop_front() {
                if matches!(item, Ok(StreamFragment::End) | Err(_)) {
                    self.finished = true;
                    self.pending.clear();
                }
                return Poll::Ready(Some(item));
            }

            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    self.buffer.extend_from_slice(bytes.as_ref());
                    self.drain_lines();
                }
                Poll::Ready(Some(Err(err))) => {
                    self.finished = true;
                    return Poll::Ready(Some(Err(BackendError::Network(err.to_string()))));
                }
                Poll::Ready(None) => {
                    // Transport closed: flush a trailing unterminated line
                    if self.buffer.is_empty() {
                        self.finished = true;
                        return Poll::Ready(None);
                    }
                    let rest = std::mem::take(&mut self.buffer);
                    let line = String::from_utf8_lossy(&rest).into_owned();
                    let fragments = parse_sse_line(&line);
                    if fragments.is_empty() {
                        warn!(data = %line, "Stream ended with unparsed data");
                    }
                    self.pending.extend(fragments);
                    if self.pending.is_empty() {
                        self.finished = true;
                        return Poll::Ready(None);
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
