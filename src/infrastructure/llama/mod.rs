//! llama.cpp server integration
//!
//! - `/completion` with server-sent-event streaming
//! - `/health` liveness probe

pub mod client;
pub mod streaming;

pub use client::{LlamaBackendProvider, LlamaServerBackend};
pub use streaming::SseStreamParser;
