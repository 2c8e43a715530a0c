//! Generation backend port - interface for text-generation servers.

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;

use crate::domain::errors::BackendError;
use crate::domain::models::Config;

/// Parameters of one generation call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub temperature: f64,
    pub max_output: u32,
}

/// One item delivered by a streaming backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFragment {
    /// A piece of generated text
    Text(String),
    /// A fragment the backend sent but that could not be decoded
    Malformed(String),
    /// The backend signalled end of generation
    End,
}

/// Stream of fragments for one generation attempt
pub type FragmentStream =
    Pin<Box<dyn Stream<Item = Result<StreamFragment, BackendError>> + Send + 'static>>;

/// Trait for text-generation backends.
///
/// A backend performs exactly one attempt per call; retrying and
/// classification policy live in the resilient client.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Backend type name, for logs
    fn name(&self) -> &'static str;

    /// Liveness probe, a single check
    async fn probe(&self) -> Result<(), BackendError>;

    /// Start a streaming generation
    ///
    /// Errors returned here (rather than inside the stream) mean the
    /// request was refused before any output was produced.
    async fn stream(&self, request: &GenerationRequest) -> Result<FragmentStream, BackendError>;
}

/// Builds the backend a run should talk to from its configuration snapshot
pub trait BackendProvider: Send + Sync {
    fn backend_for(&self, config: &Config) -> Result<Arc<dyn GenerationBackend>, BackendError>;
}
