//! llama.cpp server HTTP backend

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use super::streaming::SseStreamParser;
use crate::domain::errors::BackendError;
use crate::domain::models::{BackendConfig, Config};
use crate::domain::ports::{
    BackendProvider, FragmentStream, GenerationBackend, GenerationRequest,
};

/// Per-probe timeout for `GET /health`
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// `/completion` request body
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: u32,
    temperature: f64,
    stream: bool,
    stop: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

/// Generation backend talking to a llama.cpp-compatible server
///
/// Each call to [`GenerationBackend::stream`] is exactly one HTTP request;
/// retrying is left to the caller.
pub struct LlamaServerBackend {
    http_client: ReqwestClient,
    base_url: String,
    model: Option<String>,
    stop: Vec<String>,
}

impl LlamaServerBackend {
    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BackendError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            stop: config.stop.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl GenerationBackend for LlamaServerBackend {
    fn name(&self) -> &'static str {
        "llama.cpp"
    }

    async fn probe(&self) -> Result<(), BackendError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| BackendError::Probe(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(BackendError::Probe(format!(
                "{url} returned HTTP {}",
                response.status().as_u16()
            )))
        }
    }

    #[instrument(skip(self, request), fields(base_url = %self.base_url))]
    async fn stream(&self, request: &GenerationRequest) -> Result<FragmentStream, BackendError> {
        let body = CompletionRequest {
            prompt: &request.prompt,
            n_predict: request.max_output,
            temperature: request.temperature,
            stream: true,
            stop: &self.stop,
            model: self.model.as_deref(),
        };

        let response = self
            .http_client
            .post(format!("{}/completion", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), "Completion request rejected");
            return Err(BackendError::from_status(status.as_u16(), text));
        }

        Ok(Box::pin(SseStreamParser::new(response.bytes_stream())))
    }
}

/// Builds a [`LlamaServerBackend`] from each run's `backend` section
#[derive(Debug, Clone, Copy, Default)]
pub struct LlamaBackendProvider;

impl BackendProvider for LlamaBackendProvider {
    fn backend_for(&self, config: &Config) -> Result<Arc<dyn GenerationBackend>, BackendError> {
        let backend = LlamaServerBackend::from_config(&config.backend)?;
        Ok(Arc::new(backend))
    }
}
