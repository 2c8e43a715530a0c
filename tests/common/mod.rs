//! Common test utilities for integration tests
//!
//! In-memory adapters for every port plus fixtures for model replies.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use prismatic::domain::errors::{BackendError, ConfigError, SinkError};
use prismatic::domain::models::{Buckets, Config, PersistedResults, RunStage, RunState};
use prismatic::domain::ports::{
    BackendProvider, ConfigStore, FragmentStream, GenerationBackend, GenerationRequest,
    ResultSink, SinkProvider, Sleeper, StreamFragment,
};
use prismatic::infrastructure::config::yaml_store::deep_merge;
use prismatic::infrastructure::config::ConfigLoader;
use prismatic::StageOrchestrator;

/// Create a temporary directory for test isolation
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Setup test logging
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// What a scripted backend does for one `stream` call
#[derive(Debug, Clone)]
pub enum Reply {
    /// Stream the text in small fragments, then end
    Text(String),
    /// Refuse the request
    Fail(BackendError),
    /// Never answer
    Hang,
}

/// Backend answering from a script, one reply per call
///
/// The last reply repeats once the script is exhausted.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Reply>>,
    last: Mutex<Option<Reply>>,
    probe_ok: bool,
    calls: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(None),
            probe_ok: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: impl Into<String>) -> Self {
        Self::new(vec![Reply::Text(text.into())])
    }

    pub fn hanging() -> Self {
        Self::new(vec![Reply::Hang])
    }

    pub fn unreachable() -> Self {
        Self {
            probe_ok: false,
            ..Self::new(vec![])
        }
    }

    pub fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().unwrap().clone()
    }

    fn next_reply(&self) -> Reply {
        let mut replies = self.replies.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        if let Some(reply) = replies.pop_front() {
            *last = Some(reply.clone());
            reply
        } else {
            last.clone()
                .unwrap_or_else(|| Reply::Fail(BackendError::Stream("script empty".into())))
        }
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn probe(&self) -> Result<(), BackendError> {
        if self.probe_ok {
            Ok(())
        } else {
            Err(BackendError::Probe("connection refused".to_string()))
        }
    }

    async fn stream(&self, request: &GenerationRequest) -> Result<FragmentStream, BackendError> {
        self.calls.lock().unwrap().push(request.clone());
        match self.next_reply() {
            Reply::Text(text) => {
                let chars: Vec<char> = text.chars().collect();
                let mut fragments: Vec<Result<StreamFragment, BackendError>> = chars
                    .chunks(16)
                    .map(|chunk| Ok(StreamFragment::Text(chunk.iter().collect())))
                    .collect();
                fragments.push(Ok(StreamFragment::End));
                Ok(Box::pin(stream::iter(fragments)))
            }
            Reply::Fail(err) => Err(err),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Err(BackendError::Network("gave up".to_string()))
            }
        }
    }
}

/// Hands out the same backend for every run
pub struct FixedBackendProvider(pub Arc<dyn GenerationBackend>);

impl BackendProvider for FixedBackendProvider {
    fn backend_for(&self, _config: &Config) -> Result<Arc<dyn GenerationBackend>, BackendError> {
        Ok(Arc::clone(&self.0))
    }
}

/// Sleeper that records requested delays and returns immediately
#[derive(Default)]
pub struct RecordingSleeper {
    pub delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

// ---------------------------------------------------------------------------
// Sinks and config
// ---------------------------------------------------------------------------

/// How a [`MemorySink`] behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkMode {
    /// Store and return results
    Normal,
    /// Accept writes but keep nothing
    Forgetful,
    /// Accept writes, then fail to parse them back
    Corrupt,
}

/// Result sink kept in memory
pub struct MemorySink {
    mode: SinkMode,
    stored: Mutex<Option<PersistedResults>>,
}

impl MemorySink {
    pub fn new(mode: SinkMode) -> Self {
        Self {
            mode,
            stored: Mutex::new(None),
        }
    }

    pub fn stored(&self) -> Option<PersistedResults> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn persist(&self, buckets: &Buckets, topic: &str) -> Result<(), SinkError> {
        if self.mode != SinkMode::Forgetful {
            *self.stored.lock().unwrap() = Some(PersistedResults {
                topic: topic.to_string(),
                buckets: buckets.clone(),
                generated_at: chrono::Utc::now(),
            });
        }
        Ok(())
    }

    async fn load(&self) -> Result<PersistedResults, SinkError> {
        if self.mode == SinkMode::Corrupt {
            return Err(SinkError::Corrupt("expected value at line 1".to_string()));
        }
        self.stored()
            .ok_or_else(|| SinkError::Missing("memory".to_string()))
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

/// Hands out one shared sink for every run
pub struct SharedSinkProvider(pub Arc<MemorySink>);

impl SinkProvider for SharedSinkProvider {
    fn sink_for(&self, _config: &Config) -> Arc<dyn ResultSink> {
        Arc::clone(&self.0) as Arc<dyn ResultSink>
    }
}

/// Config store kept in memory, validating updates like the YAML store
pub struct MemoryConfigStore {
    config: Mutex<Config>,
}

impl MemoryConfigStore {
    pub fn new(config: Config) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self) -> Result<Config, ConfigError> {
        Ok(self.config.lock().unwrap().clone())
    }

    async fn set(&self, partial: Value) -> Result<Config, ConfigError> {
        if !partial.is_object() {
            return Err(ConfigError::InvalidUpdate("expected an object".to_string()));
        }
        let mut config = self.config.lock().unwrap();
        let mut document =
            serde_json::to_value(&*config).map_err(|e| ConfigError::Load(e.to_string()))?;
        deep_merge(&mut document, partial);
        let updated: Config =
            serde_json::from_value(document).map_err(|e| ConfigError::Load(e.to_string()))?;
        ConfigLoader::validate(&updated)?;
        *config = updated.clone();
        Ok(updated)
    }
}

/// Configuration sized for the 28-point fixtures, with no real waiting
pub fn test_config(cluster_count: usize) -> Config {
    let mut config = Config::default();
    config.pipeline.perspective_count = 28;
    config.pipeline.cluster_count = cluster_count;
    config.pipeline.topic = Some("public transit funding".to_string());
    config.generation.post_success_delay_ms = 0;
    config.retry.base_delay_ms = 1;
    config.backend.probe_interval_ms = 1;
    config.orchestrator.timeout_secs = 5;
    config
}

// ---------------------------------------------------------------------------
// Model replies
// ---------------------------------------------------------------------------

/// 28 distinct scored points on a 7 x 4 grid, wrapped in prose and a code fence
pub fn scored_reply() -> String {
    let bands = Config::default().pipeline.bands;
    let points: Vec<Value> = (0..28)
        .map(|i| {
            let band = i / 4;
            let row = i % 4;
            json!({
                "label": bands[band],
                "score_x": (band as f64 + 0.5) / 7.0,
                "score_y": 0.1 + 0.25 * row as f64,
                "text": format!("perspective {i}"),
            })
        })
        .collect();
    format!(
        "Here you go:\n```json\n{}\n```",
        serde_json::to_string_pretty(&json!({ "points": points })).unwrap()
    )
}

/// `count` banded entries spread over the default bands, in band order
pub fn banded_reply(count: usize) -> String {
    let bands = Config::default().pipeline.bands;
    let sizes = prismatic::services::prompt::band_sizes(count, bands.len());
    let mut entries = Vec::with_capacity(count);
    for (band, size) in bands.iter().zip(sizes) {
        for position in 0..size {
            entries.push(json!({
                "color": band,
                "view": format!("{band} view {position}"),
                "significance": 0.5,
            }));
        }
    }
    json!({ "perspectives": entries }).to_string()
}

// ---------------------------------------------------------------------------
// Orchestrator helpers
// ---------------------------------------------------------------------------

/// Poll until the run reaches Done or Error
pub async fn wait_for_terminal(orchestrator: &StageOrchestrator) -> RunState {
    for _ in 0..2_000 {
        let state = orchestrator.get_status();
        if state.stage.is_terminal() {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run did not finish: {:?}", orchestrator.get_status());
}

/// Poll until the run leaves the queue
pub async fn wait_for_stage(orchestrator: &StageOrchestrator, stage: RunStage) {
    for _ in 0..2_000 {
        if orchestrator.get_status().stage == stage {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("run never reached {stage}: {:?}", orchestrator.get_status());
}
