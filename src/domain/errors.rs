//! Domain errors for the prismatic pipeline.

use thiserror::Error;

/// Failure reported by a generation backend for a single attempt.
///
/// Classification into transient and fatal happens here so that the
/// resilient client never needs to know the backend's wire protocol.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Backend reported resource exhaustion or rate limiting
    #[error("rate limited by backend: {0}")]
    RateLimited(String),

    /// Non-success HTTP status
    #[error("backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Connection, DNS or transport failure
    #[error("network error: {0}")]
    Network(String),

    /// Error event delivered inside the stream
    #[error("stream error: {0}")]
    Stream(String),

    /// Liveness probe did not succeed
    #[error("liveness probe failed: {0}")]
    Probe(String),
}

impl BackendError {
    /// Only resource exhaustion is worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::RateLimited(_))
    }

    /// Classify an HTTP status and body
    ///
    /// 429 and any body carrying `RESOURCE_EXHAUSTED` are rate limits;
    /// everything else is fatal.
    pub fn from_status(status: u16, body: String) -> Self {
        if status == 429 || body.contains("RESOURCE_EXHAUSTED") {
            BackendError::RateLimited(format!("HTTP {status}: {body}"))
        } else {
            BackendError::Http { status, body }
        }
    }
}

/// Errors surfaced by the resilient generation client
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// Request violated the input constraints
    #[error("invalid generation request: {0}")]
    InvalidRequest(String),

    /// Liveness probe failed on every attempt
    #[error("generation backend unreachable after {attempts} probe attempts")]
    Unreachable { attempts: u32 },

    /// Every attempt was rate limited
    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// Fatal backend failure
    #[error("backend error: {0}")]
    Backend(String),
}

/// Malformed or unusable model output
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error("model output is empty")]
    Empty,

    #[error("model declined the topic: {0}")]
    Rejected(String),

    #[error("no JSON document found in model output")]
    NoJson,

    #[error("malformed model output: {0}")]
    Malformed(String),

    #[error("expected {expected} perspectives, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("entry {index} has unknown label '{label}'")]
    UnknownLabel { index: usize, label: String },

    #[error("entry {index} with label '{label}' breaks band order")]
    BandOrder { index: usize, label: String },

    #[error("entry {index} has {field} = {value} outside [0, 1]")]
    ScoreOutOfRange {
        index: usize,
        field: &'static str,
        value: f64,
    },
}

/// Invalid input to the representative set reducer
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ReductionError {
    #[error("cannot reduce an empty point set")]
    EmptyInput,

    #[error("cluster count must be at least 1, got {0}")]
    InvalidK(usize),
}

/// Result sink failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    /// Nothing has been persisted at the expected location
    #[error("results missing: {0}")]
    Missing(String),

    /// Persisted results cannot be parsed
    #[error("results corrupt: {0}")]
    Corrupt(String),

    #[error("result sink I/O error: {0}")]
    Io(String),
}

/// A pipeline stage failure, carrying the stage's own error message
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("no topic provided")]
    MissingTopic,

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("reduction failed: {0}")]
    Reduction(#[from] ReductionError),

    #[error("persisting results failed: {0}")]
    Sink(#[from] SinkError),
}

/// Run-control errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("pipeline already running")]
    AlreadyRunning,

    #[error("not ready")]
    NotReady,

    #[error("final output missing: {0}")]
    MissingOutput(String),

    #[error("invalid output: {0}")]
    CorruptOutput(String),

    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("{0}")]
    ChildFailed(String),
}

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid perspective_count: {0}. Must be at least 1")]
    InvalidPerspectiveCount(usize),

    #[error("Invalid cluster_count: {0}. Must be at least 1")]
    InvalidClusterCount(usize),

    #[error("Band list cannot be empty")]
    EmptyBands,

    #[error("Duplicate band label: {0}")]
    DuplicateBand(String),

    #[error("Invalid temperature: {0}. Must be finite and >= 0")]
    InvalidTemperature(f64),

    #[error("Invalid max_output: {0}. Must be positive")]
    InvalidMaxOutput(u32),

    #[error("Invalid max_attempts: {0}. Cannot be 0")]
    InvalidMaxAttempts(u32),

    #[error("Invalid probe_attempts: {0}. Cannot be 0")]
    InvalidProbeAttempts(u32),

    #[error("Invalid timeout_secs: {0}. Must be positive")]
    InvalidTimeout(u64),

    #[error("Backend base_url cannot be empty")]
    EmptyBaseUrl,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Invalid configuration update: {0}")]
    InvalidUpdate(String),

    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Failed to persist configuration: {0}")]
    Persist(String),
}
