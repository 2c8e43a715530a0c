use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure for prismatic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Generation backend location and probing
    #[serde(default)]
    pub backend: BackendConfig,

    /// Sampling parameters for the generation call
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Retry policy for rate-limited generation calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Pipeline shape: topic, perspective count, bands, cluster count
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Run supervision
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Run-control HTTP server
    #[serde(default)]
    pub server: ServerConfig,

    /// Where results are persisted
    #[serde(default)]
    pub results: ResultsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Generation backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BackendConfig {
    /// Base URL of the llama.cpp-compatible server
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model selection forwarded to the backend, if any
    #[serde(default)]
    pub model: Option<String>,

    /// Overall request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Liveness probe attempts before declaring the backend unreachable
    #[serde(default = "default_probe_attempts")]
    pub probe_attempts: u32,

    /// Delay between liveness probes in milliseconds
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    /// Stop sequences sent with each completion request
    #[serde(default = "default_stop")]
    pub stop: Vec<String>,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    600
}

const fn default_probe_attempts() -> u32 {
    30
}

const fn default_probe_interval_ms() -> u64 {
    500
}

fn default_stop() -> Vec<String> {
    vec!["<|im_end|>".to_string(), "user:".to_string()]
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: None,
            request_timeout_secs: default_request_timeout_secs(),
            probe_attempts: default_probe_attempts(),
            probe_interval_ms: default_probe_interval_ms(),
            stop: default_stop(),
        }
    }
}

/// Sampling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GenerationConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Maximum number of tokens the backend may produce
    #[serde(default = "default_max_output")]
    pub max_output: u32,

    /// Self-throttling pause after a successful call, in milliseconds
    #[serde(default = "default_post_success_delay_ms")]
    pub post_success_delay_ms: u64,
}

const fn default_temperature() -> f64 {
    0.6
}

const fn default_max_output() -> u32 {
    32768
}

const fn default_post_success_delay_ms() -> u64 {
    2000
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_output: default_max_output(),
            post_success_delay_ms: default_post_success_delay_ms(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Total attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after the first transient failure, in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

const fn default_max_attempts() -> u32 {
    5
}

const fn default_base_delay_ms() -> u64 {
    1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

/// Pipeline shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Topic used when a run request does not carry one
    #[serde(default)]
    pub topic: Option<String>,

    /// Number of perspectives requested from the model
    #[serde(default = "default_perspective_count")]
    pub perspective_count: usize,

    /// Ordered label bands, leftmost first
    #[serde(default = "default_bands")]
    pub bands: Vec<String>,

    /// Size of the representative subset
    #[serde(default = "default_cluster_count")]
    pub cluster_count: usize,
}

const fn default_perspective_count() -> usize {
    70
}

fn default_bands() -> Vec<String> {
    ["red", "orange", "yellow", "green", "blue", "indigo", "violet"]
        .iter()
        .map(|band| (*band).to_string())
        .collect()
}

const fn default_cluster_count() -> usize {
    28
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            topic: None,
            perspective_count: default_perspective_count(),
            bands: default_bands(),
            cluster_count: default_cluster_count(),
        }
    }
}

/// How a run is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunnerKind {
    /// Spawned tokio task inside the server process
    #[default]
    InProcess,
    /// Child process running `prismatic pipeline`
    Subprocess,
}

/// Run supervision configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OrchestratorConfig {
    /// Hard limit on one run, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub runner: RunnerKind,
}

const fn default_timeout_secs() -> u64 {
    300
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            runner: RunnerKind::default(),
        }
    }
}

/// Run-control HTTP server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by CORS
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8000
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

/// Result sink configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ResultsConfig {
    /// Directory receiving `low.json`, `mid.json`, `high.json` and `results.json`
    #[serde(default = "default_results_dir")]
    pub dir: PathBuf,
}

fn default_results_dir() -> PathBuf {
    PathBuf::from(".prismatic/results")
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            dir: default_results_dir(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Rotation for file output: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
