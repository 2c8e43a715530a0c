pub mod config;
pub mod point;
pub mod run_state;

pub use config::{
    BackendConfig, Config, GenerationConfig, LoggingConfig, OrchestratorConfig, PipelineConfig,
    ResultsConfig, RetryConfig, RunnerKind, ServerConfig,
};
pub use point::{BucketLabel, Buckets, PersistedResults, Point, PointSet, NEUTRAL_SCORE};
pub use run_state::{RunStage, RunState};
