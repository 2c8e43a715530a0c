//! Prismatic - perspective gradient pipeline
//!
//! Asks a local language model for a gradient of perspectives on a topic,
//! reduces them to a representative subset, partitions that subset into
//! low / mid / high buckets and persists the result. A run-control HTTP
//! server starts runs and serves their status and results.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Data model, errors and port traits
//! - **Service Layer** (`services`): Pipeline stages and the resilient generation client
//! - **Application Layer** (`application`): Run orchestration and stage runners
//! - **Infrastructure Layer** (`infrastructure`): Config, llama.cpp backend, logging, result sink
//! - **Adapters** (`adapters`): Run-control HTTP server
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use prismatic::services::{partition, reduce};
//!
//! let reduced = reduce(&points, 28)?;
//! let buckets = partition(&reduced);
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{StageOrchestrator, StageRunner};
pub use domain::errors::{
    BackendError, ConfigError, GenerationError, OrchestratorError, ParseError, PipelineError,
    ReductionError, SinkError,
};
pub use domain::models::{
    BucketLabel, Buckets, Config, PersistedResults, Point, PointSet, RunStage, RunState,
};
pub use domain::ports::{ConfigStore, GenerationBackend, ResultSink, Sleeper};
pub use infrastructure::config::ConfigLoader;
pub use services::{partition, reduce, ResilientGenerationClient, RetryPolicy};
