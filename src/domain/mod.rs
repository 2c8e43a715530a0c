//! Domain layer for the prismatic pipeline
//!
//! Core data model, error taxonomy and the ports that infrastructure
//! adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{
    BackendError, ConfigError, GenerationError, OrchestratorError, ParseError, PipelineError,
    ReductionError, SinkError,
};
