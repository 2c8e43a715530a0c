//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the interfaces that infrastructure adapters implement:
//! - GenerationBackend: streaming text generation + liveness probe
//! - BackendProvider / SinkProvider: per-run adapter construction
//! - ConfigStore: durable configuration
//! - ResultSink: persistence of partitioned results
//! - Sleeper: waiting, injectable for tests

pub mod config_store;
pub mod generation_backend;
pub mod result_sink;
pub mod sleeper;

pub use config_store::ConfigStore;
pub use generation_backend::{
    BackendProvider, FragmentStream, GenerationBackend, GenerationRequest, StreamFragment,
};
pub use result_sink::{ResultSink, SinkProvider};
pub use sleeper::{Sleeper, TokioSleeper};
