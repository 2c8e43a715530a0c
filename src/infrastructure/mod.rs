//! Infrastructure layer module
//!
//! Adapters for the outside world, implementing the domain ports:
//! - Configuration management (figment + YAML store)
//! - llama.cpp generation backend
//! - Logging infrastructure
//! - JSON result sink

pub mod config;
pub mod llama;
pub mod logging;
pub mod sink;
