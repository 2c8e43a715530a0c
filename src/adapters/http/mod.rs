//! HTTP adapters.

pub mod run_control_http;

pub use run_control_http::{RunControlConfig, RunControlServer};
