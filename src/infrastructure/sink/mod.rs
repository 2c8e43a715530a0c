//! Result persistence

pub mod json_sink;

pub use json_sink::{JsonFileSink, JsonSinkProvider, RESULTS_FILE};
