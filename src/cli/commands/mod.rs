//! Command handlers

pub mod config;
pub mod pipeline;
pub mod probe;
pub mod run;
pub mod serve;
