//! Application layer: run lifecycle and stage execution

pub mod orchestrator;
pub mod stage_runner;

pub use orchestrator::StageOrchestrator;
pub use stage_runner::{
    drive, ConfiguredRunner, InProcessRunner, PipelineJob, RunEvent, StageRunner,
    SubprocessRunner,
};
