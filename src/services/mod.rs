pub mod generation_client;
pub mod output_parser;
pub mod partitioner;
pub mod pipeline_driver;
pub mod prompt;
pub mod reducer;
pub mod retry_policy;

pub use generation_client::{ProbeSettings, ResilientGenerationClient};
pub use output_parser::OutputParser;
pub use partitioner::{partition, T_HIGH, T_LOW};
pub use pipeline_driver::{
    NoProgress, PipelineDriver, PipelineSettings, PipelineStep, PipelineSummary,
    ProgressReporter,
};
pub use prompt::build_prompt;
pub use reducer::{reduce, RepresentativeReducer};
pub use retry_policy::RetryPolicy;
