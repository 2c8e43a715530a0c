//! Pipeline driver
//!
//! Sequences one run: prompt → generation → parse → reduction →
//! partitioning → sink. The first failing stage aborts the run.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

use super::generation_client::ResilientGenerationClient;
use super::output_parser::OutputParser;
use super::partitioner::partition;
use super::prompt::build_prompt;
use super::reducer::RepresentativeReducer;
use crate::domain::errors::PipelineError;
use crate::domain::models::{Buckets, Config};
use crate::domain::ports::ResultSink;

/// Milestones reported while a run makes progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Generating,
    Generated,
    Parsed,
    Reduced,
    Partitioned,
    Persisted,
}

impl PipelineStep {
    /// Run progress (percent) reached once this step is hit
    pub fn progress(self) -> u8 {
        match self {
            Self::Generating => 20,
            Self::Generated => 60,
            Self::Parsed => 65,
            Self::Reduced => 75,
            Self::Partitioned => 85,
            Self::Persisted => 95,
        }
    }
}

/// Receives pipeline milestones
pub trait ProgressReporter: Send + Sync {
    fn report(&self, step: PipelineStep);
}

impl<F> ProgressReporter for F
where
    F: Fn(PipelineStep) + Send + Sync,
{
    fn report(&self, step: PipelineStep) {
        self(step);
    }
}

/// Reporter that drops every milestone
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _step: PipelineStep) {}
}

/// Generation parameters for one run, snapshotted from configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub perspective_count: usize,
    pub bands: Vec<String>,
    pub temperature: f64,
    pub max_output: u32,
    pub cluster_count: usize,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            perspective_count: config.pipeline.perspective_count,
            bands: config.pipeline.bands.clone(),
            temperature: config.generation.temperature,
            max_output: config.generation.max_output,
            cluster_count: config.pipeline.cluster_count,
        }
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSummary {
    pub topic: String,
    /// Points parsed from the model reply
    pub generated: usize,
    /// Points kept after reduction
    pub reduced: usize,
    pub buckets: Buckets,
    /// Where the sink wrote the buckets
    pub location: String,
}

/// Runs the pipeline stages in order
pub struct PipelineDriver {
    client: Arc<ResilientGenerationClient>,
    parser: OutputParser,
    reducer: RepresentativeReducer,
    settings: PipelineSettings,
    sink: Arc<dyn ResultSink>,
}

impl PipelineDriver {
    pub fn new(
        client: Arc<ResilientGenerationClient>,
        settings: PipelineSettings,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        let parser = OutputParser::new(settings.perspective_count, settings.bands.clone());
        Self {
            client,
            parser,
            reducer: RepresentativeReducer::default(),
            settings,
            sink,
        }
    }

    /// Run every stage for `topic`
    #[instrument(skip(self, progress), fields(sink = %self.sink.location()))]
    pub async fn run(
        &self,
        topic: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<PipelineSummary, PipelineError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(PipelineError::MissingTopic);
        }

        let prompt = build_prompt(
            topic,
            self.settings.perspective_count,
            &self.settings.bands,
        );

        progress.report(PipelineStep::Generating);
        let raw = self
            .client
            .generate(&prompt, self.settings.temperature, self.settings.max_output)
            .await?;
        progress.report(PipelineStep::Generated);

        let points = self.parser.parse(&raw)?;
        progress.report(PipelineStep::Parsed);

        let reduced = self.reducer.reduce(&points, self.settings.cluster_count)?;
        progress.report(PipelineStep::Reduced);

        let buckets = partition(&reduced);
        progress.report(PipelineStep::Partitioned);

        self.sink.persist(&buckets, topic).await?;
        progress.report(PipelineStep::Persisted);

        info!(
            generated = points.len(),
            reduced = reduced.len(),
            low = buckets.low.len(),
            mid = buckets.mid.len(),
            high = buckets.high.len(),
            "Pipeline finished"
        );

        Ok(PipelineSummary {
            topic: topic.to_string(),
            generated: points.len(),
            reduced: reduced.len(),
            buckets,
            location: self.sink.location(),
        })
    }
}
