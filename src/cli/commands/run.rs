//! `prismatic run`: one pipeline run in the foreground

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::application::{drive, PipelineJob};
use crate::cli::output::{buckets_table, output, CommandOutput};
use crate::cli::types::RunArgs;
use crate::domain::errors::OrchestratorError;
use crate::domain::ports::TokioSleeper;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::llama::LlamaBackendProvider;
use crate::infrastructure::sink::JsonFileSink;
use crate::services::{PipelineStep, PipelineSummary};

#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub run_id: Uuid,
    #[serde(flatten)]
    pub summary: PipelineSummary,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let summary = &self.summary;
        format!(
            "Topic: {}\nGenerated {} perspectives, kept {} (low {}, mid {}, high {})\n{}\nResults written to {}",
            summary.topic,
            summary.generated,
            summary.reduced,
            summary.buckets.low.len(),
            summary.buckets.mid.len(),
            summary.buckets.high.len(),
            buckets_table(&summary.buckets),
            summary.location,
        )
    }
}

pub async fn execute(args: RunArgs, config_dir: &Path, json_mode: bool) -> Result<()> {
    let mut config = ConfigLoader::load_from_dir(config_dir)?;
    if let Some(clusters) = args.clusters {
        config.pipeline.cluster_count = clusters;
        ConfigLoader::validate(&config)?;
    }

    let job = PipelineJob {
        run_id: Uuid::new_v4(),
        topic: args
            .topic
            .or_else(|| config.pipeline.topic.clone())
            .unwrap_or_default(),
        config,
    };
    let sink = Arc::new(JsonFileSink::new(job.config.results.dir.clone()));
    let timeout_secs = job.config.orchestrator.timeout_secs;

    let progress = |step: PipelineStep| {
        info!(step = ?step, progress = step.progress(), "Pipeline progress");
    };

    let summary = tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        drive(
            &job,
            &LlamaBackendProvider,
            Arc::new(TokioSleeper),
            sink,
            &progress,
        ),
    )
    .await
    .map_err(|_| OrchestratorError::Timeout { secs: timeout_secs })?
    .context("Pipeline run failed")?;

    output(
        &RunOutput {
            run_id: job.run_id,
            summary,
        },
        json_mode,
    );
    Ok(())
}
