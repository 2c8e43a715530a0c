//! `prismatic pipeline`: entry point of a subprocess run
//!
//! Reads one [`PipelineJob`] as JSON from stdin and writes [`RunEvent`]
//! lines to stdout. Exits non-zero when the run fails.

use anyhow::{Context, Result};
use std::io::Write;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use crate::application::{drive, PipelineJob, RunEvent};
use crate::domain::ports::TokioSleeper;
use crate::infrastructure::llama::LlamaBackendProvider;
use crate::infrastructure::sink::JsonFileSink;
use crate::services::PipelineStep;

fn emit(event: &RunEvent) {
    let Ok(line) = serde_json::to_string(event) else {
        return;
    };
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{line}").and_then(|()| stdout.flush()) {
        warn!(error = %e, "Failed to report pipeline event");
    }
}

/// Decode the job document sent by the parent
pub fn parse_job(input: &[u8]) -> Result<PipelineJob> {
    serde_json::from_slice(input).context("Invalid pipeline job on stdin")
}

pub async fn execute() -> Result<()> {
    let mut input = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut input)
        .await
        .context("Failed to read pipeline job")?;

    let job = match parse_job(&input) {
        Ok(job) => job,
        Err(err) => {
            emit(&RunEvent::Failed {
                message: format!("{err:#}"),
            });
            return Err(err);
        }
    };

    info!(run_id = %job.run_id, topic = %job.topic, "Pipeline process started");

    let sink = Arc::new(JsonFileSink::new(job.config.results.dir.clone()));
    let progress = |step: PipelineStep| emit(&RunEvent::progress(step));

    match drive(
        &job,
        &LlamaBackendProvider,
        Arc::new(TokioSleeper),
        sink,
        &progress,
    )
    .await
    {
        Ok(summary) => {
            emit(&RunEvent::finished(&summary));
            Ok(())
        }
        Err(err) => {
            emit(&RunEvent::Failed {
                message: err.to_string(),
            });
            Err(err.into())
        }
    }
}
