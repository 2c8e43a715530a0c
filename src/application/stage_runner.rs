//! Stage runners
//!
//! A stage runner executes one pipeline run. The orchestrator bounds it
//! with a timeout by dropping the future returned from [`StageRunner::run`];
//! every runner releases its work on drop:
//!
//! - [`InProcessRunner`] aborts its spawned tokio task
//! - [`SubprocessRunner`] kills its child process

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::{GenerationError, OrchestratorError, PipelineError};
use crate::domain::models::{Config, RunnerKind};
use crate::domain::ports::{BackendProvider, ResultSink, Sleeper};
use crate::services::{
    PipelineDriver, PipelineSettings, PipelineStep, PipelineSummary, ProgressReporter,
    ResilientGenerationClient,
};

/// Everything a run needs, serializable so it can cross a process boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineJob {
    pub run_id: Uuid,
    pub topic: String,
    /// Configuration snapshot taken when the run started
    pub config: Config,
}

/// Line-delimited events a `prismatic pipeline` child writes to stdout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Progress { step: PipelineStep, progress: u8 },
    Failed { message: String },
    Finished { generated: usize, reduced: usize },
}

impl RunEvent {
    pub fn progress(step: PipelineStep) -> Self {
        Self::Progress {
            step,
            progress: step.progress(),
        }
    }

    pub fn finished(summary: &PipelineSummary) -> Self {
        Self::Finished {
            generated: summary.generated,
            reduced: summary.reduced,
        }
    }
}

/// Executes one pipeline run
#[async_trait]
pub trait StageRunner: Send + Sync {
    /// Run `job` to completion, writing results to `sink`
    ///
    /// Dropping the returned future cancels the run.
    async fn run(
        &self,
        job: PipelineJob,
        sink: Arc<dyn ResultSink>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<(), OrchestratorError>;
}

/// Build a driver for `job` and run it
///
/// Shared by the in-process runner and the `pipeline` child entry point.
pub async fn drive(
    job: &PipelineJob,
    backends: &dyn BackendProvider,
    sleeper: Arc<dyn Sleeper>,
    sink: Arc<dyn ResultSink>,
    progress: &dyn ProgressReporter,
) -> Result<PipelineSummary, PipelineError> {
    let backend = backends
        .backend_for(&job.config)
        .map_err(|e| GenerationError::Backend(e.to_string()))?;
    let client = Arc::new(ResilientGenerationClient::from_config(
        backend,
        sleeper,
        &job.config,
    ));
    let driver = PipelineDriver::new(client, PipelineSettings::from_config(&job.config), sink);
    driver.run(&job.topic, progress).await
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Runs the pipeline on a spawned tokio task inside this process
pub struct InProcessRunner {
    backends: Arc<dyn BackendProvider>,
    sleeper: Arc<dyn Sleeper>,
}

impl InProcessRunner {
    pub fn new(backends: Arc<dyn BackendProvider>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { backends, sleeper }
    }
}

#[async_trait]
impl StageRunner for InProcessRunner {
    async fn run(
        &self,
        job: PipelineJob,
        sink: Arc<dyn ResultSink>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<(), OrchestratorError> {
        let backends = Arc::clone(&self.backends);
        let sleeper = Arc::clone(&self.sleeper);

        let mut task = AbortOnDrop(tokio::spawn(async move {
            drive(&job, backends.as_ref(), sleeper, sink, progress.as_ref()).await
        }));

        match (&mut task.0).await {
            Ok(Ok(_summary)) => Ok(()),
            Ok(Err(err)) => Err(OrchestratorError::ChildFailed(err.to_string())),
            Err(join_err) if join_err.is_panic() => {
                let payload = join_err.into_panic();
                Err(OrchestratorError::ChildFailed(format!(
                    "pipeline task panicked: {}",
                    panic_message(payload.as_ref())
                )))
            }
            Err(_) => Err(OrchestratorError::ChildFailed(
                "pipeline task was cancelled".to_string(),
            )),
        }
    }
}

/// Runs the pipeline in a child process
///
/// The child receives the [`PipelineJob`] as JSON on stdin and reports
/// [`RunEvent`]s as JSON lines on stdout. It writes its results to the
/// directory named in the job's configuration.
pub struct SubprocessRunner {
    program: PathBuf,
    args: Vec<String>,
}

impl SubprocessRunner {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Re-invoke the running binary as `<exe> --config <dir> pipeline`
    pub fn current_exe(config_dir: &Path) -> anyhow::Result<Self> {
        let program = std::env::current_exe().context("Failed to locate current executable")?;
        Ok(Self::new(
            program,
            vec![
                "--config".to_string(),
                config_dir.display().to_string(),
                "pipeline".to_string(),
            ],
        ))
    }
}

#[async_trait]
impl StageRunner for SubprocessRunner {
    async fn run(
        &self,
        job: PipelineJob,
        sink: Arc<dyn ResultSink>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<(), OrchestratorError> {
        let payload = serde_json::to_vec(&job)
            .map_err(|e| OrchestratorError::ChildFailed(format!("failed to encode job: {e}")))?;

        info!(
            run_id = %job.run_id,
            program = ?self.program,
            sink = %sink.location(),
            "Spawning pipeline process"
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                OrchestratorError::ChildFailed(format!("failed to spawn pipeline process: {e}"))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(&payload).await {
                warn!(error = %e, "Failed to send job to pipeline process");
            }
            // Closing stdin marks the end of the job document
            drop(stdin);
        }

        let mut failure = None;
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match serde_json::from_str::<RunEvent>(&line) {
                        Ok(RunEvent::Progress { step, .. }) => progress.report(step),
                        Ok(RunEvent::Failed { message }) => failure = Some(message),
                        Ok(RunEvent::Finished { generated, reduced }) => {
                            debug!(generated, reduced, "Pipeline process finished");
                        }
                        Err(_) => debug!(line = %line, "Ignoring non-event output"),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "Failed to read pipeline process output");
                        break;
                    }
                }
            }
        }

        let status = child.wait().await.map_err(|e| {
            OrchestratorError::ChildFailed(format!("failed to wait for pipeline process: {e}"))
        })?;

        if status.success() && failure.is_none() {
            return Ok(());
        }

        let code = status
            .code()
            .map_or_else(|| "signal".to_string(), |code| code.to_string());
        let message = failure.unwrap_or_else(|| "no error reported".to_string());
        Err(OrchestratorError::ChildFailed(format!(
            "pipeline process exited with code {code}: {message}"
        )))
    }
}

/// Dispatches to the runner selected by the job's `orchestrator.runner`
pub struct ConfiguredRunner {
    in_process: Arc<dyn StageRunner>,
    subprocess: Arc<dyn StageRunner>,
}

impl ConfiguredRunner {
    pub fn new(in_process: Arc<dyn StageRunner>, subprocess: Arc<dyn StageRunner>) -> Self {
        Self {
            in_process,
            subprocess,
        }
    }
}

#[async_trait]
impl StageRunner for ConfiguredRunner {
    async fn run(
        &self,
        job: PipelineJob,
        sink: Arc<dyn ResultSink>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<(), OrchestratorError> {
        match job.config.orchestrator.runner {
            RunnerKind::InProcess => self.in_process.run(job, sink, progress).await,
            RunnerKind::Subprocess => self.subprocess.run(job, sink, progress).await,
        }
    }
}
