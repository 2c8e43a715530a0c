//! Stage orchestrator
//!
//! Owns the single [`RunState`] and guarantees that at most one pipeline
//! run is in flight. Runs execute on a spawned task; callers only ever see
//! snapshots of the state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::stage_runner::{PipelineJob, StageRunner};
use crate::domain::errors::{OrchestratorError, SinkError};
use crate::domain::models::{Config, PersistedResults, RunStage, RunState};
use crate::domain::ports::{ConfigStore, ResultSink, SinkProvider};
use crate::services::{PipelineStep, ProgressReporter};

struct Inner {
    state: RunState,
    /// Sink of the current (or last) run, fixed when the run started
    sink: Option<Arc<dyn ResultSink>>,
}

/// Run state machine and run-control surface
#[derive(Clone)]
pub struct StageOrchestrator {
    inner: Arc<Mutex<Inner>>,
    config_store: Arc<dyn ConfigStore>,
    runner: Arc<dyn StageRunner>,
    sinks: Arc<dyn SinkProvider>,
}

impl StageOrchestrator {
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        runner: Arc<dyn StageRunner>,
        sinks: Arc<dyn SinkProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: RunState::default(),
                sink: None,
            })),
            config_store,
            runner,
            sinks,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }

    /// Accept a new run and schedule it
    ///
    /// Fails with [`OrchestratorError::AlreadyRunning`] while another run
    /// is queued or running; the current state is left untouched.
    pub fn start_run(&self, topic: Option<String>) -> Result<Uuid, OrchestratorError> {
        let run_id = Uuid::new_v4();
        {
            let mut inner = self.lock();
            if inner.state.stage.is_in_flight() {
                warn!(
                    current_run = ?inner.state.run_id,
                    stage = %inner.state.stage,
                    "Rejecting run request, pipeline already running"
                );
                return Err(OrchestratorError::AlreadyRunning);
            }
            inner.state.queue(run_id);
            inner.sink = None;
        }

        info!(%run_id, "Pipeline run queued");

        let this = self.clone();
        tokio::spawn(async move {
            this.execute(run_id, topic).await;
        });

        Ok(run_id)
    }

    /// Snapshot of the current run state
    pub fn get_status(&self) -> RunState {
        self.lock().state.clone()
    }

    /// Results of the last run, once it is done
    pub async fn get_results(&self) -> Result<PersistedResults, OrchestratorError> {
        let sink = {
            let inner = self.lock();
            if inner.state.stage != RunStage::Done {
                return Err(OrchestratorError::NotReady);
            }
            inner.sink.clone()
        };

        let Some(sink) = sink else {
            return Err(OrchestratorError::MissingOutput(
                "no result sink recorded for the last run".to_string(),
            ));
        };

        sink.load().await.map_err(|err| match err {
            SinkError::Missing(detail) => OrchestratorError::MissingOutput(detail),
            SinkError::Corrupt(detail) => OrchestratorError::CorruptOutput(detail),
            SinkError::Io(detail) => OrchestratorError::MissingOutput(detail),
        })
    }

    async fn execute(&self, run_id: Uuid, requested_topic: Option<String>) {
        let config = match self.config_store.get().await {
            Ok(config) => config,
            Err(err) => {
                self.finish(run_id, Err(format!("failed to read configuration: {err}")));
                return;
            }
        };

        let sink = self.sinks.sink_for(&config);
        {
            let mut inner = self.lock();
            if inner.state.run_id != Some(run_id) {
                return;
            }
            inner.sink = Some(Arc::clone(&sink));
            inner.state.start();
        }

        let topic = resolve_topic(requested_topic, &config);
        let timeout_secs = config.orchestrator.timeout_secs;
        info!(%run_id, %topic, timeout_secs, runner = ?config.orchestrator.runner, "Pipeline run started");

        let job = PipelineJob {
            run_id,
            topic,
            config,
        };
        let progress = Arc::new(RunProgress {
            inner: Arc::clone(&self.inner),
            run_id,
        });

        let outcome = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            self.runner.run(job, sink, progress),
        )
        .await;

        let result = match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err(OrchestratorError::Timeout { secs: timeout_secs }.to_string()),
        };
        self.finish(run_id, result);
    }

    fn finish(&self, run_id: Uuid, result: Result<(), String>) {
        let mut inner = self.lock();
        if inner.state.run_id != Some(run_id) {
            return;
        }
        match result {
            Ok(()) => {
                inner.state.complete();
                info!(%run_id, "Pipeline run finished");
            }
            Err(message) => {
                error!(%run_id, error = %message, "Pipeline run failed");
                inner.state.fail(message);
            }
        }
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Requested topic, falling back to the configured default
fn resolve_topic(requested: Option<String>, config: &Config) -> String {
    requested
        .filter(|topic| !topic.trim().is_empty())
        .or_else(|| config.pipeline.topic.clone())
        .unwrap_or_default()
}

/// Raises run progress while the run it belongs to is running
struct RunProgress {
    inner: Arc<Mutex<Inner>>,
    run_id: Uuid,
}

impl ProgressReporter for RunProgress {
    fn report(&self, step: PipelineStep) {
        let mut inner = lock(&self.inner);
        if inner.state.run_id == Some(self.run_id) && inner.state.stage == RunStage::Running {
            inner.state.advance(step.progress());
        }
    }
}
