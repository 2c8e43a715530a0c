use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle stage of the pipeline run
///
/// ```text
/// Idle ──► Queued ──► Running ──► Done
///            ▲                 └─► Error
///            └──── next run request from Done / Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStage {
    /// Initial state, before any run was requested
    Idle,
    /// Run accepted, execution not yet started
    Queued,
    /// Pipeline executing
    Running,
    /// Pipeline finished and results were persisted
    Done,
    /// Pipeline failed or timed out
    Error,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    /// A run is in flight while queued or running
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: Self) -> bool {
        match next {
            Self::Queued => *self == Self::Idle || self.is_terminal(),
            Self::Running => *self == Self::Queued,
            Self::Done => *self == Self::Running,
            Self::Error => self.is_in_flight(),
            Self::Idle => false,
        }
    }
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the single pipeline run tracked by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Identifier of the current (or last) run
    pub run_id: Option<Uuid>,
    pub stage: RunStage,
    /// 0..=100, non-decreasing within a run
    pub progress: u8,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    /// Set iff `stage` is terminal
    pub ended_at: Option<DateTime<Utc>>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            run_id: None,
            stage: RunStage::Idle,
            progress: 0,
            error: None,
            started_at: None,
            ended_at: None,
        }
    }
}

impl RunState {
    fn enter(&mut self, next: RunStage) {
        debug_assert!(
            self.stage.can_transition_to(next),
            "illegal run transition {} -> {next}",
            self.stage
        );
        self.stage = next;
    }

    /// Reset for a newly accepted run
    pub fn queue(&mut self, run_id: Uuid) {
        self.enter(RunStage::Queued);
        self.run_id = Some(run_id);
        self.progress = 0;
        self.error = None;
        self.started_at = None;
        self.ended_at = None;
    }

    /// Raise progress, never lowering it and capping at 100
    pub fn advance(&mut self, progress: u8) {
        self.progress = self.progress.max(progress.min(100));
    }

    pub fn start(&mut self) {
        self.enter(RunStage::Running);
        self.started_at = Some(Utc::now());
        self.advance(10);
    }

    pub fn complete(&mut self) {
        self.enter(RunStage::Done);
        self.advance(100);
        self.ended_at = Some(Utc::now());
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.enter(RunStage::Error);
        self.error = Some(message.into());
        self.ended_at = Some(Utc::now());
    }
}
