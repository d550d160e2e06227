//! Export job lifecycle state machine
//!
//! An [`ExportJob`] owns the lifecycle state of a single export and notifies
//! its delegate on every transition. It performs no I/O itself; the
//! [`ExportCoordinator`](super::ExportCoordinator) advances it while moving
//! rows from a source to a sink.
//!
//! ```text
//! NotStarted -> Running -> WritingData -> Completed
//!                  |            |
//!                  +------------+-------> Failed(reason)
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;

use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{LifecycleError, Result};

use super::delegate::ExportDelegate;
use super::encoders::ExportFormat;

/// Lifecycle state of an export job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    NotStarted,
    Running,
    WritingData,
    Completed,
    Failed,
}

impl JobState {
    /// Whether no further transition can happen from this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Whether moving from `self` to `to` is a legal edge
    fn can_transition_to(&self, to: JobState) -> bool {
        matches!(
            (self, to),
            (JobState::NotStarted, JobState::Running)
                | (JobState::Running, JobState::WritingData)
                | (
                    JobState::Running | JobState::WritingData,
                    JobState::Completed | JobState::Failed
                )
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::NotStarted => "not started",
            JobState::Running => "running",
            JobState::WritingData => "writing data",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Identity of a job, handed to every delegate callback
///
/// Lets a single delegate tell apart several jobs running at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    /// Unique job id
    pub id: Uuid,
    /// Output format produced by the job
    pub format: ExportFormat,
    /// Human-readable label (usually the output path)
    pub label: String,
}

impl JobInfo {
    pub fn new(label: impl Into<String>, format: ExportFormat) -> Self {
        Self {
            id: Uuid::new_v4(),
            format,
            label: label.into(),
        }
    }
}

/// Why a job ended in the `Failed` state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The caller requested cancellation
    Cancelled,
    /// Writing to or flushing the sink failed
    Io { kind: io::ErrorKind, message: String },
    /// The row source failed
    Source(String),
    /// The format encoder failed
    Encode(String),
}

impl FailureReason {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FailureReason::Cancelled)
    }
}

impl From<&io::Error> for FailureReason {
    fn from(err: &io::Error) -> Self {
        FailureReason::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Cancelled => write!(f, "cancelled"),
            FailureReason::Io { message, .. } => write!(f, "I/O error: {message}"),
            FailureReason::Source(msg) => write!(f, "source error: {msg}"),
            FailureReason::Encode(msg) => write!(f, "encoding error: {msg}"),
        }
    }
}

/// Statistics of a completed export
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Number of rows exported
    pub rows: u64,
    /// Bytes handed to the sink
    pub bytes_written: u64,
    /// Wall time of the export
    pub elapsed_ms: u64,
}

/// Terminal result reported through `process_complete`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Completed(ExportSummary),
    Failed(FailureReason),
}

impl ExportOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ExportOutcome::Completed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExportOutcome::Failed(reason) if reason.is_cancelled())
    }

    pub fn state(&self) -> JobState {
        match self {
            ExportOutcome::Completed(_) => JobState::Completed,
            ExportOutcome::Failed(_) => JobState::Failed,
        }
    }
}

/// State machine for a single export job
pub struct ExportJob {
    info: JobInfo,
    state: JobState,
    delegate: Option<Arc<dyn ExportDelegate>>,
    /// Last progress value reported to the delegate
    progress: u64,
    cancelled: bool,
    outcome: Option<ExportOutcome>,
}

impl ExportJob {
    /// Create a job in the `NotStarted` state
    pub fn new(info: JobInfo) -> Self {
        Self {
            info,
            state: JobState::NotStarted,
            delegate: None,
            progress: 0,
            cancelled: false,
            outcome: None,
        }
    }

    /// Register the delegate that observes this job
    ///
    /// Allowed once, and only before [`start`](Self::start).
    pub fn set_delegate(&mut self, delegate: Arc<dyn ExportDelegate>) -> Result<()> {
        if self.state != JobState::NotStarted {
            return Err(self.misuse("register a delegate on"));
        }
        if self.delegate.is_some() {
            return Err(LifecycleError::DelegateAlreadySet.into());
        }
        self.delegate = Some(delegate);
        Ok(())
    }

    /// Create a `NotStarted` job already observed by `delegate`
    ///
    /// The delegate can not be replaced afterwards.
    pub fn with_delegate(info: JobInfo, delegate: Arc<dyn ExportDelegate>) -> Self {
        Self {
            delegate: Some(delegate),
            ..Self::new(info)
        }
    }

    pub fn info(&self) -> &JobInfo {
        &self.info
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn progress(&self) -> u64 {
        self.progress
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Terminal outcome, once the job has finished
    pub fn outcome(&self) -> Option<&ExportOutcome> {
        self.outcome.as_ref()
    }

    /// `NotStarted -> Running`, notifies `will_begin`
    pub fn start(&mut self) -> Result<()> {
        self.transition(JobState::Running, "start")?;
        if let Some(delegate) = &self.delegate {
            delegate.will_begin(&self.info);
        }
        Ok(())
    }

    /// Report cumulative progress while running or writing
    ///
    /// Values must never decrease over the job's lifetime.
    pub fn report_progress(&mut self, value: u64) -> Result<()> {
        if !matches!(self.state, JobState::Running | JobState::WritingData) {
            return Err(self.misuse("report progress on"));
        }
        if value < self.progress {
            return Err(LifecycleError::ProgressRegression {
                current: self.progress,
                requested: value,
            }
            .into());
        }
        self.progress = value;
        if let Some(delegate) = &self.delegate {
            delegate.progress_updated(&self.info, value);
        }
        Ok(())
    }

    /// `Running -> WritingData`, notifies `will_begin_writing_data`
    pub fn begin_writing_data(&mut self) -> Result<()> {
        self.transition(JobState::WritingData, "begin writing data for")?;
        if let Some(delegate) = &self.delegate {
            delegate.will_begin_writing_data(&self.info);
        }
        Ok(())
    }

    /// Move to `Completed` and notify `process_complete`
    pub fn complete(&mut self, summary: ExportSummary) -> Result<()> {
        if self.state.is_terminal() {
            error!(
                "Job {} asked to complete twice (already {})",
                self.info.id, self.state
            );
        }
        self.finish(ExportOutcome::Completed(summary), "complete")
    }

    /// Move to `Failed(reason)` and notify `process_complete`
    pub fn fail(&mut self, reason: FailureReason) -> Result<()> {
        let cancelled = reason.is_cancelled();
        self.finish(ExportOutcome::Failed(reason), "fail")?;
        self.cancelled = cancelled;
        Ok(())
    }

    /// Cancel a running job
    ///
    /// Moves a `Running` or `WritingData` job to `Failed(Cancelled)` and
    /// notifies `process_complete`. Cancelling a job that has not started
    /// or has already finished does nothing. Returns whether the job was
    /// cancelled by this call.
    pub fn cancel(&mut self) -> bool {
        match self.state {
            JobState::Running | JobState::WritingData => {
                self.fail(FailureReason::Cancelled).is_ok()
            }
            JobState::NotStarted => {
                debug!("Ignoring cancel for job {} that never started", self.info.id);
                false
            }
            JobState::Completed | JobState::Failed => false,
        }
    }

    fn finish(&mut self, outcome: ExportOutcome, operation: &'static str) -> Result<()> {
        self.transition(outcome.state(), operation)?;
        if let Some(delegate) = &self.delegate {
            delegate.process_complete(&self.info, &outcome);
        }
        self.outcome = Some(outcome);
        Ok(())
    }

    fn transition(&mut self, to: JobState, operation: &'static str) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(self.misuse(operation));
        }
        debug!("Job {}: {} -> {}", self.info.id, self.state, to);
        self.state = to;
        Ok(())
    }

    fn misuse(&self, operation: &'static str) -> crate::error::ExportError {
        warn!(
            "Job {} rejected '{}' in state {}",
            self.info.id, operation, self.state
        );
        LifecycleError::InvalidStateTransition {
            from: self.state,
            operation,
        }
        .into()
    }
}

impl fmt::Debug for ExportJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportJob")
            .field("info", &self.info)
            .field("state", &self.state)
            .field("progress", &self.progress)
            .field("cancelled", &self.cancelled)
            .field("has_delegate", &self.delegate.is_some())
            .finish()
    }
}
