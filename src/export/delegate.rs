//! Delegate capability for observing export jobs
//!
//! A delegate is handed to an [`ExportJob`](super::ExportJob) before it
//! starts and is told about every lifecycle transition. Callbacks must
//! return quickly; long work should be handed off elsewhere.

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use super::job::{ExportOutcome, JobInfo};

/// Observer of an export job's lifecycle
///
/// All callbacks default to doing nothing so implementors only override
/// the transitions they care about.
pub trait ExportDelegate: Send + Sync {
    /// The job is about to begin
    fn will_begin(&self, _job: &JobInfo) {}

    /// Cumulative progress (rows processed) changed
    fn progress_updated(&self, _job: &JobInfo, _progress: u64) {}

    /// The job is about to start writing to its sink
    fn will_begin_writing_data(&self, _job: &JobInfo) {}

    /// The job reached a terminal state
    fn process_complete(&self, _job: &JobInfo, _outcome: &ExportOutcome) {}
}

/// Delegate that reports every transition through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDelegate;

impl ExportDelegate for LoggingDelegate {
    fn will_begin(&self, job: &JobInfo) {
        info!("{} export '{}' starting ({})", job.format, job.label, job.id);
    }

    fn progress_updated(&self, job: &JobInfo, progress: u64) {
        debug!("{} export '{}': {} rows", job.format, job.label, progress);
    }

    fn will_begin_writing_data(&self, job: &JobInfo) {
        debug!("{} export '{}' writing data", job.format, job.label);
    }

    fn process_complete(&self, job: &JobInfo, outcome: &ExportOutcome) {
        match outcome {
            ExportOutcome::Completed(summary) => info!(
                "{} export '{}' completed: {} rows, {} bytes, {} ms",
                job.format, job.label, summary.rows, summary.bytes_written, summary.elapsed_ms
            ),
            ExportOutcome::Failed(reason) => {
                warn!("{} export '{}' failed: {}", job.format, job.label, reason)
            }
        }
    }
}

/// One delegate notification, captured so it can be replayed elsewhere
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportEvent {
    WillBegin(JobInfo),
    ProgressUpdated(JobInfo, u64),
    WillBeginWritingData(JobInfo),
    ProcessComplete(JobInfo, ExportOutcome),
}

impl ExportEvent {
    /// Invoke the matching callback on `delegate`
    pub fn deliver(&self, delegate: &dyn ExportDelegate) {
        match self {
            ExportEvent::WillBegin(job) => delegate.will_begin(job),
            ExportEvent::ProgressUpdated(job, progress) => delegate.progress_updated(job, *progress),
            ExportEvent::WillBeginWritingData(job) => delegate.will_begin_writing_data(job),
            ExportEvent::ProcessComplete(job, outcome) => delegate.process_complete(job, outcome),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportEvent::ProcessComplete(..))
    }

    pub fn job(&self) -> &JobInfo {
        match self {
            ExportEvent::WillBegin(job)
            | ExportEvent::ProgressUpdated(job, _)
            | ExportEvent::WillBeginWritingData(job)
            | ExportEvent::ProcessComplete(job, _) => job,
        }
    }
}

/// Delegate that forwards every notification over a channel
///
/// Used by the runner so that a job's worker task never calls user code
/// directly; the receiving side replays the events on the caller's task.
pub(crate) struct ChannelDelegate {
    tx: UnboundedSender<ExportEvent>,
}

impl ChannelDelegate {
    pub(crate) fn new(tx: UnboundedSender<ExportEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: ExportEvent) {
        if self.tx.send(event).is_err() {
            debug!("Export event dropped: receiver is gone");
        }
    }
}

impl ExportDelegate for ChannelDelegate {
    fn will_begin(&self, job: &JobInfo) {
        self.send(ExportEvent::WillBegin(job.clone()));
    }

    fn progress_updated(&self, job: &JobInfo, progress: u64) {
        self.send(ExportEvent::ProgressUpdated(job.clone(), progress));
    }

    fn will_begin_writing_data(&self, job: &JobInfo) {
        self.send(ExportEvent::WillBeginWritingData(job.clone()));
    }

    fn process_complete(&self, job: &JobInfo, outcome: &ExportOutcome) {
        self.send(ExportEvent::ProcessComplete(job.clone(), outcome.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::encoders::ExportFormat;
    use crate::export::job::ExportSummary;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct Counter {
        seen: Mutex<Vec<&'static str>>,
    }

    impl ExportDelegate for Counter {
        fn progress_updated(&self, _job: &JobInfo, _progress: u64) {
            self.seen.lock().unwrap().push("progress");
        }
    }

    #[test]
    fn test_default_callbacks_are_noops() {
        let counter = Counter::default();
        let job = JobInfo::new("a.csv", ExportFormat::Csv);
        counter.will_begin(&job);
        counter.progress_updated(&job, 3);
        counter.process_complete(&job, &ExportOutcome::Completed(ExportSummary::default()));
        assert_eq!(*counter.seen.lock().unwrap(), vec!["progress"]);
    }

    #[test]
    fn test_channel_delegate_forwards_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let delegate = ChannelDelegate::new(tx);
        let job = JobInfo::new("b.pdf", ExportFormat::Pdf);

        delegate.will_begin(&job);
        delegate.progress_updated(&job, 7);
        delegate.will_begin_writing_data(&job);

        assert_eq!(rx.try_recv().unwrap(), ExportEvent::WillBegin(job.clone()));
        assert_eq!(rx.try_recv().unwrap(), ExportEvent::ProgressUpdated(job.clone(), 7));
        let last = rx.try_recv().unwrap();
        assert!(!last.is_terminal());
        assert_eq!(last.job().id, job.id);
    }

    #[test]
    fn test_channel_delegate_survives_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let delegate = ChannelDelegate::new(tx);
        delegate.will_begin(&JobInfo::new("c.csv", ExportFormat::Csv));
    }
}
