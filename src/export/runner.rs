//! Background execution of export jobs
//!
//! [`ExportRunner::start`] spawns each job's coordinator on its own tokio
//! task and returns immediately. The worker never calls the caller's
//! delegate directly: notifications travel over a channel and are replayed
//! on whichever task awaits [`JobHandle::wait`].

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ExportError, Result};

use super::coordinator::ExportCoordinator;
use super::delegate::{ChannelDelegate, ExportDelegate};
use super::encoders::FormatOptions;
use super::job::{ExportJob, ExportOutcome, JobInfo};
use super::sink::ExportSink;
use super::source::RowSource;

/// Everything needed to run one export
pub struct ExportRequest {
    /// Label reported to delegates (usually the output path)
    pub label: String,
    /// Rows to export
    pub source: Box<dyn RowSource>,
    /// Destination; handed back in the [`JobReport`]
    pub sink: Box<dyn ExportSink>,
    /// Output format and its settings
    pub options: FormatOptions,
}

/// Final report of a job, returned by [`JobHandle::wait`]
pub struct JobReport {
    pub info: JobInfo,
    pub outcome: ExportOutcome,
    /// The sink, returned to its owner
    pub sink: Box<dyn ExportSink>,
}

impl fmt::Debug for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobReport")
            .field("info", &self.info)
            .field("outcome", &self.outcome)
            .field("bytes_written", &self.sink.bytes_written())
            .finish()
    }
}

type WorkerResult = (Result<ExportOutcome>, Box<dyn ExportSink>);

/// Spawns export jobs onto independent workers
///
/// All jobs started by one runner share a parent cancellation token so
/// they can be cancelled together.
#[derive(Debug, Clone, Default)]
pub struct ExportRunner {
    root_token: CancellationToken,
}

impl ExportRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a job in the background
    ///
    /// Must be called from within a tokio runtime. Returns as soon as the
    /// worker is spawned; notifications are delivered to `delegate` while
    /// the returned handle is awaited with [`JobHandle::wait`].
    pub fn start(
        &self,
        request: ExportRequest,
        delegate: Arc<dyn ExportDelegate>,
    ) -> Result<JobHandle> {
        let encoder = request.options.build_encoder()?;
        let info = JobInfo::new(request.label, request.options.format());
        let (tx, rx) = mpsc::unbounded_channel();

        let mut job = ExportJob::new(info.clone());
        job.set_delegate(Arc::new(ChannelDelegate::new(tx)))?;

        let token = self.root_token.child_token();
        let mut coordinator = ExportCoordinator::new(job, request.source, encoder, request.sink)
            .with_cancellation(token.clone());

        debug!("Spawning {} export worker for {}", info.format, info.label);
        let worker = tokio::spawn(async move {
            let outcome = coordinator.execute().await;
            (outcome, coordinator.into_sink())
        });

        Ok(JobHandle {
            info,
            delegate,
            events: rx,
            cancel_token: token,
            worker,
        })
    }

    /// Start every request, or none of them
    ///
    /// If one request fails to start, the jobs already started from this
    /// batch are cancelled and awaited, so each of them still delivers its
    /// terminal notification, and the start error is returned.
    pub async fn start_all(
        &self,
        requests: Vec<ExportRequest>,
        delegate: Arc<dyn ExportDelegate>,
    ) -> Result<Vec<JobHandle>> {
        let mut handles = Vec::with_capacity(requests.len());
        for request in requests {
            match self.start(request, Arc::clone(&delegate)) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    warn!(
                        "Failed to start export: {}; cancelling {} started job(s)",
                        e,
                        handles.len()
                    );
                    for handle in handles {
                        handle.cancel();
                        if let Err(err) = handle.wait().await {
                            warn!("Cancelled job ended with error: {}", err);
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(handles)
    }

    /// Request cancellation of every job started by this runner
    pub fn cancel_all(&self) {
        self.root_token.cancel();
    }
}

/// Handle to a job running in the background
pub struct JobHandle {
    info: JobInfo,
    delegate: Arc<dyn ExportDelegate>,
    events: UnboundedReceiver<super::delegate::ExportEvent>,
    cancel_token: CancellationToken,
    worker: JoinHandle<WorkerResult>,
}

impl JobHandle {
    pub fn info(&self) -> &JobInfo {
        &self.info
    }

    /// Request cooperative cancellation
    ///
    /// The worker stops at its next checkpoint (after the batch in flight)
    /// and the job ends in `Failed(Cancelled)`.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// A token that cancels this job when triggered
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Deliver this job's notifications to its delegate on the calling
    /// task, then wait for the worker and return the report
    pub async fn wait(mut self) -> Result<JobReport> {
        let mut terminal_seen = false;
        while let Some(event) = self.events.recv().await {
            event.deliver(self.delegate.as_ref());
            if event.is_terminal() {
                terminal_seen = true;
                break;
            }
        }

        let (result, sink) = self.worker.await.map_err(ExportError::from)?;
        let outcome = result?;
        if !terminal_seen {
            warn!("Job {} ended without a terminal notification", self.info.id);
        }

        Ok(JobReport {
            info: self.info,
            outcome,
            sink,
        })
    }
}
