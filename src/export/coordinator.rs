//! Export coordinator for orchestrating export operations
//!
//! This module brings together a row source, a format encoder and a sink,
//! and advances an [`ExportJob`] through its lifecycle while rows flow
//! between them.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ExportError, Result};

use super::encoders::RowEncoder;
use super::job::{ExportJob, ExportOutcome, ExportSummary, FailureReason, JobState};
use super::sink::ExportSink;
use super::source::{Row, RowSource};

/// Coordinator for a single export
///
/// Holds the job together with the source, encoder and sink bound to it.
pub struct ExportCoordinator {
    /// Lifecycle state machine
    job: ExportJob,
    /// Source of rows
    source: Box<dyn RowSource>,
    /// Encoder for the output format
    encoder: Box<dyn RowEncoder>,
    /// Destination of encoded bytes
    sink: Box<dyn ExportSink>,
    /// Cancellation token for aborting export
    cancel_token: Option<CancellationToken>,
    /// Set once `close` has been called on the sink
    sink_closed: bool,
}

impl ExportCoordinator {
    /// Create a new export coordinator
    pub fn new(
        job: ExportJob,
        source: Box<dyn RowSource>,
        encoder: Box<dyn RowEncoder>,
        sink: Box<dyn ExportSink>,
    ) -> Self {
        Self {
            job,
            source,
            encoder,
            sink,
            cancel_token: None,
            sink_closed: false,
        }
    }

    /// Set cancellation token for this export operation
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn job(&self) -> &ExportJob {
        &self.job
    }

    /// Give the sink back to its owner once the export is over
    pub fn into_sink(self) -> Box<dyn ExportSink> {
        self.sink
    }

    /// Execute the export operation
    ///
    /// 1. Start the job and fetch the first batch
    /// 2. Begin writing data
    /// 3. Encode and write each batch, reporting progress
    /// 4. Finish the encoding, flush and close the sink
    /// 5. Complete the job
    ///
    /// Source, encoding and sink failures as well as cancellation end the
    /// job in `Failed` and are returned as the outcome. An `Err` means the
    /// job could not be driven at all (it was already started).
    pub async fn execute(&mut self) -> Result<ExportOutcome> {
        let start_time = Instant::now();
        let label = self.job.info().label.clone();

        self.job.start()?;
        info!("Starting {} export to {}", self.job.info().format, label);

        let mut pending = match self.source.next_batch().await {
            Ok(batch) => batch,
            Err(e) => return self.abort(source_failure(e)).await,
        };

        if self.is_cancelled() {
            return self.abort(FailureReason::Cancelled).await;
        }

        self.job.begin_writing_data()?;

        let mut exported = 0u64;
        let mut batch_count = 0u32;

        while let Some(rows) = pending.take() {
            debug!("Writing batch #{} of {} rows", batch_count + 1, rows.len());

            if let Err(reason) = self.write_rows(&rows).await {
                return self.abort(reason).await;
            }

            exported += rows.len() as u64;
            self.job.report_progress(exported)?;
            batch_count += 1;

            // Log progress periodically
            if batch_count % 10 == 0 {
                info!(
                    "Progress: {} rows exported to {} ({} batches)",
                    exported, label, batch_count
                );
            }

            // Checkpoint: only between batches
            if self.is_cancelled() {
                info!("Export to {} cancelled after {} rows", label, exported);
                return self.abort(FailureReason::Cancelled).await;
            }

            pending = match self.source.next_batch().await {
                Ok(batch) => batch,
                Err(e) => return self.abort(source_failure(e)).await,
            };
        }

        if let Err(reason) = self.finish_output().await {
            return self.abort(reason).await;
        }

        if let Err(e) = self.source.close().await {
            warn!("Failed to close source for {}: {}", label, e);
        }

        let summary = ExportSummary {
            rows: exported,
            bytes_written: self.sink.bytes_written(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        };

        info!(
            "Export completed: {} rows, {} bytes, {} ms",
            summary.rows, summary.bytes_written, summary.elapsed_ms
        );

        self.job.complete(summary.clone())?;
        Ok(ExportOutcome::Completed(summary))
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_token
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }

    async fn write_rows(&mut self, rows: &[Row]) -> std::result::Result<(), FailureReason> {
        let bytes = self
            .encoder
            .encode_batch(rows)
            .map_err(|e| FailureReason::Encode(e.to_string()))?;
        if !bytes.is_empty() {
            self.sink.write(&bytes).await.map_err(|e| FailureReason::from(&e))?;
        }
        Ok(())
    }

    async fn finish_output(&mut self) -> std::result::Result<(), FailureReason> {
        let trailer = self
            .encoder
            .finish()
            .map_err(|e| FailureReason::Encode(e.to_string()))?;
        if !trailer.is_empty() {
            self.sink.write(&trailer).await.map_err(|e| FailureReason::from(&e))?;
        }
        self.sink.flush().await.map_err(|e| FailureReason::from(&e))?;
        self.sink_closed = true;
        self.sink.close().await.map_err(|e| FailureReason::from(&e))
    }

    /// Release resources and move the job to `Failed(reason)`
    async fn abort(&mut self, reason: FailureReason) -> Result<ExportOutcome> {
        // The sink is only touched once data writing has begun, and closed once
        if self.job.state() == JobState::WritingData && !self.sink_closed {
            self.sink_closed = true;
            if let Err(e) = self.sink.flush().await {
                debug!("Flush during abort failed: {}", e);
            }
            if let Err(e) = self.sink.close().await {
                debug!("Close during abort failed: {}", e);
            }
        }
        if let Err(e) = self.source.close().await {
            debug!("Closing source during abort failed: {}", e);
        }

        if reason.is_cancelled() {
            self.job.cancel();
        } else {
            warn!("Export to {} failed: {}", self.job.info().label, reason);
            self.job.fail(reason.clone())?;
        }
        Ok(ExportOutcome::Failed(reason))
    }
}

fn source_failure(err: ExportError) -> FailureReason {
    match err {
        ExportError::Io(e) => FailureReason::from(&e),
        ExportError::Source(e) => FailureReason::Source(e.to_string()),
        other => FailureReason::Source(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CsvConfig, PdfConfig};
    use crate::error::SourceError;
    use crate::export::delegate::ExportDelegate;
    use crate::export::encoders::{CsvEncoder, ExportFormat, PdfEncoder};
    use crate::export::job::JobInfo;
    use crate::export::sink::MemorySink;
    use crate::export::source::MemorySource;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl ExportDelegate for Recorder {
        fn will_begin(&self, _job: &JobInfo) {
            self.events.lock().unwrap().push("begin".into());
        }

        fn progress_updated(&self, _job: &JobInfo, progress: u64) {
            self.events.lock().unwrap().push(format!("progress {progress}"));
        }

        fn will_begin_writing_data(&self, _job: &JobInfo) {
            self.events.lock().unwrap().push("writing".into());
        }

        fn process_complete(&self, _job: &JobInfo, outcome: &ExportOutcome) {
            let text = match outcome {
                ExportOutcome::Completed(s) => format!("completed {}", s.rows),
                ExportOutcome::Failed(r) => format!("failed {r}"),
            };
            self.events.lock().unwrap().push(text);
        }
    }

    // Source whose second batch fails
    struct FlakySource {
        calls: usize,
    }

    #[async_trait]
    impl RowSource for FlakySource {
        async fn next_batch(&mut self) -> Result<Option<Vec<Row>>> {
            self.calls += 1;
            if self.calls == 1 {
                Ok(Some(rows(2)))
            } else {
                Err(SourceError::Read("connection reset".into()).into())
            }
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    // Source that trips a cancellation token after serving a number of batches
    struct CancellingSource {
        inner: MemorySource,
        token: CancellationToken,
        cancel_after: usize,
        served: usize,
    }

    #[async_trait]
    impl RowSource for CancellingSource {
        async fn next_batch(&mut self) -> Result<Option<Vec<Row>>> {
            let batch = self.inner.next_batch().await?;
            self.served += 1;
            if self.served == self.cancel_after {
                self.token.cancel();
            }
            Ok(batch)
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    // Memory sink that records flush/close calls and can fail on close
    struct TrackedSink {
        inner: MemorySink,
        calls: Arc<Mutex<Vec<&'static str>>>,
        fail_close: bool,
    }

    impl TrackedSink {
        fn new(fail_close: bool) -> (Self, Arc<Mutex<Vec<&'static str>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let sink = Self {
                inner: MemorySink::new(),
                calls: Arc::clone(&calls),
                fail_close,
            };
            (sink, calls)
        }
    }

    #[async_trait]
    impl ExportSink for TrackedSink {
        async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
            self.inner.write(bytes).await
        }

        async fn flush(&mut self) -> std::io::Result<()> {
            self.calls.lock().unwrap().push("flush");
            self.inner.flush().await
        }

        async fn close(&mut self) -> std::io::Result<()> {
            self.calls.lock().unwrap().push("close");
            if self.fail_close {
                return Err(std::io::Error::other("device gone"));
            }
            self.inner.close().await
        }

        fn bytes_written(&self) -> u64 {
            self.inner.bytes_written()
        }
    }

    fn rows(n: usize) -> Vec<Row> {
        (0..n)
            .map(|i| json!({ "id": i }).as_object().cloned().unwrap())
            .collect()
    }

    fn csv_coordinator(
        source: Box<dyn RowSource>,
        sink: MemorySink,
    ) -> (ExportCoordinator, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let job =
            ExportJob::with_delegate(JobInfo::new("memory", ExportFormat::Csv), recorder.clone());
        let encoder = Box::new(CsvEncoder::new(CsvConfig::default()).unwrap());
        (
            ExportCoordinator::new(job, source, encoder, Box::new(sink)),
            recorder,
        )
    }

    #[tokio::test]
    async fn test_coordinator_basic() {
        let sink = MemorySink::new();
        let buffer = sink.buffer();
        let (mut coordinator, recorder) =
            csv_coordinator(Box::new(MemorySource::new(rows(3), 2)), sink);

        let outcome = coordinator.execute().await.unwrap();
        let ExportOutcome::Completed(summary) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.bytes_written, 9);
        assert_eq!(&*buffer.lock().unwrap(), b"id\n0\n1\n2\n");
        assert_eq!(
            recorder.events(),
            vec!["begin", "writing", "progress 2", "progress 3", "completed 3"]
        );
    }

    #[tokio::test]
    async fn test_coordinator_empty_source() {
        let (mut coordinator, recorder) =
            csv_coordinator(Box::new(MemorySource::new(Vec::new(), 10)), MemorySink::new());

        let outcome = coordinator.execute().await.unwrap();
        assert!(outcome.is_completed());
        assert_eq!(recorder.events(), vec!["begin", "writing", "completed 0"]);
    }

    #[tokio::test]
    async fn test_coordinator_source_failure() {
        let (mut coordinator, recorder) =
            csv_coordinator(Box::new(FlakySource { calls: 0 }), MemorySink::new());

        let outcome = coordinator.execute().await.unwrap();
        assert!(matches!(outcome, ExportOutcome::Failed(FailureReason::Source(_))));
        let events = recorder.events();
        assert_eq!(events.len(), 4);
        assert!(events[3].starts_with("failed source error"));
        assert_eq!(coordinator.job().state(), JobState::Failed);
    }

    #[tokio::test]
    async fn test_coordinator_sink_failure() {
        let (mut coordinator, recorder) =
            csv_coordinator(Box::new(MemorySource::new(rows(100), 10)), MemorySink::with_limit(16));

        let outcome = coordinator.execute().await.unwrap();
        assert!(matches!(
            outcome,
            ExportOutcome::Failed(FailureReason::Io { kind: std::io::ErrorKind::WriteZero, .. })
        ));
        let events = recorder.events();
        let terminal = events.iter().filter(|e| e.starts_with("failed")).count();
        assert_eq!(terminal, 1);
        assert!(events.last().unwrap().starts_with("failed I/O error"));
    }

    #[tokio::test]
    async fn test_coordinator_cancelled_before_writing() {
        let token = CancellationToken::new();
        token.cancel();
        let (coordinator, recorder) =
            csv_coordinator(Box::new(MemorySource::new(rows(5), 2)), MemorySink::new());
        let mut coordinator = coordinator.with_cancellation(token);

        let outcome = coordinator.execute().await.unwrap();
        assert!(outcome.is_cancelled());
        assert_eq!(recorder.events(), vec!["begin", "failed cancelled"]);
    }

    #[tokio::test]
    async fn test_coordinator_cancelled_between_batches() {
        let token = CancellationToken::new();
        let source = CancellingSource {
            inner: MemorySource::new(rows(50), 10),
            token: token.clone(),
            cancel_after: 2,
            served: 0,
        };
        let (sink, calls) = TrackedSink::new(false);
        let recorder = Arc::new(Recorder::default());
        let job =
            ExportJob::with_delegate(JobInfo::new("memory", ExportFormat::Csv), recorder.clone());
        let encoder = Box::new(CsvEncoder::new(CsvConfig::default()).unwrap());
        let mut coordinator =
            ExportCoordinator::new(job, Box::new(source), encoder, Box::new(sink))
                .with_cancellation(token);

        let outcome = coordinator.execute().await.unwrap();
        assert_eq!(outcome, ExportOutcome::Failed(FailureReason::Cancelled));
        assert_eq!(
            recorder.events(),
            vec!["begin", "writing", "progress 10", "progress 20", "failed cancelled"]
        );
        assert_eq!(*calls.lock().unwrap(), vec!["flush", "close"]);
        assert!(coordinator.job().is_cancelled());

        // Both batches written before the checkpoint reach the sink
        let sink = coordinator.into_sink();
        assert_eq!(sink.bytes_written(), 3 + 10 * 2 + 10 * 3);
    }

    #[tokio::test]
    async fn test_coordinator_close_failure_closes_once() {
        let (sink, calls) = TrackedSink::new(true);
        let (mut coordinator, recorder) = {
            let recorder = Arc::new(Recorder::default());
            let job = ExportJob::with_delegate(
                JobInfo::new("memory", ExportFormat::Csv),
                recorder.clone(),
            );
            let encoder = Box::new(CsvEncoder::new(CsvConfig::default()).unwrap());
            let source = Box::new(MemorySource::new(rows(3), 2));
            (ExportCoordinator::new(job, source, encoder, Box::new(sink)), recorder)
        };

        let outcome = coordinator.execute().await.unwrap();
        assert!(matches!(
            outcome,
            ExportOutcome::Failed(FailureReason::Io { kind: std::io::ErrorKind::Other, .. })
        ));
        assert_eq!(*calls.lock().unwrap(), vec!["flush", "close"]);
        let terminal = recorder
            .events()
            .iter()
            .filter(|e| e.starts_with("failed"))
            .count();
        assert_eq!(terminal, 1);
    }

    #[tokio::test]
    async fn test_coordinator_pdf_writes_single_document() {
        let sink = MemorySink::new();
        let buffer = sink.buffer();
        let job = ExportJob::new(JobInfo::new("report", ExportFormat::Pdf));
        let encoder = Box::new(PdfEncoder::new(PdfConfig::default()).unwrap());
        let mut coordinator = ExportCoordinator::new(
            job,
            Box::new(MemorySource::new(rows(120), 50)),
            encoder,
            Box::new(sink),
        );

        let outcome = coordinator.execute().await.unwrap();
        assert!(outcome.is_completed());
        let bytes = buffer.lock().unwrap().clone();
        assert!(bytes.starts_with(b"%PDF-1.4"));
        assert!(bytes.ends_with(b"%%EOF\n"));
    }

    #[tokio::test]
    async fn test_coordinator_cannot_run_twice() {
        let (mut coordinator, _) =
            csv_coordinator(Box::new(MemorySource::new(rows(1), 1)), MemorySink::new());
        coordinator.execute().await.unwrap();
        assert!(matches!(
            coordinator.execute().await,
            Err(ExportError::Lifecycle(_))
        ));
    }
}
