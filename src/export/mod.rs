//! Export module for delegate-driven export jobs
//!
//! This module provides the export lifecycle and everything needed to run it:
//! - A lifecycle state machine that notifies a delegate on every transition
//! - Streaming row sources so large data sets never sit in memory
//! - Format encoders (CSV, PDF)
//! - Sinks for files and in-memory buffers
//! - Background execution with cooperative cancellation
//!
//! # Architecture
//!
//! 1. **ExportJob**: lifecycle state machine (`NotStarted -> Running ->
//!    WritingData -> Completed | Failed`), performs no I/O
//! 2. **ExportDelegate**: observer notified on each transition
//! 3. **RowSource / RowEncoder / ExportSink**: where rows come from, how
//!    they become bytes, where the bytes go
//!
//! These components are orchestrated by the **ExportCoordinator**, and the
//! **ExportRunner** runs coordinators on background tasks.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rowexport::config::CsvConfig;
//! use rowexport::export::{
//!     ExportRequest, ExportRunner, FormatOptions, LoggingDelegate, MemorySink, MemorySource,
//! };
//!
//! # async fn example() -> rowexport::Result<()> {
//! let runner = ExportRunner::new();
//! let handle = runner.start(
//!     ExportRequest {
//!         label: "memory".into(),
//!         source: Box::new(MemorySource::new(Vec::new(), 100)),
//!         sink: Box::new(MemorySink::new()),
//!         options: FormatOptions::Csv(CsvConfig::default()),
//!     },
//!     Arc::new(LoggingDelegate),
//! )?;
//! let report = handle.wait().await?;
//! println!("{:?}", report.outcome);
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
pub mod delegate;
pub mod encoders;
pub mod job;
pub mod progress;
pub mod runner;
pub mod sink;
pub mod source;

pub use coordinator::ExportCoordinator;
pub use delegate::{ExportDelegate, ExportEvent, LoggingDelegate};
pub use encoders::{CsvEncoder, ExportFormat, FormatOptions, PdfEncoder, RowEncoder};
pub use job::{ExportJob, ExportOutcome, ExportSummary, FailureReason, JobInfo, JobState};
pub use progress::ProgressTracker;
pub use runner::{ExportRequest, ExportRunner, JobHandle, JobReport};
pub use sink::{ExportSink, FileSink, MemorySink};
pub use source::{JsonLinesSource, MemorySource, Row, RowSource};
