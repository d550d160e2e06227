//! Row Export Library
//!
//! This library provides delegate-driven export jobs that turn streams of
//! rows into CSV or PDF output. Each job moves through a small lifecycle
//! (`NotStarted -> Running -> WritingData -> Completed | Failed`) and
//! notifies an observer on every transition.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `error`: Error types and handling
//! - `export`: Export jobs, delegates, sources, encoders and sinks
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rowexport::config::Config;
//! use rowexport::export::{
//!     ExportRequest, ExportRunner, FileSink, FormatOptions, JsonLinesSource, LoggingDelegate,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let source = JsonLinesSource::open("rows.jsonl", config.export.batch_size).await?;
//!     let sink = FileSink::create("rows.csv").await?;
//!
//!     let runner = ExportRunner::new();
//!     let handle = runner.start(
//!         ExportRequest {
//!             label: "rows.csv".to_string(),
//!             source: Box::new(source),
//!             sink: Box::new(sink),
//!             options: FormatOptions::Csv(config.csv),
//!         },
//!         Arc::new(LoggingDelegate),
//!     )?;
//!
//!     let report = handle.wait().await?;
//!     println!("{:?}", report.outcome);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod export;

// Re-export commonly used types
pub use config::Config;
pub use error::{ExportError, Result};
pub use export::{
    ExportDelegate, ExportJob, ExportOutcome, ExportRunner, ExportSink, FailureReason, JobInfo,
    JobState,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
///
/// # Returns
/// * `&str` - Version string
pub fn version() -> &'static str {
    VERSION
}
