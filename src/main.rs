//! rowexport - command-line export tool
//!
//! Reads rows from a JSON Lines file and exports them to CSV and/or PDF.
//! Every output file is its own export job running on its own task.
//!
//! # Usage
//!
//! ```bash
//! rowexport orders.jsonl -o orders.csv -o orders.pdf --title "Orders"
//! ```

use std::sync::Arc;

use tabled::settings::Style;
use tabled::{Table, Tabled};
use tracing::Level;

use rowexport::cli::CliInterface;
use rowexport::error::Result;
use rowexport::export::{
    ExportDelegate, ExportOutcome, ExportRequest, ExportRunner, FileSink, JobHandle, JobReport,
    JsonLinesSource, ProgressTracker,
};

/// Exit code when the user cancelled with Ctrl+C
const EXIT_CANCELLED: i32 = 130;

/// Application entry point
#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Handle subcommands or run the exports
///
/// # Returns
/// * `Result<i32>` - Process exit code or error
async fn run() -> Result<i32> {
    let cli = CliInterface::new()?;

    initialize_logging(&cli);

    if cli.handle_subcommand()? {
        return Ok(0);
    }

    run_exports(&cli).await
}

/// Start one job per output, wait for all of them and print a summary
async fn run_exports(cli: &CliInterface) -> Result<i32> {
    let input = cli.input()?;
    let plans = cli.output_plans()?;
    let config = cli.config();

    let runner = ExportRunner::new();
    let tracker: Arc<dyn ExportDelegate> =
        Arc::new(ProgressTracker::new(config.export.progress_bar));

    // Open every input and output before any job starts
    let mut requests = Vec::with_capacity(plans.len());
    for plan in plans {
        // Each job reads the input independently
        let source = JsonLinesSource::open(input, config.export.batch_size).await?;
        let sink = FileSink::create(&plan.path).await?;
        requests.push(ExportRequest {
            label: plan.path.display().to_string(),
            source: Box::new(source),
            sink: Box::new(sink),
            options: plan.options,
        });
    }
    let handles = runner.start_all(requests, tracker).await?;

    // Ctrl+C cancels every running job
    let ctrl_c_runner = runner.clone();
    let ctrl_c_handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => ctrl_c_runner.cancel_all(),
            Err(err) => eprintln!("Failed to listen for Ctrl+C: {}", err),
        }
    });

    let reports = futures::future::join_all(handles.into_iter().map(JobHandle::wait)).await;
    ctrl_c_handle.abort();

    let mut rows = Vec::with_capacity(reports.len());
    let mut exit_code = 0;
    for report in reports {
        match report {
            Ok(report) => {
                if report.outcome.is_cancelled() {
                    exit_code = EXIT_CANCELLED;
                } else if !report.outcome.is_completed() && exit_code == 0 {
                    exit_code = 1;
                }
                rows.push(ResultRow::from(&report));
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                if exit_code == 0 {
                    exit_code = 1;
                }
            }
        }
    }

    if !cli.args().quiet && !rows.is_empty() {
        println!("{}", Table::new(rows).with(Style::rounded()));
    }

    Ok(exit_code)
}

/// One line of the end-of-run summary table
#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Output")]
    output: String,
    #[tabled(rename = "Format")]
    format: String,
    #[tabled(rename = "Rows")]
    rows: String,
    #[tabled(rename = "Bytes")]
    bytes: String,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Status")]
    status: String,
}

impl From<&JobReport> for ResultRow {
    fn from(report: &JobReport) -> Self {
        let (rows, time, status) = match &report.outcome {
            ExportOutcome::Completed(summary) => (
                summary.rows.to_string(),
                format!("{} ms", summary.elapsed_ms),
                "completed".to_string(),
            ),
            ExportOutcome::Failed(reason) => ("-".to_string(), "-".to_string(), reason.to_string()),
        };
        Self {
            output: report.info.label.clone(),
            format: report.info.format.to_string(),
            rows,
            bytes: report.sink.bytes_written().to_string(),
            time,
            status,
        }
    }
}

/// Initialize logging system based on verbosity level
///
/// # Arguments
/// * `cli` - CLI interface with verbosity settings
fn initialize_logging(cli: &CliInterface) {
    let level: Level = cli.config().logging.level.to_tracing_level();

    // Build subscriber with level filter; stdout is kept for results
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    // Configure timestamps
    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
