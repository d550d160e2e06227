//! Export job lifecycle through the public API

use std::sync::{Arc, Mutex};

use rowexport::config::CsvConfig;
use rowexport::error::{ExportError, LifecycleError};
use rowexport::export::{
    ExportDelegate, ExportEvent, ExportFormat, ExportJob, ExportOutcome, ExportRequest,
    ExportRunner, ExportSummary, FailureReason, FormatOptions, JobInfo, JobState, MemorySink,
    MemorySource, Row,
};
use serde_json::json;

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<ExportEvent>>,
}

impl Recorder {
    fn names(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|event| match event {
                ExportEvent::WillBegin(_) => "will_begin".to_string(),
                ExportEvent::ProgressUpdated(_, p) => format!("progress({p})"),
                ExportEvent::WillBeginWritingData(_) => "will_begin_writing_data".to_string(),
                ExportEvent::ProcessComplete(_, ExportOutcome::Completed(_)) => {
                    "complete".to_string()
                }
                ExportEvent::ProcessComplete(_, ExportOutcome::Failed(reason)) => {
                    format!("failed({reason})")
                }
            })
            .collect()
    }
}

impl ExportDelegate for Recorder {
    fn will_begin(&self, job: &JobInfo) {
        self.events.lock().unwrap().push(ExportEvent::WillBegin(job.clone()));
    }

    fn progress_updated(&self, job: &JobInfo, progress: u64) {
        self.events
            .lock()
            .unwrap()
            .push(ExportEvent::ProgressUpdated(job.clone(), progress));
    }

    fn will_begin_writing_data(&self, job: &JobInfo) {
        self.events
            .lock()
            .unwrap()
            .push(ExportEvent::WillBeginWritingData(job.clone()));
    }

    fn process_complete(&self, job: &JobInfo, outcome: &ExportOutcome) {
        self.events
            .lock()
            .unwrap()
            .push(ExportEvent::ProcessComplete(job.clone(), outcome.clone()));
    }
}

fn job(recorder: &Arc<Recorder>) -> ExportJob {
    ExportJob::with_delegate(JobInfo::new("report.csv", ExportFormat::Csv), recorder.clone())
}

#[test]
fn test_progress_then_complete_sequence() {
    let recorder = Arc::new(Recorder::default());
    let mut job = job(&recorder);

    job.start().unwrap();
    job.report_progress(10).unwrap();
    job.report_progress(25).unwrap();
    job.begin_writing_data().unwrap();
    job.complete(ExportSummary {
        rows: 25,
        ..ExportSummary::default()
    })
    .unwrap();

    assert_eq!(
        recorder.names(),
        vec![
            "will_begin",
            "progress(10)",
            "progress(25)",
            "will_begin_writing_data",
            "complete"
        ]
    );
    assert_eq!(job.state(), JobState::Completed);
}

#[test]
fn test_cancel_after_writing_begins() {
    let recorder = Arc::new(Recorder::default());
    let mut job = job(&recorder);

    job.start().unwrap();
    job.begin_writing_data().unwrap();
    assert!(job.cancel());
    assert!(job.report_progress(5).is_err());

    assert_eq!(
        recorder.names(),
        vec!["will_begin", "will_begin_writing_data", "failed(cancelled)"]
    );
    assert_eq!(
        job.outcome(),
        Some(&ExportOutcome::Failed(FailureReason::Cancelled))
    );
    assert!(job.is_cancelled());
}

#[test]
fn test_second_start_is_misuse() {
    let recorder = Arc::new(Recorder::default());
    let mut job = job(&recorder);

    job.start().unwrap();
    let err = job.start().unwrap_err();
    assert!(matches!(
        err,
        ExportError::Lifecycle(LifecycleError::InvalidStateTransition {
            from: JobState::Running,
            ..
        })
    ));
    assert_eq!(recorder.names(), vec!["will_begin"]);
}

#[tokio::test]
async fn test_runner_exports_rows_to_memory() {
    let rows: Vec<Row> = (1..=3)
        .map(|i| json!({ "id": i, "name": format!("row {i}") }).as_object().cloned().unwrap())
        .collect();
    let sink = MemorySink::new();
    let buffer = sink.buffer();
    let recorder = Arc::new(Recorder::default());

    let handle = ExportRunner::new()
        .start(
            ExportRequest {
                label: "rows.csv".into(),
                source: Box::new(MemorySource::new(rows, 2)),
                sink: Box::new(sink),
                options: FormatOptions::Csv(CsvConfig::default()),
            },
            recorder.clone(),
        )
        .unwrap();
    let report = handle.wait().await.unwrap();

    assert!(report.outcome.is_completed());
    assert_eq!(
        String::from_utf8(buffer.lock().unwrap().clone()).unwrap(),
        "id,name\n1,row 1\n2,row 2\n3,row 3\n"
    );
    assert_eq!(
        recorder.names(),
        vec![
            "will_begin",
            "will_begin_writing_data",
            "progress(2)",
            "progress(3)",
            "complete"
        ]
    );
}
