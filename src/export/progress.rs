//! Progress display for export jobs
//!
//! [`ProgressTracker`] is an [`ExportDelegate`] that draws one spinner per
//! running job, giving users real-time feedback on export progress.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use uuid::Uuid;

use super::delegate::ExportDelegate;
use super::job::{ExportOutcome, JobInfo};

/// Per-job progress state
struct JobProgress {
    bar: ProgressBar,
    start_time: Instant,
}

/// Progress tracker for export jobs
///
/// Tracks row progress per job and displays a spinner with the row count
/// and export speed. When disabled, it only keeps counts.
pub struct ProgressTracker {
    /// Progress bars (optional, can be disabled)
    bars: Option<MultiProgress>,
    jobs: Mutex<HashMap<Uuid, JobProgress>>,
    /// Last progress value seen per running job
    processed: Mutex<HashMap<Uuid, u64>>,
}

impl ProgressTracker {
    /// Create a new progress tracker
    ///
    /// # Arguments
    /// * `enable_bar` - Whether to display progress bars
    pub fn new(enable_bar: bool) -> Self {
        Self {
            bars: enable_bar.then(MultiProgress::new),
            jobs: Mutex::new(HashMap::new()),
            processed: Mutex::new(HashMap::new()),
        }
    }

    /// Rows processed so far by a running job
    ///
    /// Finished and unknown jobs report 0.
    pub fn processed(&self, job: &Uuid) -> u64 {
        self.processed
            .lock()
            .ok()
            .and_then(|p| p.get(job).copied())
            .unwrap_or(0)
    }

    fn spinner(&self, job: &JobInfo) -> Option<ProgressBar> {
        let bars = self.bars.as_ref()?;
        let bar = bars.add(ProgressBar::new_spinner());
        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner:.green} {prefix} {pos} rows {msg}")
        {
            bar.set_style(style);
        }
        bar.set_prefix(format!("[{}] {}", job.format, job.label));
        bar.enable_steady_tick(Duration::from_millis(100));
        Some(bar)
    }
}

impl ExportDelegate for ProgressTracker {
    fn will_begin(&self, job: &JobInfo) {
        if let Ok(mut processed) = self.processed.lock() {
            processed.insert(job.id, 0);
        }
        if let Some(bar) = self.spinner(job) {
            bar.set_message("reading");
            if let Ok(mut jobs) = self.jobs.lock() {
                jobs.insert(
                    job.id,
                    JobProgress {
                        bar,
                        start_time: Instant::now(),
                    },
                );
            }
        }
    }

    fn progress_updated(&self, job: &JobInfo, count: u64) {
        if let Ok(mut processed) = self.processed.lock() {
            processed.insert(job.id, count);
        }

        let Ok(jobs) = self.jobs.lock() else {
            return;
        };
        if let Some(progress) = jobs.get(&job.id) {
            progress.bar.set_position(count);

            // Calculate and display speed
            let elapsed = progress.start_time.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                let speed = count as f64 / elapsed;
                progress.bar.set_message(format!("({:.0} rows/sec)", speed));
            }
        }
    }

    fn will_begin_writing_data(&self, job: &JobInfo) {
        if let Ok(jobs) = self.jobs.lock() {
            if let Some(progress) = jobs.get(&job.id) {
                progress.bar.set_message("writing");
            }
        }
    }

    fn process_complete(&self, job: &JobInfo, outcome: &ExportOutcome) {
        if let Ok(mut processed) = self.processed.lock() {
            processed.remove(&job.id);
        }
        let Ok(mut jobs) = self.jobs.lock() else {
            return;
        };
        if let Some(progress) = jobs.remove(&job.id) {
            match outcome {
                ExportOutcome::Completed(_) => progress.bar.finish_and_clear(),
                ExportOutcome::Failed(reason) => {
                    progress.bar.abandon_with_message(format!("{reason}"))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::encoders::ExportFormat;
    use crate::export::job::{ExportSummary, FailureReason};

    #[test]
    fn test_progress_tracker_counts_without_bar() {
        let tracker = ProgressTracker::new(false);
        let job = JobInfo::new("out.csv", ExportFormat::Csv);
        tracker.will_begin(&job);
        tracker.progress_updated(&job, 500);
        assert_eq!(tracker.processed(&job.id), 500);
        tracker.process_complete(&job, &ExportOutcome::Completed(ExportSummary::default()));
        assert_eq!(tracker.processed(&job.id), 0);
    }

    #[test]
    fn test_progress_tracker_keeps_jobs_apart() {
        let tracker = ProgressTracker::new(false);
        let csv = JobInfo::new("out.csv", ExportFormat::Csv);
        let pdf = JobInfo::new("out.pdf", ExportFormat::Pdf);
        tracker.will_begin(&csv);
        tracker.will_begin(&pdf);
        tracker.progress_updated(&csv, 10);
        tracker.progress_updated(&pdf, 3);
        tracker.process_complete(&pdf, &ExportOutcome::Failed(FailureReason::Cancelled));

        assert_eq!(tracker.processed(&csv.id), 10);
        assert_eq!(tracker.processed(&pdf.id), 0);
        assert_eq!(tracker.processed.lock().unwrap().len(), 1);
    }
}
