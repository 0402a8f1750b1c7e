//! Progress reporting service
//!
//! Separates progress reporting from the pipeline so that frontends (the CLI's
//! progress bar, plain logging, tests) can observe a run without touching it.

use crate::types::{RunSummary, SkipReason};
use instant::Instant;

/// Stages of a dataset building run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Opening the export and preparing the output directory
    Loading,
    /// Applying the pre-filter and tag query to a record
    Filtering,
    /// Locating, transforming and packaging a matched record
    Processing,
    /// Writing the token database
    Finalizing,
    /// Run completed
    Done,
}

impl PipelineStage {
    /// Get a human-readable description of the stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            PipelineStage::Loading => "Loading export",
            PipelineStage::Filtering => "Filtering records",
            PipelineStage::Processing => "Processing record",
            PipelineStage::Finalizing => "Finalizing dataset",
            PipelineStage::Done => "Done",
        }
    }
}

/// Snapshot of run progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub stage: PipelineStage,
    /// Id of the record being processed, if any
    pub record_id: Option<String>,
    pub records_read: usize,
    pub matched: usize,
    pub succeeded: usize,
    pub skipped: usize,
    /// Elapsed time since the run started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    /// Create a new progress update from the run counters
    #[must_use]
    pub fn new(stage: PipelineStage, summary: &RunSummary, start_time: Instant) -> Self {
        Self {
            stage,
            record_id: None,
            records_read: summary.records_read,
            matched: summary.matched,
            succeeded: summary.succeeded,
            skipped: summary.skipped_total(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        }
    }

    #[must_use]
    pub fn with_record<S: Into<String>>(mut self, record_id: S) -> Self {
        self.record_id = Some(record_id.into());
        self
    }
}

/// Trait for observing a dataset building run
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: &ProgressUpdate);

    /// Report a skipped record
    fn report_skip(&self, record_id: &str, reason: SkipReason, detail: &str) {
        let _ = (record_id, reason, detail);
    }

    /// Report run completion with the final summary
    fn report_completion(&self, summary: &RunSummary);

    /// Report a fatal error
    fn report_error(&self, stage: PipelineStage, error: &str);
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: &ProgressUpdate) {}

    fn report_completion(&self, _summary: &RunSummary) {}

    fn report_error(&self, _stage: PipelineStage, _error: &str) {}
}

/// Reporter that writes progress through the `log` facade
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    ///
    /// # Arguments
    /// * `verbose` - Also log every processed record, not only stage changes
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: &ProgressUpdate) {
        match (&update.record_id, self.verbose) {
            (Some(id), true) => log::info!(
                "{} {} ({} read, {} matched, {} packaged, {}ms elapsed)",
                update.stage.description(),
                id,
                update.records_read,
                update.matched,
                update.succeeded,
                update.elapsed_ms
            ),
            (Some(_), false) => {},
            (None, _) => log::info!("{}", update.stage.description()),
        }
    }

    fn report_skip(&self, record_id: &str, reason: SkipReason, detail: &str) {
        log::warn!("Skipped record {record_id} ({reason}): {detail}");
    }

    fn report_completion(&self, summary: &RunSummary) {
        log::info!(
            "Dataset complete in {}ms: {summary}",
            summary.elapsed.as_millis()
        );
    }

    fn report_error(&self, stage: PipelineStage, error: &str) {
        log::error!("Error during {}: {}", stage.description(), error);
    }
}

/// Progress tracker that manages timing and forwards to a reporter
pub struct ProgressTracker {
    reporter: Box<dyn ProgressReporter>,
    start_time: Instant,
    current_stage: Option<PipelineStage>,
}

impl ProgressTracker {
    /// Create a new progress tracker with the specified reporter
    #[must_use]
    pub fn new(reporter: Box<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current_stage: None,
        }
    }

    /// Create a progress tracker with no-op reporter (for testing/disabled progress)
    #[must_use]
    pub fn no_op() -> Self {
        Self::new(Box::new(NoOpProgressReporter))
    }

    /// Create a progress tracker with console reporter
    #[must_use]
    pub fn console(verbose: bool) -> Self {
        Self::new(Box::new(ConsoleProgressReporter::new(verbose)))
    }

    /// Report entering a stage
    pub fn report_stage(&mut self, stage: PipelineStage, summary: &RunSummary) {
        self.current_stage = Some(stage);
        let update = ProgressUpdate::new(stage, summary, self.start_time);
        self.reporter.report_progress(&update);
    }

    /// Report that a record has been handled
    pub fn report_record(&mut self, record_id: &str, summary: &RunSummary) {
        self.current_stage = Some(PipelineStage::Processing);
        let update = ProgressUpdate::new(PipelineStage::Processing, summary, self.start_time)
            .with_record(record_id);
        self.reporter.report_progress(&update);
    }

    pub fn report_skip(&self, record_id: &str, reason: SkipReason, detail: &str) {
        self.reporter.report_skip(record_id, reason, detail);
    }

    pub fn report_completion(&mut self, summary: &RunSummary) {
        self.current_stage = Some(PipelineStage::Done);
        self.reporter.report_completion(summary);
    }

    /// Report a fatal error against the current stage
    pub fn report_error(&self, error: &str) {
        let stage = self.current_stage.unwrap_or(PipelineStage::Loading);
        self.reporter.report_error(stage, error);
    }

    /// Get the elapsed time since tracking started
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    #[must_use]
    pub fn current_stage(&self) -> Option<PipelineStage> {
        self.current_stage
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::no_op()
    }
}
