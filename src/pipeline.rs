//! Pipeline driver
//!
//! Streams records from the export through the pre-filter and the tag query, then
//! locates, transforms and packages every match, one record at a time. Per-record
//! failures are counted and skipped; everything else stops the run.
//!
//! ```text
//! Idle -> Loading -> Filtering <-> Processing -> Done
//!            \            \            /
//!             `------------`----------`---> Failed
//! ```

use crate::{
    config::PipelineConfig,
    error::{DatasetError, Result},
    export::ExportSource,
    packager::DatasetPackager,
    query::TagQuery,
    services::{ImageIOService, ImageLocator, PipelineStage, ProgressTracker},
    tracing_config::{events, spans},
    transform::ImageTransformer,
    types::{Record, RunSummary, SkipReason},
};
use instant::Instant;
use std::collections::HashSet;
use std::path::PathBuf;

/// Lifecycle state of a [`Pipeline`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Loading,
    Filtering,
    Processing,
    Done,
    Failed,
}

impl RunState {
    /// Whether the run has finished, successfully or not
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Skip reason for a record-local error
fn skip_reason(error: &DatasetError) -> Option<SkipReason> {
    match error {
        DatasetError::ImageNotFound { .. } => Some(SkipReason::ImageNotFound),
        DatasetError::ImageUnreadable { .. } => Some(SkipReason::ImageUnreadable),
        DatasetError::UnsupportedFormat { .. } => Some(SkipReason::UnsupportedFormat),
        _ => None,
    }
}

/// All state of one dataset building run
pub struct Pipeline {
    config: PipelineConfig,
    query: TagQuery,
    transformer: ImageTransformer,
    locator: Option<ImageLocator>,
    packager: Option<DatasetPackager>,
    progress: ProgressTracker,
    seen_ids: HashSet<String>,
    state: RunState,
    summary: RunSummary,
}

impl Pipeline {
    /// Create a pipeline, validating the configuration and parsing the query
    ///
    /// Nothing is read or written until [`Pipeline::run`].
    ///
    /// # Errors
    /// - `DatasetError::InvalidQuerySyntax` for a malformed query
    /// - `DatasetError::InvalidConfig` for invalid parameters
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let query = config.tag_query()?;
        let transformer = ImageTransformer::new(config.transform.clone())?;

        Ok(Self {
            config,
            query,
            transformer,
            locator: None,
            packager: None,
            progress: ProgressTracker::no_op(),
            seen_ids: HashSet::new(),
            state: RunState::Idle,
            summary: RunSummary::default(),
        })
    }

    /// Attach a progress tracker
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressTracker) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn query(&self) -> &TagQuery {
        &self.query
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Counters so far; complete once the run is terminal
    #[must_use]
    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Execute the run
    ///
    /// The summary is available through [`Pipeline::summary`] whether or not
    /// the run succeeds.
    ///
    /// # Errors
    /// Any fatal error: unreadable export, output write failure, or an I/O error
    /// while reading. The pipeline is `Failed` afterwards.
    pub fn run(&mut self) -> Result<RunSummary> {
        if self.state != RunState::Idle {
            return Err(DatasetError::invalid_config("a pipeline can only run once"));
        }

        let span = spans::run(&self.config.export, &self.config.output_dir, &self.config.query);
        let _enter = span.enter();
        tracing::info!(query = %self.query, "Starting dataset run");

        let start = Instant::now();
        let result = self.execute();
        self.summary.elapsed = start.elapsed();

        match result {
            Ok(()) => {
                self.state = RunState::Done;
                self.progress.report_completion(&self.summary);
                tracing::info!("{}", self.summary);
                Ok(self.summary.clone())
            },
            Err(e) => {
                self.state = RunState::Failed;
                self.progress.report_error(&e.to_string());
                events::error_with_context(&e, "dataset run aborted");
                Err(e)
            },
        }
    }

    fn execute(&mut self) -> Result<()> {
        self.state = RunState::Loading;
        self.progress.report_stage(PipelineStage::Loading, &self.summary);

        let source = ExportSource::from_path(&self.config.export)?;
        let reader = source.open()?;

        let roots = if self.config.image_roots.is_empty() {
            // Without explicit roots, images are looked up next to the export
            source
                .path()
                .parent()
                .map(|parent| vec![parent.to_path_buf()])
                .unwrap_or_default()
        } else {
            self.config.image_roots.clone()
        };
        let cache_dir = self
            .config
            .cache_dir
            .clone()
            .or_else(ImageLocator::default_cache_dir);
        let mut locator = ImageLocator::new(roots, cache_dir);
        if self.config.index_images {
            locator.build_index();
        }
        self.locator = Some(locator);

        self.packager = Some(DatasetPackager::create(
            &self.config.output_dir,
            self.config.caption.clone(),
            self.config.store_metadata,
        )?);

        self.state = RunState::Filtering;
        self.progress.report_stage(PipelineStage::Filtering, &self.summary);

        for item in reader {
            self.summary.records_read += 1;

            let record = match item {
                Ok(record) => record,
                Err(e) if e.is_record_local() => {
                    self.summary.malformed += 1;
                    tracing::warn!(error = %e, "Skipping malformed record");
                    continue;
                },
                Err(e) => return Err(e),
            };

            if !self.accepts(&record) {
                self.summary.filtered_out += 1;
                continue;
            }
            self.summary.matched += 1;

            // Output files are named by id, so ids differing only in case collide
            // on case-insensitive filesystems
            if !self.seen_ids.insert(record.id.to_ascii_lowercase()) {
                self.skip(&record, SkipReason::DuplicateId, &"already processed");
                continue;
            }

            self.state = RunState::Processing;
            self.process_record(&record)?;
            self.state = RunState::Filtering;

            if self
                .config
                .limit
                .is_some_and(|limit| self.summary.succeeded >= limit)
            {
                tracing::info!(limit = ?self.config.limit, "Sample limit reached");
                break;
            }
        }

        if self.config.build_tokendb {
            self.progress.report_stage(PipelineStage::Finalizing, &self.summary);
            if let Some(packager) = &self.packager {
                packager.write_token_db()?;
            }
        }

        Ok(())
    }

    fn accepts(&self, record: &Record) -> bool {
        if let Err(rejection) = self.config.filter.check(record) {
            tracing::trace!(record_id = %record.id, %rejection, "Rejected by pre-filter");
            return false;
        }
        let matched = self.query.matches(record);
        if !matched {
            tracing::trace!(record_id = %record.id, "Rejected by query");
        }
        matched
    }

    fn skip(&mut self, record: &Record, reason: SkipReason, detail: &dyn std::fmt::Display) {
        self.summary.record_skip(reason);
        events::record_skipped(&record.id, reason, detail);
        self.progress
            .report_skip(&record.id, reason, &detail.to_string());
    }

    /// Locate, decode and transform a record's image
    fn prepare(&self, record: &Record) -> Result<(PathBuf, Vec<crate::transform::EncodedImage>)> {
        let locator = self
            .locator
            .as_ref()
            .ok_or_else(|| DatasetError::invalid_config("image locator not initialised"))?;

        let path = locator.locate(record)?;
        let image = ImageIOService::load_image(&path)?;

        let span = spans::transform(&path, (image.width(), image.height()));
        let _enter = span.enter();
        let start = Instant::now();
        let images = self.transformer.process(image, &path)?;
        events::performance_metric("transform", start.elapsed().as_millis() as u64);

        Ok((path, images))
    }

    fn process_record(&mut self, record: &Record) -> Result<()> {
        let span = spans::record(&record.id);
        let _enter = span.enter();

        let (path, images) = match self.prepare(record) {
            Ok(prepared) => prepared,
            Err(e) => {
                return match skip_reason(&e) {
                    Some(reason) => {
                        self.skip(record, reason, &e);
                        Ok(())
                    },
                    None => Err(e),
                };
            },
        };

        let extension = self.transformer.extension();
        let packager = self
            .packager
            .as_mut()
            .ok_or_else(|| DatasetError::invalid_config("packager not initialised"))?;
        let entries = packager.package(record, &images, extension)?;

        tracing::debug!(
            record_id = %record.id,
            source = %path.display(),
            entries = entries.len(),
            "Packaged record"
        );
        self.summary.succeeded += 1;
        self.summary.entries_written = packager.entries_written();
        self.progress.report_record(&record.id, &self.summary);
        Ok(())
    }
}
