#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # e621-noapi
//!
//! Builds image/caption training datasets from offline e621-style metadata
//! exports, without talking to any server.
//!
//! A run streams records out of an export (JSON Lines or CSV, optionally gzip
//! compressed), keeps the ones matching a tag query, locates each record's image
//! on disk, crops and resizes it to a fixed resolution, and writes the image next
//! to a caption file listing the record's tags.
//!
//! ## Features
//!
//! - **Export Formats**: JSON Lines, CSV and e621's `posts-YYYY-MM-DD.csv.gz` dumps
//! - **Tag Queries**: `AND`/`OR`/`NOT` with grouping, plus e621 search syntax
//!   (`-tag`, `~tag`, `rating:s`, `score:>=100`)
//! - **Crop Strategies**: a single centred crop or several crops at different scales
//! - **Output Formats**: PNG, JPEG, WebP and TIFF
//! - **Dataset Extras**: JSON metadata sidecars, a manifest and a tag frequency database
//! - **CLI Integration**: Optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use e621_noapi::{build_dataset, PipelineConfig};
//!
//! # fn example() -> e621_noapi::Result<()> {
//! let config = PipelineConfig::builder()
//!     .export("db_export/posts-2024-05-01.csv.gz")
//!     .output_dir("dataset")
//!     .image_root("images")
//!     .query("wolf ~solo ~duo -comic rating:s")
//!     .target_size(768, 768)
//!     .build()?;
//!
//! let summary = build_dataset(config)?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Library vs CLI Usage
//!
//! - **Library Usage**: the [`Pipeline`] and every stage it drives are public
//! - **CLI Usage**: the `e621-noapi` binary, built with the `cli` feature
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line interface, progress spinner and log subscriber
//! - `webp-support` (default): WebP output
//! - `tracing-json`: JSON log output
//! - `tracing-files`: log file output
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! e621-noapi = { version = "0.1", default-features = false }
//! ```

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod packager;
pub mod pipeline;
pub mod query;
pub mod services;
pub mod tracing_config;
pub mod transform;
pub mod types;

// Public API exports
pub use config::{
    CaptionStyle, CropStrategy, OutputFormat, PipelineConfig, PipelineConfigBuilder,
    TransformSpec,
};
pub use error::{DatasetError, Result};
pub use export::{ExportFormat, ExportReader, ExportSource};
pub use packager::DatasetPackager;
pub use pipeline::{Pipeline, RunState};
pub use query::{RecordFilter, TagQuery};
pub use services::{
    ConsoleProgressReporter, ImageIOService, ImageLocator, NoOpProgressReporter,
    OutputFormatHandler, PipelineStage, ProgressReporter, ProgressTracker, ProgressUpdate,
};
pub use tracing_config::{events, spans, TracingConfig, TracingFormat, TracingOutput};
pub use transform::{CropWindow, ImageTransformer};
pub use types::{DatasetEntry, Record, RunSummary, SkipReason, SourceReference};

/// Run a complete dataset build with the given configuration
///
/// Progress is discarded; use [`Pipeline`] directly to observe the run.
///
/// # Errors
/// - Invalid configuration or query syntax
/// - Unreadable export
/// - Output write failures
pub fn build_dataset(config: PipelineConfig) -> Result<RunSummary> {
    Pipeline::new(config)?.run()
}
