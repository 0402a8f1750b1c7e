//! e621-noapi CLI tool
//!
//! Command-line interface building image/caption datasets from offline exports.

use super::config::CliConfigBuilder;
use crate::{
    pipeline::Pipeline,
    services::{
        ConsoleProgressReporter, PipelineStage, ProgressReporter, ProgressTracker, ProgressUpdate,
    },
    tracing_config::TracingConfig,
    types::{RunSummary, SkipReason},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

/// Build image/caption training datasets from offline e621-style exports
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "e621-noapi")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Export file (JSON Lines or CSV, optionally gzip compressed) or a directory holding one
    #[arg(value_name = "EXPORT", required_unless_present = "config")]
    pub export: Option<PathBuf>,

    /// Dataset output directory
    #[arg(value_name = "OUTPUT_DIR", required_unless_present = "config")]
    pub output_dir: Option<PathBuf>,

    /// Tag query, e.g. "wolf ~fox -comic rating:s" [default: match everything]
    #[arg(short, long)]
    pub query: Option<String>,

    /// Directory searched for images (repeatable, searched in order)
    #[arg(short, long = "image-dir", value_name = "DIR")]
    pub image_dir: Vec<PathBuf>,

    /// Local image cache directory [default: $E621_NOAPI_CACHE_DIR or the platform cache]
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Index image directories by file stem before processing
    #[arg(long)]
    pub index_images: bool,

    /// Target resolution as WIDTHxHEIGHT or a single edge length [default: 512]
    #[arg(short, long, value_name = "WxH|N", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Crop strategy [default: center]
    #[arg(long, value_enum)]
    pub crop: Option<CliCropStrategy>,

    /// Comma-separated multi-resolution scales in (0, 1] [default: 1.0,0.75]
    #[arg(long, value_delimiter = ',')]
    pub scales: Option<Vec<f32>>,

    /// Output format [default: png]
    #[arg(short, long, value_enum)]
    pub format: Option<CliOutputFormat>,

    /// JPEG quality (0-100) [default: 90]
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub jpeg_quality: Option<u8>,

    /// Separator between tags in caption files [default: ", "]
    #[arg(long)]
    pub caption_separator: Option<String>,

    /// Write underscores in tags as spaces in captions
    #[arg(long)]
    pub underscores_to_spaces: bool,

    /// Write a JSON metadata sidecar next to every image
    #[arg(long)]
    pub store_metadata: bool,

    /// Write a tokens.txt tag frequency database
    #[arg(long)]
    pub build_tokendb: bool,

    /// Stop after this many records have been packaged
    #[arg(long)]
    pub limit: Option<usize>,

    /// Comma-separated file extensions to keep
    #[arg(long, value_delimiter = ',', value_name = "LIST")]
    pub allowed_ext: Option<Vec<String>>,

    /// Minimum source width and height in pixels
    #[arg(long, value_name = "N")]
    pub min_dimension: Option<u32>,

    /// Comma-separated tags whose records are dropped
    #[arg(long, value_delimiter = ',', value_name = "LIST")]
    pub blacklist: Option<Vec<String>>,

    /// Keep deleted, pending and flagged records
    #[arg(long)]
    pub include_flagged: bool,

    /// JSON configuration file; command-line flags override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Write the effective configuration as JSON and exit
    #[arg(long, value_name = "FILE")]
    pub save_config: Option<PathBuf>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Show a progress spinner instead of stage log lines
    #[arg(long)]
    pub progress: bool,

    /// Also write logs to this file
    #[cfg(feature = "tracing-files")]
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Jpeg,
    Webp,
    Tiff,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum CliCropStrategy {
    /// One centred crop per image
    Center,
    /// One centred crop per scale
    Multi,
}

/// Parse `WIDTHxHEIGHT` or a single edge length
fn parse_size(value: &str) -> std::result::Result<(u32, u32), String> {
    let parse_edge = |edge: &str| {
        edge.trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid size '{value}': {e}"))
    };

    let (width, height) = match value.split_once(['x', 'X']) {
        Some((width, height)) => (parse_edge(width)?, parse_edge(height)?),
        None => {
            let edge = parse_edge(value)?;
            (edge, edge)
        },
    };

    if width == 0 || height == 0 {
        return Err(format!("invalid size '{value}': dimensions must be non-zero"));
    }
    Ok((width, height))
}

/// Progress reporter driving an indicatif spinner
struct SpinnerProgressReporter {
    bar: ProgressBar,
}

impl SpinnerProgressReporter {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }
}

impl ProgressReporter for SpinnerProgressReporter {
    fn report_progress(&self, update: &ProgressUpdate) {
        self.bar.set_message(format!(
            "{}: {} read, {} matched, {} packaged, {} skipped",
            update.stage.description(),
            update.records_read,
            update.matched,
            update.succeeded,
            update.skipped
        ));
    }

    fn report_skip(&self, record_id: &str, reason: SkipReason, detail: &str) {
        self.bar
            .set_message(format!("Skipped record {record_id} ({reason}): {detail}"));
    }

    fn report_completion(&self, summary: &RunSummary) {
        self.bar.finish_with_message(format!(
            "Done: {} packaged, {} entries written",
            summary.succeeded, summary.entries_written
        ));
    }

    fn report_error(&self, stage: PipelineStage, error: &str) {
        self.bar
            .abandon_with_message(format!("{} failed: {error}", stage.description()));
    }
}

/// Main entry point for the CLI application
pub fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli).context("Failed to initialize tracing")?;

    let config = CliConfigBuilder::from_cli(&cli)?;

    if let Some(path) = &cli.save_config {
        config
            .save_json(path)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        log::info!("Saved configuration to {}", path.display());
        return Ok(());
    }

    let reporter: Box<dyn ProgressReporter> = if cli.progress {
        Box::new(SpinnerProgressReporter::new())
    } else {
        Box::new(ConsoleProgressReporter::new(cli.verbose > 0))
    };

    let mut pipeline = Pipeline::new(config)
        .context("Failed to create pipeline")?
        .with_progress(ProgressTracker::new(reporter));

    let result = pipeline.run();

    // The summary goes to stdout whatever the outcome; logs stay on stderr
    println!("{}", pipeline.summary());

    result.context("Dataset run failed")?;
    Ok(())
}

/// Initialize tracing from the verbosity flags
fn init_tracing(cli: &Cli) -> Result<()> {
    let session_id = uuid::Uuid::new_v4().to_string();

    #[allow(unused_mut)]
    let mut config = TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_session_id(session_id);

    #[cfg(feature = "tracing-files")]
    if let Some(path) = &cli.log_file {
        config = config.with_output(crate::tracing_config::TracingOutput::Both(path.clone()));
    }

    config.init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("512"), Ok((512, 512)));
        assert_eq!(parse_size("768x512"), Ok((768, 512)));
        assert_eq!(parse_size("640X480"), Ok((640, 480)));
        assert!(parse_size("0").is_err());
        assert!(parse_size("512x").is_err());
        assert!(parse_size("big").is_err());
    }

    #[test]
    fn test_cli_output_format_enum() {
        let formats = [
            CliOutputFormat::Png,
            CliOutputFormat::Jpeg,
            CliOutputFormat::Webp,
            CliOutputFormat::Tiff,
        ];
        for format in formats {
            let name = format.to_possible_value().unwrap();
            assert_eq!(CliOutputFormat::from_str(name.get_name(), false), Ok(format));
        }
    }

    #[test]
    fn test_cli_struct_creation() {
        let cli = Cli::try_parse_from([
            "e621-noapi",
            "dump",
            "out",
            "-vv",
            "--crop",
            "multi",
            "--scales",
            "1.0,0.5",
            "--allowed-ext",
            "png,jpg",
            "--progress",
        ])
        .unwrap();

        assert_eq!(cli.export, Some(PathBuf::from("dump")));
        assert_eq!(cli.output_dir, Some(PathBuf::from("out")));
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.crop, Some(CliCropStrategy::Multi));
        assert_eq!(cli.scales, Some(vec![1.0, 0.5]));
        assert_eq!(
            cli.allowed_ext,
            Some(vec!["png".to_string(), "jpg".to_string()])
        );
        assert!(cli.progress);
        assert!(cli.query.is_none());
    }

    #[test]
    fn test_positionals_required_without_config() {
        assert!(Cli::try_parse_from(["e621-noapi", "dump"]).is_err());
        assert!(Cli::try_parse_from(["e621-noapi", "--config", "c.json"]).is_ok());
        assert!(Cli::try_parse_from(["e621-noapi", "d", "o", "--jpeg-quality", "101"]).is_err());
    }
}
