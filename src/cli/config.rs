//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliCropStrategy, CliOutputFormat};
use crate::config::{CropStrategy, OutputFormat, PipelineConfig, PipelineConfigBuilder, DEFAULT_SCALES};
use anyhow::{Context, Result};

/// Convert CLI arguments to a `PipelineConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build a `PipelineConfig` from CLI arguments
    ///
    /// A `--config` file is loaded first; every flag given on the command line
    /// overrides the corresponding value from the file.
    pub(crate) fn from_cli(cli: &Cli) -> Result<PipelineConfig> {
        let base = match &cli.config {
            Some(path) => PipelineConfig::load_json(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => PipelineConfig::default(),
        };
        let mut builder = PipelineConfigBuilder::from_config(base);

        if let Some(export) = &cli.export {
            builder = builder.export(export);
        }
        if let Some(output_dir) = &cli.output_dir {
            builder = builder.output_dir(output_dir);
        }
        if let Some(query) = &cli.query {
            builder = builder.query(query.as_str());
        }
        if !cli.image_dir.is_empty() {
            builder = builder.image_roots(cli.image_dir.clone());
        }
        if let Some(cache_dir) = &cli.cache_dir {
            builder = builder.cache_dir(cache_dir);
        }
        if cli.index_images {
            builder = builder.index_images(true);
        }

        if let Some((width, height)) = cli.size {
            builder = builder.target_size(width, height);
        }
        if let Some(strategy) = Self::crop_strategy(cli) {
            builder = builder.crop_strategy(strategy);
        }
        if let Some(format) = cli.format {
            builder = builder.output_format(format.into());
        }
        if let Some(quality) = cli.jpeg_quality {
            builder = builder.jpeg_quality(quality);
        }

        if let Some(separator) = &cli.caption_separator {
            builder = builder.caption_separator(separator.as_str());
        }
        if cli.underscores_to_spaces {
            builder = builder.replace_underscores(true);
        }
        if cli.store_metadata {
            builder = builder.store_metadata(true);
        }
        if cli.build_tokendb {
            builder = builder.build_tokendb(true);
        }
        if cli.limit.is_some() {
            builder = builder.limit(cli.limit);
        }

        if let Some(extensions) = &cli.allowed_ext {
            builder = builder.allowed_extensions(extensions.iter().map(String::as_str));
        }
        if let Some(pixels) = cli.min_dimension {
            builder = builder.min_dimension(pixels);
        }
        if let Some(tags) = &cli.blacklist {
            builder = builder.blacklist(tags.iter().map(String::as_str));
        }
        if cli.include_flagged {
            builder = builder.include_flagged(true);
        }

        builder.build().context("Invalid configuration")
    }

    /// Crop strategy from `--crop` and `--scales`; `--scales` alone implies `multi`
    fn crop_strategy(cli: &Cli) -> Option<CropStrategy> {
        match (cli.crop, &cli.scales) {
            (Some(CliCropStrategy::Center), scales) => {
                if scales.is_some() {
                    log::warn!("--scales has no effect with --crop center");
                }
                Some(CropStrategy::Center)
            },
            (Some(CliCropStrategy::Multi), scales) => Some(CropStrategy::MultiResolution {
                scales: scales.clone().unwrap_or_else(|| DEFAULT_SCALES.to_vec()),
            }),
            (None, Some(scales)) => Some(CropStrategy::MultiResolution {
                scales: scales.clone(),
            }),
            (None, None) => None,
        }
    }
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(format: CliOutputFormat) -> Self {
        match format {
            CliOutputFormat::Png => OutputFormat::Png,
            CliOutputFormat::Jpeg => OutputFormat::Jpeg,
            CliOutputFormat::Webp => OutputFormat::WebP,
            CliOutputFormat::Tiff => OutputFormat::Tiff,
        }
    }
}
