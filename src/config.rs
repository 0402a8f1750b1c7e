//! Configuration types for dataset building runs

use crate::error::{DatasetError, Result};
use crate::query::{RecordFilter, TagQuery};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Scales used by [`CropStrategy::multi_resolution`] when none are given
pub const DEFAULT_SCALES: [f32; 2] = [1.0, 0.75];

/// Default square target resolution
pub const DEFAULT_TARGET_SIZE: u32 = 512;

/// Output image format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG, lossless, keeps alpha
    #[default]
    Png,
    /// JPEG (alpha is dropped)
    Jpeg,
    /// WebP, lossless, keeps alpha
    WebP,
    /// TIFF, lossless, keeps alpha
    Tiff,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Png => write!(f, "png"),
            Self::Jpeg => write!(f, "jpeg"),
            Self::WebP => write!(f, "webp"),
            Self::Tiff => write!(f, "tiff"),
        }
    }
}

/// How crop windows are chosen from a source image
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum CropStrategy {
    /// One crop: the largest centred window with the target's aspect ratio
    #[default]
    Center,
    /// One crop per scale, each a centred fraction of the base window
    MultiResolution { scales: Vec<f32> },
}

impl CropStrategy {
    /// Multi-resolution strategy with [`DEFAULT_SCALES`]
    #[must_use]
    pub fn multi_resolution() -> Self {
        Self::MultiResolution {
            scales: DEFAULT_SCALES.to_vec(),
        }
    }

    /// Number of images produced per source image
    #[must_use]
    pub fn crop_count(&self) -> usize {
        match self {
            Self::Center => 1,
            Self::MultiResolution { scales } => scales.len(),
        }
    }
}

/// Transformation applied to every located image. Constant for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformSpec {
    /// Output (width, height) in pixels
    pub target_size: (u32, u32),
    pub crop_strategy: CropStrategy,
    pub output_format: OutputFormat,
    /// JPEG quality (0-100, only used for JPEG output)
    pub jpeg_quality: u8,
}

impl Default for TransformSpec {
    fn default() -> Self {
        Self {
            target_size: (DEFAULT_TARGET_SIZE, DEFAULT_TARGET_SIZE),
            crop_strategy: CropStrategy::default(),
            output_format: OutputFormat::default(),
            jpeg_quality: 90,
        }
    }
}

impl TransformSpec {
    /// Validate sizes, scales and quality
    ///
    /// # Errors
    /// - Zero target width or height
    /// - JPEG quality above 100
    /// - Empty scale list, or a scale outside (0, 1]
    pub fn validate(&self) -> Result<()> {
        let (width, height) = self.target_size;
        if width == 0 || height == 0 {
            return Err(DatasetError::config_value_error(
                "target size",
                format!("{width}x{height}"),
                "width and height >= 1",
            ));
        }

        if self.jpeg_quality > 100 {
            return Err(DatasetError::config_value_error(
                "JPEG quality",
                self.jpeg_quality,
                "0-100",
            ));
        }

        if !crate::services::OutputFormatHandler::is_available(self.output_format) {
            return Err(DatasetError::invalid_config(format!(
                "output format {} is not enabled in this build",
                self.output_format
            )));
        }

        if let CropStrategy::MultiResolution { scales } = &self.crop_strategy {
            if scales.is_empty() {
                return Err(DatasetError::invalid_config(
                    "multi-resolution cropping needs at least one scale",
                ));
            }
            if let Some(scale) = scales
                .iter()
                .find(|scale| !scale.is_finite() || **scale <= 0.0 || **scale > 1.0)
            {
                return Err(DatasetError::config_value_error("crop scale", scale, "(0, 1]"));
            }
        }

        Ok(())
    }
}

/// How tags are rendered into caption sidecars
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionStyle {
    pub separator: String,
    /// Render `long_tail` as `long tail`
    pub replace_underscores: bool,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            separator: ", ".to_string(),
            replace_underscores: false,
        }
    }
}

/// Configuration for one dataset building run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Export file, or a directory holding one
    pub export: PathBuf,

    /// Dataset output directory (created if missing)
    pub output_dir: PathBuf,

    /// Tag query; empty matches every record
    pub query: String,

    /// Directories searched for images, in order
    pub image_roots: Vec<PathBuf>,

    /// Local image cache; `None` uses the environment or platform default
    pub cache_dir: Option<PathBuf>,

    /// Build a file-stem index of the image roots before processing
    pub index_images: bool,

    pub filter: RecordFilter,
    pub transform: TransformSpec,
    pub caption: CaptionStyle,

    /// Write a JSON metadata sidecar next to every image
    pub store_metadata: bool,

    /// Write `tokens.txt` at the end of the run
    pub build_tokendb: bool,

    /// Stop once this many records have been packaged
    pub limit: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            export: PathBuf::new(),
            output_dir: PathBuf::new(),
            query: String::new(),
            image_roots: Vec::new(),
            cache_dir: None,
            index_images: false,
            filter: RecordFilter::default(),
            transform: TransformSpec::default(),
            caption: CaptionStyle::default(),
            store_metadata: false,
            build_tokendb: false,
            limit: None,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder
    ///
    /// ```rust
    /// use e621_noapi::{CropStrategy, PipelineConfig};
    ///
    /// let config = PipelineConfig::builder()
    ///     .export("dump/posts.csv.gz")
    ///     .output_dir("dataset")
    ///     .query("wolf -comic")
    ///     .target_size(768, 768)
    ///     .crop_strategy(CropStrategy::multi_resolution())
    ///     .build()?;
    /// assert_eq!(config.transform.crop_strategy.crop_count(), 2);
    /// # Ok::<(), e621_noapi::DatasetError>(())
    /// ```
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Parse the configured tag query
    ///
    /// # Errors
    /// Returns `DatasetError::InvalidQuerySyntax` for a malformed query.
    pub fn tag_query(&self) -> Result<TagQuery> {
        TagQuery::parse(&self.query)
    }

    /// Validate all configuration parameters, including the query syntax
    ///
    /// # Errors
    /// - Missing export or output paths
    /// - Invalid transform parameters
    /// - A zero `limit`
    /// - Invalid query syntax
    pub fn validate(&self) -> Result<()> {
        if self.export.as_os_str().is_empty() {
            return Err(DatasetError::invalid_config("no export path given"));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(DatasetError::invalid_config("no output directory given"));
        }

        self.transform.validate()?;

        if self.limit == Some(0) {
            return Err(DatasetError::config_value_error("limit", 0, ">= 1"));
        }

        self.tag_query()?;
        Ok(())
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    ///
    /// # Errors
    /// - File cannot be read
    /// - Invalid JSON
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DatasetError::file_io_error("read config", path, &e))?;
        let config = serde_json::from_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Write the configuration as pretty-printed JSON
    ///
    /// # Errors
    /// - Serialization or file write failure
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content + "\n")
            .map_err(|e| DatasetError::file_io_error("write config", path, &e))
    }
}

/// Builder for `PipelineConfig`
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Start from an existing configuration, e.g. one loaded from a file
    #[must_use]
    pub fn from_config(config: PipelineConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn export<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.export = path.into();
        self
    }

    #[must_use]
    pub fn output_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.output_dir = path.into();
        self
    }

    #[must_use]
    pub fn query<S: Into<String>>(mut self, query: S) -> Self {
        self.config.query = query.into();
        self
    }

    /// Append an image root
    #[must_use]
    pub fn image_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.config.image_roots.push(root.into());
        self
    }

    /// Replace all image roots
    #[must_use]
    pub fn image_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.config.image_roots = roots;
        self
    }

    #[must_use]
    pub fn cache_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.cache_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn index_images(mut self, enabled: bool) -> Self {
        self.config.index_images = enabled;
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: RecordFilter) -> Self {
        self.config.filter = filter;
        self
    }

    /// Keep only these extensions (case-insensitive)
    #[must_use]
    pub fn allowed_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.filter.allowed_extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        self
    }

    /// Minimum source width and height
    #[must_use]
    pub fn min_dimension(mut self, pixels: u32) -> Self {
        self.config.filter.min_width = pixels;
        self.config.filter.min_height = pixels;
        self
    }

    #[must_use]
    pub fn blacklist<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.filter.blacklist = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Keep deleted, pending and flagged records
    #[must_use]
    pub fn include_flagged(mut self, include: bool) -> Self {
        self.config.filter.exclude_flagged = !include;
        self
    }

    #[must_use]
    pub fn transform(mut self, transform: TransformSpec) -> Self {
        self.config.transform = transform;
        self
    }

    #[must_use]
    pub fn target_size(mut self, width: u32, height: u32) -> Self {
        self.config.transform.target_size = (width, height);
        self
    }

    #[must_use]
    pub fn crop_strategy(mut self, strategy: CropStrategy) -> Self {
        self.config.transform.crop_strategy = strategy;
        self
    }

    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.transform.output_format = format;
        self
    }

    /// Set JPEG quality (clamped to 100)
    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.transform.jpeg_quality = quality.min(100);
        self
    }

    #[must_use]
    pub fn caption_separator<S: Into<String>>(mut self, separator: S) -> Self {
        self.config.caption.separator = separator.into();
        self
    }

    #[must_use]
    pub fn replace_underscores(mut self, replace: bool) -> Self {
        self.config.caption.replace_underscores = replace;
        self
    }

    #[must_use]
    pub fn store_metadata(mut self, store: bool) -> Self {
        self.config.store_metadata = store;
        self
    }

    #[must_use]
    pub fn build_tokendb(mut self, build: bool) -> Self {
        self.config.build_tokendb = build;
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.config.limit = limit;
        self
    }

    /// Build the configuration, validating it first
    ///
    /// # Errors
    /// See [`PipelineConfig::validate`].
    pub fn build(self) -> Result<PipelineConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}
