//! Tracing configuration module for structured logging and observability
//!
//! Applications configure subscribers through [`TracingConfig`]; the library
//! itself only emits events and spans (see [`spans`] and [`events`]).

#[cfg(feature = "cli")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable console output with colors (default for CLI)
    Console,
    /// Compact console output without colors for CI environments
    Compact,
    /// JSON structured logging
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Configuration for tracing output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TracingOutput {
    /// Output to stderr (default), keeping stdout for the run summary
    Console,
    /// Output to a file
    #[cfg(feature = "tracing-files")]
    File(std::path::PathBuf),
    /// Output to both stderr and a file
    #[cfg(feature = "tracing-files")]
    Both(std::path::PathBuf),
}

/// Tracing configuration builder
#[derive(Debug)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    /// Output format
    pub format: TracingFormat,
    /// Output destination
    pub output: TracingOutput,
    /// Environment filter string (overrides verbosity and `RUST_LOG` if set)
    pub env_filter: Option<String>,
    /// Session ID for correlation
    pub session_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            output: TracingOutput::Console,
            env_filter: None,
            session_id: None,
        }
    }
}

impl TracingConfig {
    /// Create a new tracing configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity level (0-2+)
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
        self
    }

    /// Set custom environment filter
    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Set session ID for run correlation
    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Convert verbosity level to tracing filter string
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",  // Default: progress, skips and the summary
            1 => "debug", // -v: per-record decisions
            _ => "trace", // -vv+: everything
        }
    }

    #[cfg(feature = "cli")]
    fn build_filter(&self) -> anyhow::Result<EnvFilter> {
        if let Some(env_filter) = &self.env_filter {
            return Ok(EnvFilter::try_new(env_filter)?);
        }
        if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return Ok(filter);
            }
        }
        Ok(EnvFilter::try_new(self.verbosity_to_filter())?)
    }

    /// Initialize the global tracing subscriber
    ///
    /// # Errors
    /// - Invalid filter directives
    /// - A global subscriber is already installed
    #[cfg(feature = "cli")]
    pub fn init(self) -> anyhow::Result<()> {
        use tracing_subscriber::fmt;

        let filter = self.build_filter()?;
        let registry = Registry::default().with(filter);

        match (&self.format, &self.output) {
            (TracingFormat::Console, TracingOutput::Console) => {
                let fmt_layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(false)
                    .with_level(true)
                    .compact();

                registry.with(fmt_layer).try_init()?;
            },

            (TracingFormat::Compact, TracingOutput::Console) => {
                let fmt_layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_target(false)
                    .compact();

                registry.with(fmt_layer).try_init()?;
            },

            #[cfg(feature = "tracing-json")]
            (TracingFormat::Json, TracingOutput::Console) => {
                let fmt_layer = fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(true);

                registry.with(fmt_layer).try_init()?;
            },

            #[cfg(feature = "tracing-files")]
            (format, TracingOutput::File(path)) => {
                let file_writer = file_appender(path);

                match format {
                    TracingFormat::Console | TracingFormat::Compact => {
                        let fmt_layer = fmt::layer()
                            .with_ansi(false)
                            .with_writer(file_writer)
                            .compact();
                        registry.with(fmt_layer).try_init()?;
                    },
                    #[cfg(feature = "tracing-json")]
                    TracingFormat::Json => {
                        let fmt_layer = fmt::layer()
                            .json()
                            .with_writer(file_writer)
                            .with_current_span(true)
                            .with_span_list(true);
                        registry.with(fmt_layer).try_init()?;
                    },
                }
            },

            #[cfg(feature = "tracing-files")]
            (format, TracingOutput::Both(path)) => {
                let console_layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(*format == TracingFormat::Console)
                    .with_target(false)
                    .compact();

                let file_layer = fmt::layer()
                    .with_ansi(false)
                    .with_writer(file_appender(path))
                    .compact();

                registry.with(console_layer).with(file_layer).try_init()?;
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::info!(session_id = %session_id, "Dataset session started");
        }

        Ok(())
    }
}

/// Blocking file writer appending to exactly `path`
#[cfg(feature = "tracing-files")]
fn file_appender(path: &std::path::Path) -> tracing_appender::rolling::RollingFileAppender {
    tracing_appender::rolling::never(
        path.parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| std::path::Path::new(".")),
        path.file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("e621-noapi.log")),
    )
}

/// Span creation helpers for common operations
pub mod spans {
    use tracing::{Level, Span};

    /// Span covering a whole dataset building run
    pub fn run(export: &std::path::Path, output_dir: &std::path::Path, query: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "run",
            export = %export.display(),
            output_dir = %output_dir.display(),
            query = %query
        )
    }

    /// Span for the processing of one matched record
    pub fn record(record_id: &str) -> Span {
        tracing::span!(Level::DEBUG, "record", record_id = %record_id)
    }

    /// Span for crop and resize work on one image
    pub fn transform(source: &std::path::Path, dimensions: (u32, u32)) -> Span {
        tracing::span!(
            Level::DEBUG,
            "transform",
            source = %source.display(),
            width = %dimensions.0,
            height = %dimensions.1
        )
    }
}

/// Event helpers for common logging patterns
pub mod events {
    use crate::types::SkipReason;
    use tracing::{debug, error, warn};

    /// Log a skipped record
    pub fn record_skipped(record_id: &str, reason: SkipReason, error: &dyn std::fmt::Display) {
        warn!(
            record_id = %record_id,
            reason = %reason,
            error = %error,
            "Skipping record"
        );
    }

    /// Log an error with context
    pub fn error_with_context(error: &dyn std::error::Error, context: &str) {
        error!(
            error = %error,
            context = %context,
            "Operation failed"
        );
    }

    /// Log performance metrics
    pub fn performance_metric(operation: &str, duration_ms: u64) {
        debug!(
            operation = %operation,
            duration_ms = %duration_ms,
            "Performance metric"
        );
    }
}
