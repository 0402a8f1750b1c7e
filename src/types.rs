//! Core data types shared across the pipeline

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Where the image for a record lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceReference {
    /// Explicit file path; relative paths are resolved against the image roots
    Path(PathBuf),
    /// e621 content-addressed layout (`ab/cd/abcd....ext`)
    Md5 { md5: String, ext: String },
}

impl SourceReference {
    /// File extension of the referenced image, if known
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        match self {
            Self::Path(path) => path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_lowercase),
            Self::Md5 { ext, .. } => Some(ext.to_lowercase()),
        }
    }
}

impl fmt::Display for SourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Md5 { md5, ext } => write!(f, "md5:{md5}.{ext}"),
        }
    }
}

/// Content rating of a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rating {
    #[serde(rename = "s")]
    Safe,
    #[serde(rename = "q")]
    Questionable,
    #[serde(rename = "e")]
    Explicit,
}

impl Rating {
    /// Parse e621's single-letter or spelled-out rating
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "s" | "safe" => Some(Self::Safe),
            "q" | "questionable" => Some(Self::Questionable),
            "e" | "explicit" => Some(Self::Explicit),
            _ => None,
        }
    }
}

/// Optional post attributes carried by richer exports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_ext: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fav_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub is_pending: bool,
    #[serde(default)]
    pub is_flagged: bool,
}

/// One entry of the metadata export. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub tags: BTreeSet<String>,
    pub source: SourceReference,
    #[serde(default)]
    pub metadata: RecordMetadata,
}

impl Record {
    /// Check whether the record carries a tag
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Extension of the referenced image, preferring the export's `file_ext`
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        self.metadata
            .file_ext
            .as_deref()
            .map(str::to_lowercase)
            .or_else(|| self.source.extension())
    }
}

/// A record id is used as an output file stem, so it is restricted to a safe alphabet.
#[must_use]
pub fn is_valid_record_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// One packaged (image, caption) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_index: Option<usize>,
    /// Image path relative to the output directory
    pub image: PathBuf,
    /// Caption path relative to the output directory
    pub caption: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PathBuf>,
    pub sha256: String,
    pub width: u32,
    pub height: u32,
    pub tags: BTreeSet<String>,
}

/// Why a record was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ImageNotFound,
    ImageUnreadable,
    UnsupportedFormat,
    DuplicateId,
}

impl SkipReason {
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::ImageNotFound => "image not found",
            Self::ImageUnreadable => "image unreadable",
            Self::UnsupportedFormat => "unsupported format",
            Self::DuplicateId => "duplicate id",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Counters collected by the pipeline driver over a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Records yielded by the export reader, including malformed ones
    pub records_read: usize,
    /// Records that could not be parsed
    pub malformed: usize,
    /// Records rejected by the pre-filter or the tag query
    pub filtered_out: usize,
    /// Records that passed the pre-filter and the tag query
    pub matched: usize,
    /// Matched records that produced all of their dataset entries
    pub succeeded: usize,
    /// Matched records skipped, by reason
    pub skipped: BTreeMap<SkipReason, usize>,
    /// Dataset entries written (more than `succeeded` with multi-resolution crops)
    pub entries_written: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RunSummary {
    /// Total number of skipped records over all reasons
    #[must_use]
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }

    pub(crate) fn record_skip(&mut self, reason: SkipReason) {
        *self.skipped.entry(reason).or_insert(0) += 1;
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "matched {}, succeeded {}, skipped {}",
            self.matched,
            self.succeeded,
            self.skipped_total()
        )?;
        if !self.skipped.is_empty() {
            let reasons: Vec<String> = self
                .skipped
                .iter()
                .map(|(reason, count)| format!("{reason}: {count}"))
                .collect();
            write!(f, " ({})", reasons.join(", "))?;
        }
        write!(
            f,
            "; {} entries written, {} records read, {} malformed, {} filtered out",
            self.entries_written, self.records_read, self.malformed, self.filtered_out
        )
    }
}
