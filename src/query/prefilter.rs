//! Record pre-filter applied before the tag query
//!
//! Mirrors the cleaning pass the e621 dump needs before any search: drop posts
//! that are deleted, pending or flagged, posts whose files are too small or in an
//! unwanted format, and posts carrying blacklisted tags.

use crate::types::Record;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Why the pre-filter rejected a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterRejection {
    Status,
    Extension(Option<String>),
    TooSmall { width: u32, height: u32 },
    Blacklisted(String),
}

impl fmt::Display for FilterRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status => write!(f, "deleted, pending or flagged"),
            Self::Extension(Some(ext)) => write!(f, "extension '{ext}' not allowed"),
            Self::Extension(None) => write!(f, "unknown extension"),
            Self::TooSmall { width, height } => write!(f, "too small ({width}x{height})"),
            Self::Blacklisted(tag) => write!(f, "blacklisted tag '{tag}'"),
        }
    }
}

/// Configurable record pre-filter. The default accepts everything that is not
/// deleted, pending or flagged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordFilter {
    /// Extensions to keep, compared without case or a leading dot; empty keeps all
    pub allowed_extensions: Vec<String>,
    /// Minimum width, checked only when the export carries dimensions
    pub min_width: u32,
    /// Minimum height, checked only when the export carries dimensions
    pub min_height: u32,
    /// Records carrying any of these tags are dropped
    pub blacklist: BTreeSet<String>,
    /// Drop records marked deleted, pending or flagged
    pub exclude_flagged: bool,
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self {
            allowed_extensions: Vec::new(),
            min_width: 0,
            min_height: 0,
            blacklist: BTreeSet::new(),
            exclude_flagged: true,
        }
    }
}

impl RecordFilter {
    /// Check a record, returning the first rejection reason
    ///
    /// # Errors
    /// Returns the [`FilterRejection`] describing why the record is dropped.
    pub fn check(&self, record: &Record) -> std::result::Result<(), FilterRejection> {
        let meta = &record.metadata;

        if self.exclude_flagged && (meta.is_deleted || meta.is_pending || meta.is_flagged) {
            return Err(FilterRejection::Status);
        }

        if !self.allowed_extensions.is_empty() {
            let ext = record.extension();
            let allowed = ext.as_deref().is_some_and(|ext| {
                self.allowed_extensions
                    .iter()
                    .any(|allowed| extension_matches(allowed, ext))
            });
            if !allowed {
                return Err(FilterRejection::Extension(ext));
            }
        }

        let width = meta.width.unwrap_or(u32::MAX);
        let height = meta.height.unwrap_or(u32::MAX);
        if width < self.min_width || height < self.min_height {
            return Err(FilterRejection::TooSmall {
                width: meta.width.unwrap_or_default(),
                height: meta.height.unwrap_or_default(),
            });
        }

        if let Some(tag) = record.tags.iter().find(|tag| self.blacklist.contains(*tag)) {
            return Err(FilterRejection::Blacklisted(tag.clone()));
        }

        Ok(())
    }

    /// Convenience boolean form of [`RecordFilter::check`]
    #[must_use]
    pub fn accepts(&self, record: &Record) -> bool {
        self.check(record).is_ok()
    }
}

/// Compare an allow-list entry such as `PNG` or `.png` with a lowercase record extension
fn extension_matches(allowed: &str, ext: &str) -> bool {
    allowed.trim().trim_start_matches('.').eq_ignore_ascii_case(ext)
}
