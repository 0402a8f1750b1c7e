//! Offline metadata export reader
//!
//! Reads a record-per-entry export (JSON Lines or CSV, optionally gzip-compressed)
//! into a lazy stream of [`Record`]s. The stream is finite and can be restarted by
//! calling [`ExportSource::open`] again. Records that cannot be parsed are yielded
//! as `DatasetError::MalformedExport` so the caller can skip them and carry on.

mod delimited;
mod jsonl;

use crate::{
    error::{DatasetError, Result},
    types::{is_valid_record_id, Rating, Record, RecordMetadata, SourceReference},
};
use chrono::NaiveDate;
use flate2::read::MultiGzDecoder;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// File names tried, in order, when the export path is a directory
const DIRECTORY_CANDIDATES: &[&str] = &["posts.jsonl", "posts.ndjson", "posts.csv", "posts.csv.gz"];

/// Dated e621 dump names, e.g. `posts-2024-3-7.csv.gz`
const DATED_DUMP_PATTERN: &str = "posts-*.csv.gz";

/// Serialization of the export file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// One JSON object per line
    JsonLines,
    /// Comma-separated values with a header row
    Csv,
}

/// A resolved export file that can be opened (and re-opened) for reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSource {
    path: PathBuf,
    format: ExportFormat,
    gzip: bool,
}

impl ExportSource {
    /// Resolve an export from a file path or a directory holding a posts export
    ///
    /// # Errors
    /// - `DatasetError::Io` when the path does not exist
    /// - `DatasetError::MalformedExport` when no export can be identified
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)
            .map_err(|e| DatasetError::file_io_error("access export", path, &e))?;

        let file = if metadata.is_dir() {
            discover_in_directory(path)?
        } else {
            path.to_path_buf()
        };

        let (format, gzip) = detect_format(&file)?;
        Ok(Self {
            path: file,
            format,
            gzip,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn format(&self) -> ExportFormat {
        self.format
    }

    #[must_use]
    pub fn is_gzip(&self) -> bool {
        self.gzip
    }

    /// Open a fresh record stream from the start of the export
    ///
    /// # Errors
    /// - `DatasetError::Io` when the file cannot be opened
    /// - `DatasetError::MalformedExport` when a CSV header lacks required columns
    pub fn open(&self) -> Result<ExportReader> {
        let file = File::open(&self.path)
            .map_err(|e| DatasetError::file_io_error("open export", &self.path, &e))?;
        let input: Box<dyn BufRead> = if self.gzip {
            Box::new(BufReader::new(MultiGzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        let stream = match self.format {
            ExportFormat::JsonLines => RecordStream::Json(jsonl::JsonLinesReader::new(input)),
            ExportFormat::Csv => RecordStream::Csv(delimited::CsvRecordReader::new(input)?),
        };

        tracing::debug!(
            path = %self.path.display(),
            format = ?self.format,
            gzip = self.gzip,
            "Opened export"
        );
        Ok(ExportReader { stream })
    }
}

enum RecordStream {
    Json(jsonl::JsonLinesReader),
    Csv(delimited::CsvRecordReader),
}

/// Lazy, finite stream of records from one pass over an export
pub struct ExportReader {
    stream: RecordStream,
}

impl Iterator for ExportReader {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.stream {
            RecordStream::Json(reader) => reader.next(),
            RecordStream::Csv(reader) => reader.next(),
        }
    }
}

fn detect_format(path: &Path) -> Result<(ExportFormat, bool)> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let (stem, gzip) = match name.strip_suffix(".gz") {
        Some(stem) => (stem, true),
        None => (name.as_str(), false),
    };

    let format = if stem.ends_with(".jsonl") || stem.ends_with(".ndjson") || stem.ends_with(".json")
    {
        ExportFormat::JsonLines
    } else if stem.ends_with(".csv") {
        ExportFormat::Csv
    } else {
        return Err(DatasetError::malformed(
            path.display(),
            "unrecognized export format (expected .jsonl, .json, .csv, optionally .gz)",
        ));
    };

    Ok((format, gzip))
}

fn discover_in_directory(dir: &Path) -> Result<PathBuf> {
    for candidate in DIRECTORY_CANDIDATES {
        let path = dir.join(candidate);
        if path.is_file() {
            return Ok(path);
        }
    }

    let pattern = glob::Pattern::new(DATED_DUMP_PATTERN)
        .map_err(|e| DatasetError::invalid_config(format!("bad export pattern: {e}")))?;

    let entries = std::fs::read_dir(dir)
        .map_err(|e| DatasetError::file_io_error("list export directory", dir, &e))?;

    let mut newest: Option<(NaiveDate, PathBuf)> = None;
    for entry in entries {
        let entry = entry.map_err(|e| DatasetError::file_io_error("list export directory", dir, &e))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !pattern.matches(&name) {
            continue;
        }
        let Some(date) = dump_date(&name) else {
            tracing::debug!(file = %name, "Ignoring dump with unparseable date");
            continue;
        };
        let path = entry.path();
        if newest
            .as_ref()
            .map_or(true, |current| (date, &path) > (current.0, &current.1))
        {
            newest = Some((date, path));
        }
    }

    newest.map(|(_, path)| path).ok_or_else(|| {
        DatasetError::malformed(
            dir.display(),
            "no posts export found (expected posts.jsonl, posts.csv[.gz] or posts-YYYY-MM-DD.csv.gz)",
        )
    })
}

/// Date embedded in a dump file name such as `posts-2024-3-7.csv.gz`
fn dump_date(name: &str) -> Option<NaiveDate> {
    let date = name.strip_prefix("posts-")?.strip_suffix(".csv.gz")?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Normalised record fields before validation, shared by both parsers
#[derive(Debug, Default)]
pub(crate) struct RecordFields {
    pub(crate) id: String,
    pub(crate) tags: BTreeSet<String>,
    pub(crate) file: Option<String>,
    pub(crate) md5: Option<String>,
    pub(crate) file_ext: Option<String>,
    pub(crate) rating: Option<String>,
    pub(crate) score: Option<i64>,
    pub(crate) fav_count: Option<i64>,
    pub(crate) width: Option<u32>,
    pub(crate) height: Option<u32>,
    pub(crate) is_deleted: bool,
    pub(crate) is_pending: bool,
    pub(crate) is_flagged: bool,
}

pub(crate) fn split_tags(joined: &str) -> BTreeSet<String> {
    joined.split_whitespace().map(str::to_string).collect()
}

pub(crate) fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "t" | "true" | "1" => Some(true),
        "f" | "false" | "0" | "" => Some(false),
        _ => None,
    }
}

fn is_md5(value: &str) -> bool {
    value.len() == 32 && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Validate normalised fields into a [`Record`]
pub(crate) fn build_record(location: &str, fields: RecordFields) -> Result<Record> {
    let id = fields.id.trim().to_string();
    if !is_valid_record_id(&id) {
        return Err(DatasetError::malformed(
            location,
            format!("invalid id '{id}' (allowed: ASCII letters, digits, '-', '_')"),
        ));
    }

    let rating = match fields.rating.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(value) => Some(Rating::parse(value).ok_or_else(|| {
            DatasetError::malformed(location, format!("unknown rating '{value}'"))
        })?),
    };

    let md5 = fields
        .md5
        .map(|md5| md5.trim().to_lowercase())
        .filter(|md5| !md5.is_empty());
    let file_ext = fields
        .file_ext
        .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty());

    let file = fields.file.filter(|file| !file.trim().is_empty());
    let source = match (file, &md5, &file_ext) {
        (Some(file), _, _) => SourceReference::Path(PathBuf::from(file.trim())),
        (None, Some(md5), Some(ext)) => {
            if !is_md5(md5) {
                return Err(DatasetError::malformed(
                    location,
                    format!("'{md5}' is not an md5 digest"),
                ));
            }
            SourceReference::Md5 {
                md5: md5.clone(),
                ext: ext.clone(),
            }
        },
        _ => {
            return Err(DatasetError::malformed(
                location,
                "record has neither `file` nor `md5` + `file_ext`",
            ))
        },
    };

    let tags = fields
        .tags
        .into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect();

    Ok(Record {
        id,
        tags,
        source,
        metadata: RecordMetadata {
            md5,
            file_ext,
            rating,
            score: fields.score,
            fav_count: fields.fav_count,
            width: fields.width,
            height: fields.height,
            is_deleted: fields.is_deleted,
            is_pending: fields.is_pending,
            is_flagged: fields.is_flagged,
        },
    })
}
