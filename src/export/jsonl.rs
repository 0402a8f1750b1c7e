//! JSON Lines export parsing

use super::{build_record, parse_flag, split_tags, RecordFields};
use crate::{
    error::{DatasetError, Result},
    types::Record,
};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::io::{BufRead, ErrorKind, Lines};

/// Record ids appear as numbers in e621 exports and as strings elsewhere
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

/// Tags are either a JSON array or a whitespace-joined `tag_string`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTags {
    List(Vec<String>),
    Joined(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawFlag {
    Bool(bool),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct RawJsonRecord {
    id: RawId,
    #[serde(alias = "tag_string")]
    tags: RawTags,
    #[serde(default, alias = "file_path", alias = "path")]
    file: Option<String>,
    #[serde(default)]
    md5: Option<String>,
    #[serde(default)]
    file_ext: Option<String>,
    #[serde(default)]
    rating: Option<String>,
    #[serde(default)]
    score: Option<i64>,
    #[serde(default)]
    fav_count: Option<i64>,
    #[serde(default, alias = "image_width")]
    width: Option<u32>,
    #[serde(default, alias = "image_height")]
    height: Option<u32>,
    #[serde(default)]
    is_deleted: Option<RawFlag>,
    #[serde(default)]
    is_pending: Option<RawFlag>,
    #[serde(default)]
    is_flagged: Option<RawFlag>,
}

fn flag(location: &str, name: &str, value: Option<RawFlag>) -> Result<bool> {
    match value {
        None => Ok(false),
        Some(RawFlag::Bool(value)) => Ok(value),
        Some(RawFlag::Text(text)) => parse_flag(&text).ok_or_else(|| {
            DatasetError::malformed(location, format!("`{name}` is not a boolean: '{text}'"))
        }),
    }
}

fn parse_line(line: &str, location: &str) -> Result<Record> {
    let raw: RawJsonRecord = serde_json::from_str(line)
        .map_err(|e| DatasetError::malformed(location, e.to_string()))?;

    let tags: BTreeSet<String> = match raw.tags {
        RawTags::List(tags) => tags.into_iter().collect(),
        RawTags::Joined(joined) => split_tags(&joined),
    };

    let fields = RecordFields {
        id: match raw.id {
            RawId::Number(id) => id.to_string(),
            RawId::Text(id) => id,
        },
        tags,
        file: raw.file,
        md5: raw.md5,
        file_ext: raw.file_ext,
        rating: raw.rating,
        score: raw.score,
        fav_count: raw.fav_count,
        width: raw.width,
        height: raw.height,
        is_deleted: flag(location, "is_deleted", raw.is_deleted)?,
        is_pending: flag(location, "is_pending", raw.is_pending)?,
        is_flagged: flag(location, "is_flagged", raw.is_flagged)?,
    };

    build_record(location, fields)
}

/// Line-by-line JSON reader; blank lines are ignored
pub(crate) struct JsonLinesReader {
    lines: Lines<Box<dyn BufRead>>,
    line_number: usize,
    finished: bool,
}

impl JsonLinesReader {
    pub(crate) fn new(input: Box<dyn BufRead>) -> Self {
        Self {
            lines: input.lines(),
            line_number: 0,
            finished: false,
        }
    }
}

impl Iterator for JsonLinesReader {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let line = self.lines.next()?;
            self.line_number += 1;
            let location = format!("line {}", self.line_number);

            match line {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => return Some(parse_line(&line, &location)),
                // Invalid UTF-8 only spoils this line
                Err(e) if e.kind() == ErrorKind::InvalidData => {
                    return Some(Err(DatasetError::malformed(location, e.to_string())))
                },
                Err(e) => {
                    self.finished = true;
                    return Some(Err(DatasetError::Io(e)));
                },
            }
        }
        None
    }
}
