//! CSV export parsing, including e621 `posts-*.csv.gz` dumps

use super::{build_record, parse_flag, split_tags, RecordFields};
use crate::{
    error::{DatasetError, Result},
    types::Record,
};
use std::io::BufRead;
use std::str::FromStr;

/// Column positions resolved from the header row
#[derive(Debug)]
struct Columns {
    id: usize,
    tags: usize,
    file: Option<usize>,
    md5: Option<usize>,
    file_ext: Option<usize>,
    rating: Option<usize>,
    score: Option<usize>,
    fav_count: Option<usize>,
    width: Option<usize>,
    height: Option<usize>,
    is_deleted: Option<usize>,
    is_pending: Option<usize>,
    is_flagged: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &::csv::StringRecord) -> Result<Self> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|header| names.contains(&header.trim()))
        };

        let id = find(&["id"])
            .ok_or_else(|| DatasetError::malformed("header", "missing `id` column"))?;
        let tags = find(&["tags", "tag_string"])
            .ok_or_else(|| DatasetError::malformed("header", "missing `tags` or `tag_string` column"))?;

        let columns = Self {
            id,
            tags,
            file: find(&["file", "file_path", "path"]),
            md5: find(&["md5"]),
            file_ext: find(&["file_ext"]),
            rating: find(&["rating"]),
            score: find(&["score"]),
            fav_count: find(&["fav_count"]),
            width: find(&["width", "image_width"]),
            height: find(&["height", "image_height"]),
            is_deleted: find(&["is_deleted"]),
            is_pending: find(&["is_pending"]),
            is_flagged: find(&["is_flagged"]),
        };

        if columns.file.is_none() && (columns.md5.is_none() || columns.file_ext.is_none()) {
            return Err(DatasetError::malformed(
                "header",
                "missing `file` column (or `md5` and `file_ext`)",
            ));
        }
        Ok(columns)
    }
}

fn cell(row: &::csv::StringRecord, index: Option<usize>) -> Option<&str> {
    index
        .and_then(|index| row.get(index))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn number<T: FromStr>(
    row: &::csv::StringRecord,
    index: Option<usize>,
    name: &str,
    location: &str,
) -> Result<Option<T>> {
    cell(row, index)
        .map(|value| {
            value.parse::<T>().map_err(|_| {
                DatasetError::malformed(location, format!("`{name}` is not a number: '{value}'"))
            })
        })
        .transpose()
}

fn flag(row: &::csv::StringRecord, index: Option<usize>, name: &str, location: &str) -> Result<bool> {
    let value = cell(row, index).unwrap_or_default();
    parse_flag(value).ok_or_else(|| {
        DatasetError::malformed(location, format!("`{name}` is not a boolean: '{value}'"))
    })
}

/// Header-driven CSV reader; rows may have extra or missing trailing cells
pub(crate) struct CsvRecordReader {
    reader: ::csv::Reader<Box<dyn BufRead>>,
    columns: Columns,
    row: ::csv::StringRecord,
    row_number: usize,
    finished: bool,
}

impl CsvRecordReader {
    pub(crate) fn new(input: Box<dyn BufRead>) -> Result<Self> {
        let mut reader = ::csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(input);

        let headers = reader.headers().map_err(|e| {
            if e.is_io_error() {
                DatasetError::Io(e.into())
            } else {
                DatasetError::malformed("header", e.to_string())
            }
        })?;
        let columns = Columns::from_headers(headers)?;

        Ok(Self {
            reader,
            columns,
            row: ::csv::StringRecord::new(),
            row_number: 0,
            finished: false,
        })
    }

    fn parse_row(&self, location: &str) -> Result<Record> {
        let row = &self.row;
        let columns = &self.columns;

        let id = cell(row, Some(columns.id))
            .ok_or_else(|| DatasetError::malformed(location, "empty `id`"))?
            .to_string();
        let tags = row
            .get(columns.tags)
            .map(split_tags)
            .ok_or_else(|| DatasetError::malformed(location, "missing tags cell"))?;

        let fields = RecordFields {
            id,
            tags,
            file: cell(row, columns.file).map(str::to_string),
            md5: cell(row, columns.md5).map(str::to_string),
            file_ext: cell(row, columns.file_ext).map(str::to_string),
            rating: cell(row, columns.rating).map(str::to_string),
            score: number(row, columns.score, "score", location)?,
            fav_count: number(row, columns.fav_count, "fav_count", location)?,
            width: number(row, columns.width, "width", location)?,
            height: number(row, columns.height, "height", location)?,
            is_deleted: flag(row, columns.is_deleted, "is_deleted", location)?,
            is_pending: flag(row, columns.is_pending, "is_pending", location)?,
            is_flagged: flag(row, columns.is_flagged, "is_flagged", location)?,
        };

        build_record(location, fields)
    }
}

impl Iterator for CsvRecordReader {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let read = self.reader.read_record(&mut self.row);
        self.row_number += 1;
        let location = format!("row {}", self.row_number);

        match read {
            Ok(true) => Some(self.parse_row(&location)),
            Ok(false) => {
                self.finished = true;
                None
            },
            Err(e) if e.is_io_error() => {
                self.finished = true;
                Some(Err(DatasetError::Io(e.into())))
            },
            Err(e) => Some(Err(DatasetError::malformed(location, e.to_string()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceReference;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn reader(input: &'static str) -> Result<CsvRecordReader> {
        CsvRecordReader::new(Box::new(Cursor::new(input.as_bytes())))
    }

    #[test]
    fn test_e621_dump_columns() {
        let records: Vec<_> = reader(
            "id,md5,rating,image_width,image_height,tag_string,fav_count,file_ext,is_deleted,score\n\
             42,0123456789abcdef0123456789abcdef,s,1024,768,\"wolf solo forest\",12,png,f,30\n",
        )
        .unwrap()
        .collect();

        assert_eq!(records.len(), 1);
        let record = records[0].as_ref().unwrap();
        assert_eq!(record.id, "42");
        assert_eq!(record.tags.len(), 3);
        assert_eq!(record.metadata.width, Some(1024));
        assert_eq!(record.metadata.fav_count, Some(12));
        assert_eq!(record.metadata.score, Some(30));
        assert!(!record.metadata.is_deleted);
        assert!(matches!(record.source, SourceReference::Md5 { .. }));
    }

    #[test]
    fn test_file_column_takes_precedence() {
        let records: Vec<_> = reader("id,tags,file,md5,file_ext\n1,a,imgs/1.jpg,,\n")
            .unwrap()
            .collect();
        assert_eq!(
            records[0].as_ref().unwrap().source,
            SourceReference::Path(PathBuf::from("imgs/1.jpg"))
        );
    }

    #[test]
    fn test_missing_required_columns() {
        assert!(matches!(
            reader("tags,file\na,1.png\n"),
            Err(DatasetError::MalformedExport { .. })
        ));
        assert!(matches!(
            reader("id,tags,md5\n1,a,abc\n"),
            Err(DatasetError::MalformedExport { .. })
        ));
    }

    #[test]
    fn test_bad_rows_are_skipped_individually() {
        let records: Vec<_> = reader(
            "id,tags,file,score\n\
             1,a,1.png,5\n\
             2,b,2.png,lots\n\
             ,c,3.png,1\n\
             4,d\n\
             5,e,5.png,\n",
        )
        .unwrap()
        .collect();

        assert_eq!(records.len(), 5);
        assert!(records[0].is_ok());
        match &records[1] {
            Err(DatasetError::MalformedExport { location, .. }) => assert_eq!(location, "row 2"),
            other => panic!("expected malformed row, got {other:?}"),
        }
        assert!(records[2].is_err());
        // Short row: no file cell, no md5 columns
        assert!(records[3].is_err());
        let last = records[4].as_ref().unwrap();
        assert_eq!(last.id, "5");
        assert_eq!(last.metadata.score, None);
    }
}
