//! Dataset output writer
//!
//! Every record is written all-or-nothing: its files are staged as temporary files
//! inside the output directory and renamed into place only once all of them have
//! been written. A failed rename removes the files already renamed for that record.

use crate::{
    config::CaptionStyle,
    error::{DatasetError, Result},
    transform::EncodedImage,
    types::{DatasetEntry, Record, RecordMetadata, SourceReference},
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Manifest file name, one JSON line per dataset entry
pub const MANIFEST_FILE: &str = "manifest.jsonl";

/// Token database file name
pub const TOKEN_DB_FILE: &str = "tokens.txt";

/// Render a caption from a tag set
///
/// ```rust
/// use e621_noapi::{packager::format_caption, CaptionStyle};
///
/// let tags = ["wolf", "blue_eyes"].iter().map(|t| t.to_string()).collect();
/// assert_eq!(format_caption(&tags, &CaptionStyle::default()), "blue_eyes, wolf");
/// ```
#[must_use]
pub fn format_caption(tags: &BTreeSet<String>, style: &CaptionStyle) -> String {
    tags.iter()
        .map(|tag| {
            if style.replace_underscores {
                tag.replace('_', " ")
            } else {
                tag.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(&style.separator)
}

/// JSON sidecar written next to each image with `store_metadata`
#[derive(Debug, Serialize)]
struct MetadataSidecar<'a> {
    id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    crop_index: Option<usize>,
    tags: &'a BTreeSet<String>,
    source: &'a SourceReference,
    metadata: &'a RecordMetadata,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Writes dataset entries, the manifest and the token database
pub struct DatasetPackager {
    output_dir: PathBuf,
    caption: CaptionStyle,
    store_metadata: bool,
    manifest: BufWriter<File>,
    token_counts: BTreeMap<String, usize>,
    entries_written: usize,
}

impl DatasetPackager {
    /// Prepare the output directory and start a new manifest
    ///
    /// # Errors
    /// - `DatasetError::Write` when the directory or the manifest cannot be created
    pub fn create<P: AsRef<Path>>(
        output_dir: P,
        caption: CaptionStyle,
        store_metadata: bool,
    ) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&output_dir)
            .map_err(|e| DatasetError::write_error("create output directory", &output_dir, e))?;

        let manifest_path = output_dir.join(MANIFEST_FILE);
        let manifest = File::create(&manifest_path)
            .map_err(|e| DatasetError::write_error("create manifest", &manifest_path, e))?;

        log::debug!("Packaging dataset into {}", output_dir.display());
        Ok(Self {
            output_dir,
            caption,
            store_metadata,
            manifest: BufWriter::new(manifest),
            token_counts: BTreeMap::new(),
            entries_written: 0,
        })
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    #[must_use]
    pub fn entries_written(&self) -> usize {
        self.entries_written
    }

    /// Tag counts over every packaged record so far
    #[must_use]
    pub fn token_counts(&self) -> &BTreeMap<String, usize> {
        &self.token_counts
    }

    fn stage(&self, bytes: &[u8], target: &Path) -> Result<NamedTempFile> {
        let mut temp = tempfile::Builder::new()
            .prefix(".staging-")
            .tempfile_in(&self.output_dir)
            .map_err(|e| DatasetError::write_error("stage", target, e))?;
        temp.write_all(bytes)
            .and_then(|()| temp.flush())
            .map_err(|e| DatasetError::write_error("stage", target, e))?;
        Ok(temp)
    }

    fn remove_all(paths: &[PathBuf]) {
        for path in paths {
            if let Err(e) = std::fs::remove_file(path) {
                log::warn!("Failed to remove partial output {}: {}", path.display(), e);
            }
        }
    }

    /// Write all images of one record with their sidecars and manifest lines
    ///
    /// # Arguments
    /// * `record` - Source record
    /// * `images` - Encoded images, one per crop window
    /// * `extension` - Image file extension for the output format
    ///
    /// # Errors
    /// - `DatasetError::Write` on any filesystem failure; no file of the record
    ///   is left behind in that case
    /// - `DatasetError::Serialization` if a sidecar cannot be serialized
    pub fn package(
        &mut self,
        record: &Record,
        images: &[EncodedImage],
        extension: &str,
    ) -> Result<Vec<DatasetEntry>> {
        let caption = format_caption(&record.tags, &self.caption);
        let mut staged = Vec::new();
        let mut entries = Vec::with_capacity(images.len());

        for image in images {
            let stem = match image.crop_index {
                Some(index) => format!("{}_{index}", record.id),
                None => record.id.clone(),
            };
            let image_name = PathBuf::from(format!("{stem}.{extension}"));
            let caption_name = PathBuf::from(format!("{stem}.txt"));

            staged.push((self.stage(&image.bytes, &image_name)?, image_name.clone()));
            staged.push((self.stage(caption.as_bytes(), &caption_name)?, caption_name.clone()));

            let metadata_name = if self.store_metadata {
                let name = PathBuf::from(format!("{stem}.json"));
                let sidecar = MetadataSidecar {
                    id: &record.id,
                    crop_index: image.crop_index,
                    tags: &record.tags,
                    source: &record.source,
                    metadata: &record.metadata,
                };
                let mut json = serde_json::to_vec_pretty(&sidecar)?;
                json.push(b'\n');
                staged.push((self.stage(&json, &name)?, name.clone()));
                Some(name)
            } else {
                None
            };

            entries.push(DatasetEntry {
                id: record.id.clone(),
                crop_index: image.crop_index,
                image: image_name,
                caption: caption_name,
                metadata: metadata_name,
                sha256: sha256_hex(&image.bytes),
                width: image.width,
                height: image.height,
                tags: record.tags.clone(),
            });
        }

        let mut persisted = Vec::with_capacity(staged.len());
        for (temp, name) in staged {
            let target = self.output_dir.join(&name);
            if let Err(e) = temp.persist(&target) {
                Self::remove_all(&persisted);
                return Err(DatasetError::write_error("persist", &target, e.error));
            }
            persisted.push(target);
        }

        if let Err(e) = self.append_manifest(&entries) {
            Self::remove_all(&persisted);
            return Err(e);
        }

        for tag in &record.tags {
            *self.token_counts.entry(tag.clone()).or_insert(0) += 1;
        }
        self.entries_written += entries.len();
        Ok(entries)
    }

    fn append_manifest(&mut self, entries: &[DatasetEntry]) -> Result<()> {
        let manifest_path = self.output_dir.join(MANIFEST_FILE);
        for entry in entries {
            let line = serde_json::to_string(entry)?;
            writeln!(self.manifest, "{line}")
                .map_err(|e| DatasetError::write_error("append to manifest", &manifest_path, e))?;
        }
        self.manifest
            .flush()
            .map_err(|e| DatasetError::write_error("flush manifest", &manifest_path, e))
    }

    /// Token database lines: `<tag> <count>`, most frequent first, ties by tag
    #[must_use]
    pub fn token_lines(&self) -> Vec<String> {
        let mut tokens: Vec<(&String, &usize)> = self.token_counts.iter().collect();
        tokens.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        tokens
            .into_iter()
            .map(|(tag, count)| format!("{tag} {count}"))
            .collect()
    }

    /// Write `tokens.txt` into the output directory
    ///
    /// # Errors
    /// - `DatasetError::Write` on filesystem failure
    pub fn write_token_db(&self) -> Result<PathBuf> {
        let target = self.output_dir.join(TOKEN_DB_FILE);
        let mut content = self.token_lines().join("\n");
        if !content.is_empty() {
            content.push('\n');
        }

        let temp = self.stage(content.as_bytes(), Path::new(TOKEN_DB_FILE))?;
        temp.persist(&target)
            .map_err(|e| DatasetError::write_error("persist", &target, e.error))?;

        log::info!(
            "Wrote {} tokens to {}",
            self.token_counts.len(),
            target.display()
        );
        Ok(target)
    }
}
