//! Shared fixtures for the integration tests: synthetic images and exports

#![allow(dead_code)]

use e621_noapi::{PipelineConfig, PipelineConfigBuilder};
use flate2::{write::GzEncoder, Compression};
use image::{Rgb, RgbImage};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// One record of a synthetic JSON Lines export
pub struct TestRecord {
    pub id: String,
    pub tags: Vec<String>,
    pub file: String,
}

impl TestRecord {
    pub fn new(id: &str, tags: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            tags: tags.iter().map(|tag| (*tag).to_string()).collect(),
            file: format!("{id}.png"),
        }
    }

    pub fn with_file(mut self, file: &str) -> Self {
        self.file = file.to_string();
        self
    }

    fn to_json_line(&self) -> String {
        serde_json::json!({
            "id": self.id,
            "tags": self.tags,
            "file": self.file,
        })
        .to_string()
    }
}

/// Temporary workspace holding an export, an image root and output directories
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        std::fs::create_dir_all(dir.path().join("images")).expect("Failed to create image root");
        std::fs::create_dir_all(dir.path().join("cache")).expect("Failed to create cache dir");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn images(&self) -> PathBuf {
        self.path().join("images")
    }

    pub fn output(&self, name: &str) -> PathBuf {
        self.path().join(name)
    }

    /// Write a JSON Lines export and return its path
    pub fn write_jsonl(&self, records: &[TestRecord]) -> PathBuf {
        let content: String = records
            .iter()
            .map(|record| record.to_json_line() + "\n")
            .collect();
        self.write_raw("posts.jsonl", content.as_bytes())
    }

    /// Write a gzip compressed CSV export and return its path
    pub fn write_csv_gz(&self, name: &str, csv: &str) -> PathBuf {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(csv.as_bytes()).expect("Failed to compress CSV");
        let bytes = encoder.finish().expect("Failed to finish gzip stream");
        self.write_raw(name, &bytes)
    }

    pub fn write_raw(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.path().join(name);
        std::fs::write(&path, bytes).expect("Failed to write fixture");
        path
    }

    /// Write a gradient PNG into the image root
    pub fn write_image(&self, relative: &str, width: u32, height: u32) -> PathBuf {
        let path = self.images().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create image directory");
        }
        gradient(width, height)
            .save(&path)
            .expect("Failed to save test image");
        path
    }

    /// Builder preconfigured with this workspace's image root and cache
    pub fn config(&self, export: &Path, output: &str) -> PipelineConfigBuilder {
        PipelineConfig::builder()
            .export(export)
            .output_dir(self.output(output))
            .image_root(self.images())
            .cache_dir(self.path().join("cache"))
            .target_size(32, 32)
    }
}

pub fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x + y) % 256) as u8,
        ])
    })
}

/// Every regular file below `dir`, keyed by relative path
pub fn read_tree(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let relative = entry
                .path()
                .strip_prefix(dir)
                .expect("Entry below root")
                .to_path_buf();
            let bytes = std::fs::read(entry.path()).expect("Failed to read output file");
            (relative, bytes)
        })
        .collect()
}

/// Names of the image files written to `dir`, sorted
pub fn image_names(dir: &Path, extension: &str) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("Failed to list output")
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| name.ends_with(&format!(".{extension}")))
        .collect();
    names.sort();
    names
}

/// Parsed lines of `manifest.jsonl`
pub fn manifest(dir: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(dir.join("manifest.jsonl"))
        .expect("Failed to read manifest")
        .lines()
        .map(|line| serde_json::from_str(line).expect("Invalid manifest line"))
        .collect()
}
