//! Image file lookup
//!
//! Resolves a record's [`SourceReference`] to a file on disk. Lookup order:
//!
//! 1. absolute paths as given
//! 2. every image root, in configuration order
//! 3. the local image cache directory
//! 4. the optional file-stem index of the roots
//!
//! `Md5` references are tried in e621's nested layout (`ab/cd/abcd….ext`) before
//! the flat layout (`abcd….ext`) in each directory.

use crate::{
    error::{DatasetError, Result},
    types::{Record, SourceReference},
};
use std::collections::HashMap;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Environment variable overriding the default image cache directory
pub const CACHE_DIR_ENV: &str = "E621_NOAPI_CACHE_DIR";

/// Locates image files for records
#[derive(Debug, Clone, Default)]
pub struct ImageLocator {
    roots: Vec<PathBuf>,
    cache_dir: Option<PathBuf>,
    index: Option<HashMap<String, PathBuf>>,
}

impl ImageLocator {
    /// Create a locator over the given roots and optional cache directory
    #[must_use]
    pub fn new(roots: Vec<PathBuf>, cache_dir: Option<PathBuf>) -> Self {
        Self {
            roots,
            cache_dir,
            index: None,
        }
    }

    /// Default cache directory: `$E621_NOAPI_CACHE_DIR`, else the platform cache
    /// directory joined with `e621-noapi/images`
    #[must_use]
    pub fn default_cache_dir() -> Option<PathBuf> {
        std::env::var_os(CACHE_DIR_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .or_else(|| dirs::cache_dir().map(|dir| dir.join("e621-noapi").join("images")))
    }

    #[must_use]
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    #[must_use]
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    /// Directories searched, roots first then the cache
    fn search_dirs(&self) -> impl Iterator<Item = &PathBuf> {
        self.roots.iter().chain(self.cache_dir.iter())
    }

    /// Index every file below the roots and the cache by file stem
    ///
    /// The first file found for a stem wins; directories are walked in root order
    /// with entries sorted by name so the result is deterministic.
    ///
    /// Returns the number of indexed files.
    pub fn build_index(&mut self) -> usize {
        let mut index = HashMap::new();

        for dir in self.search_dirs() {
            if !dir.is_dir() {
                log::debug!("Skipping index of missing directory {}", dir.display());
                continue;
            }
            for entry in WalkDir::new(dir)
                .sort_by_file_name()
                .into_iter()
                .filter_map(std::result::Result::ok)
                .filter(|entry| entry.file_type().is_file())
            {
                if let Some(stem) = entry.path().file_stem().and_then(|stem| stem.to_str()) {
                    index
                        .entry(stem.to_string())
                        .or_insert_with(|| entry.path().to_path_buf());
                }
            }
        }

        let count = index.len();
        log::info!("Indexed {} image files", count);
        self.index = Some(index);
        count
    }

    /// Candidate paths for a reference, in lookup order
    #[must_use]
    pub fn candidates(&self, source: &SourceReference) -> Vec<PathBuf> {
        match source {
            SourceReference::Path(path) if path.is_absolute() => vec![path.clone()],
            SourceReference::Path(path) => self.search_dirs().map(|dir| dir.join(path)).collect(),
            SourceReference::Md5 { md5, ext } => {
                let file_name = format!("{md5}.{ext}");
                let nested = match (md5.get(0..2), md5.get(2..4)) {
                    (Some(first), Some(second)) => Some(Path::new(first).join(second)),
                    _ => None,
                };
                self.search_dirs()
                    .flat_map(|dir| {
                        let nested = nested
                            .as_ref()
                            .map(|nested| dir.join(nested).join(&file_name));
                        nested.into_iter().chain(std::iter::once(dir.join(&file_name)))
                    })
                    .collect()
            },
        }
    }

    fn index_lookup(&self, source: &SourceReference) -> Option<&PathBuf> {
        let index = self.index.as_ref()?;
        let stem = match source {
            SourceReference::Path(path) => path.file_stem()?.to_str()?.to_string(),
            SourceReference::Md5 { md5, .. } => md5.clone(),
        };
        index.get(&stem)
    }

    /// Resolve a record's image to a readable file
    ///
    /// # Errors
    /// - `DatasetError::ImageNotFound` when no candidate exists
    /// - `DatasetError::ImageUnreadable` when a candidate exists but cannot be opened
    pub fn locate(&self, record: &Record) -> Result<PathBuf> {
        let indexed = self.index_lookup(&record.source).cloned();

        for candidate in self.candidates(&record.source).into_iter().chain(indexed) {
            match std::fs::metadata(&candidate) {
                Ok(metadata) if metadata.is_file() => {
                    File::open(&candidate)
                        .map_err(|e| DatasetError::image_unreadable(&candidate, e.to_string()))?;
                    return Ok(candidate);
                },
                Ok(_) => {
                    return Err(DatasetError::image_unreadable(
                        &candidate,
                        "not a regular file",
                    ))
                },
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(DatasetError::image_unreadable(&candidate, e.to_string())),
            }
        }

        Err(DatasetError::image_not_found(&record.id, &record.source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordMetadata;
    use tempfile::TempDir;

    const MD5: &str = "abcdef0123456789abcdef0123456789";

    fn record(source: SourceReference) -> Record {
        Record {
            id: "1".to_string(),
            tags: Default::default(),
            source,
            metadata: RecordMetadata::default(),
        }
    }

    fn md5_ref() -> SourceReference {
        SourceReference::Md5 {
            md5: MD5.to_string(),
            ext: "png".to_string(),
        }
    }

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_md5_candidate_order() {
        let locator = ImageLocator::new(vec![PathBuf::from("/r1")], Some(PathBuf::from("/cache")));
        let candidates = locator.candidates(&md5_ref());
        let name = format!("{MD5}.png");
        assert_eq!(
            candidates,
            vec![
                PathBuf::from("/r1/ab/cd").join(&name),
                PathBuf::from("/r1").join(&name),
                PathBuf::from("/cache/ab/cd").join(&name),
                PathBuf::from("/cache").join(&name),
            ]
        );
    }

    #[test]
    fn test_roots_are_searched_in_order() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        touch(&second.path().join("img/1.png"));

        let locator = ImageLocator::new(
            vec![first.path().to_path_buf(), second.path().to_path_buf()],
            None,
        );
        let source = SourceReference::Path(PathBuf::from("img/1.png"));
        assert_eq!(
            locator.locate(&record(source.clone())).unwrap(),
            second.path().join("img/1.png")
        );

        touch(&first.path().join("img/1.png"));
        assert_eq!(
            locator.locate(&record(source)).unwrap(),
            first.path().join("img/1.png")
        );
    }

    #[test]
    fn test_absolute_path_and_cache() {
        let cache = TempDir::new().unwrap();
        let nested = cache.path().join("ab/cd").join(format!("{MD5}.png"));
        touch(&nested);

        let locator = ImageLocator::new(Vec::new(), Some(cache.path().to_path_buf()));
        assert_eq!(locator.locate(&record(md5_ref())).unwrap(), nested);

        let absolute = SourceReference::Path(nested.clone());
        assert_eq!(ImageLocator::default().locate(&record(absolute)).unwrap(), nested);
    }

    #[test]
    fn test_not_found_and_directory() {
        let root = TempDir::new().unwrap();
        let locator = ImageLocator::new(vec![root.path().to_path_buf()], None);

        let missing = locator.locate(&record(md5_ref()));
        assert!(matches!(missing, Err(DatasetError::ImageNotFound { .. })));

        std::fs::create_dir(root.path().join("dir.png")).unwrap();
        let directory = locator.locate(&record(SourceReference::Path(PathBuf::from("dir.png"))));
        assert!(matches!(directory, Err(DatasetError::ImageUnreadable { .. })));
    }

    #[test]
    fn test_stem_index_finds_foreign_layouts() {
        let root = TempDir::new().unwrap();
        let odd = root.path().join("some/other/place").join(format!("{MD5}.jpg"));
        touch(&odd);

        let mut locator = ImageLocator::new(vec![root.path().to_path_buf()], None);
        assert!(locator.locate(&record(md5_ref())).is_err());

        assert_eq!(locator.build_index(), 1);
        assert_eq!(locator.locate(&record(md5_ref())).unwrap(), odd);
    }
}
