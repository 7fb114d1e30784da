//! JSON file scanner
//!
//! Directory-backed [`RecordSource`]: a recursive walk collecting `*.json`
//! files in file-name order, each read as line-delimited JSON. Hidden
//! entries and notebook checkpoint folders are skipped.

use super::record_source::{RawLine, RecordIter, RecordSource, SourceItem};
use crate::error::SourceError;
use crate::models::RecordKind;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Line-delimited JSON files under one root directory
#[derive(Debug, Clone)]
pub struct JsonDirSource {
    root: PathBuf,
    kind: RecordKind,
    ignore_patterns: Vec<String>,
}

impl JsonDirSource {
    /// Create a source with the default ignore patterns
    pub fn new(root: impl Into<PathBuf>, kind: RecordKind) -> Self {
        Self {
            root: root.into(),
            kind,
            ignore_patterns: vec![".ipynb_checkpoints".to_string(), "__MACOSX".to_string()],
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn should_process_entry(&self, entry: &DirEntry) -> bool {
        // The root itself may be "." or similar
        if entry.depth() == 0 {
            return true;
        }

        let file_name = entry.file_name().to_string_lossy();
        if file_name.starts_with('.') {
            return false;
        }

        !self
            .ignore_patterns
            .iter()
            .any(|pattern| file_name.contains(pattern.as_str()))
    }

    fn item_path(&self, item: &str) -> PathBuf {
        self.root.join(item)
    }
}

fn is_json_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

impl RecordSource for JsonDirSource {
    fn kind(&self) -> RecordKind {
        self.kind
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn check(&self) -> Result<(), SourceError> {
        if !self.root.exists() {
            return Err(SourceError::PathNotFound(self.root.clone()));
        }
        if !self.root.is_dir() {
            return Err(SourceError::NotADirectory(self.root.clone()));
        }
        Ok(())
    }

    fn discover(&self) -> Result<Vec<SourceItem>, SourceError> {
        self.check()?;

        let mut items = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| self.should_process_entry(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    // Continue scanning, don't abort
                    tracing::warn!("Error accessing entry under {}: {}", self.root.display(), e);
                    continue;
                }
            };

            if !entry.file_type().is_file() || !is_json_file(entry.path()) {
                continue;
            }

            let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            let size_bytes = match entry.metadata() {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    tracing::warn!("Cannot stat {}: {}", entry.path().display(), e);
                    0
                }
            };

            items.push(SourceItem { name, size_bytes });
        }

        tracing::debug!(
            root = %self.root.display(),
            kind = %self.kind,
            files = items.len(),
            "Discovered source files"
        );

        Ok(items)
    }

    fn records(&self, item: &str) -> Result<RecordIter<'_>, SourceError> {
        let path = self.item_path(item);
        let file = File::open(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                SourceError::UnknownItem(item.to_string())
            } else {
                SourceError::Io {
                    path: path.display().to_string(),
                    source,
                }
            }
        })?;

        // Split on raw bytes: decoding happens per line, so one badly
        // encoded line does not end the file
        let display = path.display().to_string();
        let lines = BufReader::new(file).split(b'\n').enumerate().filter_map(move |(i, line)| {
            match line {
                Ok(mut bytes) => {
                    if bytes.last() == Some(&b'\r') {
                        bytes.pop();
                    }
                    let line = RawLine::new(i + 1, bytes);
                    (!line.is_blank()).then_some(Ok(line))
                }
                Err(source) => Some(Err(SourceError::Io {
                    path: display.clone(),
                    source,
                })),
            }
        });

        Ok(Box::new(lines))
    }
}
