//! Raw-record source provider
//!
//! A source declares the kind of record it yields, enumerates its items
//! (files) up front and hands out a fresh line iterator per item, so any
//! item can be re-read. Sources hold no store connection.

use crate::error::{ParseError, SourceError};
use crate::models::RecordKind;

/// One enumerable unit of input (a file for directory sources)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceItem {
    /// Stable name, unique within the source
    pub name: String,
    pub size_bytes: u64,
}

/// One raw line of line-delimited JSON, undecoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// 1-based line number within the item
    pub line: usize,
    pub bytes: Vec<u8>,
}

impl RawLine {
    pub fn new(line: usize, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            line,
            bytes: bytes.into(),
        }
    }

    /// The line as text; bad encoding is a per-line parse failure
    pub fn text(&self) -> Result<&str, ParseError> {
        std::str::from_utf8(&self.bytes).map_err(|e| ParseError::InvalidUtf8(e.valid_up_to()))
    }

    pub fn is_blank(&self) -> bool {
        self.bytes.iter().all(u8::is_ascii_whitespace)
    }
}

pub type RecordIter<'a> = Box<dyn Iterator<Item = Result<RawLine, SourceError>> + Send + 'a>;

/// Restartable provider of raw records of one kind
pub trait RecordSource: Send + Sync {
    fn kind(&self) -> RecordKind;

    /// Human-readable location for logs
    fn describe(&self) -> String;

    /// Verify the source is usable before discovery
    fn check(&self) -> Result<(), SourceError>;

    /// Enumerate items in a stable order
    fn discover(&self) -> Result<Vec<SourceItem>, SourceError>;

    /// Lines of the named item; blank lines are not yielded
    fn records(&self, item: &str) -> Result<RecordIter<'_>, SourceError>;

    /// (item count, total bytes)
    fn size_hint(&self) -> Result<(usize, u64), SourceError> {
        let items = self.discover()?;
        let bytes = items.iter().map(|i| i.size_bytes).sum();
        Ok((items.len(), bytes))
    }
}

/// Source backed by in-memory lines
#[derive(Debug, Clone)]
pub struct MemorySource {
    kind: RecordKind,
    items: Vec<(String, Vec<Vec<u8>>)>,
}

impl MemorySource {
    pub fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            items: Vec::new(),
        }
    }

    /// Add an item holding the given lines
    pub fn with_item<S: Into<Vec<u8>>>(mut self, name: &str, lines: Vec<S>) -> Self {
        self.items
            .push((name.to_string(), lines.into_iter().map(Into::into).collect()));
        self
    }
}

impl RecordSource for MemorySource {
    fn kind(&self) -> RecordKind {
        self.kind
    }

    fn describe(&self) -> String {
        format!("memory ({} items)", self.items.len())
    }

    fn check(&self) -> Result<(), SourceError> {
        Ok(())
    }

    fn discover(&self) -> Result<Vec<SourceItem>, SourceError> {
        Ok(self
            .items
            .iter()
            .map(|(name, lines)| SourceItem {
                name: name.clone(),
                size_bytes: lines.iter().map(|l| l.len() as u64 + 1).sum(),
            })
            .collect())
    }

    fn records(&self, item: &str) -> Result<RecordIter<'_>, SourceError> {
        let (_, lines) = self
            .items
            .iter()
            .find(|(name, _)| name == item)
            .ok_or_else(|| SourceError::UnknownItem(item.to_string()))?;

        Ok(Box::new(
            lines
                .iter()
                .enumerate()
                .map(|(i, bytes)| RawLine::new(i + 1, bytes.clone()))
                .filter(|line| !line.is_blank())
                .map(Ok),
        ))
    }
}
