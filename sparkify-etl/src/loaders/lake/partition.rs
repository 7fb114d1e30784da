//! Partitioned parquet layout and atomic partition overwrite
//!
//! Layout: `<root>/<table>/<col>=<value>/.../part-<uuid>.snappy.parquet`.
//! Values are escaped the way Hive does it, with
//! `__HIVE_DEFAULT_PARTITION__` for an empty value.
//!
//! An overwrite writes the new file set into a hidden sibling directory,
//! then swaps it in with two renames. Readers never look at dot-prefixed
//! entries, so they see either the old or the new file set.

use super::columnar;
use crate::error::StoreError;
use crate::models::{Entity, Row};
use crate::services::build_time_bucket;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;
use walkdir::WalkDir;

pub const DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// Partition columns per table, outermost first
pub fn partition_columns(entity: Entity) -> &'static [&'static str] {
    match entity {
        Entity::Songs => &["year", "artist_id"],
        Entity::Time | Entity::Songplays => &["year", "month"],
        Entity::Artists | Entity::Users => &[],
    }
}

/// One partition of one table; unpartitioned tables have a single empty key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub entity: Entity,
    /// (column, raw value) pairs in [`partition_columns`] order
    pub values: Vec<(String, String)>,
}

impl PartitionKey {
    pub fn unpartitioned(entity: Entity) -> Self {
        Self {
            entity,
            values: Vec::new(),
        }
    }

    /// Partition a row belongs to
    pub fn for_row(row: &Row) -> Self {
        let entity = row.entity();
        let raw: Vec<String> = match row {
            Row::Song(s) => vec![s.year.to_string(), s.artist_id.clone()],
            Row::Time(t) => vec![t.year.to_string(), t.month.to_string()],
            Row::Songplay(p) => {
                let calendar = build_time_bucket(p.start_time);
                vec![calendar.year.to_string(), calendar.month.to_string()]
            }
            Row::Artist(_) | Row::User(_) => Vec::new(),
        };

        Self {
            entity,
            values: partition_columns(entity)
                .iter()
                .map(|c| c.to_string())
                .zip(raw)
                .collect(),
        }
    }

    /// Directory of this partition relative to the lake root
    pub fn relative_path(&self) -> PathBuf {
        let mut path = PathBuf::from(self.entity.table_name());
        for (column, value) in &self.values {
            path.push(format!("{}={}", column, escape_value(value)));
        }
        path
    }

    pub fn dir(&self, root: &Path) -> PathBuf {
        root.join(self.relative_path())
    }
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.relative_path().display())
    }
}

fn needs_escape(c: char) -> bool {
    c.is_control()
        || matches!(
            c,
            '"' | '#' | '%' | '\'' | '*' | '/' | ':' | '=' | '?' | '\\' | '\x7F' | '{' | '[' | ']' | '^'
        )
}

/// Hive-style escaping of a partition value
pub fn escape_value(value: &str) -> String {
    if value.is_empty() {
        return DEFAULT_PARTITION.to_string();
    }

    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if needs_escape(c) {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                escaped.push_str(&format!("%{:02X}", byte));
            }
        } else {
            escaped.push(c);
        }
    }
    escaped
}

/// Inverse of [`escape_value`]
pub fn unescape_value(value: &str) -> String {
    if value == DEFAULT_PARTITION {
        return String::new();
    }

    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            let hex = [bytes[i + 1], bytes[i + 2]];
            let decoded = std::str::from_utf8(&hex)
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok());
            if let Some(byte) = decoded {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Every partition of a table present under `root`
pub fn list_partitions(root: &Path, entity: Entity) -> Result<Vec<PartitionKey>, StoreError> {
    let table_dir = root.join(entity.table_name());
    if !table_dir.is_dir() {
        return Ok(Vec::new());
    }

    let columns = partition_columns(entity);
    if columns.is_empty() {
        return Ok(vec![PartitionKey::unpartitioned(entity)]);
    }

    let mut keys = Vec::new();
    let walker = WalkDir::new(&table_dir)
        .min_depth(columns.len())
        .max_depth(columns.len())
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));

    for entry in walker {
        let entry = entry.map_err(|e| StoreError::Fatal(format!("walking {}: {}", table_dir.display(), e)))?;
        if !entry.file_type().is_dir() {
            continue;
        }

        let relative = entry.path().strip_prefix(&table_dir).unwrap_or(entry.path());
        let mut values = Vec::with_capacity(columns.len());
        for (component, column) in relative.components().zip(columns.iter()) {
            let segment = component.as_os_str().to_string_lossy();
            match segment.split_once('=') {
                Some((name, value)) if name == *column => {
                    values.push((column.to_string(), unescape_value(value)));
                }
                _ => {
                    tracing::warn!("Ignoring unexpected directory {}", entry.path().display());
                    break;
                }
            }
        }

        if values.len() == columns.len() {
            keys.push(PartitionKey { entity, values });
        }
    }

    Ok(keys)
}

fn part_files(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if is_hidden(&entry.file_name()) || !entry.file_type()?.is_file() {
            continue;
        }
        if path.extension().map(|ext| ext == "parquet").unwrap_or(false) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// All rows stored in one partition
pub fn read_partition(root: &Path, key: &PartitionKey) -> Result<Vec<Row>, StoreError> {
    let mut rows = Vec::new();
    for path in part_files(&key.dir(root))? {
        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path)?)?.build()?;
        for batch in reader {
            rows.extend(columnar::from_batch(key.entity, &batch?)?);
        }
    }
    Ok(rows)
}

/// Row count of one partition, from file metadata only
pub fn partition_row_count(root: &Path, key: &PartitionKey) -> Result<u64, StoreError> {
    let mut total = 0u64;
    for path in part_files(&key.dir(root))? {
        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&path)?)?;
        total += builder.metadata().file_metadata().num_rows().max(0) as u64;
    }
    Ok(total)
}

fn write_parquet(path: &Path, entity: Entity, rows: &[Row]) -> Result<(), StoreError> {
    let batch = columnar::to_batch(entity, rows)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

/// A partition's new file set, written but not yet swapped in
#[derive(Debug)]
pub struct StagedPartition {
    key: PartitionKey,
    dir: PathBuf,
    staging: PathBuf,
    retired: PathBuf,
    empty: bool,
}

/// Write the new file set of one partition into a hidden sibling directory
///
/// Nothing readers see changes until [`StagedPartition::commit`].
pub fn stage_partition(root: &Path, key: &PartitionKey, rows: &[Row]) -> Result<StagedPartition, StoreError> {
    let dir = key.dir(root);
    let parent = dir
        .parent()
        .ok_or_else(|| StoreError::Fatal(format!("partition {} has no parent directory", key)))?
        .to_path_buf();
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| StoreError::Fatal(format!("partition {} has no directory name", key)))?;
    fs::create_dir_all(&parent)?;

    let run = Uuid::new_v4();
    let staging = parent.join(format!(".{}.tmp-{}", name, run));
    fs::create_dir_all(&staging)?;

    if !rows.is_empty() {
        let file = staging.join(format!("part-00000-{}.snappy.parquet", run));
        if let Err(e) = write_parquet(&file, key.entity, rows) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }
    }

    Ok(StagedPartition {
        key: key.clone(),
        retired: parent.join(format!(".{}.old-{}", name, run)),
        dir,
        staging,
        empty: rows.is_empty(),
    })
}

impl StagedPartition {
    /// Swap the staged file set in with two renames
    ///
    /// An empty file set removes the partition.
    pub fn commit(self) -> Result<(), StoreError> {
        let had_previous = self.dir.exists();
        if had_previous {
            if let Err(e) = fs::rename(&self.dir, &self.retired) {
                self.abandon();
                return Err(e.into());
            }
        }

        if self.empty {
            fs::remove_dir_all(&self.staging)?;
        } else if let Err(e) = fs::rename(&self.staging, &self.dir) {
            // Put the previous file set back
            if had_previous {
                let _ = fs::rename(&self.retired, &self.dir);
            }
            self.abandon();
            return Err(e.into());
        }

        if had_previous {
            if let Err(e) = fs::remove_dir_all(&self.retired) {
                tracing::warn!("Could not remove retired partition {}: {}", self.retired.display(), e);
            }
        }

        tracing::debug!(partition = %self.key, "Partition overwritten");
        Ok(())
    }

    /// Drop the staged file set, leaving the partition as it was
    pub fn abandon(self) {
        if let Err(e) = fs::remove_dir_all(&self.staging) {
            tracing::warn!("Could not remove staged partition {}: {}", self.staging.display(), e);
        }
    }
}

/// Replace the file set of one partition with `rows`
///
/// An empty `rows` removes the partition.
pub fn overwrite_partition(root: &Path, key: &PartitionKey, rows: &[Row]) -> Result<(), StoreError> {
    stage_partition(root, key, rows)?.commit()
}

/// Overwrite several partitions: stage every file set, then swap them in
///
/// `cancelled` is checked before each file set is staged and once more
/// before the first swap. Once it is set, the staged file sets are dropped
/// and no partition changes. The swaps themselves are not interrupted.
pub fn overwrite_partitions(
    root: &Path,
    partitions: &[(PartitionKey, Vec<Row>)],
    cancelled: &AtomicBool,
) -> Result<usize, StoreError> {
    let mut staged = Vec::with_capacity(partitions.len());
    for (key, rows) in partitions {
        if cancelled.load(Ordering::SeqCst) {
            break;
        }
        match stage_partition(root, key, rows) {
            Ok(partition) => staged.push(partition),
            Err(e) => {
                staged.into_iter().for_each(StagedPartition::abandon);
                return Err(e);
            }
        }
    }

    if cancelled.load(Ordering::SeqCst) {
        staged.into_iter().for_each(StagedPartition::abandon);
        return Err(StoreError::Fatal("partition overwrite cancelled before commit".into()));
    }

    let total = staged.len();
    let mut staged = staged.into_iter();
    while let Some(partition) = staged.next() {
        if let Err(e) = partition.commit() {
            staged.for_each(StagedPartition::abandon);
            return Err(e);
        }
    }
    Ok(total)
}
