//! Lake loader: partitioned parquet tables under one root directory
//!
//! `load` only buffers rows by partition. `flush` rebuilds each touched
//! partition from this run's rows alone (deduplicated with the same
//! per-entity policy as the SQL backends) and overwrites its file set, so
//! rows whose source records are gone do not survive a rerun. Partitions
//! whose content would not change are left alone.

pub mod columnar;
pub mod partition;

pub use partition::PartitionKey;

use super::{apply_row_policy, ExecutionModel, Loader, MemoryRowStore, PartitionStore};
use crate::error::{EtlResult, StoreError};
use crate::models::{Entity, EntityCounts, LoadStats, Row, RowBatch, UnitId};
use crate::services::{CatalogEntry, CatalogIndex};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub struct LakeLoader {
    root: PathBuf,
    pending: Mutex<BTreeMap<PartitionKey, Vec<Row>>>,
    /// Held by the blocking task that writes partitions, which can outlive
    /// a dropped flush
    writer: Arc<Mutex<()>>,
}

/// New content of one partition and what writing it changes
struct PartitionPlan {
    rows: Vec<Row>,
    stats: LoadStats,
    changed: bool,
    /// Stored rows with no counterpart in this run
    removed: usize,
}

/// Raises the flag when the owning flush is dropped, e.g. on timeout
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl LakeLoader {
    /// Open the lake rooted at `root`, creating the directory if needed
    pub fn open(root: &Path) -> EtlResult<Self> {
        std::fs::create_dir_all(root).map_err(|e| {
            crate::error::EtlError::Configuration(format!(
                "cannot create output directory {}: {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self {
            root: root.to_path_buf(),
            pending: Mutex::new(BTreeMap::new()),
            writer: Arc::new(Mutex::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rows buffered and not yet flushed
    #[cfg(test)]
    async fn pending_rows(&self) -> usize {
        self.pending.lock().await.values().map(Vec::len).sum()
    }

    /// Deduplicate this run's rows for a partition and compare them with
    /// the stored file set they will replace
    async fn plan_partition(
        &self,
        key: &PartitionKey,
        incoming: &[Row],
    ) -> Result<PartitionPlan, StoreError> {
        let mut fresh = MemoryRowStore::new();
        let in_run = apply_row_policy(&mut fresh, incoming).await?;
        let rows = fresh.into_rows();

        let existing = self.read_partition(key).await?;
        let changed = rows != existing;
        let stored = MemoryRowStore::from_rows(existing);

        let mut stats = LoadStats {
            updated: in_run.updated,
            duplicates: in_run.duplicates,
            ..LoadStats::default()
        };
        let mut kept = 0usize;
        for row in &rows {
            let entity = row.entity();
            match stored.get(&row.natural_key()) {
                None => stats.inserted.add(entity, 1),
                Some(previous) => {
                    kept += 1;
                    if previous == row {
                        stats.duplicates.add(entity, 1);
                    } else {
                        stats.updated.add(entity, 1);
                    }
                }
            }
        }

        Ok(PartitionPlan {
            rows,
            stats,
            changed,
            removed: stored.len().saturating_sub(kept),
        })
    }

    async fn read_table(&self, entity: Entity) -> Result<Vec<Row>, StoreError> {
        let root = self.root.clone();
        blocking(move || {
            let mut rows = Vec::new();
            for key in partition::list_partitions(&root, entity)? {
                rows.extend(partition::read_partition(&root, &key)?);
            }
            Ok(rows)
        })
        .await
    }
}

/// Run partition file I/O off the async workers
async fn blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Fatal(format!("partition I/O task failed: {}", e)))?
}

#[async_trait]
impl PartitionStore for LakeLoader {
    async fn read_partition(&self, key: &PartitionKey) -> Result<Vec<Row>, StoreError> {
        let root = self.root.clone();
        let key = key.clone();
        blocking(move || partition::read_partition(&root, &key)).await
    }

    async fn overwrite_partition(&self, key: &PartitionKey, rows: &[Row]) -> Result<(), StoreError> {
        let root = self.root.clone();
        let key = key.clone();
        let rows = rows.to_vec();
        blocking(move || partition::overwrite_partition(&root, &key, &rows)).await
    }
}

#[async_trait]
impl Loader for LakeLoader {
    fn name(&self) -> &'static str {
        "lake"
    }

    fn execution_model(&self) -> ExecutionModel {
        ExecutionModel::PartitionOverwrite
    }

    async fn load(&self, unit: UnitId, batch: &RowBatch) -> Result<LoadStats, StoreError> {
        let mut pending = self.pending.lock().await;
        for row in &batch.rows {
            pending
                .entry(PartitionKey::for_row(row))
                .or_default()
                .push(row.clone());
        }

        debug!(unit = %unit, rows = batch.len(), "Unit buffered");
        Ok(LoadStats::default())
    }

    async fn flush(&self) -> Result<LoadStats, StoreError> {
        let mut pending = self.pending.lock().await;
        let permit = Arc::clone(&self.writer).lock_owned().await;
        let mut stats = LoadStats::default();
        let mut removed = 0usize;
        let mut changed = Vec::new();

        for (key, incoming) in pending.iter() {
            let plan = self.plan_partition(key, incoming).await?;
            stats.merge(&plan.stats);
            removed += plan.removed;
            if plan.changed {
                changed.push((key.clone(), plan.rows));
            }
        }

        // Nothing is swapped in once this flush has been dropped
        let cancelled = Arc::new(AtomicBool::new(false));
        let _cancel_on_drop = CancelOnDrop(Arc::clone(&cancelled));
        let root = self.root.clone();
        let rewritten = blocking(move || {
            let _permit = permit;
            partition::overwrite_partitions(&root, &changed, &cancelled)
        })
        .await?;

        pending.clear();
        info!(
            partitions = rewritten,
            inserted = stats.inserted.total(),
            updated = stats.updated.total(),
            duplicates = stats.duplicates.total(),
            removed,
            "Lake flushed"
        );
        Ok(stats)
    }

    async fn discard(&self) {
        let mut pending = self.pending.lock().await;
        // Let a write left behind by a dropped flush settle first
        let _settled = self.writer.lock().await;
        let dropped: usize = pending.values().map(Vec::len).sum();
        pending.clear();
        if dropped > 0 {
            debug!(rows = dropped, "Discarded buffered rows");
        }
    }

    async fn catalog(&self) -> Result<CatalogIndex, StoreError> {
        let names: HashMap<String, String> = self
            .read_table(Entity::Artists)
            .await?
            .into_iter()
            .filter_map(|row| match row {
                Row::Artist(a) => Some((a.artist_id, a.name)),
                _ => None,
            })
            .collect();

        let entries = self
            .read_table(Entity::Songs)
            .await?
            .into_iter()
            .filter_map(|row| match row {
                Row::Song(s) => names.get(&s.artist_id).map(|name| CatalogEntry {
                    artist_name: name.clone(),
                    song_id: s.song_id,
                    artist_id: s.artist_id,
                    title: s.title,
                    duration: s.duration,
                }),
                _ => None,
            });

        Ok(CatalogIndex::from_entries(entries))
    }

    async fn counts(&self) -> Result<EntityCounts, StoreError> {
        let root = self.root.clone();
        blocking(move || {
            let mut counts = EntityCounts::default();
            for entity in Entity::ALL {
                for key in partition::list_partitions(&root, entity)? {
                    counts.add(entity, partition::partition_row_count(&root, &key)?);
                }
            }
            Ok(counts)
        })
        .await
    }

    async fn reset(&self) -> Result<(), StoreError> {
        let mut pending = self.pending.lock().await;
        let _settled = self.writer.lock().await;
        pending.clear();

        let root = self.root.clone();
        blocking(move || {
            for entity in Entity::ALL {
                let dir = root.join(entity.table_name());
                if dir.exists() {
                    std::fs::remove_dir_all(&dir)?;
                }
            }
            Ok(())
        })
        .await?;

        info!(root = %self.root.display(), "Lake reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Artist, Gender, Level, Phase, Song, User};
    use tempfile::TempDir;

    fn unit(index: usize) -> UnitId {
        UnitId {
            phase: Phase::Songs,
            index,
        }
    }

    fn song(song_id: &str) -> Row {
        Row::Song(Song {
            song_id: song_id.into(),
            title: format!("Title {}", song_id),
            artist_id: "AR1".into(),
            year: 1999,
            duration: 120.5,
        })
    }

    fn artist() -> Row {
        Row::Artist(Artist {
            artist_id: "AR1".into(),
            name: "Artist One".into(),
            location: Some(String::new()),
            latitude: None,
            longitude: None,
        })
    }

    fn user(level: Level) -> Row {
        Row::User(User {
            user_id: 26,
            first_name: Some("Ryan".into()),
            last_name: Some("Smith".into()),
            gender: Gender::Male,
            level,
        })
    }

    fn batch(rows: Vec<Row>) -> RowBatch {
        rows.into_iter().collect()
    }

    #[tokio::test]
    async fn test_load_buffers_until_flush() {
        let temp = TempDir::new().unwrap();
        let lake = LakeLoader::open(temp.path()).unwrap();

        lake.load(unit(0), &batch(vec![song("S1"), artist()])).await.unwrap();
        assert_eq!(lake.counts().await.unwrap().total(), 0);
        assert_eq!(lake.pending_rows().await, 2);

        let stats = lake.flush().await.unwrap();
        assert_eq!(stats.inserted.total(), 2);
        assert_eq!(lake.pending_rows().await, 0);

        let counts = lake.counts().await.unwrap();
        assert_eq!(counts.songs, 1);
        assert_eq!(counts.artists, 1);
    }

    #[tokio::test]
    async fn test_unchanged_partition_is_not_rewritten() {
        let temp = TempDir::new().unwrap();
        let lake = LakeLoader::open(temp.path()).unwrap();
        let key = PartitionKey::for_row(&song("S1"));

        lake.load(unit(0), &batch(vec![song("S1")])).await.unwrap();
        lake.flush().await.unwrap();
        let before: Vec<_> = std::fs::read_dir(key.dir(temp.path()))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();

        lake.load(unit(1), &batch(vec![song("S1")])).await.unwrap();
        let stats = lake.flush().await.unwrap();
        assert_eq!(stats.duplicates.total(), 1);

        let after: Vec<_> = std::fs::read_dir(key.dir(temp.path()))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_users_last_write_wins_across_flushes() {
        let temp = TempDir::new().unwrap();
        let lake = LakeLoader::open(temp.path()).unwrap();

        lake.load(unit(0), &batch(vec![user(Level::Free)])).await.unwrap();
        lake.flush().await.unwrap();
        lake.load(unit(1), &batch(vec![user(Level::Paid)])).await.unwrap();
        let stats = lake.flush().await.unwrap();
        assert_eq!(stats.updated.get(Entity::Users), 1);

        let rows = lake
            .read_partition(&PartitionKey::unpartitioned(Entity::Users))
            .await
            .unwrap();
        assert_eq!(rows, vec![user(Level::Paid)]);
    }

    #[tokio::test]
    async fn test_flush_drops_rows_missing_from_this_run() {
        let temp = TempDir::new().unwrap();
        let lake = LakeLoader::open(temp.path()).unwrap();
        let key = PartitionKey::for_row(&song("S1"));

        lake.load(unit(0), &batch(vec![song("S1"), song("S2")])).await.unwrap();
        lake.flush().await.unwrap();
        lake.load(unit(0), &batch(vec![song("S1")])).await.unwrap();
        let stats = lake.flush().await.unwrap();

        assert_eq!(stats.duplicates.get(Entity::Songs), 1);
        assert_eq!(stats.inserted.get(Entity::Songs), 0);
        assert_eq!(lake.read_partition(&key).await.unwrap(), vec![song("S1")]);
    }

    #[tokio::test]
    async fn test_untouched_partitions_survive_flush() {
        let temp = TempDir::new().unwrap();
        let lake = LakeLoader::open(temp.path()).unwrap();

        lake.load(unit(0), &batch(vec![song("S1"), artist()])).await.unwrap();
        lake.flush().await.unwrap();
        lake.load(unit(0), &batch(vec![user(Level::Free)])).await.unwrap();
        lake.flush().await.unwrap();

        let counts = lake.counts().await.unwrap();
        assert_eq!(counts.songs, 1);
        assert_eq!(counts.artists, 1);
        assert_eq!(counts.users, 1);
    }

    #[tokio::test]
    async fn test_overwrite_partition_replaces_rows() {
        let temp = TempDir::new().unwrap();
        let lake = LakeLoader::open(temp.path()).unwrap();
        let key = PartitionKey::unpartitioned(Entity::Users);

        lake.overwrite_partition(&key, &[user(Level::Free)]).await.unwrap();
        lake.overwrite_partition(&key, &[user(Level::Paid)]).await.unwrap();

        assert_eq!(lake.read_partition(&key).await.unwrap(), vec![user(Level::Paid)]);
    }

    #[tokio::test]
    async fn test_discard_drops_buffer() {
        let temp = TempDir::new().unwrap();
        let lake = LakeLoader::open(temp.path()).unwrap();

        lake.load(unit(0), &batch(vec![song("S1")])).await.unwrap();
        lake.discard().await;
        lake.flush().await.unwrap();

        assert_eq!(lake.counts().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_catalog_joins_artist_names() {
        let temp = TempDir::new().unwrap();
        let lake = LakeLoader::open(temp.path()).unwrap();

        lake.load(unit(0), &batch(vec![song("S1"), song("S2"), artist()]))
            .await
            .unwrap();
        lake.flush().await.unwrap();

        let catalog = lake.catalog().await.unwrap();
        assert_eq!(catalog.len(), 2);
    }

    #[tokio::test]
    async fn test_reset_removes_tables() {
        let temp = TempDir::new().unwrap();
        let lake = LakeLoader::open(temp.path()).unwrap();

        lake.load(unit(0), &batch(vec![song("S1"), artist()])).await.unwrap();
        lake.flush().await.unwrap();
        lake.reset().await.unwrap();

        assert_eq!(lake.counts().await.unwrap().total(), 0);
        assert!(!temp.path().join("songs").exists());
    }
}
