//! Dedup/upsert loaders
//!
//! One [`Loader`] per backend, all applying the same per-entity policy:
//! insert-if-absent for songs, artists, time and songplays; last write wins
//! for users. They differ in execution model:
//!
//! | Backend | Model |
//! |---|---|
//! | transactional | per-row existence check in one transaction per unit |
//! | warehouse | stage the unit, then set-based anti-join merge |
//! | lake | buffer rows, then overwrite each touched partition at flush |

pub mod lake;
pub mod memory;
pub mod transactional;
pub mod warehouse;

use crate::error::{EtlResult, StoreError};
use crate::models::{EntityCounts, LoadPolicy, LoadStats, NaturalKey, Row, RowBatch, UnitId};
use crate::services::CatalogIndex;
use async_trait::async_trait;
use sparkify_common::{Backend, EtlConfig};
use std::sync::Arc;

pub use lake::{LakeLoader, PartitionKey};
pub use memory::MemoryRowStore;
pub use transactional::{SqliteRowStore, TransactionalLoader};
pub use warehouse::WarehouseLoader;

/// How a loader commits work, which drives how the pipeline schedules units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionModel {
    /// Each unit commits on its own, in order
    RowTransaction,
    /// Each unit is staged and merged on its own, in order
    StagedMerge,
    /// Units only buffer; output is committed by [`Loader::flush`]
    PartitionOverwrite,
}

impl ExecutionModel {
    /// Whether units of a phase may be built concurrently before loading
    pub fn is_parallel(&self) -> bool {
        matches!(self, ExecutionModel::PartitionOverwrite)
    }
}

/// Row-level target store
#[async_trait]
pub trait RowStore: Send {
    async fn exists(&mut self, key: &NaturalKey) -> Result<bool, StoreError>;
    async fn insert(&mut self, row: &Row) -> Result<(), StoreError>;
    async fn upsert(&mut self, row: &Row) -> Result<(), StoreError>;
}

/// Partition-level target store
#[async_trait]
pub trait PartitionStore: Send + Sync {
    async fn read_partition(&self, key: &PartitionKey) -> Result<Vec<Row>, StoreError>;
    async fn overwrite_partition(&self, key: &PartitionKey, rows: &[Row]) -> Result<(), StoreError>;
}

/// Apply each row's entity policy against a row store, in order
pub async fn apply_row_policy<S>(store: &mut S, rows: &[Row]) -> Result<LoadStats, StoreError>
where
    S: RowStore + ?Sized,
{
    let mut stats = LoadStats::default();

    for row in rows {
        let entity = row.entity();
        let present = store.exists(&row.natural_key()).await?;

        match (entity.policy(), present) {
            (LoadPolicy::InsertIfAbsent, true) => stats.duplicates.add(entity, 1),
            (LoadPolicy::Upsert, true) => {
                store.upsert(row).await?;
                stats.updated.add(entity, 1);
            }
            (_, false) => {
                store.insert(row).await?;
                stats.inserted.add(entity, 1);
            }
        }
    }

    Ok(stats)
}

/// Target of a pipeline run
#[async_trait]
pub trait Loader: Send + Sync {
    fn name(&self) -> &'static str;

    fn execution_model(&self) -> ExecutionModel;

    /// Load one unit's rows
    async fn load(&self, unit: UnitId, batch: &RowBatch) -> Result<LoadStats, StoreError>;

    /// Commit deferred output (barrier at the end of a phase)
    async fn flush(&self) -> Result<LoadStats, StoreError> {
        Ok(LoadStats::default())
    }

    /// Drop deferred output that will never be flushed
    async fn discard(&self) {}

    /// Snapshot of the song/artist catalog as currently stored
    async fn catalog(&self) -> Result<CatalogIndex, StoreError>;

    /// Per-entity row counts of the target
    async fn counts(&self) -> Result<EntityCounts, StoreError>;

    /// Operator-invoked full reset; never part of a run
    async fn reset(&self) -> Result<(), StoreError>;
}

/// Open the loader for the configured backend
pub async fn open_loader(config: &EtlConfig) -> EtlResult<Arc<dyn Loader>> {
    let loader: Arc<dyn Loader> = match config.backend {
        Backend::Transactional => Arc::new(TransactionalLoader::open(&config.database).await?),
        Backend::Warehouse => Arc::new(WarehouseLoader::open(&config.database).await?),
        Backend::Lake => Arc::new(LakeLoader::open(&config.output)?),
    };

    tracing::info!(backend = %config.backend, loader = loader.name(), "Loader ready");
    Ok(loader)
}
