//! Warehouse loader: stage a unit, then merge each entity set-based
//!
//! Staging and merges share one transaction, so a unit is either fully
//! merged or leaves no trace (staging tables included).

use super::{ExecutionModel, Loader};
use crate::db;
use crate::db::staging::{clear_staging, merge_entity, stage_batch};
use crate::error::{EtlResult, StoreError};
use crate::models::{Entity, EntityCounts, LoadStats, RowBatch, UnitId};
use crate::services::CatalogIndex;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::debug;

/// Dimensions first so a unit's facts land after the rows they describe
const MERGE_ORDER: [Entity; 5] = [
    Entity::Songs,
    Entity::Artists,
    Entity::Users,
    Entity::Time,
    Entity::Songplays,
];

pub struct WarehouseLoader {
    pool: SqlitePool,
}

impl WarehouseLoader {
    pub async fn open(path: &Path) -> EtlResult<Self> {
        let pool = sparkify_common::db::init_database(path).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Loader for WarehouseLoader {
    fn name(&self) -> &'static str {
        "warehouse"
    }

    fn execution_model(&self) -> ExecutionModel {
        ExecutionModel::StagedMerge
    }

    async fn load(&self, unit: UnitId, batch: &RowBatch) -> Result<LoadStats, StoreError> {
        let mut tx = self.pool.begin().await?;

        clear_staging(&mut tx).await?;
        let staged = stage_batch(&mut tx, batch).await?;

        let mut stats = LoadStats::default();
        for entity in MERGE_ORDER {
            let (inserted, updated) = merge_entity(&mut tx, entity).await?;
            stats.inserted.add(entity, inserted);
            stats.updated.add(entity, updated);
            stats.duplicates.add(
                entity,
                staged
                    .get(entity)
                    .saturating_sub(inserted)
                    .saturating_sub(updated),
            );
        }

        clear_staging(&mut tx).await?;
        tx.commit().await?;

        debug!(
            unit = %unit,
            staged = staged.total(),
            inserted = stats.inserted.total(),
            updated = stats.updated.total(),
            "Unit merged"
        );
        Ok(stats)
    }

    async fn catalog(&self) -> Result<CatalogIndex, StoreError> {
        let entries = db::load_catalog(&self.pool).await?;
        Ok(CatalogIndex::from_entries(entries))
    }

    async fn counts(&self) -> Result<EntityCounts, StoreError> {
        Ok(db::table_counts(&self.pool).await?)
    }

    async fn reset(&self) -> Result<(), StoreError> {
        Ok(sparkify_common::db::reset_database(&self.pool).await?)
    }
}
