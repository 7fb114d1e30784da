//! Transactional loader: row-by-row existence checks inside one SQLite
//! transaction per unit (commit on success, rollback on failure)

use super::{apply_row_policy, ExecutionModel, Loader, RowStore};
use crate::db;
use crate::error::{EtlResult, StoreError};
use crate::models::{EntityCounts, LoadStats, NaturalKey, Row, RowBatch, UnitId};
use crate::services::CatalogIndex;
use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};
use std::path::Path;
use tracing::debug;

/// [`RowStore`] over one SQLite connection (usually an open transaction)
pub struct SqliteRowStore<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> SqliteRowStore<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl<'c> RowStore for SqliteRowStore<'c> {
    async fn exists(&mut self, key: &NaturalKey) -> Result<bool, StoreError> {
        let conn = &mut *self.conn;
        let found = match key {
            NaturalKey::Song(song_id) => db::songs::song_exists(conn, song_id).await?,
            NaturalKey::Artist(artist_id) => db::artists::artist_exists(conn, artist_id).await?,
            NaturalKey::User(user_id) => db::users::user_exists(conn, *user_id).await?,
            NaturalKey::Time(start_time) => db::time::time_exists(conn, start_time).await?,
            NaturalKey::Songplay {
                user_id,
                session_id,
                start_time,
            } => db::songplays::songplay_exists(conn, *user_id, *session_id, start_time).await?,
        };
        Ok(found)
    }

    async fn insert(&mut self, row: &Row) -> Result<(), StoreError> {
        let conn = &mut *self.conn;
        match row {
            Row::Song(song) => db::songs::insert_song(conn, song).await?,
            Row::Artist(artist) => db::artists::insert_artist(conn, artist).await?,
            Row::User(user) => db::users::insert_user(conn, user).await?,
            Row::Time(bucket) => db::time::insert_time(conn, bucket).await?,
            Row::Songplay(songplay) => {
                db::songplays::insert_songplay(conn, songplay).await?;
            }
        }
        Ok(())
    }

    async fn upsert(&mut self, row: &Row) -> Result<(), StoreError> {
        match row {
            Row::User(user) => Ok(db::users::upsert_user(&mut *self.conn, user).await?),
            other => Err(StoreError::Fatal(format!(
                "{} rows are insert-only",
                other.entity().table_name()
            ))),
        }
    }
}

/// Loader for a local SQLite database
pub struct TransactionalLoader {
    pool: SqlitePool,
}

impl TransactionalLoader {
    /// Open (creating if needed) the database with the star schema
    pub async fn open(path: &Path) -> EtlResult<Self> {
        let pool = sparkify_common::db::init_database(path).await?;
        Ok(Self { pool })
    }

    /// Use an existing pool whose schema is already in place
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Loader for TransactionalLoader {
    fn name(&self) -> &'static str {
        "transactional"
    }

    fn execution_model(&self) -> ExecutionModel {
        ExecutionModel::RowTransaction
    }

    async fn load(&self, unit: UnitId, batch: &RowBatch) -> Result<LoadStats, StoreError> {
        let mut tx = self.pool.begin().await?;

        let stats = {
            let mut store = SqliteRowStore::new(&mut *tx);
            apply_row_policy(&mut store, &batch.rows).await?
        };

        tx.commit().await?;

        debug!(
            unit = %unit,
            rows = batch.len(),
            inserted = stats.inserted.total(),
            updated = stats.updated.total(),
            duplicates = stats.duplicates.total(),
            "Unit committed"
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
