//! SQLite access for the star schema
//!
//! Row-level operations run on a `&mut SqliteConnection` so callers can
//! scope them to a transaction; whole-table reads take the pool. Table creation
//! lives in `sparkify_common::db`.

pub mod artists;
pub mod catalog;
pub mod songplays;
pub mod songs;
pub mod staging;
pub mod time;
pub mod users;

use crate::models::{Entity, EntityCounts};
use sqlx::SqlitePool;

pub use catalog::load_catalog;

/// Row count of every star-schema table
pub async fn table_counts(pool: &SqlitePool) -> sparkify_common::Result<EntityCounts> {
    let mut counts = EntityCounts::default();
    for entity in Entity::ALL {
        let n = sparkify_common::db::count_rows(pool, entity.table_name()).await?;
        counts.add(entity, n.max(0) as u64);
    }
    Ok(counts)
}
