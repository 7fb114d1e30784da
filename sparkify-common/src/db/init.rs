//! Database initialization
//!
//! Opens (creating if needed) the SQLite database and makes sure every
//! star-schema and staging table exists. Table creation is idempotent and
//! runs on every start; [`reset_database`] is the only destructive path and
//! is invoked by an operator, never by a pipeline run.

use super::schema::{CREATE_ALL, STAGING_TABLES, STAR_TABLES};
use crate::{Error, Result};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{debug, info};

/// Milliseconds SQLite waits on a locked database before reporting busy
const BUSY_TIMEOUT_MS: u32 = 5000;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL allows readers while a unit transaction is open
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    let pragma_sql = format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS);
    sqlx::query(&pragma_sql).execute(&pool).await?;

    create_tables(&pool).await?;

    Ok(pool)
}

/// Open a private in-memory database with the full schema
///
/// Limited to one connection: every SQLite `:memory:` connection is a
/// separate database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    create_tables(&pool).await?;

    Ok(pool)
}

/// Create all star-schema and staging tables (idempotent)
pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    for ddl in CREATE_ALL {
        sqlx::query(ddl).execute(pool).await?;
    }

    debug!("Star schema and staging tables present");
    Ok(())
}

/// Drop all star-schema and staging tables
pub async fn drop_tables(pool: &SqlitePool) -> Result<()> {
    for table in STAR_TABLES.iter().chain(STAGING_TABLES.iter()) {
        let sql = format!("DROP TABLE IF EXISTS {}", table);
        sqlx::query(&sql).execute(pool).await?;
    }

    Ok(())
}

/// Full reset: drop then recreate every table
pub async fn reset_database(pool: &SqlitePool) -> Result<()> {
    drop_tables(pool).await?;
    create_tables(pool).await?;
    info!("Database reset: all tables dropped and recreated");
    Ok(())
}

/// Row count of one star-schema or staging table
pub async fn count_rows(pool: &SqlitePool, table: &str) -> Result<i64> {
    if !STAR_TABLES.contains(&table) && !STAGING_TABLES.contains(&table) {
        return Err(Error::InvalidInput(format!("Unknown table: {}", table)));
    }

    let sql = format!("SELECT COUNT(*) FROM {}", table);
    let count: i64 = sqlx::query_scalar(&sql).fetch_one(pool).await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn table_names(pool: &SqlitePool) -> Vec<String> {
        sqlx::query_scalar::<_, String>(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_memory_database_has_all_tables() {
        let pool = init_memory_database().await.unwrap();
        let names = table_names(&pool).await;

        for table in STAR_TABLES.iter().chain(STAGING_TABLES.iter()) {
            assert!(names.contains(&table.to_string()), "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn test_create_tables_is_idempotent() {
        let pool = init_memory_database().await.unwrap();
        sqlx::query("INSERT INTO artists (artist_id, name) VALUES ('AR1', 'Someone')")
            .execute(&pool)
            .await
            .unwrap();

        create_tables(&pool).await.unwrap();

        assert_eq!(count_rows(&pool, "artists").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reset_empties_tables() {
        let pool = init_memory_database().await.unwrap();
        sqlx::query("INSERT INTO artists (artist_id, name) VALUES ('AR1', 'Someone')")
            .execute(&pool)
            .await
            .unwrap();

        reset_database(&pool).await.unwrap();

        assert_eq!(count_rows(&pool, "artists").await.unwrap(), 0);
        assert_eq!(table_names(&pool).await.len(), 10);
    }

    #[tokio::test]
    async fn test_count_rows_rejects_unknown_table() {
        let pool = init_memory_database().await.unwrap();
        let result = count_rows(&pool, "sqlite_master").await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_songplay_natural_key_is_unique() {
        let pool = init_memory_database().await.unwrap();
        let insert = "INSERT INTO songplays (start_time, user_id, level, session_id) \
                      VALUES ('2018-11-12T05:05:42.796+00:00', 7, 'free', 100)";
        sqlx::query(insert).execute(&pool).await.unwrap();

        let duplicate = sqlx::query(insert).execute(&pool).await;
        assert!(duplicate.is_err());
    }
}
