//! Catalog snapshot query: every song joined with its artist's name

use crate::services::CatalogEntry;
use sqlx::{Row, SqlitePool};

pub async fn load_catalog(pool: &SqlitePool) -> sqlx::Result<Vec<CatalogEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT s.song_id, s.artist_id, s.title, s.duration, a.name
        FROM songs s
        JOIN artists a ON a.artist_id = s.artist_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(CatalogEntry {
                song_id: row.try_get("song_id")?,
                artist_id: row.try_get("artist_id")?,
                title: row.try_get("title")?,
                artist_name: row.try_get("name")?,
                duration: row.try_get("duration")?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparkify_common::db::init_memory_database;

    #[tokio::test]
    async fn test_songs_without_artist_are_not_in_catalog() {
        let pool = init_memory_database().await.unwrap();
        sqlx::query(
            "INSERT INTO songs (song_id, title, artist_id, year, duration) VALUES \
             ('S1', 'One', 'A1', 0, 10.0), ('S2', 'Two', 'A2', 0, 20.0)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO artists (artist_id, name) VALUES ('A1', 'First')")
            .execute(&pool)
            .await
            .unwrap();

        let entries = load_catalog(&pool).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].artist_name, "First");
        assert_eq!(entries[0].duration, 10.0);
    }
}
