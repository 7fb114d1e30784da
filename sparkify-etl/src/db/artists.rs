//! Artist dimension operations (insert-if-absent)

use crate::models::Artist;
use sqlx::{Row, SqliteConnection, SqlitePool};

pub async fn artist_exists(conn: &mut SqliteConnection, artist_id: &str) -> sqlx::Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM artists WHERE artist_id = ?")
        .bind(artist_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

pub async fn insert_artist(conn: &mut SqliteConnection, artist: &Artist) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO artists (artist_id, name, location, latitude, longitude)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&artist.artist_id)
    .bind(&artist.name)
    .bind(&artist.location)
    .bind(artist.latitude)
    .bind(artist.longitude)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Load artist by id
pub async fn load_artist(pool: &SqlitePool, artist_id: &str) -> sqlx::Result<Option<Artist>> {
    let row = sqlx::query(
        r#"
        SELECT artist_id, name, location, latitude, longitude
        FROM artists
        WHERE artist_id = ?
        "#,
    )
    .bind(artist_id)
    .fetch_optional(pool)
    .await?;

    row.map(|row| {
        Ok(Artist {
            artist_id: row.try_get("artist_id")?,
            name: row.try_get("name")?,
            location: row.try_get("location")?,
            latitude: row.try_get("latitude")?,
            longitude: row.try_get("longitude")?,
        })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparkify_common::db::init_memory_database;

    #[tokio::test]
    async fn test_nullable_location_round_trip() {
        let pool = init_memory_database().await.unwrap();
        let artist = Artist {
            artist_id: "AR1".into(),
            name: "Casual".into(),
            location: None,
            latitude: None,
            longitude: None,
        };

        let mut conn = pool.acquire().await.unwrap();
        insert_artist(&mut conn, &artist).await.unwrap();
        assert!(artist_exists(&mut conn, "AR1").await.unwrap());
        drop(conn);

        assert_eq!(load_artist(&pool, "AR1").await.unwrap(), Some(artist));
        assert_eq!(load_artist(&pool, "AR2").await.unwrap(), None);
    }
}
