//! Song dimension operations
//!
//! Songs are insert-if-absent: a row is written once per `song_id` and
//! never updated.

use crate::models::Song;
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Whether a song with this id is stored
pub async fn song_exists(conn: &mut SqliteConnection, song_id: &str) -> sqlx::Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM songs WHERE song_id = ?")
        .bind(song_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

/// Insert a song (fails on an existing `song_id`)
pub async fn insert_song(conn: &mut SqliteConnection, song: &Song) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO songs (song_id, title, artist_id, year, duration)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&song.song_id)
    .bind(&song.title)
    .bind(&song.artist_id)
    .bind(song.year)
    .bind(song.duration)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Load song by id
pub async fn load_song(pool: &SqlitePool, song_id: &str) -> sqlx::Result<Option<Song>> {
    let row = sqlx::query(
        r#"
        SELECT song_id, title, artist_id, year, duration
        FROM songs
        WHERE song_id = ?
        "#,
    )
    .bind(song_id)
    .fetch_optional(pool)
    .await?;

    row.map(|row| {
        Ok(Song {
            song_id: row.try_get("song_id")?,
            title: row.try_get("title")?,
            artist_id: row.try_get("artist_id")?,
            year: row.try_get("year")?,
            duration: row.try_get("duration")?,
        })
    })
    .transpose()
}
