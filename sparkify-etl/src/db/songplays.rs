//! Songplay fact operations
//!
//! Facts are append-only and deduplicated on (user_id, session_id,
//! start_time); `songplay_id` is assigned by SQLite.

use crate::models::Songplay;
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

pub async fn songplay_exists(
    conn: &mut SqliteConnection,
    user_id: i64,
    session_id: i64,
    start_time: &DateTime<Utc>,
) -> sqlx::Result<bool> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM songplays WHERE user_id = ? AND session_id = ? AND start_time = ?",
    )
    .bind(user_id)
    .bind(session_id)
    .bind(start_time)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(found.is_some())
}

/// Insert a fact, returning its surrogate id
pub async fn insert_songplay(conn: &mut SqliteConnection, songplay: &Songplay) -> sqlx::Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO songplays (
            start_time, user_id, level, song_id, artist_id, session_id, location, user_agent
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(songplay.start_time)
    .bind(songplay.user_id)
    .bind(songplay.level.as_str())
    .bind(&songplay.song_id)
    .bind(&songplay.artist_id)
    .bind(songplay.session_id)
    .bind(&songplay.location)
    .bind(&songplay.user_agent)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}
