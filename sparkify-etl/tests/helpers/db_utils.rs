//! Database Test Utilities
//!
//! Read-back queries for inspecting a loaded SQLite star schema

use chrono::{DateTime, Utc};
use sparkify_etl::models::{Gender, Level, Songplay, TimeBucket, User};
use sqlx::{Row, SqlitePool};

fn level(value: &str) -> sqlx::Result<Level> {
    Level::from_db(value).ok_or_else(|| sqlx::Error::Decode(format!("invalid level: {}", value).into()))
}

/// Stored fact with its surrogate id
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSongplay {
    pub songplay_id: i64,
    pub songplay: Songplay,
}

/// All facts in id order
pub async fn list_songplays(pool: &SqlitePool) -> sqlx::Result<Vec<StoredSongplay>> {
    let rows = sqlx::query(
        r#"
        SELECT songplay_id, start_time, user_id, level, song_id, artist_id,
               session_id, location, user_agent
        FROM songplays
        ORDER BY songplay_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let stored_level: String = row.try_get("level")?;
            Ok(StoredSongplay {
                songplay_id: row.try_get("songplay_id")?,
                songplay: Songplay {
                    start_time: row.try_get("start_time")?,
                    user_id: row.try_get("user_id")?,
                    level: level(&stored_level)?,
                    song_id: row.try_get("song_id")?,
                    artist_id: row.try_get("artist_id")?,
                    session_id: row.try_get("session_id")?,
                    location: row.try_get("location")?,
                    user_agent: row.try_get("user_agent")?,
                },
            })
        })
        .collect()
}

/// Load user by id
pub async fn load_user(pool: &SqlitePool, user_id: i64) -> sqlx::Result<Option<User>> {
    let row = sqlx::query(
        "SELECT user_id, first_name, last_name, gender, level FROM users WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.map(|row| {
        let gender: String = row.try_get("gender")?;
        let stored_level: String = row.try_get("level")?;
        Ok(User {
            user_id: row.try_get("user_id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            gender: Gender::from_code(&gender),
            level: level(&stored_level)?,
        })
    })
    .transpose()
}

/// Load time bucket by instant
pub async fn load_time(
    pool: &SqlitePool,
    start_time: &DateTime<Utc>,
) -> sqlx::Result<Option<TimeBucket>> {
    let row = sqlx::query(
        "SELECT start_time, hour, day, week, month, year, weekday FROM time WHERE start_time = ?",
    )
    .bind(start_time)
    .fetch_optional(pool)
    .await?;

    row.map(|row| {
        Ok(TimeBucket {
            start_time: row.try_get("start_time")?,
            hour: row.try_get("hour")?,
            day: row.try_get("day")?,
            week: row.try_get("week")?,
            month: row.try_get("month")?,
            year: row.try_get("year")?,
            weekday: row.try_get("weekday")?,
        })
    })
    .transpose()
}
