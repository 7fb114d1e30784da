//! Time dimension operations (insert-if-absent, keyed by `start_time`)

use crate::models::TimeBucket;
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

pub async fn time_exists(
    conn: &mut SqliteConnection,
    start_time: &DateTime<Utc>,
) -> sqlx::Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM time WHERE start_time = ?")
        .bind(start_time)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

pub async fn insert_time(conn: &mut SqliteConnection, bucket: &TimeBucket) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO time (start_time, hour, day, week, month, year, weekday)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(bucket.start_time)
    .bind(bucket.hour)
    .bind(bucket.day)
    .bind(bucket.week)
    .bind(bucket.month)
    .bind(bucket.year)
    .bind(bucket.weekday)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
