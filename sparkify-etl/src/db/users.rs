//! User dimension operations
//!
//! Users are the one mutable dimension: an upsert overwrites names, gender
//! and level, so the last write for a `user_id` wins.

use crate::models::User;
use sqlx::SqliteConnection;

pub async fn user_exists(conn: &mut SqliteConnection, user_id: i64) -> sqlx::Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM users WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

pub async fn insert_user(conn: &mut SqliteConnection, user: &User) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO users (user_id, first_name, last_name, gender, level)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(user.user_id)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(user.gender.as_str())
    .bind(user.level.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Insert or overwrite a user
pub async fn upsert_user(conn: &mut SqliteConnection, user: &User) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO users (user_id, first_name, last_name, gender, level)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            first_name = excluded.first_name,
            last_name = excluded.last_name,
            gender = excluded.gender,
            level = excluded.level
        "#,
    )
    .bind(user.user_id)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(user.gender.as_str())
    .bind(user.level.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(())
}
