//! Warehouse staging and set-based merges
//!
//! A micro-batch is bulk-inserted into the `staging_*` tables with a `seq`
//! column recording arrival order, then merged into the star schema with one
//! `INSERT ... SELECT ... WHERE NOT EXISTS` per entity. Within the batch the
//! lowest `seq` wins for insert-only entities and the highest for users.

use crate::models::{Entity, RowBatch};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

/// Rows per multi-row INSERT (keeps bind counts well under SQLite's limit)
const STAGING_CHUNK_ROWS: usize = 500;

/// Empty every staging table
pub async fn clear_staging(conn: &mut SqliteConnection) -> sqlx::Result<()> {
    for table in sparkify_common::db::STAGING_TABLES {
        let sql = format!("DELETE FROM {}", table);
        sqlx::query(&sql).execute(&mut *conn).await?;
    }
    Ok(())
}

/// Bulk-insert a batch into staging, returning rows staged per entity
pub async fn stage_batch(
    conn: &mut SqliteConnection,
    batch: &RowBatch,
) -> sqlx::Result<crate::models::EntityCounts> {
    let songs: Vec<_> = batch.songs().enumerate().collect();
    for chunk in songs.chunks(STAGING_CHUNK_ROWS) {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO staging_songs (seq, song_id, title, artist_id, year, duration) ");
        qb.push_values(chunk, |mut b, (seq, song)| {
            b.push_bind(*seq as i64)
                .push_bind(song.song_id.as_str())
                .push_bind(song.title.as_str())
                .push_bind(song.artist_id.as_str())
                .push_bind(song.year)
                .push_bind(song.duration);
        });
        qb.build().execute(&mut *conn).await?;
    }

    let artists: Vec<_> = batch.artists().enumerate().collect();
    for chunk in artists.chunks(STAGING_CHUNK_ROWS) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO staging_artists (seq, artist_id, name, location, latitude, longitude) ",
        );
        qb.push_values(chunk, |mut b, (seq, artist)| {
            b.push_bind(*seq as i64)
                .push_bind(artist.artist_id.as_str())
                .push_bind(artist.name.as_str())
                .push_bind(artist.location.as_deref())
                .push_bind(artist.latitude)
                .push_bind(artist.longitude);
        });
        qb.build().execute(&mut *conn).await?;
    }

    let users: Vec<_> = batch.users().enumerate().collect();
    for chunk in users.chunks(STAGING_CHUNK_ROWS) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO staging_users (seq, user_id, first_name, last_name, gender, level) ",
        );
        qb.push_values(chunk, |mut b, (seq, user)| {
            b.push_bind(*seq as i64)
                .push_bind(user.user_id)
                .push_bind(user.first_name.as_deref())
                .push_bind(user.last_name.as_deref())
                .push_bind(user.gender.as_str())
                .push_bind(user.level.as_str());
        });
        qb.build().execute(&mut *conn).await?;
    }

    let buckets: Vec<_> = batch.time_buckets().enumerate().collect();
    for chunk in buckets.chunks(STAGING_CHUNK_ROWS) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO staging_time (seq, start_time, hour, day, week, month, year, weekday) ",
        );
        qb.push_values(chunk, |mut b, (seq, bucket)| {
            b.push_bind(*seq as i64)
                .push_bind(bucket.start_time)
                .push_bind(bucket.hour)
                .push_bind(bucket.day)
                .push_bind(bucket.week)
                .push_bind(bucket.month)
                .push_bind(bucket.year)
                .push_bind(bucket.weekday);
        });
        qb.build().execute(&mut *conn).await?;
    }

    let songplays: Vec<_> = batch.songplays().enumerate().collect();
    for chunk in songplays.chunks(STAGING_CHUNK_ROWS) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO staging_songplays (seq, start_time, user_id, level, song_id, artist_id, \
             session_id, location, user_agent) ",
        );
        qb.push_values(chunk, |mut b, (seq, play)| {
            b.push_bind(*seq as i64)
                .push_bind(play.start_time)
                .push_bind(play.user_id)
                .push_bind(play.level.as_str())
                .push_bind(play.song_id.as_deref())
                .push_bind(play.artist_id.as_deref())
                .push_bind(play.session_id)
                .push_bind(play.location.as_deref())
                .push_bind(play.user_agent.as_deref());
        });
        qb.build().execute(&mut *conn).await?;
    }

    let mut staged = crate::models::EntityCounts::default();
    staged.add(Entity::Songs, songs.len() as u64);
    staged.add(Entity::Artists, artists.len() as u64);
    staged.add(Entity::Users, users.len() as u64);
    staged.add(Entity::Time, buckets.len() as u64);
    staged.add(Entity::Songplays, songplays.len() as u64);
    Ok(staged)
}

const MERGE_SONGS: &str = r#"
    INSERT INTO songs (song_id, title, artist_id, year, duration)
    SELECT s.song_id, s.title, s.artist_id, s.year, s.duration
    FROM staging_songs s
    WHERE s.seq = (SELECT MIN(f.seq) FROM staging_songs f WHERE f.song_id = s.song_id)
      AND NOT EXISTS (SELECT 1 FROM songs t WHERE t.song_id = s.song_id)
"#;

const MERGE_ARTISTS: &str = r#"
    INSERT INTO artists (artist_id, name, location, latitude, longitude)
    SELECT s.artist_id, s.name, s.location, s.latitude, s.longitude
    FROM staging_artists s
    WHERE s.seq = (SELECT MIN(f.seq) FROM staging_artists f WHERE f.artist_id = s.artist_id)
      AND NOT EXISTS (SELECT 1 FROM artists t WHERE t.artist_id = s.artist_id)
"#;

const MERGE_TIME: &str = r#"
    INSERT INTO time (start_time, hour, day, week, month, year, weekday)
    SELECT s.start_time, s.hour, s.day, s.week, s.month, s.year, s.weekday
    FROM staging_time s
    WHERE s.seq = (SELECT MIN(f.seq) FROM staging_time f WHERE f.start_time = s.start_time)
      AND NOT EXISTS (SELECT 1 FROM time t WHERE t.start_time = s.start_time)
"#;

const MERGE_SONGPLAYS: &str = r#"
    INSERT INTO songplays (
        start_time, user_id, level, song_id, artist_id, session_id, location, user_agent
    )
    SELECT s.start_time, s.user_id, s.level, s.song_id, s.artist_id,
           s.session_id, s.location, s.user_agent
    FROM staging_songplays s
    WHERE s.seq = (
            SELECT MIN(f.seq) FROM staging_songplays f
            WHERE f.user_id = s.user_id
              AND f.session_id = s.session_id
              AND f.start_time = s.start_time
        )
      AND NOT EXISTS (
            SELECT 1 FROM songplays t
            WHERE t.user_id = s.user_id
              AND t.session_id = s.session_id
              AND t.start_time = s.start_time
        )
    ORDER BY s.seq
"#;

// Last arrival per user_id; the WHERE clause also keeps SQLite from reading
// ON CONFLICT as part of a join
const MERGE_USERS: &str = r#"
    INSERT INTO users (user_id, first_name, last_name, gender, level)
    SELECT s.user_id, s.first_name, s.last_name, s.gender, s.level
    FROM staging_users s
    WHERE s.seq = (SELECT MAX(l.seq) FROM staging_users l WHERE l.user_id = s.user_id)
    ON CONFLICT(user_id) DO UPDATE SET
        first_name = excluded.first_name,
        last_name = excluded.last_name,
        gender = excluded.gender,
        level = excluded.level
"#;

const STAGED_USERS_PRESENT: &str = r#"
    SELECT COUNT(DISTINCT s.user_id)
    FROM staging_users s
    WHERE EXISTS (SELECT 1 FROM users u WHERE u.user_id = s.user_id)
"#;

/// Merge one entity's staged rows; returns (inserted, updated)
pub async fn merge_entity(conn: &mut SqliteConnection, entity: Entity) -> sqlx::Result<(u64, u64)> {
    let sql = match entity {
        Entity::Songs => MERGE_SONGS,
        Entity::Artists => MERGE_ARTISTS,
        Entity::Time => MERGE_TIME,
        Entity::Songplays => MERGE_SONGPLAYS,
        Entity::Users => {
            let present: i64 = sqlx::query_scalar(STAGED_USERS_PRESENT)
                .fetch_one(&mut *conn)
                .await?;
            let affected = sqlx::query(MERGE_USERS).execute(&mut *conn).await?.rows_affected();
            let updated = (present.max(0) as u64).min(affected);
            return Ok((affected - updated, updated));
        }
    };

    let inserted = sqlx::query(sql).execute(&mut *conn).await?.rows_affected();
    Ok((inserted, 0))
}
