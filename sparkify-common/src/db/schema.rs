//! DDL for the star schema and the warehouse staging tables
//!
//! Natural keys are enforced by PRIMARY KEY / UNIQUE constraints so that
//! concurrent runs against one database cannot create duplicates even
//! though the loaders already dedup before writing.

/// Fact and dimension tables, in drop order (fact first)
pub const STAR_TABLES: [&str; 5] = ["songplays", "users", "songs", "artists", "time"];

/// Warehouse staging tables
pub const STAGING_TABLES: [&str; 5] = [
    "staging_songplays",
    "staging_users",
    "staging_songs",
    "staging_artists",
    "staging_time",
];

pub(crate) const CREATE_SONGS: &str = r#"
    CREATE TABLE IF NOT EXISTS songs (
        song_id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        artist_id TEXT NOT NULL,
        year INTEGER NOT NULL DEFAULT 0,
        duration REAL NOT NULL CHECK (duration > 0)
    )
"#;

pub(crate) const CREATE_ARTISTS: &str = r#"
    CREATE TABLE IF NOT EXISTS artists (
        artist_id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        location TEXT,
        latitude REAL,
        longitude REAL
    )
"#;

pub(crate) const CREATE_USERS: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        user_id INTEGER PRIMARY KEY,
        first_name TEXT,
        last_name TEXT,
        gender TEXT NOT NULL,
        level TEXT NOT NULL
    )
"#;

pub(crate) const CREATE_TIME: &str = r#"
    CREATE TABLE IF NOT EXISTS time (
        start_time TEXT PRIMARY KEY,
        hour INTEGER NOT NULL,
        day INTEGER NOT NULL,
        week INTEGER NOT NULL,
        month INTEGER NOT NULL,
        year INTEGER NOT NULL,
        weekday INTEGER NOT NULL
    )
"#;

// song_id / artist_id are soft references: no FOREIGN KEY, NULL when unresolved
pub(crate) const CREATE_SONGPLAYS: &str = r#"
    CREATE TABLE IF NOT EXISTS songplays (
        songplay_id INTEGER PRIMARY KEY AUTOINCREMENT,
        start_time TEXT NOT NULL,
        user_id INTEGER NOT NULL,
        level TEXT NOT NULL,
        song_id TEXT,
        artist_id TEXT,
        session_id INTEGER NOT NULL,
        location TEXT,
        user_agent TEXT,
        UNIQUE (user_id, session_id, start_time)
    )
"#;

pub(crate) const CREATE_STAGING_SONGS: &str = r#"
    CREATE TABLE IF NOT EXISTS staging_songs (
        seq INTEGER NOT NULL,
        song_id TEXT NOT NULL,
        title TEXT NOT NULL,
        artist_id TEXT NOT NULL,
        year INTEGER NOT NULL,
        duration REAL NOT NULL
    )
"#;

pub(crate) const CREATE_STAGING_ARTISTS: &str = r#"
    CREATE TABLE IF NOT EXISTS staging_artists (
        seq INTEGER NOT NULL,
        artist_id TEXT NOT NULL,
        name TEXT NOT NULL,
        location TEXT,
        latitude REAL,
        longitude REAL
    )
"#;

pub(crate) const CREATE_STAGING_USERS: &str = r#"
    CREATE TABLE IF NOT EXISTS staging_users (
        seq INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        first_name TEXT,
        last_name TEXT,
        gender TEXT NOT NULL,
        level TEXT NOT NULL
    )
"#;

pub(crate) const CREATE_STAGING_TIME: &str = r#"
    CREATE TABLE IF NOT EXISTS staging_time (
        seq INTEGER NOT NULL,
        start_time TEXT NOT NULL,
        hour INTEGER NOT NULL,
        day INTEGER NOT NULL,
        week INTEGER NOT NULL,
        month INTEGER NOT NULL,
        year INTEGER NOT NULL,
        weekday INTEGER NOT NULL
    )
"#;

pub(crate) const CREATE_STAGING_SONGPLAYS: &str = r#"
    CREATE TABLE IF NOT EXISTS staging_songplays (
        seq INTEGER NOT NULL,
        start_time TEXT NOT NULL,
        user_id INTEGER NOT NULL,
        level TEXT NOT NULL,
        song_id TEXT,
        artist_id TEXT,
        session_id INTEGER NOT NULL,
        location TEXT,
        user_agent TEXT
    )
"#;

pub(crate) const CREATE_ALL: [&str; 10] = [
    CREATE_SONGS,
    CREATE_ARTISTS,
    CREATE_USERS,
    CREATE_TIME,
    CREATE_SONGPLAYS,
    CREATE_STAGING_SONGS,
    CREATE_STAGING_ARTISTS,
    CREATE_STAGING_USERS,
    CREATE_STAGING_TIME,
    CREATE_STAGING_SONGPLAYS,
];
