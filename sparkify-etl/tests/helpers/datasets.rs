//! Dataset Utilities
//!
//! Builders for song-metadata and event-log JSON lines, and temporary
//! source directories laid out like the real data set.

use serde_json::json;
use sparkify_common::{Backend, EtlConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// `1541999142796` = 2018-11-12T05:05:42.796Z (a Monday)
pub const MONDAY_MS: i64 = 1541999142796;

/// One song-metadata line
pub fn song_line(
    song_id: &str,
    artist_id: &str,
    artist_name: &str,
    title: &str,
    duration: f64,
    year: i32,
) -> String {
    json!({
        "num_songs": 1,
        "artist_id": artist_id,
        "artist_latitude": null,
        "artist_longitude": null,
        "artist_location": "",
        "artist_name": artist_name,
        "song_id": song_id,
        "title": title,
        "duration": duration,
        "year": year,
    })
    .to_string()
}

/// Builder for one event-log line; defaults to a resolvable NextSong
#[derive(Debug, Clone)]
pub struct EventBuilder {
    page: String,
    ts: i64,
    user_id: Option<String>,
    session_id: Option<i64>,
    level: String,
    song: Option<String>,
    artist: Option<String>,
    length: Option<f64>,
}

pub fn event(ts: i64) -> EventBuilder {
    EventBuilder {
        page: "NextSong".into(),
        ts,
        user_id: Some("26".into()),
        session_id: Some(583),
        level: "free".into(),
        song: None,
        artist: None,
        length: None,
    }
}

impl EventBuilder {
    pub fn page(mut self, page: &str) -> Self {
        self.page = page.into();
        self
    }

    pub fn user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn session(mut self, session_id: i64) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn level(mut self, level: &str) -> Self {
        self.level = level.into();
        self
    }

    pub fn play(mut self, song: &str, artist: &str, length: f64) -> Self {
        self.song = Some(song.into());
        self.artist = Some(artist.into());
        self.length = Some(length);
        self
    }

    pub fn line(&self) -> String {
        json!({
            "artist": self.artist,
            "auth": "Logged In",
            "firstName": "Ryan",
            "gender": "M",
            "itemInSession": 0,
            "lastName": "Smith",
            "length": self.length,
            "level": self.level,
            "location": "San Jose-Sunnyvale-Santa Clara, CA",
            "method": "PUT",
            "page": self.page,
            "registration": 1541016707796.0,
            "sessionId": self.session_id,
            "song": self.song,
            "status": 200,
            "ts": self.ts,
            "userAgent": "Mozilla/5.0 (X11; Linux x86_64)",
            "userId": self.user_id.clone().unwrap_or_default(),
        })
        .to_string()
    }
}

/// Temporary song_data/log_data directories plus target locations
pub struct Dataset {
    pub dir: TempDir,
}

impl Dataset {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("song_data")).unwrap();
        fs::create_dir_all(dir.path().join("log_data")).unwrap();
        Self { dir }
    }

    pub fn song_dir(&self) -> PathBuf {
        self.dir.path().join("song_data")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.dir.path().join("log_data")
    }

    /// Write `song_data/<relative>`; one song per file like the real data
    pub fn add_song_file(&self, relative: &str, line: String) -> &Self {
        write_lines(&self.song_dir().join(relative), &[line]);
        self
    }

    /// Write `log_data/<relative>` with one event per line
    pub fn add_log_file(&self, relative: &str, lines: &[String]) -> &Self {
        write_lines(&self.log_dir().join(relative), lines);
        self
    }

    /// Write `log_data/<relative>` byte for byte
    pub fn add_raw_log_file(&self, relative: &str, content: &[u8]) -> &Self {
        let path = self.log_dir().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
        self
    }

    /// Remove `log_data/<relative>`
    pub fn remove_log_file(&self, relative: &str) -> &Self {
        fs::remove_file(self.log_dir().join(relative)).unwrap();
        self
    }

    /// Config targeting this dataset's own database/output
    pub fn config(&self, backend: Backend) -> EtlConfig {
        let mut config = EtlConfig::default();
        config.backend = backend;
        config.song_data = self.song_dir();
        config.log_data = self.log_dir();
        config.database = self.dir.path().join("sparkify.db");
        config.output = self.dir.path().join("analytics");
        config.load.initial_backoff_ms = 1;
        config.load.max_backoff_ms = 5;
        config
    }

    /// The King Of Scurf song plus one play of it and one unmatched play
    pub fn king_of_scurf() -> Self {
        let dataset = Self::new();
        dataset.add_song_file(
            "A/A/B/TRAABJL12903CDCF1A.json",
            song_line(
                "SOAFBCP12A8C13CC7D",
                "ARTC1LV1187B9A4858",
                "Rodriguez",
                "King Of Scurf",
                301.4,
                1972,
            ),
        );
        dataset.add_song_file(
            "A/B/C/TRABCEI128F424C983.json",
            song_line("SOUPIRU12A6D4FA1E1", "ARJIE2Y1187B994AB7", "Line Renaud", "Der Kleine Dompfaff", 152.92036, 0),
        );
        dataset.add_log_file(
            "2018/11/2018-11-12-events.json",
            &[
                event(MONDAY_MS).play("King Of Scurf", "Rodriguez", 301.4).line(),
                event(MONDAY_MS + 1_000).page("Home").line(),
                event(MONDAY_MS + 2_000).play("Unknown Song", "Nobody", 200.0).line(),
            ],
        );
        dataset
    }
}

fn write_lines(path: &Path, lines: &[String]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(path, content).unwrap();
}
