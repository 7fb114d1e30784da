//! Typed intermediate records parsed from raw JSON
//!
//! Field order is irrelevant and unknown fields are ignored. Optional
//! fields deserialize to `None`; `year` defaults to 0 (unknown) and an
//! absent/unrecognized gender to [`Gender::Unknown`].

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Page value of an event that is an actual song play
pub const SONG_PLAY_PAGE: &str = "NextSong";

/// Record-kind tag supplied with every raw record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    SongMetadata,
    LogEvent,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::SongMetadata => f.write_str("song-metadata"),
            RecordKind::LogEvent => f.write_str("log-event"),
        }
    }
}

/// User subscription level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Free,
    Paid,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Free => "free",
            Level::Paid => "paid",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "free" => Some(Level::Free),
            "paid" => Some(Level::Paid),
            _ => None,
        }
    }
}

/// User gender as recorded in the activity log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
            Gender::Unknown => "unknown",
        }
    }

    /// Lenient mapping used for raw input and stored values
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "M" | "m" => Gender::Male,
            "F" | "f" => Gender::Female,
            _ => Gender::Unknown,
        }
    }
}

/// One song-metadata record (one object per song file)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SongRecord {
    pub song_id: String,
    pub artist_id: String,
    pub artist_name: String,
    pub title: String,
    pub duration: f64,
    #[serde(default, deserialize_with = "year_or_unknown")]
    pub year: i32,
    pub artist_location: Option<String>,
    pub artist_latitude: Option<f64>,
    pub artist_longitude: Option<f64>,
    pub num_songs: Option<i64>,
}

/// One user-activity log event
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub page: String,
    /// Milliseconds since the Unix epoch
    pub ts: i64,
    pub level: Level,
    #[serde(default, deserialize_with = "lenient_user_id")]
    pub user_id: Option<i64>,
    pub session_id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "gender_or_unknown")]
    pub gender: Gender,
    pub song: Option<String>,
    pub artist: Option<String>,
    pub length: Option<f64>,
    pub location: Option<String>,
    pub user_agent: Option<String>,
    pub item_in_session: Option<i64>,
    pub auth: Option<String>,
    pub method: Option<String>,
    pub status: Option<i64>,
    pub registration: Option<f64>,
}

impl LogEvent {
    /// Whether the event is an actual song play
    pub fn is_song_play(&self) -> bool {
        self.page == SONG_PLAY_PAGE
    }
}

/// Typed record of either kind
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    Song(SongRecord),
    Event(LogEvent),
}

impl RawRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            RawRecord::Song(_) => RecordKind::SongMetadata,
            RawRecord::Event(_) => RecordKind::LogEvent,
        }
    }
}

fn year_or_unknown<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i32>::deserialize(deserializer)?.unwrap_or(0))
}

fn gender_or_unknown<'de, D>(deserializer: D) -> Result<Gender, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .map(|code| Gender::from_code(&code))
        .unwrap_or_default())
}

// Raw logs carry userId as a string ("39"), and "" for logged-out sessions
fn lenient_user_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("userId is not an integer: {}", n))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("userId is not numeric: {:?}", s))),
        Some(other) => Err(D::Error::custom(format!("invalid userId: {}", other))),
    }
}
