//! Star-schema rows and their natural keys

use super::records::{Gender, Level};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Song dimension row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Song {
    pub song_id: String,
    pub title: String,
    pub artist_id: String,
    /// 0 = unknown
    pub year: i32,
    /// Seconds, > 0
    pub duration: f64,
}

/// Artist dimension row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artist {
    pub artist_id: String,
    pub name: String,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// User dimension row (mutable: last write wins)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub user_id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Gender,
    pub level: Level,
}

/// Time dimension row; every field but `start_time` is derived from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeBucket {
    pub start_time: DateTime<Utc>,
    pub hour: u32,
    pub day: u32,
    /// ISO-8601 week number
    pub week: u32,
    pub month: u32,
    pub year: i32,
    /// Monday = 0 ... Sunday = 6
    pub weekday: u32,
}

/// Songplay fact row; the surrogate id is assigned by the target store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Songplay {
    pub start_time: DateTime<Utc>,
    pub user_id: i64,
    /// Level at play time, copied from the event
    pub level: Level,
    pub song_id: Option<String>,
    pub artist_id: Option<String>,
    pub session_id: i64,
    pub location: Option<String>,
    pub user_agent: Option<String>,
}

impl Songplay {
    pub fn is_resolved(&self) -> bool {
        self.song_id.is_some() && self.artist_id.is_some()
    }
}

/// Target entity (one table per entity)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    Songs,
    Artists,
    Users,
    Time,
    Songplays,
}

/// Dedup behavior applied per entity at load time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPolicy {
    /// Keep the first row seen for a natural key, never update
    InsertIfAbsent,
    /// Insert, or overwrite the existing row (last write wins)
    Upsert,
}

impl Entity {
    pub const ALL: [Entity; 5] = [
        Entity::Songs,
        Entity::Artists,
        Entity::Users,
        Entity::Time,
        Entity::Songplays,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            Entity::Songs => "songs",
            Entity::Artists => "artists",
            Entity::Users => "users",
            Entity::Time => "time",
            Entity::Songplays => "songplays",
        }
    }

    pub fn policy(&self) -> LoadPolicy {
        match self {
            Entity::Users => LoadPolicy::Upsert,
            _ => LoadPolicy::InsertIfAbsent,
        }
    }
}

/// Business-meaningful unique identifier of a row
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NaturalKey {
    Song(String),
    Artist(String),
    User(i64),
    Time(DateTime<Utc>),
    Songplay {
        user_id: i64,
        session_id: i64,
        start_time: DateTime<Utc>,
    },
}

impl NaturalKey {
    pub fn entity(&self) -> Entity {
        match self {
            NaturalKey::Song(_) => Entity::Songs,
            NaturalKey::Artist(_) => Entity::Artists,
            NaturalKey::User(_) => Entity::Users,
            NaturalKey::Time(_) => Entity::Time,
            NaturalKey::Songplay { .. } => Entity::Songplays,
        }
    }
}

/// A row of any entity
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "entity", rename_all = "lowercase")]
pub enum Row {
    Song(Song),
    Artist(Artist),
    User(User),
    Time(TimeBucket),
    Songplay(Songplay),
}

impl Row {
    pub fn entity(&self) -> Entity {
        match self {
            Row::Song(_) => Entity::Songs,
            Row::Artist(_) => Entity::Artists,
            Row::User(_) => Entity::Users,
            Row::Time(_) => Entity::Time,
            Row::Songplay(_) => Entity::Songplays,
        }
    }

    pub fn natural_key(&self) -> NaturalKey {
        match self {
            Row::Song(s) => NaturalKey::Song(s.song_id.clone()),
            Row::Artist(a) => NaturalKey::Artist(a.artist_id.clone()),
            Row::User(u) => NaturalKey::User(u.user_id),
            Row::Time(t) => NaturalKey::Time(t.start_time),
            Row::Songplay(p) => NaturalKey::Songplay {
                user_id: p.user_id,
                session_id: p.session_id,
                start_time: p.start_time,
            },
        }
    }
}

/// Per-entity row counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    pub songs: u64,
    pub artists: u64,
    pub users: u64,
    pub time: u64,
    pub songplays: u64,
}

impl EntityCounts {
    pub fn get(&self, entity: Entity) -> u64 {
        match entity {
            Entity::Songs => self.songs,
            Entity::Artists => self.artists,
            Entity::Users => self.users,
            Entity::Time => self.time,
            Entity::Songplays => self.songplays,
        }
    }

    pub fn add(&mut self, entity: Entity, n: u64) {
        match entity {
            Entity::Songs => self.songs += n,
            Entity::Artists => self.artists += n,
            Entity::Users => self.users += n,
            Entity::Time => self.time += n,
            Entity::Songplays => self.songplays += n,
        }
    }

    pub fn merge(&mut self, other: &EntityCounts) {
        for entity in Entity::ALL {
            self.add(entity, other.get(entity));
        }
    }

    pub fn total(&self) -> u64 {
        Entity::ALL.iter().map(|e| self.get(*e)).sum()
    }
}

/// What a load did with the rows it was handed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    /// New natural keys written
    pub inserted: EntityCounts,
    /// Existing rows overwritten (users only)
    pub updated: EntityCounts,
    /// Rows dropped because their natural key already existed
    pub duplicates: EntityCounts,
}

impl LoadStats {
    pub fn merge(&mut self, other: &LoadStats) {
        self.inserted.merge(&other.inserted);
        self.updated.merge(&other.updated);
        self.duplicates.merge(&other.duplicates);
    }
}

/// Rows built from one unit, in arrival order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowBatch {
    pub rows: Vec<Row>,
}

impl RowBatch {
    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn counts(&self) -> EntityCounts {
        let mut counts = EntityCounts::default();
        for row in &self.rows {
            counts.add(row.entity(), 1);
        }
        counts
    }

    pub fn songs(&self) -> impl Iterator<Item = &Song> {
        self.rows.iter().filter_map(|r| match r {
            Row::Song(s) => Some(s),
            _ => None,
        })
    }

    pub fn artists(&self) -> impl Iterator<Item = &Artist> {
        self.rows.iter().filter_map(|r| match r {
            Row::Artist(a) => Some(a),
            _ => None,
        })
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.rows.iter().filter_map(|r| match r {
            Row::User(u) => Some(u),
            _ => None,
        })
    }

    pub fn time_buckets(&self) -> impl Iterator<Item = &TimeBucket> {
        self.rows.iter().filter_map(|r| match r {
            Row::Time(t) => Some(t),
            _ => None,
        })
    }

    pub fn songplays(&self) -> impl Iterator<Item = &Songplay> {
        self.rows.iter().filter_map(|r| match r {
            Row::Songplay(p) => Some(p),
            _ => None,
        })
    }
}

impl FromIterator<Row> for RowBatch {
    fn from_iter<I: IntoIterator<Item = Row>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}
