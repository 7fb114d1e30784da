//! Dimension builders
//!
//! Pure functions from typed records to dimension rows. Deduplication by
//! natural key happens at load time; the only build-time dedup is the time
//! builder collapsing repeated `start_time` values within one unit.

use crate::error::BuildError;
use crate::models::{Artist, LogEvent, Song, SongRecord, TimeBucket, User};
use chrono::{DateTime, Datelike, Timelike, Utc};
use sparkify_common::time::{from_epoch_millis, weekday_from_monday};
use std::collections::HashSet;

/// Song row for one song-metadata record
pub fn build_song(record: &SongRecord) -> Result<Song, BuildError> {
    require("song_id", &record.song_id)?;
    require("artist_name", &record.artist_name)?;

    Ok(Song {
        song_id: record.song_id.clone(),
        title: record.title.clone(),
        artist_id: record.artist_id.clone(),
        year: record.year,
        duration: record.duration,
    })
}

/// Artist row for one song-metadata record
pub fn build_artist(record: &SongRecord) -> Result<Artist, BuildError> {
    require("artist_id", &record.artist_id)?;
    require("artist_name", &record.artist_name)?;

    Ok(Artist {
        artist_id: record.artist_id.clone(),
        name: record.artist_name.clone(),
        location: record.artist_location.clone(),
        latitude: record.artist_latitude,
        longitude: record.artist_longitude,
    })
}

/// User row for a song-play event with a user id; `None` for anything else
pub fn build_user(event: &LogEvent) -> Option<User> {
    if !event.is_song_play() {
        return None;
    }

    let user_id = event.user_id?;
    Some(User {
        user_id,
        first_name: event.first_name.clone(),
        last_name: event.last_name.clone(),
        gender: event.gender,
        level: event.level,
    })
}

/// UTC instant of an epoch-ms timestamp
pub fn start_time(ts: i64) -> Result<DateTime<Utc>, BuildError> {
    from_epoch_millis(ts).map_err(|_| BuildError::InvalidTimestamp(ts))
}

/// Time row with every calendar field derived from `start_time`
pub fn build_time_bucket(start_time: DateTime<Utc>) -> TimeBucket {
    TimeBucket {
        start_time,
        hour: start_time.hour(),
        day: start_time.day(),
        week: start_time.iso_week().week(),
        month: start_time.month(),
        year: start_time.year(),
        weekday: weekday_from_monday(&start_time),
    }
}

/// Collects one time bucket per distinct `start_time`, in first-seen order
#[derive(Debug, Default)]
pub struct TimeBuilder {
    seen: HashSet<DateTime<Utc>>,
    buckets: Vec<TimeBucket>,
}

impl TimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a song-play event; returns the new bucket when its instant is unseen
    pub fn add(&mut self, event: &LogEvent) -> Result<Option<TimeBucket>, BuildError> {
        if !event.is_song_play() {
            return Ok(None);
        }

        let instant = start_time(event.ts)?;
        if !self.seen.insert(instant) {
            return Ok(None);
        }

        let bucket = build_time_bucket(instant);
        self.buckets.push(bucket.clone());
        Ok(Some(bucket))
    }

    pub fn into_buckets(self) -> Vec<TimeBucket> {
        self.buckets
    }
}

/// Time buckets for a batch of events
pub fn build_time_buckets<'a, I>(events: I) -> Result<Vec<TimeBucket>, BuildError>
where
    I: IntoIterator<Item = &'a LogEvent>,
{
    let mut builder = TimeBuilder::new();
    for event in events {
        builder.add(event)?;
    }
    Ok(builder.into_buckets())
}

fn require(field: &'static str, value: &str) -> Result<(), BuildError> {
    if value.trim().is_empty() {
        Err(BuildError::MissingField(field))
    } else {
        Ok(())
    }
}
