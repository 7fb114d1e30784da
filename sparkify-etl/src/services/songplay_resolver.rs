//! Songplay fact resolver
//!
//! Turns a song-play event into a fact row, attaching `song_id`/`artist_id`
//! when the catalog holds exactly one match. Zero or several matches still
//! produce the fact, with null foreign keys.

use super::catalog::{CatalogLookup, CatalogMatch};
use super::dimension_builder::start_time;
use crate::error::BuildError;
use crate::models::{LogEvent, Songplay};

/// How the catalog lookup went
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Matched(CatalogMatch),
    /// No catalog entry
    Unmatched,
    /// More than one catalog entry
    Ambiguous(usize),
    /// Event lacks song, artist or length; no lookup made
    Incomplete,
}

impl Resolution {
    pub fn is_matched(&self) -> bool {
        matches!(self, Resolution::Matched(_))
    }
}

/// Result of resolving one event
#[derive(Debug, Clone, PartialEq)]
pub enum SongplayOutcome {
    /// Not a song-play event
    Filtered,
    /// Song play without a user or session id; cannot form a natural key
    MissingKey,
    Emitted {
        songplay: Songplay,
        resolution: Resolution,
    },
}

/// Resolve one event against the catalog
pub fn resolve_songplay(
    event: &LogEvent,
    catalog: &dyn CatalogLookup,
) -> Result<SongplayOutcome, BuildError> {
    if !event.is_song_play() {
        return Ok(SongplayOutcome::Filtered);
    }

    let (Some(user_id), Some(session_id)) = (event.user_id, event.session_id) else {
        return Ok(SongplayOutcome::MissingKey);
    };

    let start_time = start_time(event.ts)?;

    let resolution = match (&event.song, &event.artist, event.length) {
        (Some(title), Some(artist), Some(length)) => {
            match catalog.lookup(title, artist, length) {
                [] => Resolution::Unmatched,
                [only] => Resolution::Matched(only.clone()),
                many => Resolution::Ambiguous(many.len()),
            }
        }
        _ => Resolution::Incomplete,
    };

    let (song_id, artist_id) = match &resolution {
        Resolution::Matched(m) => (Some(m.song_id.clone()), Some(m.artist_id.clone())),
        _ => (None, None),
    };

    Ok(SongplayOutcome::Emitted {
        songplay: Songplay {
            start_time,
            user_id,
            level: event.level,
            song_id,
            artist_id,
            session_id,
            location: event.location.clone(),
            user_agent: event.user_agent.clone(),
        },
        resolution,
    })
}
