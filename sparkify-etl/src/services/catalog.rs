//! Song/artist catalog used to resolve song plays
//!
//! Matching is exact on (title, artist name, duration). Durations compare by
//! bit pattern, so 301.4 only matches 301.4 and never 301.40036.

use serde::Serialize;
use std::collections::HashMap;

/// A catalog candidate for a song play
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CatalogMatch {
    pub song_id: String,
    pub artist_id: String,
}

/// One song joined with its artist's name
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub song_id: String,
    pub artist_id: String,
    pub title: String,
    pub artist_name: String,
    pub duration: f64,
}

/// (title, artist name, duration) -> zero, one or many candidates
pub trait CatalogLookup: Send + Sync {
    fn lookup(&self, title: &str, artist_name: &str, duration: f64) -> &[CatalogMatch];
}

type CatalogKey = (String, String, u64);

/// In-memory catalog snapshot
#[derive(Debug, Clone, Default)]
pub struct CatalogIndex {
    entries: HashMap<CatalogKey, Vec<CatalogMatch>>,
    songs: usize,
}

impl CatalogIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = CatalogEntry>,
    {
        let mut index = Self::new();
        for entry in entries {
            index.insert(entry);
        }
        index
    }

    pub fn insert(&mut self, entry: CatalogEntry) {
        let key = (entry.title, entry.artist_name, entry.duration.to_bits());
        let candidate = CatalogMatch {
            song_id: entry.song_id,
            artist_id: entry.artist_id,
        };

        let candidates = self.entries.entry(key).or_default();
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
            self.songs += 1;
        }
    }

    /// Distinct (song, artist) candidates held
    pub fn len(&self) -> usize {
        self.songs
    }

    pub fn is_empty(&self) -> bool {
        self.songs == 0
    }
}

impl CatalogLookup for CatalogIndex {
    fn lookup(&self, title: &str, artist_name: &str, duration: f64) -> &[CatalogMatch] {
        let key = (title.to_string(), artist_name.to_string(), duration.to_bits());
        self.entries.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }
}
