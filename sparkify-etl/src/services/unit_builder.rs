//! Per-unit transform: raw lines -> typed records -> rows
//!
//! Pure apart from reading the source, so units can be built concurrently.
//! Bad records are logged and counted, never fatal; a source read failure
//! fails the whole unit.

use super::catalog::{CatalogLookup, CatalogMatch};
use super::dimension_builder::{build_artist, build_song, build_user, TimeBuilder};
use super::record_parser::parse_line;
use super::record_source::RecordSource;
use super::songplay_resolver::{resolve_songplay, SongplayOutcome};
use crate::error::SourceError;
use crate::models::{RawRecord, RecordKind, Row, RowBatch, WorkUnit};
use tracing::warn;

/// Rows and counters produced from one unit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuiltUnit {
    pub batch: RowBatch,
    pub records: u64,
    pub skipped: u64,
    pub resolved: u64,
    pub unresolved: u64,
}

/// Build the rows of one unit
///
/// `catalog` is consulted for log events only; without one every song play
/// is unresolved.
pub fn build_unit(
    source: &dyn RecordSource,
    unit: &WorkUnit,
    catalog: Option<&dyn CatalogLookup>,
) -> Result<BuiltUnit, SourceError> {
    let kind = source.kind();
    let mut built = BuiltUnit::default();
    let mut time = TimeBuilder::new();

    let catalog: &dyn CatalogLookup = catalog.unwrap_or(&NoCatalog);

    for name in &unit.items {
        for line in source.records(name)? {
            let line = line?;
            built.records += 1;

            let record = match line.text().and_then(|text| parse_line(kind, text)) {
                Ok(record) => record,
                Err(e) => {
                    warn!(unit = %unit.id, file = %name, line = line.line, "Skipping record: {}", e);
                    built.skipped += 1;
                    continue;
                }
            };

            let accepted = match record {
                RawRecord::Song(song) => match (build_song(&song), build_artist(&song)) {
                    (Ok(song), Ok(artist)) => {
                        built.batch.push(Row::Song(song));
                        built.batch.push(Row::Artist(artist));
                        Ok(())
                    }
                    (Err(e), _) | (_, Err(e)) => Err(e),
                },
                RawRecord::Event(event) => {
                    let time_bucket = time.add(&event);
                    let songplay = resolve_songplay(&event, catalog);

                    match (time_bucket, songplay) {
                        (Ok(bucket), Ok(outcome)) => {
                            if let Some(user) = build_user(&event) {
                                built.batch.push(Row::User(user));
                            }
                            if let Some(bucket) = bucket {
                                built.batch.push(Row::Time(bucket));
                            }
                            match outcome {
                                SongplayOutcome::Filtered => {}
                                SongplayOutcome::MissingKey => {
                                    warn!(
                                        unit = %unit.id,
                                        file = %name,
                                        line = line.line,
                                        "Song play without user or session id, no fact emitted"
                                    );
                                    built.skipped += 1;
                                }
                                SongplayOutcome::Emitted {
                                    songplay,
                                    resolution,
                                } => {
                                    if resolution.is_matched() {
                                        built.resolved += 1;
                                    } else {
                                        built.unresolved += 1;
                                    }
                                    built.batch.push(Row::Songplay(songplay));
                                }
                            }
                            Ok(())
                        }
                        (Err(e), _) | (_, Err(e)) => Err(e),
                    }
                }
            };

            if let Err(e) = accepted {
                warn!(unit = %unit.id, file = %name, line = line.line, "Skipping record: {}", e);
                built.skipped += 1;
            }
        }
    }

    if kind == RecordKind::LogEvent && built.unresolved > 0 {
        tracing::debug!(
            unit = %unit.id,
            resolved = built.resolved,
            unresolved = built.unresolved,
            "Song plays resolved against catalog"
        );
    }

    Ok(built)
}

/// Empty catalog for runs without a song phase
struct NoCatalog;

impl CatalogLookup for NoCatalog {
    fn lookup(&self, _title: &str, _artist_name: &str, _duration: f64) -> &[CatalogMatch] {
        &[]
    }
}
