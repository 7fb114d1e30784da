//! Data models for sparkify-etl
//!
//! - `records`: typed raw records (parser output)
//! - `rows`: star-schema rows, natural keys and load policies
//! - `pipeline`: driver state machine, work units and the run report

pub mod pipeline;
pub mod records;
pub mod rows;

pub use pipeline::{
    Phase, PipelineReport, PipelineState, PipelineStatus, UnitId, UnitOutcome, UnitStatus,
    WorkUnit,
};
pub use records::{Gender, Level, LogEvent, RawRecord, RecordKind, SongRecord, SONG_PLAY_PAGE};
pub use rows::{
    Artist, Entity, EntityCounts, LoadPolicy, LoadStats, NaturalKey, Row, RowBatch, Song,
    Songplay, TimeBucket, User,
};
