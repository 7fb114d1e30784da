//! Transformation core
//!
//! Leaves first: the parser turns raw lines into typed records, the
//! dimension builders and songplay resolver turn records into rows, and the
//! unit builder strings them together for one unit of source files.

pub mod catalog;
pub mod dimension_builder;
pub mod file_scanner;
pub mod record_parser;
pub mod record_source;
pub mod songplay_resolver;
pub mod unit_builder;

pub use catalog::{CatalogEntry, CatalogIndex, CatalogLookup, CatalogMatch};
pub use dimension_builder::{
    build_artist, build_song, build_time_bucket, build_time_buckets, build_user, TimeBuilder,
};
pub use file_scanner::JsonDirSource;
pub use record_parser::{parse_line, parse_record};
pub use record_source::{MemorySource, RawLine, RecordIter, RecordSource, SourceItem};
pub use songplay_resolver::{resolve_songplay, Resolution, SongplayOutcome};
pub use unit_builder::{build_unit, BuiltUnit};
