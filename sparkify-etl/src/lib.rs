//! sparkify-etl library interface
//!
//! Turns song-metadata and user-activity JSON into a star schema
//! (`songplays` fact; `users`, `songs`, `artists`, `time` dimensions) on one
//! of three backends. The binary and the integration tests both go through
//! [`run_pipeline`] or [`workflow::PipelineDriver`].

pub mod db;
pub mod error;
pub mod loaders;
pub mod models;
pub mod services;
pub mod utils;
pub mod workflow;

pub use crate::error::{EtlError, EtlResult};

use crate::models::{PipelineReport, RecordKind};
use crate::services::JsonDirSource;
use crate::workflow::{LogProgress, PipelineDriver};
use sparkify_common::EtlConfig;
use std::sync::Arc;

/// Validate `config`, open its target and run the pipeline over its
/// source directories
pub async fn run_pipeline(config: &EtlConfig) -> EtlResult<PipelineReport> {
    config.validate()?;

    let loader = loaders::open_loader(config).await?;
    let songs = Arc::new(JsonDirSource::new(config.song_data.clone(), RecordKind::SongMetadata));
    let logs = Arc::new(JsonDirSource::new(config.log_data.clone(), RecordKind::LogEvent));

    let mut driver = PipelineDriver::new(config.clone(), loader, songs, logs)
        .with_progress(Arc::new(LogProgress));
    driver.run().await
}
