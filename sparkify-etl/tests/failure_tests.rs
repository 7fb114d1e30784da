//! Retry, timeout and fail-fast behaviour of the pipeline driver

mod helpers;

use helpers::datasets::MONDAY_MS;
use helpers::{event, song_line, Fault, FaultyLoader};
use sparkify_common::db::init_memory_database;
use sparkify_common::EtlConfig;
use sparkify_etl::loaders::{LakeLoader, Loader, TransactionalLoader};
use sparkify_etl::models::{Phase, PipelineState, RecordKind, UnitId, UnitStatus};
use sparkify_etl::services::MemorySource;
use sparkify_etl::workflow::PipelineDriver;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn config() -> EtlConfig {
    let mut config = EtlConfig::default();
    config.load.max_retries = 3;
    config.load.initial_backoff_ms = 1;
    config.load.max_backoff_ms = 4;
    config.load.timeout_ms = 2_000;
    config
}

fn songs(files: usize) -> Arc<MemorySource> {
    let source = (0..files).fold(MemorySource::new(RecordKind::SongMetadata), |source, i| {
        source.with_item(
            &format!("song_{}.json", i),
            vec![song_line(&format!("S{}", i), "AR1", "Artist", "Title", 100.0 + i as f64, 2000)],
        )
    });
    Arc::new(source)
}

fn logs() -> Arc<MemorySource> {
    Arc::new(MemorySource::new(RecordKind::LogEvent).with_item(
        "events.json",
        vec![event(MONDAY_MS).play("Title", "Artist", 100.0).line()],
    ))
}

fn song_unit(index: usize) -> UnitId {
    UnitId {
        phase: Phase::Songs,
        index,
    }
}

async fn sqlite_loader() -> Arc<dyn Loader> {
    Arc::new(TransactionalLoader::from_pool(init_memory_database().await.unwrap()))
}

#[tokio::test]
async fn test_retriable_failures_are_retried() {
    let loader = Arc::new(FaultyLoader::new(sqlite_loader().await, Fault::RetriableLoads(2)));
    let mut driver = PipelineDriver::new(config(), loader.clone(), songs(1), logs());

    let report = driver.run().await.unwrap();

    assert!(report.is_fully_committed());
    assert_eq!(report.units[0].attempts, 3);
    assert_eq!(loader.load_calls(), 4);
    assert_eq!(report.resolved_songplays, 1);
}

#[tokio::test]
async fn test_exhausted_retries_fail_only_that_unit() {
    let loader = Arc::new(FaultyLoader::new(
        sqlite_loader().await,
        Fault::AlwaysRetriable(song_unit(1)),
    ));
    let mut driver = PipelineDriver::new(config(), loader, songs(3), logs());

    let report = driver.run().await.unwrap();

    assert_eq!(report.state, PipelineState::Committed);
    assert_eq!(report.failed_units(), vec![song_unit(1)]);
    assert_eq!(report.units[1].attempts, 4);
    assert!(report.units[2].is_committed());
    assert_eq!(report.loaded.inserted.songs, 2);
}

#[tokio::test]
async fn test_timeout_fails_unit_without_retry() {
    let mut config = config();
    config.load.timeout_ms = 200;
    let loader = Arc::new(FaultyLoader::new(
        sqlite_loader().await,
        Fault::SlowOn(song_unit(0), Duration::from_secs(5)),
    ));
    let mut driver = PipelineDriver::new(config, loader.clone(), songs(2), logs());

    let report = driver.run().await.unwrap();

    assert_eq!(report.failed_units(), vec![song_unit(0)]);
    assert_eq!(report.units[0].attempts, 1);
    match &report.units[0].status {
        UnitStatus::Failed { reason } => assert!(reason.contains("timed out"), "{}", reason),
        other => panic!("unexpected status {:?}", other),
    }
    assert!(report.units[1].is_committed());
}

#[tokio::test]
async fn test_fail_fast_stops_at_first_failure() {
    let mut config = config();
    config.load.fail_fast = true;
    let loader = Arc::new(FaultyLoader::new(sqlite_loader().await, Fault::FatalOn(song_unit(1))));
    let mut driver = PipelineDriver::new(config, loader, songs(3), logs());

    let report = driver.run().await.unwrap();

    assert_eq!(driver.state(), PipelineState::Failed);
    assert_eq!(report.state, PipelineState::Failed);
    assert!(report.units[0].is_committed());
    assert!(matches!(report.units[1].status, UnitStatus::Failed { .. }));
    assert_eq!(report.units[2].status, UnitStatus::NotAttempted);
    assert_eq!(report.units[3].status, UnitStatus::NotAttempted);
    assert_eq!(report.units[3].unit.phase, Phase::Logs);
}

#[tokio::test]
async fn test_catalog_failure_fails_log_units() {
    let loader = Arc::new(FaultyLoader::new(sqlite_loader().await, Fault::FatalCatalog));
    let mut driver = PipelineDriver::new(config(), loader, songs(1), logs());

    let report = driver.run().await.unwrap();

    assert_eq!(report.state, PipelineState::Committed);
    assert!(report.units[0].is_committed());
    assert_eq!(
        report.failed_units(),
        vec![UnitId {
            phase: Phase::Logs,
            index: 0
        }]
    );
}

#[tokio::test]
async fn test_lake_flush_failure_fails_every_buffered_unit() {
    let temp = TempDir::new().unwrap();
    let lake: Arc<dyn Loader> = Arc::new(LakeLoader::open(temp.path()).unwrap());
    let loader = Arc::new(FaultyLoader::new(lake.clone(), Fault::FatalFlush));
    let mut driver = PipelineDriver::new(config(), loader, songs(3), logs());

    let report = driver.run().await.unwrap();

    // Three song units and the one log unit, each phase with its own flush
    assert_eq!(report.failed_units().len(), 4);
    assert!(report.units.iter().all(|u| !u.is_committed()));
    // Nothing reached the lake
    assert_eq!(lake.counts().await.unwrap().total(), 0);
}

#[tokio::test]
async fn test_lake_fail_fast_discards_buffered_units() {
    let temp = TempDir::new().unwrap();
    let mut config = config();
    config.load.fail_fast = true;
    let lake: Arc<dyn Loader> = Arc::new(LakeLoader::open(temp.path()).unwrap());
    let loader = Arc::new(FaultyLoader::new(lake.clone(), Fault::FatalOn(song_unit(1))));
    let mut driver = PipelineDriver::new(config, loader, songs(3), logs());

    let report = driver.run().await.unwrap();

    assert_eq!(report.state, PipelineState::Failed);
    match &report.units[0].status {
        UnitStatus::Failed { reason } => assert_eq!(reason, "run aborted before flush"),
        other => panic!("unexpected status {:?}", other),
    }
    assert_eq!(report.units[2].status, UnitStatus::NotAttempted);
    assert_eq!(lake.counts().await.unwrap().total(), 0);
}
