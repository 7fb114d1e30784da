//! Fault-injecting loader
//!
//! Wraps a real loader and injects store failures, so retry, timeout and
//! fail-fast handling can be exercised against real targets.

use async_trait::async_trait;
use sparkify_etl::error::StoreError;
use sparkify_etl::loaders::{ExecutionModel, Loader};
use sparkify_etl::models::{EntityCounts, LoadStats, RowBatch, UnitId};
use sparkify_etl::services::CatalogIndex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Fault {
    /// The first `n` load calls fail with a retriable error
    RetriableLoads(u32),
    /// Every load of this unit fails with a retriable error
    AlwaysRetriable(UnitId),
    /// Loads of this unit fail with a fatal error
    FatalOn(UnitId),
    /// Loads of this unit sleep for the given time before delegating
    SlowOn(UnitId, Duration),
    /// Every flush fails with a fatal error
    FatalFlush,
    /// The catalog snapshot fails with a fatal error
    FatalCatalog,
}

pub struct FaultyLoader {
    inner: Arc<dyn Loader>,
    fault: Fault,
    load_calls: AtomicU32,
}

impl FaultyLoader {
    pub fn new(inner: Arc<dyn Loader>, fault: Fault) -> Self {
        Self {
            inner,
            fault,
            load_calls: AtomicU32::new(0),
        }
    }

    /// Load calls made so far, including failed ones
    pub fn load_calls(&self) -> u32 {
        self.load_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Loader for FaultyLoader {
    fn name(&self) -> &'static str {
        "faulty"
    }

    fn execution_model(&self) -> ExecutionModel {
        self.inner.execution_model()
    }

    async fn load(&self, unit: UnitId, batch: &RowBatch) -> Result<LoadStats, StoreError> {
        let call = self.load_calls.fetch_add(1, Ordering::SeqCst) + 1;

        match &self.fault {
            Fault::RetriableLoads(n) if call <= *n => {
                return Err(StoreError::Retriable("database is locked".into()));
            }
            Fault::AlwaysRetriable(target) if *target == unit => {
                return Err(StoreError::Retriable("database is locked".into()));
            }
            Fault::FatalOn(target) if *target == unit => {
                return Err(StoreError::Fatal("CHECK constraint failed".into()));
            }
            Fault::SlowOn(target, delay) if *target == unit => {
                tokio::time::sleep(*delay).await;
            }
            _ => {}
        }

        self.inner.load(unit, batch).await
    }

    async fn flush(&self) -> Result<LoadStats, StoreError> {
        if matches!(self.fault, Fault::FatalFlush) {
            return Err(StoreError::Fatal("disk full".into()));
        }
        self.inner.flush().await
    }

    async fn discard(&self) {
        self.inner.discard().await
    }

    async fn catalog(&self) -> Result<CatalogIndex, StoreError> {
        if matches!(self.fault, Fault::FatalCatalog) {
            return Err(StoreError::Fatal("no such table: songs".into()));
        }
        self.inner.catalog().await
    }

    async fn counts(&self) -> Result<EntityCounts, StoreError> {
        self.inner.counts().await
    }

    async fn reset(&self) -> Result<(), StoreError> {
        self.inner.reset().await
    }
}
