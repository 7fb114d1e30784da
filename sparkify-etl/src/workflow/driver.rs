//! Pipeline driver
//!
//! Runs the songs phase, snapshots the song/artist catalog, then runs the
//! logs phase. Each phase is cut into units of `files_per_unit` source
//! files; a unit commits or fails as a whole.
//!
//! # Scheduling
//! - Row-transaction and staged-merge loaders: units are built and loaded
//!   one at a time, in discovery order.
//! - Partition-overwrite loaders: all units of a phase are built in
//!   parallel (rayon), then loaded (buffered), then committed by one
//!   flush. A failed flush fails every unit buffered in that phase.
//!
//! # Failure handling
//! Retriable store errors are retried with backoff. Fatal errors and
//! timeouts fail the unit. Under `fail_fast` the first failed unit ends
//! the run: the remaining units are reported as not attempted and the
//! run ends in [`PipelineState::Failed`].

use super::progress::{NoProgress, ProgressSink};
use crate::error::{EtlError, EtlResult, SourceError, StoreError};
use crate::loaders::Loader;
use crate::models::{
    LoadStats, Phase, PipelineReport, PipelineState, UnitId, UnitOutcome, UnitStatus, WorkUnit,
};
use crate::services::{build_unit, BuiltUnit, CatalogIndex, CatalogLookup, RecordSource};
use crate::utils::retry::{retry_retriable, with_timeout, Retried};
use rayon::prelude::*;
use sparkify_common::EtlConfig;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Reason recorded for units buffered when a fail-fast abort hits
const ABORTED_BEFORE_FLUSH: &str = "run aborted before flush";

pub struct PipelineDriver {
    config: EtlConfig,
    loader: Arc<dyn Loader>,
    songs: Arc<dyn RecordSource>,
    logs: Arc<dyn RecordSource>,
    progress: Arc<dyn ProgressSink>,
    state: PipelineState,
}

/// Outcomes and counters gathered across both phases
#[derive(Default)]
struct RunLedger {
    total: usize,
    outcomes: Vec<UnitOutcome>,
    flushed: LoadStats,
    resolved: u64,
    unresolved: u64,
    aborted: bool,
}

impl RunLedger {
    fn finish(&mut self, outcome: UnitOutcome, progress: &dyn ProgressSink) {
        self.outcomes.push(outcome);
        progress.on_progress(self.total, self.outcomes.len());
    }

    fn commit(&mut self, outcome: UnitOutcome, built: &BuiltUnit, progress: &dyn ProgressSink) {
        self.resolved += built.resolved;
        self.unresolved += built.unresolved;
        self.finish(outcome, progress);
    }
}

impl PipelineDriver {
    pub fn new(
        config: EtlConfig,
        loader: Arc<dyn Loader>,
        songs: Arc<dyn RecordSource>,
        logs: Arc<dyn RecordSource>,
    ) -> Self {
        Self {
            config,
            loader,
            songs,
            logs,
            progress: Arc::new(NoProgress),
            state: PipelineState::Idle,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Run both phases and report per-unit outcomes
    ///
    /// Returns `Err` only when the run cannot start (unusable source or
    /// failed discovery). Unit failures are reported, not raised.
    pub async fn run(&mut self) -> EtlResult<PipelineReport> {
        info!(
            loader = self.loader.name(),
            songs = %self.songs.describe(),
            logs = %self.logs.describe(),
            "Pipeline starting"
        );

        if let Err(e) = self.songs.check().and_then(|_| self.logs.check()) {
            error!("Source check failed: {}", e);
            self.state.transition(PipelineState::Failed)?;
            return Err(EtlError::Configuration(e.to_string()));
        }

        self.state.transition(PipelineState::Discovering)?;
        let files_per_unit = self.config.load.files_per_unit;
        let planned = plan_units(Phase::Songs, self.songs.as_ref(), files_per_unit).and_then(|songs| {
            Ok((songs, plan_units(Phase::Logs, self.logs.as_ref(), files_per_unit)?))
        });
        let (song_units, log_units) = match planned {
            Ok(units) => units,
            Err(e) => {
                error!("Discovery failed: {}", e);
                self.state.transition(PipelineState::Failed)?;
                return Err(e.into());
            }
        };
        info!(
            song_units = song_units.len(),
            log_units = log_units.len(),
            "Discovery complete"
        );

        self.state.transition(PipelineState::Processing)?;
        let mut ledger = RunLedger {
            total: song_units.len() + log_units.len(),
            ..RunLedger::default()
        };

        let songs = Arc::clone(&self.songs);
        self.run_phase(&mut ledger, songs, song_units, None).await;

        if ledger.aborted {
            self.skip_units(&mut ledger, &log_units, UnitStatus::NotAttempted);
        } else {
            match self.snapshot_catalog().await {
                Ok(catalog) => {
                    info!(songs = catalog.len(), "Catalog snapshot taken");
                    let logs = Arc::clone(&self.logs);
                    self.run_phase(&mut ledger, logs, log_units, Some(Arc::new(catalog)))
                        .await;
                }
                Err(e) => {
                    error!("Catalog snapshot failed: {}", e);
                    let status = UnitStatus::Failed {
                        reason: format!("catalog unavailable: {}", e),
                    };
                    if !log_units.is_empty() && self.config.load.fail_fast {
                        ledger.aborted = true;
                    }
                    self.skip_units(&mut ledger, &log_units, status);
                }
            }
        }

        let final_state = if ledger.aborted {
            PipelineState::Failed
        } else {
            PipelineState::Committed
        };
        self.state.transition(final_state)?;

        let mut outcomes = std::mem::take(&mut ledger.outcomes);
        outcomes.sort_by_key(|o| o.unit);
        let report = PipelineReport::from_outcomes(
            self.state,
            outcomes,
            ledger.flushed,
            ledger.resolved,
            ledger.unresolved,
        );

        info!(
            state = ?report.state,
            units = report.units.len(),
            failed = report.failed_units().len(),
            skipped = report.skipped,
            resolved = report.resolved_songplays,
            unresolved = report.unresolved_songplays,
            "Pipeline finished"
        );
        Ok(report)
    }

    async fn run_phase(
        &self,
        ledger: &mut RunLedger,
        source: Arc<dyn RecordSource>,
        units: Vec<WorkUnit>,
        catalog: Option<Arc<CatalogIndex>>,
    ) {
        if self.loader.execution_model().is_parallel() {
            self.run_parallel(ledger, source, units, catalog).await;
        } else {
            self.run_sequential(ledger, source, units, catalog).await;
        }
    }

    async fn run_sequential(
        &self,
        ledger: &mut RunLedger,
        source: Arc<dyn RecordSource>,
        units: Vec<WorkUnit>,
        catalog: Option<Arc<CatalogIndex>>,
    ) {
        for unit in units {
            if ledger.aborted {
                ledger.finish(empty_outcome(&unit, UnitStatus::NotAttempted), self.progress.as_ref());
                continue;
            }

            let built = build_blocking(Arc::clone(&source), unit.clone(), catalog.clone()).await;
            let built = match built {
                Ok(built) => built,
                Err(reason) => {
                    self.fail_unit(ledger, empty_outcome(&unit, UnitStatus::Failed { reason }));
                    continue;
                }
            };

            let retried = self.load_unit(&unit, &built).await;
            let attempts = retried.attempts;
            match retried.result {
                Ok(stats) => {
                    let outcome = built_outcome(&unit, &built, UnitStatus::Committed, attempts, stats);
                    ledger.commit(outcome, &built, self.progress.as_ref());
                }
                Err(e) => {
                    let status = UnitStatus::Failed {
                        reason: e.to_string(),
                    };
                    let outcome = built_outcome(&unit, &built, status, attempts, LoadStats::default());
                    self.fail_unit(ledger, outcome);
                }
            }
        }
    }

    async fn run_parallel(
        &self,
        ledger: &mut RunLedger,
        source: Arc<dyn RecordSource>,
        units: Vec<WorkUnit>,
        catalog: Option<Arc<CatalogIndex>>,
    ) {
        if units.is_empty() {
            return;
        }

        let plan = units.clone();
        let built_all = tokio::task::spawn_blocking(move || {
            plan.par_iter()
                .map(|unit| build_one(source.as_ref(), unit, catalog.as_deref()))
                .collect::<Vec<_>>()
        })
        .await
        .unwrap_or_else(|e| {
            let reason = format!("build task failed: {}", e);
            units.iter().map(|_| Err(reason.clone())).collect()
        });
        debug!(units = units.len(), "Phase built");

        let mut buffered: Vec<(UnitOutcome, BuiltUnit)> = Vec::new();
        for (unit, built) in units.iter().zip(built_all) {
            if ledger.aborted {
                ledger.finish(empty_outcome(unit, UnitStatus::NotAttempted), self.progress.as_ref());
                continue;
            }

            let built = match built {
                Ok(built) => built,
                Err(reason) => {
                    self.fail_unit(ledger, empty_outcome(unit, UnitStatus::Failed { reason }));
                    continue;
                }
            };

            let retried = self.load_unit(unit, &built).await;
            let attempts = retried.attempts;
            match retried.result {
                Ok(stats) => {
                    let outcome = built_outcome(unit, &built, UnitStatus::Committed, attempts, stats);
                    buffered.push((outcome, built));
                }
                Err(e) => {
                    let status = UnitStatus::Failed {
                        reason: e.to_string(),
                    };
                    let outcome = built_outcome(unit, &built, status, attempts, LoadStats::default());
                    self.fail_unit(ledger, outcome);
                }
            }
        }

        if buffered.is_empty() {
            return;
        }

        if ledger.aborted {
            self.loader.discard().await;
            for (mut outcome, _) in buffered {
                outcome.status = UnitStatus::Failed {
                    reason: ABORTED_BEFORE_FLUSH.to_string(),
                };
                ledger.finish(outcome, self.progress.as_ref());
            }
            return;
        }

        let timeout = self.config.load.timeout();
        let loader = &self.loader;
        let flushed = retry_retriable("flush", &self.config.load, || {
            with_timeout(timeout, loader.flush())
        })
        .await;

        match flushed.result {
            Ok(stats) => {
                ledger.flushed.merge(&stats);
                for (outcome, built) in buffered {
                    ledger.commit(outcome, &built, self.progress.as_ref());
                }
            }
            Err(e) => {
                error!(units = buffered.len(), "Flush failed: {}", e);
                self.loader.discard().await;
                let reason = format!("flush failed: {}", e);
                for (mut outcome, _) in buffered {
                    outcome.status = UnitStatus::Failed {
                        reason: reason.clone(),
                    };
                    ledger.finish(outcome, self.progress.as_ref());
                }
                if self.config.load.fail_fast {
                    ledger.aborted = true;
                }
            }
        }
    }

    async fn load_unit(&self, unit: &WorkUnit, built: &BuiltUnit) -> Retried<LoadStats> {
        let timeout = self.config.load.timeout();
        let operation = format!("load {}", unit.id);
        let loader = &self.loader;
        let batch = &built.batch;

        retry_retriable(&operation, &self.config.load, || {
            with_timeout(timeout, loader.load(unit.id, batch))
        })
        .await
    }

    async fn snapshot_catalog(&self) -> Result<CatalogIndex, StoreError> {
        let timeout = self.config.load.timeout();
        let loader = &self.loader;

        retry_retriable("catalog snapshot", &self.config.load, || {
            with_timeout(timeout, loader.catalog())
        })
        .await
        .result
    }

    fn fail_unit(&self, ledger: &mut RunLedger, outcome: UnitOutcome) {
        if let UnitStatus::Failed { reason } = &outcome.status {
            warn!(unit = %outcome.unit, attempts = outcome.attempts, "Unit failed: {}", reason);
        }
        if self.config.load.fail_fast {
            warn!(unit = %outcome.unit, "Fail-fast: aborting run");
            ledger.aborted = true;
        }
        ledger.finish(outcome, self.progress.as_ref());
    }

    fn skip_units(&self, ledger: &mut RunLedger, units: &[WorkUnit], status: UnitStatus) {
        for unit in units {
            ledger.finish(empty_outcome(unit, status.clone()), self.progress.as_ref());
        }
    }
}

/// Cut a source's items into units of `files_per_unit`, in discovery order
pub fn plan_units(
    phase: Phase,
    source: &dyn RecordSource,
    files_per_unit: usize,
) -> Result<Vec<WorkUnit>, SourceError> {
    let items = source.discover()?;
    Ok(items
        .chunks(files_per_unit.max(1))
        .enumerate()
        .map(|(index, chunk)| WorkUnit {
            id: UnitId { phase, index },
            items: chunk.iter().map(|item| item.name.clone()).collect(),
        })
        .collect())
}

fn build_one(
    source: &dyn RecordSource,
    unit: &WorkUnit,
    catalog: Option<&CatalogIndex>,
) -> Result<BuiltUnit, String> {
    build_unit(source, unit, catalog.map(|c| c as &dyn CatalogLookup)).map_err(|e| e.to_string())
}

async fn build_blocking(
    source: Arc<dyn RecordSource>,
    unit: WorkUnit,
    catalog: Option<Arc<CatalogIndex>>,
) -> Result<BuiltUnit, String> {
    tokio::task::spawn_blocking(move || build_one(source.as_ref(), &unit, catalog.as_deref()))
        .await
        .map_err(|e| format!("build task failed: {}", e))?
}

fn empty_outcome(unit: &WorkUnit, status: UnitStatus) -> UnitOutcome {
    UnitOutcome {
        unit: unit.id,
        items: unit.items.clone(),
        status,
        attempts: 0,
        records: 0,
        skipped: 0,
        emitted: Default::default(),
        load: LoadStats::default(),
    }
}

fn built_outcome(
    unit: &WorkUnit,
    built: &BuiltUnit,
    status: UnitStatus,
    attempts: u32,
    load: LoadStats,
) -> UnitOutcome {
    UnitOutcome {
        attempts,
        records: built.records,
        skipped: built.skipped,
        emitted: built.batch.counts(),
        load,
        ..empty_outcome(unit, status)
    }
}
