//! Pipeline run state, work units and the run report

use super::rows::{EntityCounts, LoadStats};
use crate::error::{EtlError, EtlResult};
use serde::Serialize;

/// Driver state machine
///
/// ```text
/// Idle -> Discovering -> Processing -> Committed
///   \          \              \
///    +----------+--------------+-----> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Idle,
    Discovering,
    Processing,
    Committed,
    Failed,
}

impl PipelineState {
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, Discovering)
                | (Idle, Failed)
                | (Discovering, Processing)
                | (Discovering, Failed)
                | (Processing, Committed)
                | (Processing, Failed)
        )
    }

    /// Move to `next`, rejecting transitions outside the state machine
    pub fn transition(&mut self, next: PipelineState) -> EtlResult<()> {
        if !self.can_transition_to(next) {
            return Err(EtlError::Internal(format!(
                "illegal pipeline transition {:?} -> {:?}",
                self, next
            )));
        }
        tracing::debug!(from = ?self, to = ?next, "Pipeline state transition");
        *self = next;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Committed | PipelineState::Failed)
    }
}

/// Which source a unit was cut from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Songs,
    Logs,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Songs => f.write_str("songs"),
            Phase::Logs => f.write_str("logs"),
        }
    }
}

/// Stable identifier of a unit within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct UnitId {
    pub phase: Phase,
    pub index: usize,
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.phase, self.index)
    }
}

/// A group of source items processed and committed together
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkUnit {
    pub id: UnitId,
    /// Source item names, in discovery order
    pub items: Vec<String>,
}

/// Final status of one unit
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitStatus {
    Committed,
    Failed { reason: String },
    /// Skipped after an earlier failure under fail-fast
    NotAttempted,
}

/// Outcome of one unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitOutcome {
    pub unit: UnitId,
    pub items: Vec<String>,
    pub status: UnitStatus,
    /// Load attempts made (0 when never loaded)
    pub attempts: u32,
    /// Raw records read
    pub records: u64,
    /// Records rejected by the parser or builders, or unusable as facts
    pub skipped: u64,
    /// Rows handed to the loader
    pub emitted: EntityCounts,
    pub load: LoadStats,
}

impl UnitOutcome {
    pub fn is_committed(&self) -> bool {
        self.status == UnitStatus::Committed
    }
}

/// Overall outcome of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineStatus {
    FullyCommitted,
    Partial { failed_units: Vec<UnitId> },
}

/// Report returned by a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub state: PipelineState,
    pub status: PipelineStatus,
    pub units: Vec<UnitOutcome>,
    pub emitted: EntityCounts,
    /// What the target did with the emitted rows, including deferred flushes
    pub loaded: LoadStats,
    pub skipped: u64,
    pub resolved_songplays: u64,
    pub unresolved_songplays: u64,
}

impl PipelineReport {
    pub fn is_fully_committed(&self) -> bool {
        self.status == PipelineStatus::FullyCommitted
    }

    /// Units that did not commit (failed or never attempted)
    pub fn failed_units(&self) -> Vec<UnitId> {
        match &self.status {
            PipelineStatus::FullyCommitted => Vec::new(),
            PipelineStatus::Partial { failed_units } => failed_units.clone(),
        }
    }

    pub(crate) fn from_outcomes(
        state: PipelineState,
        units: Vec<UnitOutcome>,
        flushed: LoadStats,
        resolved_songplays: u64,
        unresolved_songplays: u64,
    ) -> Self {
        let failed_units: Vec<UnitId> = units
            .iter()
            .filter(|u| !u.is_committed())
            .map(|u| u.unit)
            .collect();

        let status = if failed_units.is_empty() {
            PipelineStatus::FullyCommitted
        } else {
            PipelineStatus::Partial { failed_units }
        };

        let mut emitted = EntityCounts::default();
        let mut loaded = flushed;
        let mut skipped = 0;
        for unit in &units {
            emitted.merge(&unit.emitted);
            loaded.merge(&unit.load);
            skipped += unit.skipped;
        }

        Self {
            state,
            status,
            units,
            emitted,
            loaded,
            skipped,
            resolved_songplays,
            unresolved_songplays,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(index: usize, status: UnitStatus) -> UnitOutcome {
        UnitOutcome {
            unit: UnitId {
                phase: Phase::Logs,
                index,
            },
            items: vec![format!("{}.json", index)],
            status,
            attempts: 1,
            records: 3,
            skipped: 1,
            emitted: EntityCounts::default(),
            load: LoadStats::default(),
        }
    }

    #[test]
    fn test_forward_transitions() {
        let mut state = PipelineState::Idle;
        state.transition(PipelineState::Discovering).unwrap();
        state.transition(PipelineState::Processing).unwrap();
        state.transition(PipelineState::Committed).unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn test_never_reenters_discovering() {
        let mut state = PipelineState::Processing;
        let result = state.transition(PipelineState::Discovering);
        assert!(matches!(result, Err(EtlError::Internal(_))));
        assert_eq!(state, PipelineState::Processing);
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [PipelineState::Committed, PipelineState::Failed] {
            for next in [
                PipelineState::Idle,
                PipelineState::Discovering,
                PipelineState::Processing,
                PipelineState::Committed,
                PipelineState::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_report_lists_failed_and_not_attempted_units() {
        let report = PipelineReport::from_outcomes(
            PipelineState::Committed,
            vec![
                outcome(0, UnitStatus::Committed),
                outcome(1, UnitStatus::Failed {
                    reason: "constraint".into(),
                }),
                outcome(2, UnitStatus::NotAttempted),
            ],
            LoadStats::default(),
            0,
            0,
        );

        assert!(!report.is_fully_committed());
        let failed: Vec<usize> = report.failed_units().iter().map(|u| u.index).collect();
        assert_eq!(failed, vec![1, 2]);
        assert_eq!(report.skipped, 3);
    }

    #[test]
    fn test_report_fully_committed() {
        let report = PipelineReport::from_outcomes(
            PipelineState::Committed,
            vec![outcome(0, UnitStatus::Committed)],
            LoadStats::default(),
            1,
            0,
        );
        assert!(report.is_fully_committed());
        assert!(report.failed_units().is_empty());
    }
}
