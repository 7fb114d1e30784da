//! Pipeline orchestration
//!
//! [`PipelineDriver`] owns the run state machine
//! (`Idle → Discovering → Processing → Committed | Failed`) and schedules
//! units against a [`crate::loaders::Loader`]; [`ProgressSink`] observes it.

pub mod driver;
pub mod progress;

pub use driver::{plan_units, PipelineDriver};
pub use progress::{LogProgress, NoProgress, ProgressSink};
