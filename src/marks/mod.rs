//! Spreadsheet-to-portal mark synchronization.

pub mod control_actions;
pub mod engine;
pub mod names;
pub mod portal;
pub mod reconcile;
pub mod report;
pub mod runner;
pub mod values;

pub use engine::UpdateMode;
pub use portal::{DisciplineDirectory, Portal, ServiceError, ServiceResult, SheetSource};
pub use report::{Report, ReportBuilder};
pub use runner::{MarksRunner, RunOutcome, RunRequest, RunState, RunSummary};
