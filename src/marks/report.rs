//! Per-group run reports.
//!
//! The runner opens one report per (discipline, group), the engine appends to
//! it, and finishing hands an immutable snapshot to the caller's callback.

use serde::Serialize;
use std::fmt;

use crate::marks::reconcile::MergeStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UpdateStatus {
    Updated,
    Failed,
    Skipped,
}

impl UpdateStatus {
    pub const ALL: [UpdateStatus; 3] = [Self::Updated, Self::Failed, Self::Skipped];

    pub fn label(self) -> &'static str {
        match self {
            Self::Updated => "Updated",
            Self::Failed => "Failed",
            Self::Skipped => "Skipped",
        }
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of one student's unit of work in one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    pub status: UpdateStatus,
    pub description: String,
}

/// Outcomes sharing a status, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeGroup {
    pub title: String,
    pub students: Vec<String>,
}

/// Group outcomes by status, in `Updated, Failed, Skipped` order. Empty
/// statuses are left out.
pub fn group_outcomes(outcomes: &[UpdateOutcome]) -> Vec<OutcomeGroup> {
    UpdateStatus::ALL
        .into_iter()
        .filter_map(|status| {
            let students: Vec<String> = outcomes
                .iter()
                .filter(|o| o.status == status)
                .map(|o| o.description.clone())
                .collect();
            (!students.is_empty()).then(|| OutcomeGroup {
                title: status.label().to_string(),
                students,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub group_key: String,
    pub merge: Option<MergeStats>,
    pub marks: Vec<OutcomeGroup>,
    pub failures: Vec<OutcomeGroup>,
    pub config_errors: Vec<String>,
}

impl Report {
    fn new(group_key: String) -> Self {
        Self {
            group_key,
            ..Self::default()
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.config_errors.is_empty()
            || self
                .marks
                .iter()
                .chain(&self.failures)
                .any(|g| g.title == UpdateStatus::Failed.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReportError {
    #[error("no report in progress")]
    NoReportInProgress,
}

/// Accumulates the current report and emits finished ones.
///
/// Exactly one report is current at a time; starting a new one finishes the
/// previous one first.
pub struct ReportBuilder {
    current: Option<Report>,
    on_finish: Box<dyn FnMut(Report) + Send>,
}

impl ReportBuilder {
    pub fn new(on_finish: impl FnMut(Report) + Send + 'static) -> Self {
        Self {
            current: None,
            on_finish: Box::new(on_finish),
        }
    }

    /// Finish any report in progress and start an empty one.
    pub fn new_report(&mut self, group_key: impl Into<String>) {
        self.finish_report();
        self.current = Some(Report::new(group_key.into()));
    }

    pub fn current(&self) -> Result<&Report, ReportError> {
        self.current.as_ref().ok_or(ReportError::NoReportInProgress)
    }

    pub fn current_mut(&mut self) -> Result<&mut Report, ReportError> {
        self.current.as_mut().ok_or(ReportError::NoReportInProgress)
    }

    pub fn is_in_progress(&self) -> bool {
        self.current.is_some()
    }

    pub fn set_merge_stats(&mut self, stats: MergeStats) -> Result<(), ReportError> {
        self.current_mut()?.merge = Some(stats);
        Ok(())
    }

    pub fn add_mark_outcomes(&mut self, outcomes: &[UpdateOutcome]) -> Result<(), ReportError> {
        self.current_mut()?.marks.extend(group_outcomes(outcomes));
        Ok(())
    }

    pub fn add_failure_outcomes(&mut self, outcomes: &[UpdateOutcome]) -> Result<(), ReportError> {
        self.current_mut()?.failures.extend(group_outcomes(outcomes));
        Ok(())
    }

    /// Record configuration problems without aborting anything.
    pub fn on_invalid_configuration<I, S>(&mut self, messages: I) -> Result<(), ReportError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.current_mut()?
            .config_errors
            .extend(messages.into_iter().map(Into::into));
        Ok(())
    }

    /// Emit the current report, if any. A no-op when nothing is in progress.
    pub fn finish_report(&mut self) {
        if let Some(report) = self.current.take() {
            (self.on_finish)(report);
        }
    }
}
