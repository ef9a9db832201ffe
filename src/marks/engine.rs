//! Mark and failure-status update engine.
//!
//! For every matched student the engine compares each configured spreadsheet
//! column with the portal's current mark and writes only what changed. All
//! students of a group are processed concurrently; one student's columns are
//! written one after another.

use futures::future::join_all;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, warn};

use crate::brs::models::{FailureWrite, MarkWrite, PortalStudent};
use crate::marks::control_actions::ResolvedAction;
use crate::marks::portal::{Portal, ServiceError, ServiceResult};
use crate::marks::reconcile::MergedStudent;
use crate::marks::report::{UpdateOutcome, UpdateStatus};
use crate::marks::values::{FailureCode, format_mark, parse_mark};
use crate::utils::fmt_duration;

/// Whether writes reach the portal or are only previewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpdateMode {
    Save,
    DryRun,
}

/// Whether a mark has to be written.
///
/// A missing spreadsheet value never writes. A missing portal value is only
/// written when the new value is non-zero; an existing one only when it differs.
pub fn needs_update(actual: Option<f64>, portal: Option<f64>) -> bool {
    match (actual, portal) {
        (None, _) => false,
        (Some(actual), None) => actual != 0.0,
        (Some(actual), Some(portal)) => portal != actual,
    }
}

/// Write totals for one group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteCounts {
    pub updated: usize,
    pub failed: usize,
}

impl WriteCounts {
    pub fn add(&mut self, other: WriteCounts) {
        self.updated += other.updated;
        self.failed += other.failed;
    }
}

/// Everything the engine produced for one group.
#[derive(Debug, Default)]
pub struct GroupOutcome {
    /// One entry per matched student.
    pub marks: Vec<UpdateOutcome>,
    /// One entry per active portal student with no spreadsheet row.
    pub failures: Vec<UpdateOutcome>,
    pub writes: WriteCounts,
    /// First session expiry seen by any write; terminal for the run.
    pub session_expired: Option<ServiceError>,
}

/// Accumulates one student's sub-updates.
#[derive(Default)]
struct StudentTally {
    counts: WriteCounts,
    changes: Vec<String>,
    session_expired: Option<ServiceError>,
}

impl StudentTally {
    fn record(&mut self, result: ServiceResult<()>, change: String) {
        match result {
            Ok(()) => {
                self.counts.updated += 1;
                self.changes.push(change);
            }
            Err(e) => {
                self.counts.failed += 1;
                self.changes.push(format!("{change} failed: {e}"));
                if e.is_session_expired() && self.session_expired.is_none() {
                    self.session_expired = Some(e);
                }
            }
        }
    }

    fn status(&self) -> UpdateStatus {
        if self.counts.failed > 0 {
            UpdateStatus::Failed
        } else if self.counts.updated > 0 {
            UpdateStatus::Updated
        } else {
            UpdateStatus::Skipped
        }
    }

    fn into_outcome(self, name: &str, mode: UpdateMode) -> (UpdateOutcome, StudentTally) {
        let status = self.status();
        let mut description = if self.changes.is_empty() {
            format!("{name}: up to date")
        } else {
            format!("{name}: {}", self.changes.join("; "))
        };
        if mode == UpdateMode::DryRun && status == UpdateStatus::Updated {
            description.push_str(" (dry run)");
        }
        (
            UpdateOutcome {
                status,
                description,
            },
            self,
        )
    }
}

pub struct MarksEngine<'a, P: Portal + ?Sized> {
    portal: &'a P,
    mode: UpdateMode,
}

impl<'a, P: Portal + ?Sized> MarksEngine<'a, P> {
    pub fn new(portal: &'a P, mode: UpdateMode) -> Self {
        Self { portal, mode }
    }

    /// Reconcile marks for matched students and failure status for everyone.
    pub async fn apply(
        &self,
        pairs: &[MergedStudent],
        unmatched_portal: &[PortalStudent],
        actions: &[ResolvedAction],
        default_failure: FailureCode,
    ) -> GroupOutcome {
        let start = Instant::now();
        let mut outcome = GroupOutcome::default();

        let matched = join_all(
            pairs
                .iter()
                .map(|pair| self.apply_student(pair, actions, default_failure)),
        )
        .await;
        let portal_only = join_all(unmatched_portal.iter().map(|student| async move {
            let mut tally = StudentTally::default();
            self.sync_failure(student, default_failure, &mut tally).await;
            tally.into_outcome(&student.full_name, self.mode)
        }))
        .await;

        for (student_outcome, tally) in matched {
            outcome.marks.push(student_outcome);
            Self::absorb(&mut outcome, tally);
        }
        for (student_outcome, tally) in portal_only {
            outcome.failures.push(student_outcome);
            Self::absorb(&mut outcome, tally);
        }

        debug!(
            students = pairs.len() + unmatched_portal.len(),
            updated = outcome.writes.updated,
            failed = outcome.writes.failed,
            dry_run = self.mode == UpdateMode::DryRun,
            duration = fmt_duration(start.elapsed()),
            "Group updates applied"
        );
        outcome
    }

    fn absorb(outcome: &mut GroupOutcome, tally: StudentTally) {
        outcome.writes.add(tally.counts);
        if outcome.session_expired.is_none() {
            outcome.session_expired = tally.session_expired;
        }
    }

    async fn apply_student(
        &self,
        pair: &MergedStudent,
        actions: &[ResolvedAction],
        default_failure: FailureCode,
    ) -> (UpdateOutcome, StudentTally) {
        let mut tally = StudentTally::default();

        for resolved in actions {
            let action = &resolved.action;
            let actual = pair
                .actual
                .property(resolved.config.property_index())
                .and_then(parse_mark);
            let portal_raw = pair.portal.marks.get(&action.id).map(String::as_str);
            let portal = portal_raw.and_then(parse_mark);

            let Some(mark) = actual.filter(|_| needs_update(actual, portal)) else {
                continue;
            };

            let write = MarkWrite {
                student_id: pair.portal.student_id.clone(),
                control_action_id: action.id.clone(),
                mark,
                group_history_id: pair.portal.group_history_id.clone(),
                card_type: action.card_type,
                discipline_load_id: pair.portal.discipline_load_id.clone(),
            };
            let change = format!(
                "{} {} -> {}",
                action.display_name,
                portal.map(format_mark).unwrap_or_else(|| "-".to_string()),
                format_mark(mark)
            );
            let result = match self.mode {
                UpdateMode::Save => self.portal.put_mark(&write).await,
                UpdateMode::DryRun => Ok(()),
            };
            if let Err(e) = &result {
                warn!(
                    student = pair.portal.full_name,
                    control_action = action.display_name,
                    error = %e,
                    "Failed to write mark"
                );
            }
            tally.record(result, change);
        }

        let target = pair.actual.failure.unwrap_or(default_failure);
        self.sync_failure(&pair.portal, target, &mut tally).await;

        tally.into_outcome(&pair.portal.full_name, self.mode)
    }

    async fn sync_failure(
        &self,
        student: &PortalStudent,
        target: FailureCode,
        tally: &mut StudentTally,
    ) {
        let current = student.failure.unwrap_or(FailureCode::NoFailure);
        if current == target {
            return;
        }

        let write = FailureWrite {
            student_id: student.student_id.clone(),
            discipline_load_id: student.discipline_load_id.clone(),
            group_history_id: student.group_history_id.clone(),
            failure: target,
            card_type: student.card_type,
        };
        let result = match self.mode {
            UpdateMode::Save => self.portal.put_failure(&write).await,
            UpdateMode::DryRun => Ok(()),
        };
        if let Err(e) = &result {
            warn!(
                student = student.full_name,
                failure = %target,
                error = %e,
                "Failed to write failure status"
            );
        }
        tally.record(result, format!("failure {current} -> {target}"));
    }
}
