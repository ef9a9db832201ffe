//! Run controller: one spreadsheet, every matching discipline/group in turn.
//!
//! Groups are processed strictly one after another, and each group's report
//! is finished before the next group starts. Cancellation is checked only at
//! the top of the group loop: writes already dispatched for the current group
//! always finish so its report stays consistent.

use futures::future::try_join_all;
use indexmap::IndexMap;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::brs::models::{
    ControlAction, Discipline, DisciplineQuery, PortalStudent, card_mark_combinations,
};
use crate::marks::control_actions::resolve_all;
use crate::marks::engine::{MarksEngine, UpdateMode, WriteCounts};
use crate::marks::names::same_label;
use crate::marks::portal::{DisciplineDirectory, Portal, ServiceError, ServiceResult, SheetSource};
use crate::marks::reconcile::{ActualStudent, reconcile};
use crate::marks::report::{Report, ReportBuilder};
use crate::sheets::layout::SheetData;
use crate::utils::{fmt_duration, log_if_slow};

const SLOW_GROUP_THRESHOLD: Duration = Duration::from_secs(30);

/// Lifecycle of a run as observed through [`MarksRunner::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Errored,
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed,
    Cancelled,
    Errored(ServiceError),
}

impl RunOutcome {
    fn state(&self) -> RunState {
        match self {
            Self::Completed => RunState::Completed,
            Self::Cancelled => RunState::Cancelled,
            Self::Errored(_) => RunState::Errored,
        }
    }
}

/// Serialized as `{"state": ..., "error_kind": ..., "error": ...}`.
impl Serialize for RunOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let error = match self {
            Self::Errored(e) => Some(e),
            _ => None,
        };
        let mut out = serializer.serialize_struct("RunOutcome", 3)?;
        out.serialize_field("state", &self.state())?;
        out.serialize_field("error_kind", &error.map(ServiceError::kind))?;
        out.serialize_field("error", &error.map(|e| format!("{e:#}")))?;
        out.end()
    }
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    /// Groups whose report was finished, including skipped ones.
    pub groups_processed: usize,
    /// Groups skipped because their score columns did not resolve.
    pub groups_skipped: usize,
    pub writes: WriteCounts,
}

impl RunSummary {
    /// Whether the run finished but left something undone.
    pub fn has_problems(&self) -> bool {
        self.groups_skipped > 0 || self.writes.failed > 0
    }
}

/// What to synchronize and how.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub spreadsheet_id: String,
    pub range: String,
    pub mode: UpdateMode,
}

pub struct MarksRunner<D, P, S> {
    directory: D,
    portal: P,
    sheets: S,
    state: watch::Sender<RunState>,
    slow_threshold: Duration,
}

impl<D, P, S> MarksRunner<D, P, S>
where
    D: DisciplineDirectory,
    P: Portal,
    S: SheetSource,
{
    pub fn new(directory: D, portal: P, sheets: S) -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self {
            directory,
            portal,
            sheets,
            state,
            slow_threshold: SLOW_GROUP_THRESHOLD,
        }
    }

    /// Groups slower than this are logged as warnings.
    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Run the whole synchronization.
    ///
    /// Terminal errors are returned inside the summary rather than propagated,
    /// and only after the report in progress has been handed to `on_report`.
    pub async fn run(
        &self,
        request: &RunRequest,
        on_report: impl FnMut(Report) + Send + 'static,
        cancel: CancellationToken,
    ) -> RunSummary {
        self.state.send_replace(RunState::Running);
        let start = Instant::now();
        let mut builder = ReportBuilder::new(on_report);
        let mut summary = RunSummary {
            outcome: RunOutcome::Completed,
            groups_processed: 0,
            groups_skipped: 0,
            writes: WriteCounts::default(),
        };

        let (sheet, targets) = match self.prepare(request).await {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(error = %e, "Failed to prepare run");
                summary.outcome = RunOutcome::Errored(e);
                self.state.send_replace(summary.outcome.state());
                return summary;
            }
        };

        for (i, discipline) in targets.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(
                    completed_groups = i,
                    total_groups = targets.len(),
                    "Run cancelled"
                );
                summary.outcome = RunOutcome::Cancelled;
                break;
            }

            builder.new_report(discipline.key());
            let group_start = Instant::now();
            let span = info_span!(
                "group",
                discipline = discipline.name,
                group = discipline.group
            );
            let result = self
                .process_group(discipline, &sheet, request.mode, &mut builder)
                .instrument(span)
                .await;
            builder.finish_report();
            log_if_slow(group_start, self.slow_threshold, &discipline.key());

            match result {
                Ok(Some(writes)) => {
                    summary.groups_processed += 1;
                    summary.writes.add(writes);
                }
                Ok(None) => {
                    summary.groups_processed += 1;
                    summary.groups_skipped += 1;
                }
                Err(e) => {
                    error!(
                        discipline = discipline.name,
                        group = discipline.group,
                        error = %e,
                        "Run aborted"
                    );
                    summary.outcome = RunOutcome::Errored(e);
                    break;
                }
            }
        }

        info!(
            groups = summary.groups_processed,
            skipped = summary.groups_skipped,
            updated = summary.writes.updated,
            failed = summary.writes.failed,
            outcome = ?summary.outcome.state(),
            duration = fmt_duration(start.elapsed()),
            "Run finished"
        );
        self.state.send_replace(summary.outcome.state());
        summary
    }

    /// Read the sheet and work out which discipline/groups it covers.
    async fn prepare(&self, request: &RunRequest) -> ServiceResult<(SheetData, Vec<Discipline>)> {
        let rows = self
            .sheets
            .read_range(&request.spreadsheet_id, &request.range)
            .await?;
        let sheet = SheetData::parse(&rows).map_err(anyhow::Error::from)?;
        let params = &sheet.parameters;

        let query = DisciplineQuery {
            year: params.year,
            term: params.term,
            course: params.course,
            is_module: params.is_module,
        };
        let disciplines = self.directory.fetch_disciplines(&query).await?;
        let targets = select_targets(disciplines, &params.discipline, &sheet.students);

        info!(
            discipline = params.discipline,
            students = sheet.students.len(),
            columns = sheet.columns.len(),
            groups = targets.len(),
            "Sheet loaded"
        );
        if targets.is_empty() {
            warn!(
                discipline = params.discipline,
                "No portal discipline/group matches the sheet"
            );
        }
        Ok((sheet, targets))
    }

    /// Sync one group. `None` means the group was skipped for configuration
    /// errors recorded in its report.
    async fn process_group(
        &self,
        discipline: &Discipline,
        sheet: &SheetData,
        mode: UpdateMode,
        builder: &mut ReportBuilder,
    ) -> ServiceResult<Option<WriteCounts>> {
        let actions = self.fetch_control_actions(discipline).await?;
        let resolved = match resolve_all(&sheet.columns, &actions) {
            Ok(resolved) => resolved,
            Err(messages) => {
                warn!(
                    problems = messages.len() / 2,
                    "Control action configuration invalid, skipping group"
                );
                builder
                    .on_invalid_configuration(messages)
                    .map_err(anyhow::Error::from)?;
                return Ok(None);
            }
        };

        let roster = self.fetch_students(discipline).await?;
        let actual: Vec<ActualStudent> = sheet
            .students
            .iter()
            .filter(|s| same_label(&s.group_name, &discipline.group))
            .cloned()
            .collect();

        let reconciliation = reconcile(actual, roster);
        builder
            .set_merge_stats(reconciliation.stats())
            .map_err(anyhow::Error::from)?;
        debug!(
            matched = reconciliation.pairs.len(),
            unmatched_actual = reconciliation.unmatched_actual.len(),
            unmatched_portal = reconciliation.unmatched_portal.len(),
            "Students reconciled"
        );

        let engine = MarksEngine::new(&self.portal, mode);
        let outcome = engine
            .apply(
                &reconciliation.pairs,
                &reconciliation.unmatched_portal,
                &resolved,
                sheet.parameters.default_failure,
            )
            .await;

        builder
            .add_mark_outcomes(&outcome.marks)
            .map_err(anyhow::Error::from)?;
        builder
            .add_failure_outcomes(&outcome.failures)
            .map_err(anyhow::Error::from)?;

        if let Some(expired) = outcome.session_expired {
            return Err(expired);
        }
        Ok(Some(outcome.writes))
    }

    /// Every control action of the discipline across all card/mark sheets,
    /// de-duplicated by id in portal order.
    async fn fetch_control_actions(
        &self,
        discipline: &Discipline,
    ) -> ServiceResult<Vec<ControlAction>> {
        let per_sheet = try_join_all(card_mark_combinations().map(|(card, mark)| {
            self.portal.fetch_control_actions(discipline, card, mark)
        }))
        .await?;

        let mut by_id: IndexMap<String, ControlAction> = IndexMap::new();
        for action in per_sheet.into_iter().flatten() {
            by_id.entry(action.id.clone()).or_insert(action);
        }
        Ok(by_id.into_values().collect())
    }

    /// The full roster, merging partial records by student id. Later sheets
    /// override earlier ones on conflicting fields.
    async fn fetch_students(&self, discipline: &Discipline) -> ServiceResult<Vec<PortalStudent>> {
        let per_sheet = try_join_all(card_mark_combinations().map(|(card, mark)| {
            self.portal.fetch_student_marks(discipline, card, mark)
        }))
        .await?;

        let mut by_id: IndexMap<String, PortalStudent> = IndexMap::new();
        for student in per_sheet.into_iter().flatten() {
            match by_id.get_mut(&student.student_id) {
                Some(existing) => existing.merge_from(student),
                None => {
                    by_id.insert(student.student_id.clone(), student);
                }
            }
        }
        Ok(by_id.into_values().collect())
    }
}

/// Portal disciplines named like the sheet's discipline whose group appears
/// in the sheet, in directory order.
pub fn select_targets(
    disciplines: Vec<Discipline>,
    discipline_name: &str,
    students: &[ActualStudent],
) -> Vec<Discipline> {
    disciplines
        .into_iter()
        .filter(|d| same_label(&d.name, discipline_name))
        .filter(|d| students.iter().any(|s| same_label(&s.group_name, &d.group)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discipline(name: &str, group: &str) -> Discipline {
        Discipline {
            name: name.to_string(),
            group: group.to_string(),
            group_id: format!("{group}-id"),
            group_history_id: format!("{group}-hist"),
            discipline_load_id: format!("{name}-load"),
            is_module: false,
        }
    }

    fn student(group: &str) -> ActualStudent {
        ActualStudent {
            full_name: "Петров Петр".to_string(),
            group_name: group.to_string(),
            id: None,
            failure: None,
            properties: Vec::new(),
        }
    }

    #[test]
    fn targets_match_name_and_group() {
        let targets = select_targets(
            vec![
                discipline("Программирование", "РИ-1"),
                discipline("Программирование", "РИ-2"),
                discipline("Физика", "РИ-1"),
                discipline("программирование ", "ри 3"),
            ],
            "Программирование",
            &[student("РИ-1"), student("РИ-3")],
        );
        let keys: Vec<String> = targets.iter().map(Discipline::key).collect();
        assert_eq!(
            keys,
            ["Программирование / РИ-1", "программирование  / ри 3"]
        );
    }

    #[test]
    fn summary_serializes_outcome_and_error() {
        let summary = RunSummary {
            outcome: RunOutcome::Errored(ServiceError::Unavailable(anyhow::anyhow!("503"))),
            groups_processed: 1,
            groups_skipped: 1,
            writes: WriteCounts {
                updated: 2,
                failed: 0,
            },
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["outcome"]["state"], "Errored");
        assert_eq!(json["outcome"]["error_kind"], "NetworkUnavailable");
        assert!(json["outcome"]["error"].as_str().unwrap().contains("503"));
        assert_eq!(json["groups_skipped"], 1);
        assert_eq!(json["writes"]["updated"], 2);
        assert!(summary.has_problems());

        let done = serde_json::to_value(RunOutcome::Completed).unwrap();
        assert_eq!(done["state"], "Completed");
        assert!(done["error"].is_null());
    }

    #[test]
    fn no_students_no_targets() {
        let targets = select_targets(
            vec![discipline("Программирование", "РИ-1")],
            "Программирование",
            &[],
        );
        assert!(targets.is_empty());
    }
}
