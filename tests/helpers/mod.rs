#![allow(dead_code)]

//! In-memory portal and sheet fakes shared by the integration tests.

use async_trait::async_trait;
use brs_marks::brs::models::{
    CardType, ControlAction, Discipline, DisciplineQuery, FailureWrite, MarkType, MarkWrite,
    PortalStudent, StudentStatus,
};
use brs_marks::marks::portal::{
    DisciplineDirectory, Portal, ServiceError, ServiceResult, SheetSource,
};
use brs_marks::marks::report::Report;
use brs_marks::marks::values::{FailureCode, format_mark};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub const DISCIPLINE: &str = "Программирование";

pub fn discipline(group: &str) -> Discipline {
    Discipline {
        name: DISCIPLINE.to_string(),
        group: group.to_string(),
        group_id: format!("group-{group}"),
        group_history_id: format!("history-{group}"),
        discipline_load_id: "load-1".to_string(),
        is_module: false,
    }
}

/// A control action together with the mark sheet that lists it.
#[derive(Clone)]
pub struct ListedAction {
    action: ControlAction,
    mark_type: MarkType,
}

impl ListedAction {
    fn is_listed_on(&self, card_type: CardType, mark_type: MarkType) -> bool {
        self.action.card_type == card_type && self.mark_type == mark_type
    }
}

pub fn action(id: &str, name: &str) -> ListedAction {
    action_in(id, name, CardType::Practice, MarkType::Current)
}

pub fn action_in(
    id: &str,
    name: &str,
    card_type: CardType,
    mark_type: MarkType,
) -> ListedAction {
    ListedAction {
        action: ControlAction {
            id: id.to_string(),
            display_name: name.to_string(),
            card_type,
        },
        mark_type,
    }
}

pub fn portal_student(id: &str, full_name: &str, group: &Discipline) -> PortalStudent {
    PortalStudent {
        student_id: id.to_string(),
        full_name: full_name.to_string(),
        status: StudentStatus::Active,
        group_id: group.group_id.clone(),
        group_history_id: group.group_history_id.clone(),
        card_type: CardType::Practice,
        discipline_load_id: group.discipline_load_id.clone(),
        failure: None,
        marks: HashMap::new(),
    }
}

pub fn with_mark(mut student: PortalStudent, action_id: &str, raw: &str) -> PortalStudent {
    student.marks.insert(action_id.to_string(), raw.to_string());
    student
}

struct FakeGroup {
    discipline: Discipline,
    actions: Vec<ListedAction>,
    students: Vec<PortalStudent>,
}

#[derive(Default)]
struct FakeState {
    groups: Vec<FakeGroup>,
    mark_writes: Vec<MarkWrite>,
    failure_writes: Vec<FailureWrite>,
    /// group_id -> number of control-action fetches
    action_fetches: HashMap<String, usize>,
    failing_students: HashSet<String>,
    expire_on_write: bool,
    cancel_on_write: Option<(String, CancellationToken)>,
    /// group_history_id values whose roster reads fail as unavailable
    unavailable_rosters: HashSet<String>,
}

impl FakeState {
    fn group_mut(&mut self, group_history_id: &str) -> Option<&mut FakeGroup> {
        self.groups
            .iter_mut()
            .find(|g| g.discipline.group_history_id == group_history_id)
    }

    fn check_write(&self, student_id: &str, group_history_id: &str) -> ServiceResult<()> {
        if let Some((history_id, token)) = &self.cancel_on_write
            && history_id == group_history_id
        {
            token.cancel();
        }
        if self.expire_on_write {
            return Err(ServiceError::SessionExpired("redirected to login".into()));
        }
        if self.failing_students.contains(student_id) {
            return Err(anyhow::anyhow!("portal rejected the write").into());
        }
        Ok(())
    }
}

/// Portal and discipline directory backed by memory. Writes are applied to the
/// stored roster, so a second run sees the synchronized state.
#[derive(Default)]
pub struct FakePortal {
    state: Mutex<FakeState>,
}

impl FakePortal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_group(
        &self,
        discipline: Discipline,
        actions: Vec<ListedAction>,
        students: Vec<PortalStudent>,
    ) {
        self.state.lock().unwrap().groups.push(FakeGroup {
            discipline,
            actions,
            students,
        });
    }

    pub fn mark(&self, student_id: &str, action_id: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .groups
            .iter()
            .flat_map(|g| &g.students)
            .find(|s| s.student_id == student_id)
            .and_then(|s| s.marks.get(action_id).cloned())
    }

    pub fn failure(&self, student_id: &str) -> Option<FailureCode> {
        let state = self.state.lock().unwrap();
        state
            .groups
            .iter()
            .flat_map(|g| &g.students)
            .find(|s| s.student_id == student_id)
            .and_then(|s| s.failure)
    }

    pub fn mark_writes(&self) -> Vec<MarkWrite> {
        self.state.lock().unwrap().mark_writes.clone()
    }

    pub fn failure_writes(&self) -> Vec<FailureWrite> {
        self.state.lock().unwrap().failure_writes.clone()
    }

    pub fn write_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.mark_writes.len() + state.failure_writes.len()
    }

    pub fn action_fetches(&self, discipline: &Discipline) -> usize {
        let state = self.state.lock().unwrap();
        state
            .action_fetches
            .get(&discipline.group_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn fail_writes_for(&self, student_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_students
            .insert(student_id.to_string());
    }

    pub fn expire_session_on_write(&self) {
        self.state.lock().unwrap().expire_on_write = true;
    }

    /// Cancel `token` as soon as a write for `discipline` is issued.
    pub fn cancel_on_write(&self, discipline: &Discipline, token: CancellationToken) {
        self.state.lock().unwrap().cancel_on_write =
            Some((discipline.group_history_id.clone(), token));
    }

    /// Make roster reads for `discipline` fail as if the portal were down.
    pub fn roster_unavailable_for(&self, discipline: &Discipline) {
        self.state
            .lock()
            .unwrap()
            .unavailable_rosters
            .insert(discipline.group_history_id.clone());
    }

    fn find_group<T>(
        &self,
        discipline: &Discipline,
        f: impl FnOnce(&FakeGroup) -> T,
    ) -> ServiceResult<T> {
        let state = self.state.lock().unwrap();
        state
            .groups
            .iter()
            .find(|g| g.discipline == *discipline)
            .map(f)
            .ok_or_else(|| anyhow::anyhow!("unknown group {}", discipline.key()).into())
    }
}

#[async_trait]
impl DisciplineDirectory for FakePortal {
    async fn fetch_disciplines(&self, query: &DisciplineQuery) -> ServiceResult<Vec<Discipline>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .groups
            .iter()
            .map(|g| g.discipline.clone())
            .filter(|d| d.is_module == query.is_module)
            .collect())
    }
}

#[async_trait]
impl Portal for FakePortal {
    async fn fetch_control_actions(
        &self,
        discipline: &Discipline,
        card_type: CardType,
        mark_type: MarkType,
    ) -> ServiceResult<Vec<ControlAction>> {
        {
            let mut state = self.state.lock().unwrap();
            *state
                .action_fetches
                .entry(discipline.group_id.clone())
                .or_default() += 1;
        }
        self.find_group(discipline, |g| {
            g.actions
                .iter()
                .filter(|a| a.is_listed_on(card_type, mark_type))
                .map(|a| a.action.clone())
                .collect()
        })
    }

    /// Students appear on every sheet that has actions, carrying only that
    /// sheet's marks.
    async fn fetch_student_marks(
        &self,
        discipline: &Discipline,
        card_type: CardType,
        mark_type: MarkType,
    ) -> ServiceResult<Vec<PortalStudent>> {
        if self
            .state
            .lock()
            .unwrap()
            .unavailable_rosters
            .contains(&discipline.group_history_id)
        {
            return Err(ServiceError::Unavailable(anyhow::anyhow!(
                "BRS returned 503 Service Unavailable"
            )));
        }
        self.find_group(discipline, |g| {
            let sheet_actions: HashSet<&str> = g
                .actions
                .iter()
                .filter(|a| a.is_listed_on(card_type, mark_type))
                .map(|a| a.action.id.as_str())
                .collect();
            let is_default_sheet =
                card_type == CardType::Practice && mark_type == MarkType::Current;
            if sheet_actions.is_empty() && !is_default_sheet {
                return Vec::new();
            }

            g.students
                .iter()
                .map(|s| {
                    let mut partial = s.clone();
                    partial.marks.retain(|id, _| sheet_actions.contains(id.as_str()));
                    partial
                })
                .collect()
        })
    }

    async fn put_mark(&self, write: &MarkWrite) -> ServiceResult<()> {
        let mut state = self.state.lock().unwrap();
        state.check_write(&write.student_id, &write.group_history_id)?;
        state.mark_writes.push(write.clone());
        if let Some(group) = state.group_mut(&write.group_history_id)
            && let Some(student) = group
                .students
                .iter_mut()
                .find(|s| s.student_id == write.student_id)
        {
            student
                .marks
                .insert(write.control_action_id.clone(), format_mark(write.mark));
        }
        Ok(())
    }

    async fn put_failure(&self, write: &FailureWrite) -> ServiceResult<()> {
        let mut state = self.state.lock().unwrap();
        state.check_write(&write.student_id, &write.group_history_id)?;
        state.failure_writes.push(write.clone());
        if let Some(group) = state.group_mut(&write.group_history_id)
            && let Some(student) = group
                .students
                .iter_mut()
                .find(|s| s.student_id == write.student_id)
        {
            student.failure = Some(write.failure);
        }
        Ok(())
    }
}

/// A fixed sheet that counts its reads.
pub struct FakeSheet {
    rows: Vec<Vec<String>>,
    reads: Mutex<usize>,
}

impl FakeSheet {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self {
            rows,
            reads: Mutex::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        *self.reads.lock().unwrap()
    }
}

#[async_trait]
impl SheetSource for FakeSheet {
    async fn read_range(
        &self,
        _spreadsheet_id: &str,
        _a1_range: &str,
    ) -> ServiceResult<Vec<Vec<String>>> {
        *self.reads.lock().unwrap() += 1;
        Ok(self.rows.clone())
    }
}

/// A spreadsheet student row: group, full name, failure cell and score cells.
pub struct SheetStudent<'a> {
    pub group: &'a str,
    pub name: &'a str,
    pub failure: &'a str,
    pub scores: &'a [&'a str],
}

pub fn student<'a>(group: &'a str, name: &'a str, scores: &'a [&'a str]) -> SheetStudent<'a> {
    SheetStudent {
        group,
        name,
        failure: "",
        scores,
    }
}

pub const DEFAULT_PARAMS: &[(&str, &str)] = &[
    ("Дисциплина", DISCIPLINE),
    ("Год", "2024"),
    ("Семестр", "1"),
    ("Курс", "2"),
];

/// Build sheet rows with the standard layout:
/// `Группа | ФИО | Причина | Параметр | Значение | scores...`.
pub fn sheet_rows(
    score_headers: &[&str],
    params: &[(&str, &str)],
    students: &[SheetStudent<'_>],
) -> Vec<Vec<String>> {
    let mut header: Vec<String> = ["Группа", "ФИО", "Причина", "Параметр", "Значение"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    header.extend(score_headers.iter().map(|s| s.to_string()));

    let body_len = params.len().max(students.len());
    let mut rows = vec![header];
    for i in 0..body_len {
        let mut row = vec![String::new(); 5];
        if let Some(s) = students.get(i) {
            row[0] = s.group.to_string();
            row[1] = s.name.to_string();
            row[2] = s.failure.to_string();
            row.extend(s.scores.iter().map(|c| c.to_string()));
        }
        if let Some((key, value)) = params.get(i) {
            row[3] = key.to_string();
            row[4] = value.to_string();
        }
        rows.push(row);
    }
    rows
}

/// Collects finished reports from the runner callback.
#[derive(Clone, Default)]
pub struct ReportSink {
    reports: Arc<Mutex<Vec<Report>>>,
}

impl ReportSink {
    pub fn callback(&self) -> impl FnMut(Report) + Send + 'static {
        let reports = self.reports.clone();
        move |report| reports.lock().unwrap().push(report)
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap().clone()
    }
}
