//! Domain types for the BRS grading portal.
//!
//! Wire DTOs are kept private to [`crate::brs::api`]; these are the shapes the
//! reconciliation engine works with.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::marks::values::FailureCode;

/// Portal axis selecting which kind of class a mark sheet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CardType {
    Lecture,
    Laboratory,
    Practice,
    AdditionalPractice,
}

impl CardType {
    pub const ALL: [CardType; 4] = [
        Self::Lecture,
        Self::Laboratory,
        Self::Practice,
        Self::AdditionalPractice,
    ];

    /// Query parameter value expected by the portal.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lecture => "lecture",
            Self::Laboratory => "laboratory",
            Self::Practice => "practice",
            Self::AdditionalPractice => "additionalPractice",
        }
    }

    pub fn from_portal_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Portal axis separating current-term marks from intermediate attestation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkType {
    Current,
    Intermediate,
}

impl MarkType {
    pub const ALL: [MarkType; 2] = [Self::Current, Self::Intermediate];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Intermediate => "intermediate",
        }
    }
}

impl fmt::Display for MarkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every `(card type, mark type)` combination a discipline is fetched under.
pub fn card_mark_combinations() -> impl Iterator<Item = (CardType, MarkType)> {
    CardType::ALL
        .into_iter()
        .flat_map(|card| MarkType::ALL.into_iter().map(move |mark| (card, mark)))
}

/// Directory query for a teacher's disciplines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisciplineQuery {
    /// Academic year start, e.g. `2024` for 2024/2025.
    pub year: i32,
    /// `1` for the autumn term, `2` for spring.
    pub term: u8,
    pub course: u8,
    pub is_module: bool,
}

/// A discipline taught to one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discipline {
    pub name: String,
    pub group: String,
    pub group_id: String,
    pub group_history_id: String,
    pub discipline_load_id: String,
    pub is_module: bool,
}

impl Discipline {
    /// Human-readable key used for report sections and log fields.
    pub fn key(&self) -> String {
        format!("{} / {}", self.name, self.group)
    }
}

/// One gradable column of a discipline (assignment, lab, exam part).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlAction {
    pub id: String,
    pub display_name: String,
    /// The card type this action was listed under; marks are written with it.
    pub card_type: CardType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StudentStatus {
    Active,
    Transferred,
    Expelled,
    AcademicLeave,
    Other(String),
}

impl StudentStatus {
    /// Map the portal's status label.
    pub fn from_portal_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "активный" | "active" => Self::Active,
            "переведен" | "переведён" | "transferred" => Self::Transferred,
            "отчислен" | "expelled" => Self::Expelled,
            "академический отпуск" | "academicleave" => Self::AcademicLeave,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A student as the portal reports them for one discipline/group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalStudent {
    pub student_id: String,
    pub full_name: String,
    pub status: StudentStatus,
    pub group_id: String,
    pub group_history_id: String,
    pub card_type: CardType,
    pub discipline_load_id: String,
    pub failure: Option<FailureCode>,
    /// Control action id -> raw mark as the portal formats it.
    pub marks: HashMap<String, String>,
}

impl PortalStudent {
    pub fn is_active(&self) -> bool {
        self.status == StudentStatus::Active
    }

    /// Fold a later partial record for the same student into this one.
    ///
    /// Scalar fields are taken from `later`, except a missing failure code;
    /// mark entries are added or overridden per control action.
    pub fn merge_from(&mut self, later: PortalStudent) {
        self.full_name = later.full_name;
        self.status = later.status;
        self.group_id = later.group_id;
        self.group_history_id = later.group_history_id;
        self.card_type = later.card_type;
        self.discipline_load_id = later.discipline_load_id;
        // An absent failure in a later sheet is not a conflict.
        if later.failure.is_some() {
            self.failure = later.failure;
        }
        self.marks.extend(later.marks);
    }
}

/// A mark write request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkWrite {
    pub student_id: String,
    pub control_action_id: String,
    pub mark: f64,
    pub group_history_id: String,
    pub card_type: CardType,
    pub discipline_load_id: String,
}

/// A failure-status write request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureWrite {
    pub student_id: String,
    pub discipline_load_id: String,
    pub group_history_id: String,
    pub failure: FailureCode,
    pub card_type: CardType,
}
