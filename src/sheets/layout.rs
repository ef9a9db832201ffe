//! Spreadsheet layout: column resolution, parameter block, student rows.
//!
//! The first row is a header. It must contain, in this relative order:
//!
//! ```text
//! Группа | ФИО (adjacent, either order) ... Причина ... Параметр | Значение | score columns...
//! ```
//!
//! The `Параметр`/`Значение` pair holds key/value rows describing the
//! discipline. Every non-empty header after `Значение`, except an optional
//! `ID` column, is a score column whose text lists the control-action names to match, separated by `;`, with an
//! optional `[i/n]` suffix picking the i-th of n same-named actions.

use chrono::{Datelike, Local, NaiveDate};
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

use crate::marks::control_actions::{ConfigError, ControlActionConfig, MatchPosition};
use crate::marks::names::same_label;
use crate::marks::reconcile::ActualStudent;
use crate::marks::values::{FailureCode, parse_failure};

const HEADER_GROUP: &str = "Группа";
const HEADER_FULL_NAME: &str = "ФИО";
const HEADER_FAILURE: &str = "Причина";
const HEADER_PARAM_KEY: &str = "Параметр";
const HEADER_PARAM_VALUE: &str = "Значение";
const HEADER_ID: &str = "ID";

const PARAM_DISCIPLINE: &str = "Дисциплина";
const PARAM_YEAR: &str = "Год";
const PARAM_TERM: &str = "Семестр";
const PARAM_COURSE: &str = "Курс";
const PARAM_MODULE: &str = "Модуль";
const PARAM_DEFAULT_FAILURE: &str = "Причина по умолчанию";

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("sheet is empty")]
    EmptySheet,
    #[error("header column '{0}' is missing")]
    MissingColumn(&'static str),
    #[error("invalid column order: {0}")]
    ColumnOrder(String),
    #[error("parameter '{0}' is missing")]
    MissingParameter(&'static str),
    #[error("parameter '{key}' has invalid value '{value}'")]
    InvalidParameter { key: &'static str, value: String },
    #[error("score column {column} '{header}' is invalid: {source}")]
    InvalidColumn {
        column: usize,
        header: String,
        #[source]
        source: ConfigError,
    },
}

/// Resolved positions of the fixed columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub group: usize,
    pub full_name: usize,
    pub failure: usize,
    pub param_key: usize,
    pub param_value: usize,
    pub id: Option<usize>,
}

impl ColumnLayout {
    /// Locate the fixed columns in a header row and validate their order.
    pub fn resolve(header: &[String]) -> Result<Self, LayoutError> {
        let find = |name: &'static str| {
            header
                .iter()
                .position(|h| same_label(h, name))
                .ok_or(LayoutError::MissingColumn(name))
        };

        let group = find(HEADER_GROUP)?;
        let full_name = find(HEADER_FULL_NAME)?;
        let failure = find(HEADER_FAILURE)?;
        let param_key = find(HEADER_PARAM_KEY)?;
        let param_value = find(HEADER_PARAM_VALUE)?;
        let id = find(HEADER_ID).ok();

        if group.abs_diff(full_name) != 1 {
            return Err(LayoutError::ColumnOrder(format!(
                "'{HEADER_GROUP}' and '{HEADER_FULL_NAME}' must be adjacent"
            )));
        }
        if failure < group.max(full_name) {
            return Err(LayoutError::ColumnOrder(format!(
                "'{HEADER_FAILURE}' must follow '{HEADER_GROUP}' and '{HEADER_FULL_NAME}'"
            )));
        }
        if param_key < failure {
            return Err(LayoutError::ColumnOrder(format!(
                "'{HEADER_PARAM_KEY}' must follow '{HEADER_FAILURE}'"
            )));
        }
        if param_value != param_key + 1 {
            return Err(LayoutError::ColumnOrder(format!(
                "'{HEADER_PARAM_VALUE}' must directly follow '{HEADER_PARAM_KEY}'"
            )));
        }

        Ok(Self {
            group,
            full_name,
            failure,
            param_key,
            param_value,
            id,
        })
    }
}

/// Discipline parameters from the key/value block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetParameters {
    pub discipline: String,
    pub year: i32,
    pub term: u8,
    pub course: u8,
    pub is_module: bool,
    pub default_failure: FailureCode,
}

/// A parsed sheet, ready for reconciliation.
#[derive(Debug, Clone)]
pub struct SheetData {
    pub parameters: SheetParameters,
    pub columns: Vec<ControlActionConfig>,
    pub students: Vec<ActualStudent>,
}

impl SheetData {
    pub fn parse(rows: &[Vec<String>]) -> Result<Self, LayoutError> {
        Self::parse_at(rows, Local::now().date_naive())
    }

    /// Like [`SheetData::parse`], with an explicit "today" for the year default.
    pub fn parse_at(rows: &[Vec<String>], today: NaiveDate) -> Result<Self, LayoutError> {
        let (header, body) = rows.split_first().ok_or(LayoutError::EmptySheet)?;
        let layout = ColumnLayout::resolve(header)?;

        let columns = header
            .iter()
            .enumerate()
            .skip(layout.param_value + 1)
            .filter(|(index, h)| Some(*index) != layout.id && !h.trim().is_empty())
            .map(|(index, h)| parse_score_header(h, index))
            .collect::<Result<Vec<_>, _>>()?;

        let parameters = parse_parameters(body, &layout, today)?;
        let students = body
            .iter()
            .filter_map(|row| parse_student(row, &layout))
            .collect();

        Ok(Self {
            parameters,
            columns,
            students,
        })
    }
}

fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map(|s| s.trim()).unwrap_or("")
}

/// Parse a score column header such as `Контрольная работа; КР [2/2]`.
pub fn parse_score_header(
    header: &str,
    column: usize,
) -> Result<ControlActionConfig, LayoutError> {
    static POSITION_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^(.*?)\s*\[\s*(\d+)\s*/\s*(\d+)\s*\]\s*$").unwrap());

    let invalid = |source: ConfigError| LayoutError::InvalidColumn {
        column: column + 1,
        header: header.to_string(),
        source,
    };

    let (names_part, position) = match POSITION_RE.captures(header) {
        Some(caps) => {
            let ordinal: usize = caps[2].parse().unwrap_or(0);
            let count: usize = caps[3].parse().unwrap_or(0);
            // Ordinals are 1-based in the sheet.
            let position = MatchPosition::new(ordinal.wrapping_sub(1), count).map_err(|_| {
                invalid(ConfigError::IndexOutOfRange {
                    index: ordinal,
                    count,
                })
            })?;
            (caps.get(1).map_or("", |m| m.as_str()), Some(position))
        }
        None => (header, None),
    };

    ControlActionConfig::new(names_part.split(';'), position, column).map_err(invalid)
}

fn parse_parameters(
    body: &[Vec<String>],
    layout: &ColumnLayout,
    today: NaiveDate,
) -> Result<SheetParameters, LayoutError> {
    let pairs: Vec<(&str, &str)> = body
        .iter()
        .map(|row| (cell(row, layout.param_key), cell(row, layout.param_value)))
        .filter(|(key, _)| !key.is_empty())
        .collect();
    let lookup = |key: &'static str| {
        pairs
            .iter()
            .find(|(k, _)| same_label(k, key))
            .map(|(_, v)| *v)
            .filter(|v| !v.is_empty())
    };
    let invalid = |key: &'static str, value: &str| LayoutError::InvalidParameter {
        key,
        value: value.to_string(),
    };

    let discipline = lookup(PARAM_DISCIPLINE)
        .ok_or(LayoutError::MissingParameter(PARAM_DISCIPLINE))?
        .to_string();

    let year = match lookup(PARAM_YEAR) {
        Some(raw) => parse_year(raw).ok_or_else(|| invalid(PARAM_YEAR, raw))?,
        None => current_academic_year(today),
    };

    let raw_term = lookup(PARAM_TERM).ok_or(LayoutError::MissingParameter(PARAM_TERM))?;
    let term = match raw_term.parse::<u8>() {
        Ok(t @ (1 | 2)) => t,
        _ => return Err(invalid(PARAM_TERM, raw_term)),
    };

    let raw_course = lookup(PARAM_COURSE).ok_or(LayoutError::MissingParameter(PARAM_COURSE))?;
    let course = match raw_course.parse::<u8>() {
        Ok(c @ 1..=6) => c,
        _ => return Err(invalid(PARAM_COURSE, raw_course)),
    };

    let is_module = match lookup(PARAM_MODULE) {
        Some(raw) => parse_flag(raw).ok_or_else(|| invalid(PARAM_MODULE, raw))?,
        None => false,
    };

    let default_failure = match lookup(PARAM_DEFAULT_FAILURE) {
        Some(raw) => parse_failure(raw).ok_or_else(|| invalid(PARAM_DEFAULT_FAILURE, raw))?,
        None => FailureCode::NoFailure,
    };

    Ok(SheetParameters {
        discipline,
        year,
        term,
        course,
        is_module,
        default_failure,
    })
}

fn parse_student(row: &[String], layout: &ColumnLayout) -> Option<ActualStudent> {
    let full_name = cell(row, layout.full_name);
    let group_name = cell(row, layout.group);
    if full_name.is_empty() || group_name.is_empty() {
        return None;
    }

    let raw_failure = cell(row, layout.failure);
    let failure = parse_failure(raw_failure);
    if failure.is_none() && !raw_failure.is_empty() {
        warn!(
            student = full_name,
            value = raw_failure,
            "Unrecognized failure reason, ignoring"
        );
    }

    Some(ActualStudent {
        full_name: full_name.to_string(),
        group_name: group_name.to_string(),
        id: layout
            .id
            .map(|i| cell(row, i))
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        failure,
        properties: row.to_vec(),
    })
}

/// `2024` or `2024/2025` both mean the academic year starting in 2024.
fn parse_year(raw: &str) -> Option<i32> {
    static YEAR_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^(\d{4})(?:\s*[/-]\s*\d{4})?$").unwrap());
    YEAR_RE.captures(raw.trim())?[1].parse().ok()
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "да" | "yes" | "true" | "1" | "+" => Some(true),
        "нет" | "no" | "false" | "0" | "-" => Some(false),
        _ => None,
    }
}

/// The academic year a date falls into; it rolls over in August.
pub fn current_academic_year(today: NaiveDate) -> i32 {
    if today.month() >= 8 {
        today.year()
    } else {
        today.year() - 1
    }
}
