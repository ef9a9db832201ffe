//! Mark and failure-code parsing shared by the spreadsheet and portal sides.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::marks::names::normalize;

/// Absence or exemption reason attached to a student for a discipline.
///
/// Only equality is meaningful; the portal defines no order between reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureCode {
    NoFailure,
    NotAppeared,
    NotAllowed,
    ValidReason,
    AcademicLeave,
    DroppedOut,
    Exempted,
}

impl FailureCode {
    pub const ALL: [FailureCode; 7] = [
        Self::NoFailure,
        Self::NotAppeared,
        Self::NotAllowed,
        Self::ValidReason,
        Self::AcademicLeave,
        Self::DroppedOut,
        Self::Exempted,
    ];

    /// Numeric code used by the portal API.
    pub fn code(self) -> i32 {
        match self {
            Self::NoFailure => -1,
            Self::NotAppeared => 1,
            Self::NotAllowed => 2,
            Self::ValidReason => 3,
            Self::AcademicLeave => 4,
            Self::DroppedOut => 5,
            Self::Exempted => 6,
        }
    }

    /// Label shown in the portal and expected in the spreadsheet.
    pub fn label(self) -> &'static str {
        match self {
            Self::NoFailure => "-",
            Self::NotAppeared => "Неявка",
            Self::NotAllowed => "Недопуск",
            Self::ValidReason => "Неявка по уважительной причине",
            Self::AcademicLeave => "Академический отпуск",
            Self::DroppedOut => "Отчислен",
            Self::Exempted => "Освобожден",
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.code() == code)
    }

    fn variant_name(self) -> &'static str {
        match self {
            Self::NoFailure => "NoFailure",
            Self::NotAppeared => "NotAppeared",
            Self::NotAllowed => "NotAllowed",
            Self::ValidReason => "ValidReason",
            Self::AcademicLeave => "AcademicLeave",
            Self::DroppedOut => "DroppedOut",
            Self::Exempted => "Exempted",
        }
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Parse a mark cell, accepting either decimal separator.
///
/// Returns `None` for empty, unparsable, NaN or infinite input. An empty cell
/// is "no value", which is deliberately distinct from an explicit `0`.
pub fn parse_mark(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Render a mark for the portal and for report lines: `85`, `7.5`.
pub fn format_mark(mark: f64) -> String {
    if mark.fract() == 0.0 && mark.abs() < 1e15 {
        format!("{}", mark as i64)
    } else {
        format!("{mark}")
    }
}

/// Parse a failure cell by label, variant name, or numeric portal code.
pub fn parse_failure(raw: &str) -> Option<FailureCode> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed == FailureCode::NoFailure.label() {
        return Some(FailureCode::NoFailure);
    }
    if let Ok(code) = trimmed.parse::<i32>() {
        return FailureCode::from_code(code);
    }

    let key = normalize(trimmed);
    if key.is_empty() {
        return None;
    }
    FailureCode::ALL
        .into_iter()
        .find(|f| normalize(f.label()) == key || normalize(f.variant_name()) == key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mark_dot_and_comma() {
        assert_eq!(parse_mark("85"), Some(85.0));
        assert_eq!(parse_mark("7.5"), Some(7.5));
        assert_eq!(parse_mark("7,5"), Some(7.5));
        assert_eq!(parse_mark("  12,25 "), Some(12.25));
    }

    #[test]
    fn parse_mark_empty_is_none() {
        assert_eq!(parse_mark(""), None);
        assert_eq!(parse_mark("   "), None);
    }

    #[test]
    fn parse_mark_zero_is_a_value() {
        assert_eq!(parse_mark("0"), Some(0.0));
        assert_eq!(parse_mark("0,0"), Some(0.0));
    }

    #[test]
    fn parse_mark_rejects_garbage() {
        assert_eq!(parse_mark("н/а"), None);
        assert_eq!(parse_mark("NaN"), None);
        assert_eq!(parse_mark("inf"), None);
        assert_eq!(parse_mark("1,2,3"), None);
    }

    #[test]
    fn format_mark_integral_and_fractional() {
        assert_eq!(format_mark(85.0), "85");
        assert_eq!(format_mark(7.5), "7.5");
        assert_eq!(format_mark(0.0), "0");
    }

    #[test]
    fn parse_failure_by_label() {
        assert_eq!(parse_failure("Неявка"), Some(FailureCode::NotAppeared));
        assert_eq!(parse_failure("  неявка "), Some(FailureCode::NotAppeared));
        assert_eq!(
            parse_failure("Академический отпуск"),
            Some(FailureCode::AcademicLeave)
        );
        assert_eq!(parse_failure("-"), Some(FailureCode::NoFailure));
    }

    #[test]
    fn parse_failure_label_with_yo() {
        assert_eq!(parse_failure("Освобождён"), Some(FailureCode::Exempted));
    }

    #[test]
    fn parse_failure_by_code_and_name() {
        assert_eq!(parse_failure("5"), Some(FailureCode::DroppedOut));
        assert_eq!(parse_failure("-1"), Some(FailureCode::NoFailure));
        assert_eq!(parse_failure("NotAllowed"), Some(FailureCode::NotAllowed));
    }

    #[test]
    fn parse_failure_unknown() {
        assert_eq!(parse_failure(""), None);
        assert_eq!(parse_failure("болел"), None);
        assert_eq!(parse_failure("42"), None);
    }

    #[test]
    fn codes_round_trip() {
        for f in FailureCode::ALL {
            assert_eq!(FailureCode::from_code(f.code()), Some(f));
        }
    }
}
