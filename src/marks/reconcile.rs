//! Pairing spreadsheet students with portal students.

use serde::Serialize;
use tracing::debug;

use crate::brs::models::PortalStudent;
use crate::marks::names::matches;
use crate::marks::values::FailureCode;

/// A student row read from the spreadsheet.
#[derive(Debug, Clone, PartialEq)]
pub struct ActualStudent {
    pub full_name: String,
    pub group_name: String,
    pub id: Option<String>,
    pub failure: Option<FailureCode>,
    /// Raw row cells, addressed by a column's property index.
    pub properties: Vec<String>,
}

impl ActualStudent {
    pub fn property(&self, index: usize) -> Option<&str> {
        self.properties.get(index).map(String::as_str)
    }
}

/// An actual student and the single portal record they were matched to.
#[derive(Debug, Clone)]
pub struct MergedStudent {
    pub actual: ActualStudent,
    pub portal: PortalStudent,
}

#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub pairs: Vec<MergedStudent>,
    pub unmatched_actual: Vec<ActualStudent>,
    /// Active portal students no spreadsheet row claimed.
    pub unmatched_portal: Vec<PortalStudent>,
}

impl Reconciliation {
    pub fn stats(&self) -> MergeStats {
        MergeStats {
            matched: self.pairs.len(),
            unmatched_actual: self
                .unmatched_actual
                .iter()
                .map(|s| s.full_name.clone())
                .collect(),
            unmatched_portal: self
                .unmatched_portal
                .iter()
                .map(|s| s.full_name.clone())
                .collect(),
        }
    }
}

/// Merge summary as it appears in a report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub matched: usize,
    pub unmatched_actual: Vec<String>,
    pub unmatched_portal: Vec<String>,
}

/// Pair every actual student with exactly one active portal student.
///
/// Inactive portal students (transferred, expelled, ...) take no part at all.
/// An actual student matching zero or several active records stays unmatched;
/// a portal record claimed by several actual students is given to none of
/// them. The result always partitions both inputs:
/// `pairs + unmatched_actual == actual` and
/// `pairs + unmatched_portal == active portal students`.
pub fn reconcile(actual: Vec<ActualStudent>, portal: Vec<PortalStudent>) -> Reconciliation {
    let mut active: Vec<Option<PortalStudent>> = portal
        .into_iter()
        .filter(PortalStudent::is_active)
        .map(Some)
        .collect();

    // portal index -> actual indices that uniquely matched it
    let mut claims: Vec<Vec<usize>> = vec![Vec::new(); active.len()];
    let mut claimed_by: Vec<Option<usize>> = vec![None; actual.len()];

    for (ai, student) in actual.iter().enumerate() {
        let mut found = active.iter().enumerate().filter_map(|(pi, p)| {
            p.as_ref()
                .filter(|p| matches(&p.full_name, &student.full_name))
                .map(|_| pi)
        });
        match (found.next(), found.next()) {
            (Some(pi), None) => {
                claims[pi].push(ai);
                claimed_by[ai] = Some(pi);
            }
            (None, _) => {
                debug!(student = student.full_name, "No portal match");
            }
            (Some(_), Some(_)) => {
                debug!(student = student.full_name, "Ambiguous portal match");
            }
        }
    }

    for (pi, claimants) in claims.iter().enumerate() {
        if claimants.len() > 1 {
            debug!(
                portal_student = active[pi].as_ref().map(|p| p.full_name.as_str()),
                claimants = claimants.len(),
                "Portal student claimed by several rows, leaving unmatched"
            );
            for &ai in claimants {
                claimed_by[ai] = None;
            }
        }
    }

    let mut result = Reconciliation::default();
    for (ai, student) in actual.into_iter().enumerate() {
        match claimed_by[ai].and_then(|pi| active[pi].take()) {
            Some(portal) => result.pairs.push(MergedStudent {
                actual: student,
                portal,
            }),
            None => result.unmatched_actual.push(student),
        }
    }
    result.unmatched_portal = active.into_iter().flatten().collect();
    result
}
