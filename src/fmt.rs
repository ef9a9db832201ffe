//! Terminal rendering of run reports and summaries.

use std::fmt::Write;
use yansi::Paint;

use crate::marks::report::{OutcomeGroup, Report, UpdateStatus};
use crate::marks::runner::{RunOutcome, RunSummary};

fn paint_title(title: &str) -> String {
    let painted = if title == UpdateStatus::Updated.label() {
        title.green().bold()
    } else if title == UpdateStatus::Failed.label() {
        title.red().bold()
    } else {
        title.dim()
    };
    painted.to_string()
}

fn write_groups(out: &mut String, heading: &str, groups: &[OutcomeGroup]) {
    if groups.is_empty() {
        return;
    }
    let _ = writeln!(out, "  {}", heading.bold());
    for group in groups {
        let _ = writeln!(
            out,
            "    {} ({})",
            paint_title(&group.title),
            group.students.len()
        );
        for student in &group.students {
            let _ = writeln!(out, "      {student}");
        }
    }
}

/// Human-readable rendering of one finished group report.
pub fn render_report(report: &Report) -> String {
    let mut out = String::new();
    let key = report.group_key.as_str();
    let heading = if report.has_errors() {
        key.red().bold()
    } else {
        key.cyan().bold()
    };
    let _ = writeln!(out, "{heading}");

    if !report.config_errors.is_empty() {
        let _ = writeln!(out, "  {}", "Configuration errors".red().bold());
        for message in &report.config_errors {
            let _ = writeln!(out, "    {message}");
        }
    }

    if let Some(merge) = &report.merge {
        let _ = writeln!(out, "  matched: {}", merge.matched);
        if !merge.unmatched_actual.is_empty() {
            let _ = writeln!(
                out,
                "  {} {}",
                "not in portal:".yellow(),
                merge.unmatched_actual.join(", ")
            );
        }
        if !merge.unmatched_portal.is_empty() {
            let _ = writeln!(
                out,
                "  {} {}",
                "not in sheet:".yellow(),
                merge.unmatched_portal.join(", ")
            );
        }
    }

    write_groups(&mut out, "Marks", &report.marks);
    write_groups(&mut out, "Failures", &report.failures);
    out
}

/// One-line summary of the whole run.
pub fn render_summary(summary: &RunSummary) -> String {
    let outcome = match &summary.outcome {
        RunOutcome::Completed => "completed".green().to_string(),
        RunOutcome::Cancelled => "cancelled".yellow().to_string(),
        RunOutcome::Errored(e) => format!("{}: {e}", "failed".red()),
    };
    let mut line = format!(
        "Run {outcome}: {} group(s), {} write(s) succeeded, {} failed",
        summary.groups_processed, summary.writes.updated, summary.writes.failed
    );
    if summary.groups_skipped > 0 {
        let _ = write!(
            line,
            ", {}",
            format!("{} group(s) skipped", summary.groups_skipped).yellow()
        );
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marks::engine::WriteCounts;
    use crate::marks::reconcile::MergeStats;

    #[test]
    fn report_lists_every_section() {
        let report = Report {
            group_key: "Физика / РИ-1".to_string(),
            merge: Some(MergeStats {
                matched: 1,
                unmatched_actual: vec!["Сидоров Сидор".to_string()],
                unmatched_portal: Vec::new(),
            }),
            marks: vec![OutcomeGroup {
                title: "Updated".to_string(),
                students: vec!["Петров Петр: КР 80 -> 85".to_string()],
            }],
            failures: Vec::new(),
            config_errors: Vec::new(),
        };

        let text = render_report(&report);
        assert!(text.contains("Физика / РИ-1"));
        assert!(text.contains("matched: 1"));
        assert!(text.contains("Сидоров Сидор"));
        assert!(text.contains("Петров Петр: КР 80 -> 85"));
        assert!(!text.contains("not in sheet"));
    }

    #[test]
    fn summary_mentions_counts() {
        let summary = RunSummary {
            outcome: RunOutcome::Completed,
            groups_processed: 2,
            groups_skipped: 0,
            writes: WriteCounts {
                updated: 5,
                failed: 1,
            },
        };
        let text = render_summary(&summary);
        assert!(text.contains("2 group(s)"));
        assert!(text.contains("5 write(s) succeeded, 1 failed"));
        assert!(!text.contains("skipped"));
    }

    #[test]
    fn summary_mentions_skipped_groups() {
        let summary = RunSummary {
            outcome: RunOutcome::Completed,
            groups_processed: 3,
            groups_skipped: 2,
            writes: WriteCounts::default(),
        };
        assert!(render_summary(&summary).contains("2 group(s) skipped"));
    }
}
