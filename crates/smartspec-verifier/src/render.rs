//! Human-readable rendering of a verification report.
//!
//! Rendering is a separate concern from the report data; nothing here feeds
//! back into classification.

use std::fmt::Write as _;

use crate::report::VerificationReport;

/// Render a report as Markdown, suitable for `.spec/reports/**/report.md`.
#[must_use]
pub fn to_markdown(report: &VerificationReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Verification report: {}", report.tasks_path);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{} task(s): {} verified, {} failing",
        report.totals.total,
        report.totals.verified,
        report.totals.total - report.totals.verified - report.totals.unverifiable
    );
    let _ = writeln!(out);

    if !report.by_category.is_empty() {
        let _ = writeln!(out, "| Category | Count |");
        let _ = writeln!(out, "|---|---|");
        for (category, count) in &report.by_category {
            let _ = writeln!(out, "| {category} | {count} |");
        }
        let _ = writeln!(out);
    }

    for task in &report.tasks {
        let mark = if task.verdict == "pass" { "✓" } else { "✗" };
        let claim = if task.claimed { "claimed" } else { "unclaimed" };
        let _ = writeln!(
            out,
            "## {mark} {} — {} ({claim}, line {})",
            task.id, task.category, task.line
        );
        for hook in &task.hooks {
            let _ = writeln!(
                out,
                "- `{}` {} at line {}",
                hook.hook.path,
                if hook.passed() { "ok" } else { "failed" },
                hook.hook.line
            );
        }
        if task.priority > 0 {
            let _ = writeln!(out, "- priority: {}", task.priority);
        }
        for suggestion in &task.suggestions {
            let _ = writeln!(out, "- suggestion: {suggestion}");
        }
        let _ = writeln!(out);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::TaskCategory;
    use crate::report::TaskReport;

    #[test]
    fn markdown_lists_categories_and_suggestions() {
        let report = VerificationReport::assemble(
            "tasks.md".into(),
            vec![TaskReport {
                id: "TASK-001".into(),
                title: "Password hashing".into(),
                claimed: true,
                line: 3,
                category: TaskCategory::MissingTests,
                verdict: "fail".into(),
                priority: 1,
                hooks: Vec::new(),
                parse_errors: Vec::new(),
                suggestions: vec!["Create test file: tests/test_auth.py".into()],
            }],
        );
        let md = to_markdown(&report);
        assert!(md.contains("| missing_tests | 1 |"));
        assert!(md.contains("✗ TASK-001"));
        assert!(md.contains("suggestion: Create test file"));
        assert!(md.contains("priority: 1"));
    }
}
