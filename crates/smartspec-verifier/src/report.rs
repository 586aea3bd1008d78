//! Verification report model.
//!
//! The report is pure data with stable field names; rendering lives in
//! [`crate::render`]. Reports are deterministic: no timestamps, map keys
//! sorted, canonical JSON emission.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::classify::TaskCategory;
use crate::hooks::HookParseError;
use crate::resolve::{HookStatus, ResolvedHook};

/// Per-task result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub id: String,
    pub title: String,
    pub claimed: bool,
    pub line: usize,
    pub category: TaskCategory,
    /// `pass` or `fail`.
    pub verdict: String,
    /// 1-4 remediation priority; 0 when nothing needs doing.
    pub priority: u8,
    pub hooks: Vec<ResolvedHook>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parse_errors: Vec<HookParseError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

/// Aggregate counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub total: usize,
    pub verified: usize,
    pub not_implemented: usize,
    pub missing_tests: usize,
    pub missing_code: usize,
    pub naming_issue: usize,
    pub symbol_issue: usize,
    pub content_issue: usize,
    pub unverifiable: usize,
}

/// The whole report for one verification run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Repository-relative path of the verified document.
    pub tasks_path: String,
    pub totals: Totals,
    /// Non-zero category counts, keyed by category name.
    pub by_category: BTreeMap<String, usize>,
    pub tasks: Vec<TaskReport>,
}

impl VerificationReport {
    /// Assemble totals and `by_category` from per-task reports.
    #[must_use]
    pub fn assemble(tasks_path: String, tasks: Vec<TaskReport>) -> Self {
        let mut totals = Totals {
            total: tasks.len(),
            ..Totals::default()
        };
        for task in &tasks {
            // A claimed zero-hook task counts as not implemented: the claim
            // asserts work that nothing on disk backs.
            let bucket = if task.category == TaskCategory::Unverifiable && task.claimed {
                TaskCategory::NotImplemented
            } else {
                task.category
            };
            match bucket {
                TaskCategory::Verified => totals.verified += 1,
                TaskCategory::NotImplemented => totals.not_implemented += 1,
                TaskCategory::MissingTests => totals.missing_tests += 1,
                TaskCategory::MissingCode => totals.missing_code += 1,
                TaskCategory::NamingIssue => totals.naming_issue += 1,
                TaskCategory::SymbolIssue => totals.symbol_issue += 1,
                TaskCategory::ContentIssue => totals.content_issue += 1,
                TaskCategory::Unverifiable => totals.unverifiable += 1,
            }
        }

        let mut by_category = BTreeMap::new();
        for (name, count) in [
            ("verified", totals.verified),
            ("not_implemented", totals.not_implemented),
            ("missing_tests", totals.missing_tests),
            ("missing_code", totals.missing_code),
            ("naming_issue", totals.naming_issue),
            ("symbol_issue", totals.symbol_issue),
            ("content_issue", totals.content_issue),
            ("unverifiable", totals.unverifiable),
        ] {
            if count > 0 {
                by_category.insert(name.to_string(), count);
            }
        }

        Self {
            tasks_path,
            totals,
            by_category,
            tasks,
        }
    }

    /// Canonical JSON emission; two runs over identical inputs are
    /// byte-identical.
    ///
    /// # Errors
    /// Serialization failure only.
    pub fn to_canonical_json(&self) -> anyhow::Result<String> {
        smartspec_utils::canonical::to_canonical_json(self)
    }

    /// Tasks needing remediation, ordered by priority then document order.
    #[must_use]
    pub fn remediation_order(&self) -> Vec<&TaskReport> {
        let mut failed: Vec<&TaskReport> =
            self.tasks.iter().filter(|t| t.priority > 0).collect();
        failed.sort_by_key(|t| (t.priority, t.line));
        failed
    }
}

/// Build remediation suggestions for one task's resolved hooks.
#[must_use]
pub fn suggestions_for(
    category: TaskCategory,
    hooks: &[ResolvedHook],
    parse_errors: &[HookParseError],
) -> Vec<String> {
    let mut out = Vec::new();
    for err in parse_errors {
        out.push(format!("Fix evidence hook at line {}: {}", err.line, err.reason));
    }
    for hook in hooks {
        match &hook.status {
            HookStatus::Passed => {}
            HookStatus::SecurityViolation { message } => out.push(message.clone()),
            HookStatus::PathMissing => {
                if hook.suggestions.is_empty() {
                    let noun = match hook.hook.kind {
                        crate::hooks::EvidenceKind::Test => "test file",
                        crate::hooks::EvidenceKind::Doc => "doc file",
                        crate::hooks::EvidenceKind::Code => "file",
                    };
                    out.push(format!("Create {noun}: {}", hook.hook.path));
                } else {
                    for similar in &hook.suggestions {
                        out.push(format!(
                            "Similar file exists: {} (score {:.2})",
                            similar.path, similar.score
                        ));
                    }
                }
            }
            HookStatus::SymbolMissing => {
                if let Some(symbol) = &hook.hook.symbol {
                    out.push(format!(
                        "Define '{symbol}' in {} (definition scan is heuristic)",
                        hook.hook.path
                    ));
                }
            }
            HookStatus::PredicateFailed => out.push(format!(
                "Expected content not found in {}",
                hook.hook.path
            )),
            HookStatus::InvalidPredicate { message } => out.push(message.clone()),
        }
    }
    if category == TaskCategory::Unverifiable && out.is_empty() {
        out.push("Add evidence hooks binding this task to files".to_string());
    }
    out
}
