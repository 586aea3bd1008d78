//! Task classification and remediation priority.
//!
//! Categories are assigned first-match-wins. Rules about code/test hook
//! pairs only apply to tasks that actually carry hooks of those kinds, and
//! `not_implemented` requires that nothing similar exists on disk either; a
//! near-miss path is a `naming_issue` so the remediation (rename) is
//! cheaper than the remediation for a genuinely missing artifact.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::hooks::EvidenceKind;
use crate::resolve::{HookStatus, ResolvedHook};

/// Verifier category for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Verified,
    NotImplemented,
    MissingTests,
    MissingCode,
    NamingIssue,
    SymbolIssue,
    ContentIssue,
    /// Zero evidence hooks: nothing to prove or disprove.
    Unverifiable,
}

impl TaskCategory {
    /// Stable snake_case name used in report totals.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::NotImplemented => "not_implemented",
            Self::MissingTests => "missing_tests",
            Self::MissingCode => "missing_code",
            Self::NamingIssue => "naming_issue",
            Self::SymbolIssue => "symbol_issue",
            Self::ContentIssue => "content_issue",
            Self::Unverifiable => "unverifiable",
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a task from its resolved hooks.
#[must_use]
pub fn classify(resolved: &[ResolvedHook], has_parse_errors: bool) -> TaskCategory {
    if resolved.is_empty() && !has_parse_errors {
        return TaskCategory::Unverifiable;
    }

    let of_kind = |kind: EvidenceKind| -> Vec<&ResolvedHook> {
        resolved.iter().filter(|h| h.hook.kind == kind).collect()
    };
    let code = of_kind(EvidenceKind::Code);
    let test = of_kind(EvidenceKind::Test);

    let all_pass = |hooks: &[&ResolvedHook]| hooks.iter().all(|h| h.passed());
    let gated = !code.is_empty() || !test.is_empty();

    // 1. Nothing exists: every code/test hook is missing outright.
    if gated
        && code.iter().chain(test.iter()).all(|h| h.hard_missing())
    {
        return TaskCategory::NotImplemented;
    }

    // 2/3. One side of the code/test pair resolves, the other does not.
    if !code.is_empty() && !test.is_empty() {
        if all_pass(&code) && !all_pass(&test) {
            return TaskCategory::MissingTests;
        }
        if all_pass(&test) && !all_pass(&code) {
            return TaskCategory::MissingCode;
        }
    }

    // 4. A near-miss path exists above the fuzzy threshold.
    if resolved
        .iter()
        .any(|h| matches!(h.status, HookStatus::PathMissing) && !h.suggestions.is_empty())
    {
        return TaskCategory::NamingIssue;
    }

    // Remaining hard-missing paths on a task that is not fully missing.
    if resolved.iter().any(|h| h.hard_missing()) {
        return TaskCategory::NotImplemented;
    }

    // 5/6. File resolved but the symbol or content predicate did not.
    if resolved
        .iter()
        .any(|h| matches!(h.status, HookStatus::SymbolMissing))
    {
        return TaskCategory::SymbolIssue;
    }
    if resolved.iter().any(|h| {
        matches!(
            h.status,
            HookStatus::PredicateFailed | HookStatus::InvalidPredicate { .. }
        )
    }) {
        return TaskCategory::ContentIssue;
    }

    // Security violations fail the task without a remediation category of
    // their own; they read as not implemented at a rejected location.
    if resolved
        .iter()
        .any(|h| matches!(h.status, HookStatus::SecurityViolation { .. }))
    {
        return TaskCategory::NotImplemented;
    }

    if has_parse_errors {
        return TaskCategory::Unverifiable;
    }

    TaskCategory::Verified
}

/// Remediation priority 1-4; 0 means nothing to remediate.
///
/// 1: claimed but disproved. 2: unclaimed missing work. 3: symbol/content
/// drift. 4: naming mismatch.
#[must_use]
pub fn priority(claimed: bool, category: TaskCategory) -> u8 {
    let failed = !matches!(category, TaskCategory::Verified)
        && !(matches!(category, TaskCategory::Unverifiable) && !claimed);
    if claimed && failed {
        return 1;
    }
    match category {
        TaskCategory::NotImplemented | TaskCategory::MissingTests | TaskCategory::MissingCode => 2,
        TaskCategory::SymbolIssue | TaskCategory::ContentIssue => 3,
        TaskCategory::NamingIssue => 4,
        TaskCategory::Verified | TaskCategory::Unverifiable => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::EvidenceHook;

    fn resolved(kind: EvidenceKind, status: HookStatus, suggestions: usize) -> ResolvedHook {
        ResolvedHook {
            hook: EvidenceHook {
                kind,
                path: "p".into(),
                symbol: None,
                predicate: None,
                line: 1,
            },
            status,
            suggestions: (0..suggestions)
                .map(|i| crate::fuzzy::SimilarFile {
                    path: format!("cand{i}"),
                    score: 0.7,
                })
                .collect(),
        }
    }

    #[test]
    fn zero_hooks_is_unverifiable() {
        assert_eq!(classify(&[], false), TaskCategory::Unverifiable);
    }

    #[test]
    fn nothing_on_disk_is_not_implemented() {
        let hooks = vec![
            resolved(EvidenceKind::Code, HookStatus::PathMissing, 0),
            resolved(EvidenceKind::Test, HookStatus::PathMissing, 0),
        ];
        assert_eq!(classify(&hooks, false), TaskCategory::NotImplemented);
    }

    #[test]
    fn code_without_test_is_missing_tests() {
        let hooks = vec![
            resolved(EvidenceKind::Code, HookStatus::Passed, 0),
            resolved(EvidenceKind::Test, HookStatus::PathMissing, 0),
        ];
        assert_eq!(classify(&hooks, false), TaskCategory::MissingTests);
    }

    #[test]
    fn test_without_code_is_missing_code() {
        let hooks = vec![
            resolved(EvidenceKind::Code, HookStatus::PathMissing, 0),
            resolved(EvidenceKind::Test, HookStatus::Passed, 0),
        ];
        assert_eq!(classify(&hooks, false), TaskCategory::MissingCode);
    }

    #[test]
    fn near_miss_path_is_naming_issue() {
        let hooks = vec![resolved(EvidenceKind::Test, HookStatus::PathMissing, 2)];
        assert_eq!(classify(&hooks, false), TaskCategory::NamingIssue);
    }

    #[test]
    fn missing_tests_beats_naming_when_code_passes() {
        let hooks = vec![
            resolved(EvidenceKind::Code, HookStatus::Passed, 0),
            resolved(EvidenceKind::Test, HookStatus::PathMissing, 2),
        ];
        assert_eq!(classify(&hooks, false), TaskCategory::MissingTests);
    }

    #[test]
    fn symbol_beats_content() {
        let hooks = vec![
            resolved(EvidenceKind::Code, HookStatus::SymbolMissing, 0),
            resolved(EvidenceKind::Test, HookStatus::PredicateFailed, 0),
        ];
        assert_eq!(classify(&hooks, false), TaskCategory::SymbolIssue);
    }

    #[test]
    fn all_passing_is_verified() {
        let hooks = vec![
            resolved(EvidenceKind::Code, HookStatus::Passed, 0),
            resolved(EvidenceKind::Test, HookStatus::Passed, 0),
            resolved(EvidenceKind::Doc, HookStatus::Passed, 0),
        ];
        assert_eq!(classify(&hooks, false), TaskCategory::Verified);
    }

    #[test]
    fn doc_only_task_passes_without_code_or_test() {
        let hooks = vec![resolved(EvidenceKind::Doc, HookStatus::Passed, 0)];
        assert_eq!(classify(&hooks, false), TaskCategory::Verified);
    }

    #[test]
    fn priorities_follow_claim_and_category() {
        assert_eq!(priority(true, TaskCategory::MissingTests), 1);
        assert_eq!(priority(true, TaskCategory::Unverifiable), 1);
        assert_eq!(priority(false, TaskCategory::NotImplemented), 2);
        assert_eq!(priority(false, TaskCategory::MissingCode), 2);
        assert_eq!(priority(false, TaskCategory::SymbolIssue), 3);
        assert_eq!(priority(false, TaskCategory::ContentIssue), 3);
        assert_eq!(priority(false, TaskCategory::NamingIssue), 4);
        assert_eq!(priority(false, TaskCategory::Verified), 0);
        assert_eq!(priority(true, TaskCategory::Verified), 0);
        assert_eq!(priority(false, TaskCategory::Unverifiable), 0);
    }
}
