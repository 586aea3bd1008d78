//! Evidence verifier: proves (or disproves) that the work a tasks document
//! claims actually exists on disk.
//!
//! The verifier is a pure function of the document content and a filesystem
//! snapshot: identical inputs produce byte-identical reports. Hook failures
//! are data; only IO problems abort a run.

mod classify;
mod error;
mod fuzzy;
mod hooks;
pub mod render;
mod report;
mod resolve;
mod tasks;

pub use classify::{TaskCategory, classify, priority};
pub use error::VerifierError;
pub use fuzzy::SimilarFile;
pub use hooks::{ContentPredicate, EvidenceHook, EvidenceKind, HookParseError};
pub use report::{TaskReport, Totals, VerificationReport, suggestions_for};
pub use resolve::{HookStatus, ResolvedHook, contains_definition};
pub use tasks::{Task, parse_tasks};

use std::path::Path;

/// Verifier with its tuning knobs.
#[derive(Debug, Clone)]
pub struct Verifier {
    fuzzy_threshold: f64,
    max_suggestions: usize,
}

impl Default for Verifier {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.55,
            max_suggestions: 3,
        }
    }
}

impl Verifier {
    #[must_use]
    pub fn new(fuzzy_threshold: f64, max_suggestions: usize) -> Self {
        Self {
            fuzzy_threshold,
            max_suggestions,
        }
    }

    /// Verify a tasks document against the repository rooted at `repo_root`.
    ///
    /// `tasks_path` is repository-relative and recorded verbatim in the
    /// report.
    ///
    /// # Errors
    /// [`VerifierError`] when the document is missing or the filesystem
    /// fails; hook-level problems are report content instead.
    pub fn verify(
        &self,
        repo_root: &Path,
        tasks_path: &str,
    ) -> Result<VerificationReport, VerifierError> {
        let abs = repo_root.join(tasks_path);
        let content = match std::fs::read_to_string(&abs) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VerifierError::TasksNotFound {
                    path: tasks_path.to_string(),
                });
            }
            Err(e) => return Err(VerifierError::io(tasks_path, e)),
        };
        self.verify_content(repo_root, tasks_path, &content)
    }

    /// Verify already-loaded document content. Exposed so callers holding a
    /// consistent snapshot can avoid the reread.
    ///
    /// # Errors
    /// Filesystem failures during hook resolution.
    pub fn verify_content(
        &self,
        repo_root: &Path,
        tasks_path: &str,
        content: &str,
    ) -> Result<VerificationReport, VerifierError> {
        let parsed = parse_tasks(content);
        let mut task_reports = Vec::with_capacity(parsed.len());

        for task in parsed {
            let mut resolved = Vec::with_capacity(task.hooks.len());
            for hook in &task.hooks {
                resolved.push(resolve::resolve_hook(
                    repo_root,
                    hook,
                    self.fuzzy_threshold,
                    self.max_suggestions,
                )?);
            }

            let category = classify(&resolved, !task.parse_errors.is_empty());
            let priority = priority(task.claimed, category);
            let verdict = if priority == 0 { "pass" } else { "fail" };
            let suggestions = suggestions_for(category, &resolved, &task.parse_errors);

            task_reports.push(TaskReport {
                id: task.id,
                title: task.title,
                claimed: task.claimed,
                line: task.line,
                category,
                verdict: verdict.to_string(),
                priority,
                hooks: resolved,
                parse_errors: task.parse_errors,
                suggestions,
            });
        }

        Ok(VerificationReport::assemble(
            tasks_path.to_string(),
            task_reports,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, rel: &str, content: &str) {
        let path = dir.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    /// A checked task whose code and test evidence both resolve.
    #[test]
    fn clean_document_verifies() {
        let dir = TempDir::new().unwrap();
        write(&dir, "src/auth.py", "def hash_password(pw):\n    return pw\n");
        write(
            &dir,
            "tests/test_auth.py",
            "def test_hashing():\n    assert hash_password('x')\n",
        );
        write(
            &dir,
            "tasks.md",
            r#"- [x] TASK-001 Password hashing
  evidence: code path="src/auth.py" symbol=hash_password
  evidence: test path="tests/test_auth.py" contains="hash_password"
"#,
        );

        let report = Verifier::default().verify(dir.path(), "tasks.md").unwrap();
        assert_eq!(report.totals.verified, 1);
        assert_eq!(report.by_category.get("verified"), Some(&1));
        assert_eq!(report.tasks[0].verdict, "pass");
        assert_eq!(report.tasks[0].priority, 0);
    }

    /// Code exists, the test file does not: claimed, so priority 1.
    #[test]
    fn missing_test_file_is_flagged() {
        let dir = TempDir::new().unwrap();
        write(&dir, "src/auth.py", "def hash_password(pw):\n    return pw\n");
        write(
            &dir,
            "tasks.md",
            r#"- [x] TASK-001 Password hashing
  evidence: code path="src/auth.py" symbol=hash_password
  evidence: test path="tests/test_auth.py" contains="hash_password"
"#,
        );

        let report = Verifier::default().verify(dir.path(), "tasks.md").unwrap();
        assert_eq!(report.by_category.get("missing_tests"), Some(&1));
        let task = &report.tasks[0];
        assert_eq!(task.priority, 1);
        assert!(
            task.suggestions
                .iter()
                .any(|s| s == "Create test file: tests/test_auth.py"),
            "got {:?}",
            task.suggestions
        );
    }

    /// Missing path with a close sibling: naming issue plus scored suggestion.
    #[test]
    fn near_miss_paths_become_naming_issues() {
        let dir = TempDir::new().unwrap();
        write(&dir, "tests/test_checkpoint_mgr.py", "def test_ok(): pass\n");
        write(
            &dir,
            "tasks.md",
            "- [ ] TASK-002 Checkpoints\n  evidence: test path=tests/test_checkpoint_manager.py\n",
        );

        let report = Verifier::default().verify(dir.path(), "tasks.md").unwrap();
        assert_eq!(report.by_category.get("naming_issue"), Some(&1));
        let task = &report.tasks[0];
        assert_eq!(task.priority, 4);
        assert_eq!(task.hooks[0].suggestions[0].path, "tests/test_checkpoint_mgr.py");
        assert!(task.hooks[0].suggestions[0].score >= 0.55);
    }

    /// Traversal in one hook poisons only that hook's task.
    #[test]
    fn traversal_hook_reports_security_and_spares_others() {
        let dir = TempDir::new().unwrap();
        write(&dir, "src/ok.rs", "fn fine() {}\n");
        write(
            &dir,
            "tasks.md",
            "- [x] TASK-001 escape\n  evidence: code path=../../etc/passwd\n- [x] TASK-002 fine\n  evidence: code path=src/ok.rs symbol=fine\n",
        );

        let report = Verifier::default().verify(dir.path(), "tasks.md").unwrap();
        assert_eq!(report.tasks.len(), 2);
        assert!(matches!(
            report.tasks[0].hooks[0].status,
            HookStatus::SecurityViolation { .. }
        ));
        assert_eq!(report.tasks[1].verdict, "pass");
    }

    /// Byte-identical reports for identical inputs.
    #[test]
    fn verification_is_deterministic() {
        let dir = TempDir::new().unwrap();
        write(&dir, "src/a.rs", "fn a() {}\n");
        write(
            &dir,
            "tasks.md",
            "- [x] T One\n  evidence: code path=src/a.rs symbol=a\n- [ ] T Two\n  evidence: code path=src/missing.rs\n",
        );

        let verifier = Verifier::default();
        let one = verifier
            .verify(dir.path(), "tasks.md")
            .unwrap()
            .to_canonical_json()
            .unwrap();
        let two = verifier
            .verify(dir.path(), "tasks.md")
            .unwrap()
            .to_canonical_json()
            .unwrap();
        assert_eq!(one, two);
    }

    #[test]
    fn missing_document_is_a_typed_error() {
        let dir = TempDir::new().unwrap();
        let err = Verifier::default().verify(dir.path(), "tasks.md").unwrap_err();
        assert!(matches!(err, VerifierError::TasksNotFound { .. }));
    }

    #[test]
    fn claimed_task_without_hooks_counts_as_not_implemented() {
        let dir = TempDir::new().unwrap();
        write(&dir, "tasks.md", "- [x] TASK-009 ghost work\n");
        let report = Verifier::default().verify(dir.path(), "tasks.md").unwrap();
        assert_eq!(report.tasks[0].category, TaskCategory::Unverifiable);
        assert_eq!(report.totals.not_implemented, 1);
        assert_eq!(report.tasks[0].priority, 1);
    }
}
