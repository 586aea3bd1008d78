//! State-based workflow recommendation.
//!
//! The decision table is a pure function of [`BundleState`];
//! [`observe_bundle`] builds that state from the governed bundle and the
//! runtime report tree. Keeping the two apart makes every table row
//! testable without a filesystem.

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use smartspec_utils::SpecId;
use smartspec_utils::paths::RepoLayout;

/// What the router can observe about one spec bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleState {
    pub spec_exists: bool,
    pub plan_exists: bool,
    pub tasks_exists: bool,
    /// No verification report, or `tasks.md` changed since the last one.
    pub verification_stale: bool,
    /// Last verification had zero failing tasks. `None` when never run.
    pub verification_clean: Option<bool>,
    /// A prompt pack exists for this spec.
    pub prompt_pack_exists: bool,
    /// Checkbox claims agree with the last verification. `None` when never
    /// verified.
    pub checkboxes_synced: Option<bool>,
    /// Unchecked tasks that carry evidence hooks.
    pub unchecked_verifiable_tasks: usize,
    pub docs_built: bool,
    pub release_tagged: bool,
}

/// One recommendation from the decision table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub workflow: String,
    pub rationale: String,
    pub estimated_duration_secs: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Recommendation {
    fn new(workflow: &str, rationale: impl Into<String>, estimated_duration_secs: u64) -> Self {
        Self {
            workflow: workflow.to_string(),
            rationale: rationale.into(),
            estimated_duration_secs,
            warnings: Vec::new(),
        }
    }

    fn warn(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// The decision table. First matching row wins.
#[must_use]
pub fn recommend(state: &BundleState, prompt_supplied: bool) -> Recommendation {
    if !state.spec_exists {
        return if prompt_supplied {
            Recommendation::new(
                "generate_spec",
                "No spec file exists yet; drafting one from the supplied prompt",
                120,
            )
        } else {
            Recommendation::new("generate_spec", "No spec file exists yet", 120)
        };
    }
    if !state.plan_exists {
        return Recommendation::new("generate_plan", "Spec present but no plan", 90);
    }
    if !state.tasks_exists {
        return Recommendation::new("generate_tasks", "Plan present but no tasks", 90);
    }
    if state.verification_stale {
        let mut rec = Recommendation::new(
            "verify_tasks",
            "Verification is stale or has never run",
            30,
        );
        if state.checkboxes_synced == Some(false) {
            rec = rec.warn("checkboxes may disagree with evidence; consider syncing after");
        }
        return rec;
    }
    if state.verification_clean == Some(false) && !state.prompt_pack_exists {
        return Recommendation::new(
            "report_implement_prompter",
            "Verification found failures and no prompt pack exists",
            20,
        );
    }
    if state.unchecked_verifiable_tasks > 0 {
        return Recommendation::new(
            "implement_tasks",
            format!(
                "{} verifiable task(s) remain unchecked",
                state.unchecked_verifiable_tasks
            ),
            600,
        );
    }
    if state.verification_clean == Some(true) && state.checkboxes_synced != Some(true) {
        return Recommendation::new(
            "sync_tasks_checkboxes",
            "All tasks verified clean; align checkboxes with evidence",
            10,
        );
    }
    if !state.docs_built {
        return Recommendation::new("generate_docs", "Synced but no doc build artifact", 60);
    }
    if !state.release_tagged {
        return Recommendation::new("release_tagger", "Docs built but no release tag", 15);
    }
    Recommendation::new(
        "verify_tasks",
        "Pipeline complete; re-verification is the only remaining action",
        30,
    )
    .warn("spec appears fully released")
}

/// Build [`BundleState`] from disk.
///
/// # Errors
/// IO failures other than absence; a missing bundle is a valid (empty)
/// state.
pub fn observe_bundle(layout: &RepoLayout, spec_id: &SpecId) -> std::io::Result<BundleState> {
    let bundle = layout.bundle_dir(spec_id.category(), &spec_id.to_string());
    let tasks_path = bundle.join("tasks.md");

    let mut state = BundleState {
        spec_exists: bundle.join("spec.md").is_file(),
        plan_exists: bundle.join("plan.md").is_file(),
        tasks_exists: tasks_path.is_file(),
        ..BundleState::default()
    };

    let report_path = latest_verification_report(layout, spec_id);
    match &report_path {
        None => state.verification_stale = state.tasks_exists,
        Some(report) => {
            state.verification_stale = is_stale(&tasks_path, report);
            if let Some(summary) = read_summary(report) {
                state.verification_clean = Some(summary.failing == 0);
                state.checkboxes_synced = Some(summary.claim_mismatches == 0);
                state.unchecked_verifiable_tasks = summary.unchecked_verifiable;
            }
        }
    }

    state.prompt_pack_exists = layout
        .runtime_dir()
        .join("prompts")
        .join(spec_id.to_string())
        .is_dir();
    state.docs_built = layout
        .report_dir("generate_docs", &spec_id.to_string())
        .join("docs.md")
        .is_file();
    state.release_tagged = layout
        .report_dir("release_tagger", &spec_id.to_string())
        .join("release.json")
        .is_file();

    Ok(state)
}

fn latest_verification_report(
    layout: &RepoLayout,
    spec_id: &SpecId,
) -> Option<camino::Utf8PathBuf> {
    let path = layout
        .report_dir("verify_tasks", &spec_id.to_string())
        .join("summary.json");
    path.is_file().then_some(path)
}

fn is_stale(tasks_path: &Utf8Path, report_path: &Utf8Path) -> bool {
    let tasks_mtime = std::fs::metadata(tasks_path).and_then(|m| m.modified());
    let report_mtime = std::fs::metadata(report_path).and_then(|m| m.modified());
    match (tasks_mtime, report_mtime) {
        (Ok(tasks), Ok(report)) => tasks > report,
        _ => true,
    }
}

struct SummaryCounts {
    failing: usize,
    claim_mismatches: usize,
    unchecked_verifiable: usize,
}

/// Pull what the decision table needs out of a verification `summary.json`
/// without depending on the verifier's types.
fn read_summary(path: &Utf8Path) -> Option<SummaryCounts> {
    let raw = std::fs::read_to_string(path).ok()?;
    let value: serde_json::Value = serde_json::from_str(&raw).ok()?;
    let tasks = value.get("tasks")?.as_array()?;

    let mut failing = 0;
    let mut claim_mismatches = 0;
    let mut unchecked_verifiable = 0;
    for task in tasks {
        let claimed = task.get("claimed").and_then(serde_json::Value::as_bool)?;
        let passed = task.get("verdict").and_then(serde_json::Value::as_str)? == "pass";
        let has_hooks = task
            .get("hooks")
            .and_then(serde_json::Value::as_array)
            .is_some_and(|hooks| !hooks.is_empty());
        if !passed {
            failing += 1;
        }
        if claimed != passed {
            claim_mismatches += 1;
        }
        if !claimed && has_hooks {
            unchecked_verifiable += 1;
        }
    }
    Some(SummaryCounts {
        failing,
        claim_mismatches,
        unchecked_verifiable,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> BundleState {
        BundleState::default()
    }

    #[test]
    fn empty_bundle_recommends_spec_generation() {
        let rec = recommend(&fresh(), false);
        assert_eq!(rec.workflow, "generate_spec");
        let with_prompt = recommend(&fresh(), true);
        assert!(with_prompt.rationale.contains("prompt"));
    }

    #[test]
    fn table_rows_fire_in_order() {
        let mut state = fresh();
        state.spec_exists = true;
        assert_eq!(recommend(&state, false).workflow, "generate_plan");

        state.plan_exists = true;
        assert_eq!(recommend(&state, false).workflow, "generate_tasks");

        state.tasks_exists = true;
        state.verification_stale = true;
        assert_eq!(recommend(&state, false).workflow, "verify_tasks");

        state.verification_stale = false;
        state.verification_clean = Some(false);
        assert_eq!(
            recommend(&state, false).workflow,
            "report_implement_prompter"
        );

        state.prompt_pack_exists = true;
        state.unchecked_verifiable_tasks = 3;
        let rec = recommend(&state, false);
        assert_eq!(rec.workflow, "implement_tasks");
        assert!(rec.rationale.contains('3'));

        state.unchecked_verifiable_tasks = 0;
        state.verification_clean = Some(true);
        state.checkboxes_synced = Some(false);
        assert_eq!(recommend(&state, false).workflow, "sync_tasks_checkboxes");

        state.checkboxes_synced = Some(true);
        assert_eq!(recommend(&state, false).workflow, "generate_docs");

        state.docs_built = true;
        assert_eq!(recommend(&state, false).workflow, "release_tagger");

        state.release_tagged = true;
        let done = recommend(&state, false);
        assert!(!done.warnings.is_empty());
    }

    #[test]
    fn stale_verification_warns_about_checkbox_drift() {
        let mut state = fresh();
        state.spec_exists = true;
        state.plan_exists = true;
        state.tasks_exists = true;
        state.verification_stale = true;
        state.checkboxes_synced = Some(false);
        let rec = recommend(&state, false);
        assert_eq!(rec.workflow, "verify_tasks");
        assert_eq!(rec.warnings.len(), 1);
    }

    #[test]
    fn every_row_carries_rationale_and_duration() {
        let mut state = fresh();
        for _ in 0..8 {
            let rec = recommend(&state, false);
            assert!(!rec.rationale.is_empty());
            assert!(rec.estimated_duration_secs > 0);
            // Advance the pipeline one observable step.
            match rec.workflow.as_str() {
                "generate_spec" => state.spec_exists = true,
                "generate_plan" => state.plan_exists = true,
                "generate_tasks" => {
                    state.tasks_exists = true;
                    state.verification_stale = true;
                }
                "verify_tasks" => {
                    state.verification_stale = false;
                    state.verification_clean = Some(true);
                    state.checkboxes_synced = Some(false);
                }
                "sync_tasks_checkboxes" => state.checkboxes_synced = Some(true),
                "generate_docs" => state.docs_built = true,
                "release_tagger" => state.release_tagged = true,
                other => panic!("unexpected workflow {other}"),
            }
        }
    }
}
