//! Builtin pipeline workflows.
//!
//! Each builder returns a [`WorkflowPlan`] whose steps close over a shared
//! [`WorkflowContext`]. Steps only ever write through the engine's scoped
//! writer, so governed artifacts land under `specs/**` and everything else
//! under `.spec/**`. Generative steps go through the gateway unless the
//! run is validate-only, in which case a deterministic draft stands in and
//! nothing governed is written.

use std::sync::Arc;
use uuid::Uuid;

use smartspec_engine::{FnStep, Step, StepContext, WorkflowPlan};
use smartspec_gateway::{BudgetPriority, CompletionRequest, Gateway, Message, TaskClass};
use smartspec_utils::atomic_write::content_hash;
use smartspec_utils::paths::RepoLayout;
use smartspec_utils::{SmartSpecError, SpecId};
use smartspec_verifier::Verifier;

/// Everything builtin workflow steps need.
#[derive(Clone)]
pub struct WorkflowContext {
    pub layout: RepoLayout,
    pub gateway: Arc<Gateway>,
    pub verifier: Verifier,
    pub user_id: Uuid,
    pub spec_id: SpecId,
    /// Compute-only: report instead of writing governed artifacts, and no
    /// provider calls.
    pub validate_only: bool,
}

impl WorkflowContext {
    fn bundle_rel(&self, file: &str) -> String {
        format!(
            "specs/{}/{}/{}",
            self.spec_id.category(),
            self.spec_id,
            file
        )
    }

    fn report_rel(&self, workflow: &str, file: &str) -> String {
        format!(".spec/reports/{workflow}/{}/{file}", self.spec_id)
    }

    fn prompts_rel(&self, file: &str) -> String {
        format!(".spec/prompts/{}/{file}", self.spec_id)
    }

    fn read_artifact(&self, file: &str) -> Option<String> {
        std::fs::read_to_string(
            self.layout
                .bundle_dir(self.spec_id.category(), &self.spec_id.to_string())
                .join(file),
        )
        .ok()
    }
}

/// Build the plan for a builtin workflow name.
///
/// # Errors
/// `validation_error` for a name with no builtin plan.
pub fn build_plan(name: &str, ctx: WorkflowContext) -> Result<WorkflowPlan, SmartSpecError> {
    match name {
        "generate_spec" => Ok(generation_plan(
            ctx,
            "generate_spec",
            None,
            "spec.md",
            "Write a complete specification document for the following feature request.",
        )),
        "generate_plan" => Ok(generation_plan(
            ctx,
            "generate_plan",
            Some("spec.md"),
            "plan.md",
            "Write an implementation plan for the following specification.",
        )),
        "generate_tasks" => Ok(generation_plan(
            ctx,
            "generate_tasks",
            Some("plan.md"),
            "tasks.md",
            "Break the following plan into checkbox tasks with evidence hooks \
             (`evidence: <kind> path=<path> ...`) binding each task to files.",
        )),
        "verify_tasks" => Ok(verify_tasks_plan(ctx)),
        "sync_tasks_checkboxes" => Ok(sync_checkboxes_plan(ctx)),
        "report_implement_prompter" => Ok(prompter_plan(ctx)),
        "implement_tasks" => Ok(implement_tasks_plan(ctx)),
        "generate_docs" => Ok(docs_plan(ctx)),
        "release_tagger" => Ok(release_plan(ctx)),
        other => Err(SmartSpecError::validation(format!(
            "no builtin plan for workflow '{other}'"
        ))),
    }
}

fn step<F, Fut>(name: &str, body: F) -> Arc<dyn Step>
where
    F: Fn(StepContext) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<(), SmartSpecError>> + Send + 'static,
{
    FnStep::new(name, body)
}

/// Skip the write when the content already matches (idempotent re-runs).
fn write_if_changed(
    step_ctx: &StepContext,
    layout: &RepoLayout,
    relative: &str,
    content: &str,
) -> Result<bool, SmartSpecError> {
    let absolute = layout.root().join(relative);
    let new_hash = blake3::hash(content.as_bytes()).to_hex().to_string();
    let existing = content_hash(&absolute)
        .map_err(|e| SmartSpecError::io(relative, std::io::Error::other(e.to_string())))?;
    if existing.as_deref() == Some(new_hash.as_str()) {
        return Ok(false);
    }
    step_ctx.write_scoped(relative, content)?;
    Ok(true)
}

/// Shared shape of the three generative pipeline stages.
fn generation_plan(
    ctx: WorkflowContext,
    workflow: &str,
    source: Option<&'static str>,
    target: &'static str,
    instruction: &'static str,
) -> WorkflowPlan {
    let collect_ctx = ctx.clone();
    let collect = step("collect_inputs", move |step_ctx| {
        let ctx = collect_ctx.clone();
        async move {
            let input = match source {
                Some(file) => ctx.read_artifact(file).ok_or_else(|| {
                    SmartSpecError::validation(format!(
                        "missing prerequisite artifact {}",
                        ctx.bundle_rel(file)
                    ))
                })?,
                None => step_ctx
                    .state
                    .get("args")
                    .and_then(|args| args.get("prompt").and_then(|p| p.as_str().map(String::from)))
                    .unwrap_or_else(|| format!("Feature: {}", ctx.spec_id.slug())),
            };
            step_ctx.state.set("input", serde_json::json!(input));
            Ok(())
        }
    });

    let draft_ctx = ctx.clone();
    let draft = step("draft", move |step_ctx| {
        let ctx = draft_ctx.clone();
        async move {
            let input = step_ctx
                .state
                .get("input")
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default();
            step_ctx.progress.report(0.25);

            let draft = if ctx.validate_only {
                format!("# {} (draft preview)\n\n{instruction}\n\n---\n\n{input}\n", ctx.spec_id)
            } else {
                let completion = ctx
                    .gateway
                    .complete(CompletionRequest {
                        user_id: ctx.user_id,
                        task: TaskClass::Reasoning,
                        priority: BudgetPriority::Quality,
                        messages: vec![
                            Message::system(instruction),
                            Message::user(input),
                        ],
                        expected_output_tokens: None,
                    })
                    .await
                    .map_err(SmartSpecError::from)?;
                completion.content
            };
            step_ctx.state.set("draft", serde_json::json!(draft));
            step_ctx.progress.report(1.0);
            Ok(())
        }
    });

    let write_ctx = ctx.clone();
    let workflow_owned = workflow.to_string();
    let write = step("write_artifact", move |step_ctx| {
        let ctx = write_ctx.clone();
        let workflow = workflow_owned.clone();
        async move {
            let draft = step_ctx
                .state
                .get("draft")
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default();
            if ctx.validate_only {
                let rel = ctx.report_rel(&workflow, "preview.md");
                step_ctx.write_scoped(&rel, &draft)?;
            } else {
                let rel = ctx.bundle_rel(target);
                let changed = write_if_changed(&step_ctx, &ctx.layout, &rel, &draft)?;
                step_ctx
                    .state
                    .set("changed", serde_json::json!(changed));
            }
            Ok(())
        }
    });

    WorkflowPlan::linear(workflow, vec![collect, draft, write])
        .with_bundle_key(ctx.spec_id.to_string())
}

fn verify_tasks_plan(ctx: WorkflowContext) -> WorkflowPlan {
    let verify_ctx = ctx.clone();
    let run = step("run_verifier", move |step_ctx| {
        let ctx = verify_ctx.clone();
        async move {
            let rel = ctx.bundle_rel("tasks.md");
            let report = ctx
                .verifier
                .verify(ctx.layout.root().as_std_path(), &rel)
                .map_err(SmartSpecError::from)?;
            let json = report
                .to_canonical_json()
                .map_err(|e| SmartSpecError::internal(e.to_string()))?;
            step_ctx.state.set("summary", serde_json::json!(json));
            step_ctx.state.set(
                "rendered",
                serde_json::json!(smartspec_verifier::render::to_markdown(&report)),
            );
            Ok(())
        }
    });

    let write_ctx = ctx.clone();
    let write = step("write_report", move |step_ctx| {
        let ctx = write_ctx.clone();
        async move {
            let summary = step_ctx
                .state
                .get("summary")
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default();
            let rendered = step_ctx
                .state
                .get("rendered")
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default();
            step_ctx.write_scoped(&ctx.report_rel("verify_tasks", "summary.json"), &summary)?;
            step_ctx.write_scoped(&ctx.report_rel("verify_tasks", "report.md"), &rendered)?;
            Ok(())
        }
    });

    WorkflowPlan::linear("verify_tasks", vec![run, write])
}

/// Align checkbox claims with the latest verification. Idempotent: a second
/// run right after a successful one rewrites nothing.
fn sync_checkboxes_plan(ctx: WorkflowContext) -> WorkflowPlan {
    let verify_ctx = ctx.clone();
    let run = step("run_verifier", move |step_ctx| {
        let ctx = verify_ctx.clone();
        async move {
            let rel = ctx.bundle_rel("tasks.md");
            let report = ctx
                .verifier
                .verify(ctx.layout.root().as_std_path(), &rel)
                .map_err(SmartSpecError::from)?;
            let verdicts: Vec<(usize, bool)> = report
                .tasks
                .iter()
                .map(|t| (t.line, t.verdict == "pass"))
                .collect();
            step_ctx
                .state
                .set("verdicts", serde_json::to_value(&verdicts).unwrap_or_default());
            Ok(())
        }
    });

    let write_ctx = ctx.clone();
    let rewrite = step("rewrite_checkboxes", move |step_ctx| {
        let ctx = write_ctx.clone();
        async move {
            let rel = ctx.bundle_rel("tasks.md");
            let absolute = ctx.layout.root().join(&rel);
            let content = std::fs::read_to_string(&absolute)
                .map_err(|e| SmartSpecError::io(&rel, e))?;
            let verdicts: Vec<(usize, bool)> = step_ctx
                .state
                .get("verdicts")
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_default();

            let synced = sync_checkbox_lines(&content, &verdicts);
            if ctx.validate_only {
                step_ctx.write_scoped(
                    &ctx.report_rel("sync_tasks_checkboxes", "preview.md"),
                    &synced,
                )?;
            } else {
                let changed = write_if_changed(&step_ctx, &ctx.layout, &rel, &synced)?;
                step_ctx.state.set("changed", serde_json::json!(changed));
            }
            Ok(())
        }
    });

    WorkflowPlan::linear("sync_tasks_checkboxes", vec![run, rewrite])
        .with_bundle_key(ctx.spec_id.to_string())
}

/// Flip `- [ ]` / `- [x]` markers on the given 1-based lines.
fn sync_checkbox_lines(content: &str, verdicts: &[(usize, bool)]) -> String {
    let mut lines: Vec<String> = content.lines().map(String::from).collect();
    for (line_no, passed) in verdicts {
        let Some(line) = line_no.checked_sub(1).and_then(|i| lines.get_mut(i)) else {
            continue;
        };
        let replacement = if *passed { "[x]" } else { "[ ]" };
        for marker in ["[ ]", "[x]", "[X]"] {
            if let Some(pos) = line.find(marker) {
                line.replace_range(pos..pos + marker.len(), replacement);
                break;
            }
        }
    }
    let mut out = lines.join("\n");
    if content.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn load_verification(ctx: &WorkflowContext) -> Result<serde_json::Value, SmartSpecError> {
    let path = ctx
        .layout
        .report_dir("verify_tasks", &ctx.spec_id.to_string())
        .join("summary.json");
    let raw = std::fs::read_to_string(&path).map_err(|_| {
        SmartSpecError::validation(format!(
            "no verification report for {}; run verify_tasks first",
            ctx.spec_id
        ))
    })?;
    serde_json::from_str(&raw)
        .map_err(|e| SmartSpecError::internal(format!("corrupt verification summary: {e}")))
}

/// Failed tasks from a summary, ordered by priority then line.
fn remediation_tasks(summary: &serde_json::Value) -> Vec<serde_json::Value> {
    let mut failed: Vec<serde_json::Value> = summary
        .get("tasks")
        .and_then(|t| t.as_array())
        .map(|tasks| {
            tasks
                .iter()
                .filter(|t| t.get("priority").and_then(serde_json::Value::as_u64).unwrap_or(0) > 0)
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    failed.sort_by_key(|t| {
        (
            t.get("priority").and_then(serde_json::Value::as_u64).unwrap_or(9),
            t.get("line").and_then(serde_json::Value::as_u64).unwrap_or(0),
        )
    });
    failed
}

fn prompter_plan(ctx: WorkflowContext) -> WorkflowPlan {
    let load_ctx = ctx.clone();
    let load = step("load_verification", move |step_ctx| {
        let ctx = load_ctx.clone();
        async move {
            let summary = load_verification(&ctx)?;
            step_ctx.state.set("summary", summary);
            Ok(())
        }
    });

    let write_ctx = ctx.clone();
    let write = step("write_prompt_packs", move |step_ctx| {
        let ctx = write_ctx.clone();
        async move {
            let summary = step_ctx.state.get("summary").unwrap_or_default();
            let failed = remediation_tasks(&summary);

            // One pack per category, tasks already in remediation order.
            let mut packs: std::collections::BTreeMap<String, String> =
                std::collections::BTreeMap::new();
            for task in &failed {
                let category = task
                    .get("category")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("uncategorized")
                    .to_string();
                let entry = packs.entry(category.clone()).or_insert_with(|| {
                    format!("# Remediation pack: {category}\n\nSpec: {}\n\n", ctx.spec_id)
                });
                let id = task.get("id").and_then(serde_json::Value::as_str).unwrap_or("?");
                let title = task
                    .get("title")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("");
                let priority = task
                    .get("priority")
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(0);
                entry.push_str(&format!("## {id} (priority {priority})\n{title}\n"));
                if let Some(suggestions) =
                    task.get("suggestions").and_then(serde_json::Value::as_array)
                {
                    for suggestion in suggestions {
                        if let Some(s) = suggestion.as_str() {
                            entry.push_str(&format!("- {s}\n"));
                        }
                    }
                }
                entry.push('\n');
            }

            for (category, body) in &packs {
                step_ctx.write_scoped(&ctx.prompts_rel(&format!("{category}.md")), body)?;
            }
            step_ctx.write_scoped(
                &ctx.report_rel("report_implement_prompter", "summary.json"),
                &serde_json::json!({
                    "spec_id": ctx.spec_id.to_string(),
                    "packs": packs.keys().collect::<Vec<_>>(),
                    "failed_tasks": failed.len(),
                })
                .to_string(),
            )?;
            Ok(())
        }
    });

    WorkflowPlan::linear("report_implement_prompter", vec![load, write])
}

fn implement_tasks_plan(ctx: WorkflowContext) -> WorkflowPlan {
    let load_ctx = ctx.clone();
    let collect = step("collect_failures", move |step_ctx| {
        let ctx = load_ctx.clone();
        async move {
            let summary = load_verification(&ctx)?;
            let failed = remediation_tasks(&summary);
            step_ctx
                .state
                .set("failed", serde_json::Value::Array(failed));
            Ok(())
        }
    });

    let draft_ctx = ctx.clone();
    let propose = step("propose_changes", move |step_ctx| {
        let ctx = draft_ctx.clone();
        async move {
            let failed = step_ctx.state.get("failed").unwrap_or_default();
            let listing = serde_json::to_string_pretty(&failed).unwrap_or_default();
            let proposals = if ctx.validate_only {
                format!("# Implementation proposals (preview)\n\n```json\n{listing}\n```\n")
            } else {
                let completion = ctx
                    .gateway
                    .complete(CompletionRequest {
                        user_id: ctx.user_id,
                        task: TaskClass::CodeGeneration,
                        priority: BudgetPriority::Quality,
                        messages: vec![
                            Message::system(
                                "For each failing task below, propose the file changes that \
                                 would satisfy its evidence hooks. Output one section per task.",
                            ),
                            Message::user(listing),
                        ],
                        expected_output_tokens: None,
                    })
                    .await
                    .map_err(SmartSpecError::from)?;
                completion.content
            };
            step_ctx.state.set("proposals", serde_json::json!(proposals));
            Ok(())
        }
    });

    let write_ctx = ctx.clone();
    let write = step("write_proposals", move |step_ctx| {
        let ctx = write_ctx.clone();
        async move {
            let proposals = step_ctx
                .state
                .get("proposals")
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default();
            step_ctx.write_scoped(&ctx.prompts_rel("implementation.md"), &proposals)?;
            step_ctx.write_scoped(
                &ctx.report_rel("implement_tasks", "summary.json"),
                &serde_json::json!({
                    "spec_id": ctx.spec_id.to_string(),
                    "proposal_bytes": proposals.len(),
                })
                .to_string(),
            )?;
            Ok(())
        }
    });

    // A human signs off on the proposals before they are persisted.
    WorkflowPlan::linear("implement_tasks", vec![collect, propose, write])
        .with_interrupt_after("propose_changes")
}

fn docs_plan(ctx: WorkflowContext) -> WorkflowPlan {
    let collect_ctx = ctx.clone();
    let collect = step("collect_bundle", move |step_ctx| {
        let ctx = collect_ctx.clone();
        async move {
            let mut sections = Vec::new();
            for file in ["spec.md", "plan.md", "tasks.md"] {
                if let Some(content) = ctx.read_artifact(file) {
                    let hash = blake3::hash(content.as_bytes()).to_hex().to_string();
                    sections.push(serde_json::json!({
                        "file": file,
                        "blake3": hash,
                        "lines": content.lines().count(),
                    }));
                }
            }
            step_ctx
                .state
                .set("sections", serde_json::Value::Array(sections));
            Ok(())
        }
    });

    let write_ctx = ctx.clone();
    let write = step("write_docs", move |step_ctx| {
        let ctx = write_ctx.clone();
        async move {
            let sections = step_ctx.state.get("sections").unwrap_or_default();
            let mut doc = format!("# {} — bundle documentation\n\n", ctx.spec_id);
            if let Some(entries) = sections.as_array() {
                doc.push_str("| Artifact | blake3 | Lines |\n|---|---|---|\n");
                for entry in entries {
                    doc.push_str(&format!(
                        "| {} | `{}` | {} |\n",
                        entry["file"].as_str().unwrap_or("?"),
                        entry["blake3"].as_str().unwrap_or("?"),
                        entry["lines"]
                    ));
                }
            }
            step_ctx.write_scoped(&ctx.report_rel("generate_docs", "docs.md"), &doc)?;
            Ok(())
        }
    });

    WorkflowPlan::linear("generate_docs", vec![collect, write])
}

fn release_plan(ctx: WorkflowContext) -> WorkflowPlan {
    let collect_ctx = ctx.clone();
    let collect = step("collect_hashes", move |step_ctx| {
        let ctx = collect_ctx.clone();
        async move {
            let mut artifacts = serde_json::Map::new();
            for file in ["spec.md", "plan.md", "tasks.md"] {
                if let Some(content) = ctx.read_artifact(file) {
                    artifacts.insert(
                        file.to_string(),
                        serde_json::json!(blake3::hash(content.as_bytes()).to_hex().to_string()),
                    );
                }
            }
            step_ctx
                .state
                .set("artifacts", serde_json::Value::Object(artifacts));
            Ok(())
        }
    });

    let write_ctx = ctx.clone();
    let write = step("write_tag", move |step_ctx| {
        let ctx = write_ctx.clone();
        async move {
            let artifacts = step_ctx.state.get("artifacts").unwrap_or_default();
            let tag = serde_json::json!({
                "spec_id": ctx.spec_id.to_string(),
                "artifacts": artifacts,
            });
            let line = smartspec_utils::canonical::to_canonical_json_line(&tag)
                .map_err(|e| SmartSpecError::internal(e.to_string()))?;
            step_ctx.write_scoped(&ctx.report_rel("release_tagger", "release.json"), &line)?;
            Ok(())
        }
    });

    WorkflowPlan::linear("release_tagger", vec![collect, write])
}
