//! Task extraction from a `tasks.md` document.
//!
//! A task is either a checkbox list item (`- [ ]` / `- [x]`, the claim bit)
//! or a level-2/3 heading that has evidence hooks under it. Hooks attach to
//! the enclosing list item when one is open, otherwise to the nearest
//! preceding heading. Blank lines do not close a list item; the next list
//! item or heading does.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::hooks::{EvidenceHook, HookLine, HookParseError, parse_hook_line};

static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(##|###)\s+(.+?)\s*$").expect("heading regex is valid"));

static CHECKBOX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[-*]\s+\[( |x|X)\]\s+(.+?)\s*$").expect("checkbox regex is valid")
});

static PLAIN_ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[-*]\s+(.+?)\s*$").expect("list item regex is valid"));

static TASK_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z][A-Z0-9]*-\d+)\b").expect("task token regex is valid"));

/// One task extracted from the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Stable identifier: leading `TASK-001`-style token when present,
    /// otherwise a slug of the title, suffixed with the line on collision.
    pub id: String,
    pub title: String,
    /// Claim bit from the checkbox; heading tasks are unclaimed.
    pub claimed: bool,
    /// 1-based line the task starts on.
    pub line: usize,
    pub hooks: Vec<EvidenceHook>,
    /// Hook lines under this task that violated the grammar.
    pub parse_errors: Vec<HookParseError>,
}

impl Task {
    fn new(title: &str, claimed: bool, line: usize) -> Self {
        Self {
            id: String::new(),
            title: title.to_string(),
            claimed,
            line,
            hooks: Vec::new(),
            parse_errors: Vec::new(),
        }
    }
}

/// Parse a document into its tasks, in document order.
///
/// Checkbox items always become tasks (a claimed task with no hooks is
/// still meaningful to the classifier). Headings and plain bullets only
/// become tasks once a hook attaches to them.
#[must_use]
pub fn parse_tasks(content: &str) -> Vec<Task> {
    // Candidate contexts; `materialized` marks the ones that become tasks.
    struct Candidate {
        task: Task,
        materialized: bool,
    }

    let mut candidates: Vec<Candidate> = Vec::new();
    // Index of the open list item, and of the current heading, in `candidates`.
    let mut current_item: Option<usize> = None;
    let mut current_heading: Option<usize> = None;

    for (idx, text) in content.lines().enumerate() {
        let line = idx + 1;

        if let Some(caps) = HEADING_RE.captures(text) {
            candidates.push(Candidate {
                task: Task::new(&caps[2], false, line),
                materialized: false,
            });
            current_heading = Some(candidates.len() - 1);
            current_item = None;
            continue;
        }

        if let Some(caps) = CHECKBOX_RE.captures(text) {
            let claimed = !caps[1].trim().is_empty();
            candidates.push(Candidate {
                task: Task::new(&caps[2], claimed, line),
                materialized: true,
            });
            current_item = Some(candidates.len() - 1);
            continue;
        }

        match parse_hook_line(text, line) {
            HookLine::NotAHook => {
                // A plain bullet opens an (unmaterialized) item context.
                if let Some(caps) = PLAIN_ITEM_RE.captures(text) {
                    candidates.push(Candidate {
                        task: Task::new(&caps[1], false, line),
                        materialized: false,
                    });
                    current_item = Some(candidates.len() - 1);
                }
            }
            HookLine::Hook(hook) => {
                if let Some(i) = current_item.or(current_heading) {
                    candidates[i].task.hooks.push(hook);
                    candidates[i].materialized = true;
                }
                // A hook before any heading or item has no task to bind to
                // and is dropped; the line numbers of kept hooks are all
                // reported, so the omission is visible in the report.
            }
            HookLine::Invalid(err) => {
                if let Some(i) = current_item.or(current_heading) {
                    candidates[i].task.parse_errors.push(err);
                    candidates[i].materialized = true;
                }
            }
        }
    }

    let mut tasks: Vec<Task> = candidates
        .into_iter()
        .filter(|c| c.materialized)
        .map(|c| c.task)
        .collect();
    assign_ids(&mut tasks);
    tasks
}

fn assign_ids(tasks: &mut [Task]) {
    let mut seen = std::collections::HashSet::new();
    for task in tasks.iter_mut() {
        let base = TASK_TOKEN_RE
            .captures(&task.title)
            .map(|caps| caps[1].to_string())
            .unwrap_or_else(|| slugify(&task.title));
        let id = if seen.contains(&base) {
            format!("{}-L{}", base, task.line)
        } else {
            base
        };
        seen.insert(id.clone());
        task.id = id;
    }
}

fn slugify(title: &str) -> String {
    let slug: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let trimmed: Vec<&str> = slug.split('-').filter(|s| !s.is_empty()).collect();
    let joined = trimmed.join("-");
    if joined.is_empty() {
        "task".to_string()
    } else {
        joined.chars().take(48).collect()
    }
}
