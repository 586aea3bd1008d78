//! Hook resolution against the repository filesystem.
//!
//! Resolution order per hook: containment check, path existence, symbol
//! lookup, content predicate. Individual hook failures never abort the run;
//! IO errors other than NotFound do (partial reports are never emitted).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

use smartspec_utils::paths::resolve_read;

use crate::error::VerifierError;
use crate::fuzzy::{SimilarFile, similar_files};
use crate::hooks::{ContentPredicate, EvidenceHook};

/// Definition keywords recognized by the language-agnostic symbol scan.
const DEFINITION_KEYWORDS: &[&str] = &[
    "fn", "def", "class", "struct", "enum", "trait", "impl", "const", "static", "let", "var",
    "function", "type", "interface", "module", "async",
];

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("identifier regex is valid"));

/// Outcome of resolving one hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum HookStatus {
    Passed,
    /// Containment violation: `..`, absolute path, or symlink escape.
    SecurityViolation { message: String },
    PathMissing,
    SymbolMissing,
    PredicateFailed,
    /// The regex predicate failed to compile.
    InvalidPredicate { message: String },
}

/// A hook plus its resolution outcome and any fuzzy suggestions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedHook {
    #[serde(flatten)]
    pub hook: EvidenceHook,
    #[serde(flatten)]
    pub status: HookStatus,
    /// Similar files when the path was missing. Suggestions only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<SimilarFile>,
}

impl ResolvedHook {
    /// Whether the hook fully resolved: path, symbol, and predicate.
    #[must_use]
    pub fn passed(&self) -> bool {
        matches!(self.status, HookStatus::Passed)
    }

    /// Path missing with no similar file above the threshold.
    #[must_use]
    pub fn hard_missing(&self) -> bool {
        matches!(self.status, HookStatus::PathMissing) && self.suggestions.is_empty()
    }
}

/// Resolve one hook against the repository.
///
/// # Errors
/// [`VerifierError::Io`] on filesystem failures other than NotFound; the
/// caller aborts the entire run.
pub fn resolve_hook(
    repo_root: &Path,
    hook: &EvidenceHook,
    fuzzy_threshold: f64,
    max_suggestions: usize,
) -> Result<ResolvedHook, VerifierError> {
    let resolved = |status, suggestions| ResolvedHook {
        hook: hook.clone(),
        status,
        suggestions,
    };

    let abs = match resolve_read(repo_root, &hook.path) {
        Ok(p) => p,
        Err(violation) => {
            return Ok(resolved(
                HookStatus::SecurityViolation {
                    message: format!("evidence path rejected: {violation}"),
                },
                Vec::new(),
            ));
        }
    };

    let content = match std::fs::read_to_string(&abs) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let suggestions =
                similar_files(repo_root, &hook.path, fuzzy_threshold, max_suggestions)
                    .map_err(|e| VerifierError::io(&hook.path, e))?;
            return Ok(resolved(HookStatus::PathMissing, suggestions));
        }
        // Binary files still count as existing; symbol/content checks
        // operate on a lossy view.
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            let bytes = std::fs::read(&abs).map_err(|e| VerifierError::io(&hook.path, e))?;
            String::from_utf8_lossy(&bytes).into_owned()
        }
        Err(e) => return Err(VerifierError::io(&hook.path, e)),
    };

    if let Some(symbol) = &hook.symbol {
        if !contains_definition(&content, symbol) {
            return Ok(resolved(HookStatus::SymbolMissing, Vec::new()));
        }
    }

    if let Some(predicate) = &hook.predicate {
        match predicate {
            ContentPredicate::Contains(literal) => {
                if !content.contains(literal.as_str()) {
                    return Ok(resolved(HookStatus::PredicateFailed, Vec::new()));
                }
            }
            ContentPredicate::Regex(pattern) => {
                let anchored = format!("^(?:{pattern})$");
                let re = match Regex::new(&anchored) {
                    Ok(re) => re,
                    Err(e) => {
                        return Ok(resolved(
                            HookStatus::InvalidPredicate {
                                message: format!("invalid regex /{pattern}/: {e}"),
                            },
                            Vec::new(),
                        ));
                    }
                };
                if !content.lines().any(|line| re.is_match(line)) {
                    return Ok(resolved(HookStatus::PredicateFailed, Vec::new()));
                }
            }
        }
    }

    Ok(resolved(HookStatus::Passed, Vec::new()))
}

/// Language-agnostic definition scan.
///
/// A line defines `symbol` when the symbol appears as an identifier token
/// either immediately after a definition keyword, or as the line's first
/// identifier followed by `(`, `=`, `:` or `{`. The scan is heuristic; the
/// report says so wherever a symbol verdict is surfaced.
#[must_use]
pub fn contains_definition(content: &str, symbol: &str) -> bool {
    for line in content.lines() {
        let mut prev: Option<&str> = None;
        for m in IDENTIFIER_RE.find_iter(line) {
            if m.as_str() == symbol {
                if prev.is_some_and(|kw| DEFINITION_KEYWORDS.contains(&kw)) {
                    return true;
                }
                let after = line[m.end()..].trim_start();
                let first_identifier = IDENTIFIER_RE
                    .find(line)
                    .is_some_and(|first| first.start() == m.start());
                if first_identifier
                    && (after.starts_with('(')
                        || after.starts_with('=')
                        || after.starts_with(':')
                        || after.starts_with('{'))
                {
                    return true;
                }
            }
            prev = Some(m.as_str());
        }
    }
    false
}
