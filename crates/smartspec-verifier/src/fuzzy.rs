//! Fuzzy path suggestions for missing evidence files.
//!
//! When a hook's path does not exist but its parent directory does, every
//! sibling file is scored with normalized Levenshtein similarity against the
//! missing file name. Matches at or above the threshold are suggestions
//! only; the hook still fails.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

/// A candidate file similar to a missing evidence path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarFile {
    /// Repository-relative path of the candidate.
    pub path: String,
    /// Similarity in [0, 1], rounded to two decimals for stable output.
    pub score: f64,
}

/// Score sibling files of `relative` (which does not exist) under `repo_root`.
///
/// Returns at most `max_suggestions` entries, highest score first, ties
/// broken lexicographically by path so output is deterministic.
///
/// # Errors
/// IO failures other than a missing parent directory. A missing parent
/// yields an empty list.
pub fn similar_files(
    repo_root: &Path,
    relative: &str,
    threshold: f64,
    max_suggestions: usize,
) -> io::Result<Vec<SimilarFile>> {
    let rel = Path::new(relative);
    let Some(file_name) = rel.file_name().and_then(|n| n.to_str()) else {
        return Ok(Vec::new());
    };
    let parent_rel = rel.parent().unwrap_or_else(|| Path::new(""));
    let parent_abs = repo_root.join(parent_rel);

    let entries = match std::fs::read_dir(&parent_abs) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut matches: Vec<SimilarFile> = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(candidate) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let score = strsim::normalized_levenshtein(file_name, &candidate);
        if score >= threshold {
            let path = parent_rel.join(&candidate);
            matches.push(SimilarFile {
                path: path.to_string_lossy().replace('\\', "/"),
                score: (score * 100.0).round() / 100.0,
            });
        }
    }

    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
    });
    matches.truncate(max_suggestions);
    Ok(matches)
}
