//! Repository layout and path containment for smartspec.
//!
//! Two concerns live here:
//!
//! - [`RepoLayout`]: where governed artifacts (`specs/**`) and runtime files
//!   (`.spec/**`) live relative to the repository root.
//! - [`WriteScope`] / [`resolve_read`]: containment checks. The engine runs
//!   every file open through [`WriteScope::check`]; the verifier resolves
//!   evidence paths through [`resolve_read`]. Both reject `..` segments and
//!   absolute paths outright, and resolve symlinks before the root check so
//!   a link cannot smuggle a path outside the repository.

use camino::{Utf8Path, Utf8PathBuf};
use std::path::{Component, Path, PathBuf};

use crate::error::ScopeViolation;

/// Directory name for governed artifacts.
pub const SPECS_DIR: &str = "specs";

/// Directory name for the runtime tree (reports, prompts, scripts, db, locks).
pub const RUNTIME_DIR: &str = ".spec";

/// Locations of governed and runtime trees under one repository root.
#[derive(Debug, Clone)]
pub struct RepoLayout {
    root: Utf8PathBuf,
}

impl RepoLayout {
    /// Create a layout rooted at `root`. The directories need not exist yet;
    /// [`ensure_runtime_tree`](Self::ensure_runtime_tree) creates them.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    #[must_use]
    pub fn specs_dir(&self) -> Utf8PathBuf {
        self.root.join(SPECS_DIR)
    }

    #[must_use]
    pub fn runtime_dir(&self) -> Utf8PathBuf {
        self.root.join(RUNTIME_DIR)
    }

    /// `specs/<category>/<spec-id>/` for a parsed spec id.
    #[must_use]
    pub fn bundle_dir(&self, category: &str, spec_id: &str) -> Utf8PathBuf {
        self.specs_dir().join(category).join(spec_id)
    }

    /// `.spec/reports/<workflow>/<run-id>/`
    #[must_use]
    pub fn report_dir(&self, workflow: &str, run_id: &str) -> Utf8PathBuf {
        self.runtime_dir()
            .join("reports")
            .join(workflow)
            .join(run_id)
    }

    /// `.spec/prompts/<run-id>/`
    #[must_use]
    pub fn prompts_dir(&self, run_id: &str) -> Utf8PathBuf {
        self.runtime_dir().join("prompts").join(run_id)
    }

    /// Directory of on-disk workflow descriptors (`.spec/workflows/`).
    #[must_use]
    pub fn workflows_dir(&self) -> Utf8PathBuf {
        self.runtime_dir().join("workflows")
    }

    /// Default sqlite database path.
    #[must_use]
    pub fn database_path(&self) -> Utf8PathBuf {
        self.runtime_dir().join("smartspec.db")
    }

    /// Create the runtime tree (`.spec/` and its subdirectories) and the
    /// governed root if missing.
    ///
    /// # Errors
    /// Returns the underlying IO error with the failing path.
    pub fn ensure_runtime_tree(&self) -> std::io::Result<()> {
        for dir in [
            self.specs_dir(),
            self.runtime_dir(),
            self.runtime_dir().join("reports"),
            self.runtime_dir().join("prompts"),
            self.runtime_dir().join("scripts"),
            self.workflows_dir(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

/// Write containment: the engine may only write under `specs/` or `.spec/`.
pub struct WriteScope;

impl WriteScope {
    /// Check that `relative` is a writable path under `root`.
    ///
    /// Rules, in order:
    /// 1. absolute paths rejected
    /// 2. any `..` component rejected
    /// 3. the path must start with `specs/` or `.spec/`
    /// 4. after joining and resolving existing symlinked ancestors, the
    ///    result must remain under `root`
    ///
    /// Returns the absolute target path on success.
    ///
    /// # Errors
    /// A [`ScopeViolation`] naming the failed rule.
    pub fn check(root: &Utf8Path, relative: &str) -> Result<Utf8PathBuf, ScopeViolation> {
        let rel = Path::new(relative);
        if rel.is_absolute() {
            return Err(ScopeViolation::AbsolutePath {
                path: relative.to_string(),
            });
        }
        if has_parent_component(rel) {
            return Err(ScopeViolation::ParentTraversal {
                path: relative.to_string(),
            });
        }
        let first = rel.components().next().and_then(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        });
        if !matches!(first, Some(SPECS_DIR) | Some(RUNTIME_DIR)) {
            return Err(ScopeViolation::OutsideWritablePrefix {
                path: relative.to_string(),
            });
        }
        let joined = root.as_std_path().join(rel);
        ensure_within_root(root.as_std_path(), &joined).map_err(|()| {
            ScopeViolation::EscapesRoot {
                path: relative.to_string(),
            }
        })?;
        Utf8PathBuf::from_path_buf(joined).map_err(|p| ScopeViolation::EscapesRoot {
            path: p.display().to_string(),
        })
    }
}

/// Resolve an evidence path for reading, relative to the repository root.
///
/// Same containment rules as [`WriteScope::check`] minus the writable-prefix
/// restriction: evidence may point anywhere inside the repository.
///
/// # Errors
/// A [`ScopeViolation`] for `..` segments, absolute paths, or symlinks that
/// resolve outside the root.
pub fn resolve_read(root: &Path, relative: &str) -> Result<PathBuf, ScopeViolation> {
    let rel = Path::new(relative);
    if rel.is_absolute() {
        return Err(ScopeViolation::AbsolutePath {
            path: relative.to_string(),
        });
    }
    if has_parent_component(rel) {
        return Err(ScopeViolation::ParentTraversal {
            path: relative.to_string(),
        });
    }
    let joined = root.join(rel);
    ensure_within_root(root, &joined).map_err(|()| ScopeViolation::EscapesRoot {
        path: relative.to_string(),
    })?;
    Ok(joined)
}

fn has_parent_component(path: &Path) -> bool {
    path.components()
        .any(|c| matches!(c, Component::ParentDir))
}

/// Resolve symlinks on the longest existing prefix of `candidate` and verify
/// the result stays under the canonicalized `root`.
///
/// Non-existent tails are allowed (a write target may not exist yet); only
/// the existing ancestry can carry symlinks.
fn ensure_within_root(root: &Path, candidate: &Path) -> Result<(), ()> {
    let canonical_root = root.canonicalize().map_err(|_| ())?;

    let mut existing = candidate.to_path_buf();
    let mut tail = PathBuf::new();
    while !existing.exists() {
        let Some(name) = existing.file_name().map(std::ffi::OsStr::to_os_string) else {
            return Err(());
        };
        tail = Path::new(&name).join(&tail);
        if !existing.pop() {
            return Err(());
        }
    }
    let resolved = existing.canonicalize().map_err(|_| ())?.join(&tail);
    if resolved.starts_with(&canonical_root) {
        Ok(())
    } else {
        Err(())
    }
}
