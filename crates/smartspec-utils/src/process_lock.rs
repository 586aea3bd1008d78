//! Advisory process lock for the runtime tree.
//!
//! One smartspec process owns `.spec/` at a time. The lock file records the
//! owning pid for diagnostics; the advisory lock itself is what coordinates
//! processes. Held for the life of the process, so the backing allocation
//! is intentionally leaked.

use camino::Utf8Path;
use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::io::Write;

use crate::error::SmartSpecError;

/// Exclusive advisory lock on the runtime tree.
pub struct ProcessLock {
    _guard: RwLockWriteGuard<'static, File>,
}

impl ProcessLock {
    /// Acquire the lock, writing the owning pid into the lock file.
    ///
    /// # Errors
    /// `validation_error` when another process holds the lock; IO errors
    /// from creating the lock file.
    pub fn acquire(path: &Utf8Path) -> Result<Self, SmartSpecError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SmartSpecError::io(parent.as_str(), e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| SmartSpecError::io(path.as_str(), e))?;

        let lock: &'static mut RwLock<File> = Box::leak(Box::new(RwLock::new(file)));
        let mut guard = lock.try_write().map_err(|_| {
            SmartSpecError::validation(format!(
                "another smartspec process holds the runtime lock at {path}"
            ))
        })?;
        let _ = writeln!(&mut *guard, "{}", std::process::id());
        Ok(Self { _guard: guard })
    }
}
