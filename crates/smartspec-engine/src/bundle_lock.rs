//! Per-spec bundle mutex.
//!
//! Writes to governed artifacts are serialized per spec id. Acquisition
//! never waits: a held mutex surfaces as `bundle_busy` so the caller can
//! decide to retry, matching one-writer-at-a-time semantics without
//! queueing invisible work.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::EngineError;

/// Registry of per-spec mutexes.
#[derive(Default)]
pub struct BundleLockRegistry {
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Guard releasing the bundle on drop.
pub struct BundleGuard {
    _guard: OwnedMutexGuard<()>,
}

impl BundleLockRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take the writer slot for `spec_id`.
    ///
    /// # Errors
    /// [`EngineError::BundleBusy`] when another writer holds it.
    pub fn try_acquire(&self, spec_id: &str) -> Result<BundleGuard, EngineError> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(
                locks
                    .entry(spec_id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        match lock.try_lock_owned() {
            Ok(guard) => Ok(BundleGuard { _guard: guard }),
            Err(_) => Err(EngineError::BundleBusy {
                spec_id: spec_id.to_string(),
            }),
        }
    }
}
