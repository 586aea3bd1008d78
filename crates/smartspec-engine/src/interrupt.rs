//! Human-in-the-loop interrupt registry.
//!
//! A paused execution parks on a oneshot; an external actor answers by
//! interrupt id. Unanswered interrupts time out in the executor, which then
//! removes the entry.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::EngineError;

/// The three possible answers to an interrupt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum InterruptResponse {
    /// Continue the execution.
    Approve,
    /// Fail the execution.
    Reject,
    /// Merge the payload into workflow state, then continue.
    Modify { payload: Value },
}

/// Registry of open interrupts.
#[derive(Default)]
pub struct InterruptRegistry {
    pending: Mutex<HashMap<Uuid, oneshot::Sender<InterruptResponse>>>,
}

impl InterruptRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new interrupt, returning its id and the receiving end
    /// the executor parks on.
    #[must_use]
    pub fn register(&self) -> (Uuid, oneshot::Receiver<InterruptResponse>) {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, tx);
        (id, rx)
    }

    /// Deliver a response to an open interrupt.
    ///
    /// # Errors
    /// [`EngineError::UnknownInterrupt`] when the id is not open (never
    /// existed, already answered, or timed out).
    pub fn respond(&self, interrupt_id: Uuid, response: InterruptResponse) -> Result<(), EngineError> {
        let sender = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&interrupt_id)
            .ok_or(EngineError::UnknownInterrupt { interrupt_id })?;
        // A dropped receiver means the executor already gave up (timeout or
        // cancel); report the interrupt as unknown.
        sender
            .send(response)
            .map_err(|_| EngineError::UnknownInterrupt { interrupt_id })
    }

    /// Drop an interrupt the executor stopped waiting on.
    pub fn forget(&self, interrupt_id: Uuid) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&interrupt_id);
    }
}
