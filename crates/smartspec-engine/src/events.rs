//! Typed engine events.
//!
//! Events for one execution are strictly ordered by `sequence` and the
//! stream ends at the first terminal event. Serialized records are JSON
//! Lines friendly: one flat object per event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Event payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EngineEventKind {
    WorkflowStarted { workflow: String, total_steps: usize },
    StepStarted { step: String },
    StepProgress { step: String, fraction: f64 },
    StepCompleted { step: String },
    StepFailed { step: String, error: String },
    WorkflowPaused { reason: String, interrupt_id: Uuid },
    WorkflowResumed,
    WorkflowCompleted,
    WorkflowCancelled,
    WorkflowFailed { error: String },
}

impl EngineEventKind {
    /// Terminal events close the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::WorkflowCompleted | Self::WorkflowCancelled | Self::WorkflowFailed { .. }
        )
    }
}

/// One event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub execution_id: Uuid,
    /// Monotonic per execution, starting at 0.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EngineEventKind,
}

impl EngineEvent {
    /// One JSON line, for `events.jsonl`.
    ///
    /// # Errors
    /// Serialization failure only.
    pub fn to_json_line(&self) -> anyhow::Result<String> {
        smartspec_utils::canonical::to_canonical_json_line(self)
    }
}

/// Sequenced event emitter for one execution. Cheap to clone.
#[derive(Clone)]
pub struct EventEmitter {
    execution_id: Uuid,
    sequence: Arc<AtomicU64>,
    sender: mpsc::UnboundedSender<EngineEvent>,
    /// JSONL sink under `.spec/reports/`; events are appended as emitted.
    sink: Option<Arc<std::sync::Mutex<std::fs::File>>>,
}

impl EventEmitter {
    #[must_use]
    pub fn new(execution_id: Uuid) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                execution_id,
                sequence: Arc::new(AtomicU64::new(0)),
                sender,
                sink: None,
            },
            receiver,
        )
    }

    /// Attach a JSONL log file.
    #[must_use]
    pub fn with_sink(mut self, file: std::fs::File) -> Self {
        self.sink = Some(Arc::new(std::sync::Mutex::new(file)));
        self
    }

    /// Emit one event. Send failures mean the consumer is gone, which is
    /// fine: the engine never blocks on a slow or absent consumer. Sink
    /// write failures are logged, not fatal.
    pub fn emit(&self, kind: EngineEventKind) -> EngineEvent {
        let event = EngineEvent {
            execution_id: self.execution_id,
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            timestamp: Utc::now(),
            kind,
        };
        if let Some(sink) = &self.sink {
            if let Ok(line) = event.to_json_line() {
                use std::io::Write;
                let mut file = sink.lock().unwrap_or_else(|e| e.into_inner());
                if let Err(e) = file.write_all(line.as_bytes()) {
                    tracing::warn!(error = %e, "event log write failed");
                }
            }
        }
        let _ = self.sender.send(event.clone());
        event
    }
}

/// Step-scoped progress reporting handed to step bodies.
#[derive(Clone)]
pub struct ProgressHandle {
    emitter: EventEmitter,
    step: String,
}

impl ProgressHandle {
    #[must_use]
    pub fn new(emitter: EventEmitter, step: impl Into<String>) -> Self {
        Self {
            emitter,
            step: step.into(),
        }
    }

    /// Report fractional progress in [0, 1].
    pub fn report(&self, fraction: f64) {
        self.emitter.emit(EngineEventKind::StepProgress {
            step: self.step.clone(),
            fraction: fraction.clamp(0.0, 1.0),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_are_monotonic_from_zero() {
        let (emitter, mut rx) = EventEmitter::new(Uuid::new_v4());
        emitter.emit(EngineEventKind::WorkflowStarted {
            workflow: "verify_tasks".into(),
            total_steps: 2,
        });
        emitter.emit(EngineEventKind::StepStarted { step: "load".into() });
        emitter.emit(EngineEventKind::WorkflowCompleted);

        let mut sequences = Vec::new();
        while let Ok(event) = rx.try_recv() {
            sequences.push(event.sequence);
        }
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[test]
    fn terminal_detection() {
        assert!(EngineEventKind::WorkflowCompleted.is_terminal());
        assert!(EngineEventKind::WorkflowCancelled.is_terminal());
        assert!(
            EngineEventKind::WorkflowFailed {
                error: "x".into()
            }
            .is_terminal()
        );
        assert!(!EngineEventKind::StepCompleted { step: "s".into() }.is_terminal());
    }

    #[test]
    fn events_serialize_as_flat_tagged_records() {
        let (emitter, _rx) = EventEmitter::new(Uuid::new_v4());
        let event = emitter.emit(EngineEventKind::StepFailed {
            step: "call_llm".into(),
            error: "timeout".into(),
        });
        let line = event.to_json_line().unwrap();
        assert!(line.contains(r#""event_type":"step_failed""#));
        assert!(line.contains(r#""sequence":0"#));
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn progress_is_clamped() {
        let (emitter, mut rx) = EventEmitter::new(Uuid::new_v4());
        let progress = ProgressHandle::new(emitter, "pack");
        progress.report(1.7);
        let event = rx.try_recv().unwrap();
        match event.kind {
            EngineEventKind::StepProgress { fraction, .. } => assert_eq!(fraction, 1.0),
            other => panic!("unexpected {other:?}"),
        }
    }
}
