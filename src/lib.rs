//! smartspec: specification-driven development automation.
//!
//! The pipeline SPEC → PLAN → TASKS → IMPLEMENT → VERIFY → SYNC runs as
//! governed workflows over `specs/<category>/<spec-id>/` bundles. Four
//! subsystems carry the weight:
//!
//! - [`smartspec_verifier`]: proves task claims against the repository
//! - [`smartspec_registry`]: workflow discovery, recommendation, routing
//! - [`smartspec_engine`]: checkpointed execution with streaming and HITL
//! - [`smartspec_gateway`]: credit-gated, provider-routed LLM access
//!
//! This crate composes them behind [`orchestrator::Orchestrator`] and the
//! CLI.

pub mod cli;
pub mod orchestrator;
pub mod workflows;

pub use orchestrator::{AskOutcome, AskResult, Orchestrator};
pub use smartspec_utils::{ExitCode, SmartSpecError, SpecId};
