//! CLI argument definitions.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

/// smartspec - specification-driven development automation
#[derive(Parser)]
#[command(name = "smartspec")]
#[command(about = "Drive the SPEC → PLAN → TASKS → IMPLEMENT → VERIFY → SYNC pipeline")]
#[command(long_about = r#"
smartspec turns a feature prompt into governed Markdown artifacts under
specs/<category>/<spec-id>/ and proves claimed work against the repository
with evidence hooks.

EXAMPLES:
  # Scaffold the runtime tree and a starter config
  smartspec init

  # See what to do next for a spec
  smartspec recommend spec-core-001-auth

  # Generate the spec document (writes governed artifacts, calls a provider)
  smartspec run generate_spec --spec spec-core-001-auth --apply --allow-network \
      --prompt "JWT-based authentication for the public API"

  # Prove the tasks document against the repository
  smartspec run verify_tasks --spec spec-core-001-auth

  # Follow a running execution
  smartspec events <execution-id>

  # Answer a paused workflow
  smartspec respond <interrupt-id> approve

  # Credits
  smartspec credits balance
  smartspec credits topup 100

CONFIGURATION:
  .spec/config.toml is discovered by searching upward from the working
  directory; --config overrides discovery. CLI flags beat config values.
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Universal workflow flags shared by run/resume.
#[derive(Args, Debug, Clone, Default)]
pub struct UniversalFlagArgs {
    /// Enable writes to governed artifacts (specs/**)
    #[arg(long)]
    pub apply: bool,

    /// Enable outbound network access (LLM providers)
    #[arg(long = "allow-network")]
    pub allow_network: bool,

    /// Compute-only: produce a report, write nothing governed
    #[arg(long = "validate-only")]
    pub validate_only: bool,

    /// Report output directory under .spec/reports/
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,

    /// Suppress progress output
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Scaffold the .spec/ runtime tree and a starter config
    Init,

    /// Execute a workflow and stream its events
    Run {
        /// Workflow name (see `smartspec workflows`)
        workflow: String,

        /// Spec identifier (spec-<category>-<nnn>-<slug>)
        #[arg(long)]
        spec: String,

        /// Feature prompt for generate_spec
        #[arg(long)]
        prompt: Option<String>,

        /// Return the execution id immediately instead of following events
        #[arg(long)]
        detach: bool,

        #[command(flatten)]
        flags: UniversalFlagArgs,
    },

    /// Recommend the next workflow for a spec
    Recommend {
        spec: String,

        /// A feature prompt is available (affects the empty-bundle row)
        #[arg(long)]
        prompt: bool,

        #[arg(long)]
        json: bool,
    },

    /// Verify a spec's tasks.md against the repository
    Verify {
        spec: String,

        #[arg(long)]
        json: bool,
    },

    /// Show one execution's status
    Status {
        execution_id: Uuid,

        #[arg(long)]
        json: bool,
    },

    /// Stream an execution's events as JSON lines
    Events { execution_id: Uuid },

    /// Cancel an execution (cooperative)
    Cancel { execution_id: Uuid },

    /// Resume from a checkpoint
    Resume {
        checkpoint_id: Uuid,

        #[command(flatten)]
        flags: UniversalFlagArgs,
    },

    /// Answer a paused workflow's interrupt
    Respond {
        interrupt_id: Uuid,

        /// approve, reject, or modify
        action: String,

        /// JSON payload for modify
        #[arg(long)]
        payload: Option<String>,
    },

    /// Ask in natural language; routed to status/recommendation/existence
    Ask {
        /// The question
        input: Vec<String>,
    },

    /// List registered workflows
    Workflows {
        #[arg(long)]
        json: bool,
    },

    /// Credit accounting for the local operator account
    Credits {
        #[command(subcommand)]
        command: CreditsCommand,
    },

    /// Enable or disable a provider at runtime
    Provider {
        name: String,

        #[arg(long, conflicts_with = "disable")]
        enable: bool,

        #[arg(long)]
        disable: bool,
    },
}

#[derive(Subcommand)]
pub enum CreditsCommand {
    /// Show the current balance
    Balance,
    /// Top up: pay <usd>, receive floor(usd * 1000 / (1 + markup)) credits
    Topup { usd: f64 },
    /// Show the transaction ledger
    History {
        #[arg(long)]
        json: bool,
    },
}

impl UniversalFlagArgs {
    /// Names in the wire format `parse_flags` expects.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if self.apply {
            names.push("apply".to_string());
        }
        if self.allow_network {
            names.push("allow-network".to_string());
        }
        if self.validate_only {
            names.push("validate-only".to_string());
        }
        if self.out.is_some() {
            names.push("out".to_string());
        }
        if self.json {
            names.push("json".to_string());
        }
        if self.quiet {
            names.push("quiet".to_string());
        }
        names
    }
}
