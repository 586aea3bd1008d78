//! Command dispatch: each subcommand maps to one orchestrator operation.

use anyhow::Result;
use serde::Serialize;
use tokio_stream::StreamExt;

use smartspec_engine::InterruptResponse;
use smartspec_registry::parse_flags;
use smartspec_store::ExecutionStatus;
use smartspec_utils::ExitCode;
use smartspec_utils::SmartSpecError;
use smartspec_verifier::render;

use crate::orchestrator::Orchestrator;

use super::args::{Command, CreditsCommand, UniversalFlagArgs};

/// Run one parsed command against a bootstrapped orchestrator. Returns the
/// process exit code.
pub async fn dispatch(orchestrator: &Orchestrator, command: Command) -> Result<ExitCode> {
    let result = match command {
        Command::Init => {
            // Bootstrap already created the tree; write a starter config if
            // none exists.
            let config_path = orchestrator.layout().runtime_dir().join("config.toml");
            if config_path.exists() {
                println!("already initialized: {config_path}");
            } else {
                smartspec_utils::atomic_write::write_file_atomic(
                    &config_path,
                    STARTER_CONFIG,
                )
                .map_err(|e| {
                    SmartSpecError::io(config_path.as_str(), std::io::Error::other(e.to_string()))
                })?;
                println!("wrote {config_path}");
            }
            Ok(())
        }

        Command::Run {
            workflow,
            spec,
            prompt,
            detach,
            flags,
        } => run_workflow(orchestrator, &workflow, &spec, prompt, detach, &flags).await,

        Command::Recommend { spec, prompt, json } => {
            let recommendation = orchestrator.recommend(&spec, prompt)?;
            if json {
                println!("{}", to_pretty(&recommendation)?);
            } else {
                println!("next: {}", recommendation.workflow);
                println!("  why: {}", recommendation.rationale);
                println!("  est: ~{}s", recommendation.estimated_duration_secs);
                for warning in &recommendation.warnings {
                    println!("  warning: {warning}");
                }
            }
            Ok(())
        }

        Command::Verify { spec, json } => {
            let report = orchestrator.verify(&spec)?;
            if json {
                println!("{}", report.to_canonical_json().map_err(internal)?);
            } else {
                print!("{}", render::to_markdown(&report));
            }
            if report.totals.total == report.totals.verified {
                Ok(())
            } else {
                Err(SmartSpecError::validation(format!(
                    "{} of {} task(s) failed verification",
                    report.totals.total - report.totals.verified,
                    report.totals.total
                )))
            }
        }

        Command::Status { execution_id, json } => {
            let snapshot = orchestrator.status(execution_id).await?;
            if json {
                println!("{}", to_pretty(&snapshot)?);
            } else {
                println!(
                    "{} {} [{}/{}] {:.0}% {}",
                    snapshot.id,
                    snapshot.workflow,
                    snapshot.current_step,
                    snapshot.total_steps,
                    snapshot.progress * 100.0,
                    snapshot.status,
                );
            }
            Ok(())
        }

        Command::Events { execution_id } => {
            let mut stream = orchestrator.events(execution_id)?;
            while let Some(event) = stream.next().await {
                print!("{}", event.to_json_line().map_err(internal)?);
            }
            Ok(())
        }

        Command::Cancel { execution_id } => orchestrator.cancel(execution_id).await,

        Command::Resume {
            checkpoint_id,
            flags,
        } => {
            let parsed = parse_flags(&flags.names())?;
            let id = orchestrator.resume(checkpoint_id, &parsed).await?;
            println!("{id}");
            Ok(())
        }

        Command::Respond {
            interrupt_id,
            action,
            payload,
        } => {
            let response = match action.as_str() {
                "approve" => InterruptResponse::Approve,
                "reject" => InterruptResponse::Reject,
                "modify" => {
                    let raw = payload.ok_or_else(|| {
                        SmartSpecError::validation("modify requires --payload <json>")
                    })?;
                    let payload = serde_json::from_str(&raw).map_err(|e| {
                        SmartSpecError::validation(format!("invalid --payload JSON: {e}"))
                    })?;
                    InterruptResponse::Modify { payload }
                }
                other => {
                    return Ok(print_error(SmartSpecError::validation(format!(
                        "unknown action '{other}' (expected approve|reject|modify)"
                    ))));
                }
            };
            orchestrator.respond(interrupt_id, response)
        }

        Command::Ask { input } => {
            let question = input.join(" ");
            let answer = orchestrator.ask(&question).await?;
            println!("{}", to_pretty(&answer)?);
            Ok(())
        }

        Command::Workflows { json } => {
            if json {
                let all: Vec<_> = orchestrator.registry().iter().collect();
                println!("{}", to_pretty(&all)?);
            } else {
                for descriptor in orchestrator.registry().iter() {
                    println!("{descriptor}");
                }
            }
            Ok(())
        }

        Command::Credits { command } => credits(orchestrator, command).await,

        Command::Provider {
            name,
            enable,
            disable,
        } => {
            if enable == disable {
                Err(SmartSpecError::validation(
                    "pass exactly one of --enable / --disable",
                ))
            } else {
                orchestrator.set_provider_enabled(&name, enable);
                println!("{name}: {}", if enable { "enabled" } else { "disabled" });
                Ok(())
            }
        }
    };

    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(error) => Ok(print_error(error)),
    }
}

async fn run_workflow(
    orchestrator: &Orchestrator,
    workflow: &str,
    spec: &str,
    prompt: Option<String>,
    detach: bool,
    flags: &UniversalFlagArgs,
) -> Result<(), SmartSpecError> {
    let parsed = parse_flags(&flags.names())?;
    let mut args = serde_json::json!({ "spec_id": spec });
    if let Some(prompt) = prompt {
        args["prompt"] = serde_json::Value::String(prompt);
    }

    let execution_id = orchestrator.execute(workflow, args, &parsed).await?;
    if detach {
        println!("{execution_id}");
        return Ok(());
    }

    let mut stream = orchestrator.events(execution_id)?;
    while let Some(event) = stream.next().await {
        if !flags.quiet {
            print!(
                "{}",
                event
                    .to_json_line()
                    .unwrap_or_else(|_| format!("{:?}\n", event.kind))
            );
        }
    }

    let snapshot = orchestrator.status(execution_id).await?;
    match snapshot.status {
        ExecutionStatus::Completed => Ok(()),
        ExecutionStatus::Stopped => Err(SmartSpecError::validation(format!(
            "execution {execution_id} was cancelled"
        ))),
        other => Err(SmartSpecError::StepFailed {
            step: workflow.to_string(),
            message: format!("execution {execution_id} ended {other}"),
        }),
    }
}

async fn credits(
    orchestrator: &Orchestrator,
    command: CreditsCommand,
) -> Result<(), SmartSpecError> {
    match command {
        CreditsCommand::Balance => {
            let (balance, _) = orchestrator.credit_history().await?;
            println!("{balance} credits");
            Ok(())
        }
        CreditsCommand::Topup { usd } => {
            if usd <= 0.0 {
                return Err(SmartSpecError::validation("top-up amount must be positive"));
            }
            let row = orchestrator.topup(usd).await?;
            println!(
                "+{} credits (balance {})",
                row.amount_credits, row.balance_after
            );
            Ok(())
        }
        CreditsCommand::History { json } => {
            let (balance, history) = orchestrator.credit_history().await?;
            if json {
                println!("{}", to_pretty(&history)?);
            } else {
                for row in &history {
                    println!(
                        "{} {:>10} {:>8} -> {:>8}  {}",
                        row.created_at.format("%Y-%m-%d %H:%M:%S"),
                        format!("{:?}", row.kind).to_lowercase(),
                        row.balance_before,
                        row.balance_after,
                        row.id
                    );
                }
                println!("balance: {balance} credits");
            }
            Ok(())
        }
    }
}

fn print_error(error: SmartSpecError) -> ExitCode {
    eprintln!("error: {}", error.display_for_user());
    error.to_exit_code()
}

fn internal(e: anyhow::Error) -> SmartSpecError {
    SmartSpecError::internal(e.to_string())
}

fn to_pretty<T: Serialize>(value: &T) -> Result<String, SmartSpecError> {
    serde_json::to_string_pretty(value).map_err(|e| SmartSpecError::internal(e.to_string()))
}

const STARTER_CONFIG: &str = r#"# smartspec configuration. Every value shown is the default.

[engine]
fan_out = 4
step_grace_secs = 30
execution_timeout_secs = 1800
interrupt_deadline_secs = 3600

[gateway]
markup_rate = 0.15
rate_limit_per_minute = 60
expected_output_tokens = 1024
max_concurrent_requests = 8

[verifier]
fuzzy_threshold = 0.55
max_suggestions = 3

[store]
database_url = "sqlite://.spec/smartspec.db"

# [providers.anthropic]
# kind = "anthropic"
# api_key_env = "ANTHROPIC_API_KEY"
# model = "claude-sonnet-4-5"

# [[routing]]
# task = "reasoning"
# priority = "quality"
# routes = [
#   { provider = "anthropic", model = "claude-sonnet-4-5", price_in_per_1k = 0.003, price_out_per_1k = 0.015 },
# ]
"#;
