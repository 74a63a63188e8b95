use crate::agent::{LoopOutcome, LoopStopReason, ToolLoop, system_prompt};
use crate::cli::{Cli, Commands};
use crate::config::Config;
use crate::providers::OpenAiCompatBackend;
use crate::security::{
    ActionVerdict, ApprovalPrompt, AuditLogger, AutoDenyPrompt, CliApprovalPrompt,
    CommandSandbox, PathIntent,
};
use crate::tools::ToolRegistry;
use anyhow::{Result, bail};
use console::style;
use std::sync::Arc;

pub async fn dispatch(cli: Cli, mut config: Config) -> Result<()> {
    match cli.command {
        Commands::Run {
            prompt,
            working_dir,
            max_iterations,
            non_interactive,
        } => {
            if let Some(dir) = working_dir {
                config.agent.working_dir = Some(dir);
            }
            if let Some(max) = max_iterations {
                config.agent.max_tool_iterations = max;
            }
            config.validate()?;
            run_task(&config, &prompt, non_interactive).await
        }
        Commands::Classify { command } => classify_command(&config, &command),
        Commands::CheckPath { path, write } => check_path(&config, &path, write),
        Commands::Tools => list_tools(),
    }
}

async fn run_task(config: &Config, task: &str, non_interactive: bool) -> Result<()> {
    let working_dir = config.working_dir()?;
    let prompt_text = system_prompt(&working_dir, &ToolRegistry::with_builtin_tools()?);
    let backend = Arc::new(OpenAiCompatBackend::new(&config.backend, prompt_text));
    let approvals: Arc<dyn ApprovalPrompt> = if non_interactive {
        Arc::new(AutoDenyPrompt)
    } else {
        Arc::new(CliApprovalPrompt::new())
    };

    let mut tool_loop = ToolLoop::from_config(config, backend, approvals)?;
    tracing::info!(
        working_dir = %working_dir.display(),
        model = %config.backend.model,
        max_iterations = tool_loop.max_iterations(),
        "starting task"
    );

    let outcome = tool_loop.run(task).await;
    print_outcome(&outcome);

    if let LoopStopReason::Fatal(detail) = &outcome.stop_reason {
        bail!("run aborted: {detail}");
    }
    Ok(())
}

fn print_outcome(outcome: &LoopOutcome) {
    for call in &outcome.tool_calls {
        let status = if call.result.success {
            style("ok").green().to_string()
        } else {
            let kind = call.result.failure.map_or("failed", |f| f.as_str());
            style(kind).red().to_string()
        };
        eprintln!(
            "  {} {} [{}] {}",
            style("•").dim(),
            call.tool_name,
            call.verdict,
            status
        );
    }

    if !outcome.final_text.is_empty() {
        println!("{}", outcome.final_text);
    }

    let reason = match &outcome.stop_reason {
        LoopStopReason::Completed => style(outcome.stop_reason.to_string()).green(),
        _ => style(outcome.stop_reason.to_string()).yellow(),
    };
    eprintln!(
        "\n{} {} after {} backend call(s), {} tool call(s)",
        style("Stopped:").bold(),
        reason,
        outcome.iterations,
        outcome.tool_calls.len()
    );
    if outcome.audit_degraded {
        eprintln!(
            "{} audit log could not be written for part of this run",
            style("Warning:").yellow().bold()
        );
    }
}

fn print_verdict(verdict: &ActionVerdict) {
    match verdict {
        ActionVerdict::Allowed => println!("{}", style("allowed").green().bold()),
        ActionVerdict::Blocked { reason } => {
            println!("{} {reason}", style("blocked:").red().bold());
        }
        ActionVerdict::RequiresConfirmation { reason, risk } => {
            println!(
                "{} {reason} (risk {risk})",
                style("requires confirmation:").yellow().bold()
            );
        }
    }
}

fn classify_command(config: &Config, command: &str) -> Result<()> {
    let audit = Arc::new(AuditLogger::new(config.audit_log_path()?));
    let sandbox = CommandSandbox::new(config.sandbox.rules(), config.sandbox.limits(), audit);
    let working_dir = config.working_dir()?;
    print_verdict(&sandbox.classify(command, Some(&working_dir)));
    println!("subject key: {}", sandbox.subject_key(command));
    Ok(())
}

fn check_path(config: &Config, path: &str, write: bool) -> Result<()> {
    let working_dir = config.working_dir()?;
    let validator = config.path_validator(&working_dir);
    let intent = if write {
        PathIntent::Write
    } else {
        PathIntent::Read
    };
    println!("{} ({})", validator.absolutize(path).display(), intent.as_str());
    print_verdict(&validator.classify(path, intent));
    Ok(())
}

fn list_tools() -> Result<()> {
    let registry = ToolRegistry::with_builtin_tools()?;
    for spec in registry.specs() {
        println!("{}", style(&spec.name).bold());
        println!("  {}", spec.description);
        println!(
            "  {}",
            serde_json::to_string_pretty(&spec.parameters)?.replace('\n', "\n  ")
        );
    }
    Ok(())
}
