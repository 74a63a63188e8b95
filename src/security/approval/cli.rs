use crate::error::PermissionError;
use crate::security::approval::{ApprovalPrompt, ApprovalRequest};
use crate::security::permissions::PermissionResponse;
use crate::security::verdict::RiskLevel;
use console::style;
use dialoguer::Select;
use std::future::Future;
use std::io::BufRead;
use std::pin::Pin;

/// Invalid typed answers tolerated before the request is denied once.
const MAX_TYPED_ATTEMPTS: usize = 3;

/// Operator prompt on the controlling terminal.
///
/// With a terminal attached this is an arrow-key menu; otherwise one line per
/// answer is read from stdin (`y`, `n`, `always`, `never`). End of input is a
/// prompt error, which the permission manager resolves as deny-once.
#[derive(Debug, Clone, Copy, Default)]
pub struct CliApprovalPrompt;

impl CliApprovalPrompt {
    pub const fn new() -> Self {
        Self
    }
}

impl ApprovalPrompt for CliApprovalPrompt {
    fn ask<'a>(
        &'a self,
        request: &'a ApprovalRequest,
    ) -> Pin<Box<dyn Future<Output = Result<PermissionResponse, PermissionError>> + Send + 'a>>
    {
        let request = request.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                eprintln!();
                eprintln!("{}", style("┌─ Permission required ───────────────────────────").bold());
                eprintln!("│ Action:  {}", request.description);
                eprintln!("│ Scope:   {}", request.subject);
                eprintln!("│ Risk:    {}", styled_risk(request.risk));
                eprintln!("└─────────────────────────────────────────────────");

                if console::Term::stderr().is_term() {
                    select_response()
                } else {
                    read_typed_response(&mut std::io::stdin().lock())
                }
            })
            .await
            .map_err(|e| PermissionError::Prompt(e.to_string()))?
        })
    }
}

fn styled_risk(risk: RiskLevel) -> String {
    match risk {
        RiskLevel::Low => style(risk).green().to_string(),
        RiskLevel::Medium => style(risk).yellow().to_string(),
        RiskLevel::High | RiskLevel::Critical => style(risk).red().bold().to_string(),
    }
}

fn select_response() -> Result<PermissionResponse, PermissionError> {
    let items: Vec<&str> = PermissionResponse::ALL
        .iter()
        .map(|r| r.label())
        .collect();
    let choice = Select::new()
        .with_prompt("  Allow this action?")
        .items(&items)
        .default(2)
        .interact()
        .map_err(|e| PermissionError::Prompt(e.to_string()))?;
    PermissionResponse::ALL
        .get(choice)
        .copied()
        .ok_or_else(|| PermissionError::Prompt(format!("menu returned index {choice}")))
}

fn read_typed_response(input: &mut impl BufRead) -> Result<PermissionResponse, PermissionError> {
    let mut last_error = PermissionError::Prompt("no input received".to_string());
    for _ in 0..MAX_TYPED_ATTEMPTS {
        eprint!("  Allow? [y/n/always/never] > ");
        let mut line = String::new();
        let read = input
            .read_line(&mut line)
            .map_err(|e| PermissionError::Prompt(e.to_string()))?;
        if read == 0 {
            return Err(PermissionError::Prompt("end of input".to_string()));
        }
        match line.parse::<PermissionResponse>() {
            Ok(response) => return Ok(response),
            Err(error) => {
                eprintln!("  {}", style(&error).red());
                last_error = error;
            }
        }
    }
    Err(last_error)
}
