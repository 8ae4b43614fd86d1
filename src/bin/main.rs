use async_trait::async_trait;
use banking_agent_orchestrator::{
    agent::ApprovalPrompt,
    config::Settings,
    models::{ApprovalDecision, ApprovalRequest, RequestContext},
    services::Services,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Asks on the terminal; anything but "y"/"yes" declines
struct TerminalApproval;

#[async_trait]
impl ApprovalPrompt for TerminalApproval {
    async fn decide(
        &self,
        request: &ApprovalRequest,
    ) -> banking_agent_orchestrator::Result<ApprovalDecision> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(
                format!(
                    "\n{}\n\n{}\n\n{} [y/N]: ",
                    request.description, request.plan, request.action
                )
                .as_bytes(),
            )
            .await?;
        stdout.flush().await?;

        let mut answer = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut answer)
            .await?;

        Ok(match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => ApprovalDecision::Approved,
            _ => ApprovalDecision::Declined,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    let goal = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if goal.trim().is_empty() {
        eprintln!("usage: orchestrator <goal>");
        std::process::exit(2);
    }

    let settings = Settings::from_env()?;
    let services = Services::from_settings(&settings)?;
    let ctx = RequestContext::new(Uuid::new_v4(), None);

    info!(session_id = %ctx.session_id, goal = %goal, "Running plan-execute");

    let snapshot = services
        .orchestrator
        .run_interactive(&goal, &ctx, &TerminalApproval)
        .await?;

    println!("\n=== RUN {} ({}) ===", snapshot.run_id, snapshot.status);
    for (i, past) in snapshot.past_steps.iter().enumerate() {
        println!("  {}. {}\n     -> {}", i + 1, past.step, past.result);
    }
    if let Some(response) = &snapshot.response {
        println!("\n{}", response);
    }
    if let Some(reason) = &snapshot.failure_reason {
        eprintln!("\nFailure: {}", reason);
    }

    Ok(())
}
