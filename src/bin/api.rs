use banking_agent_orchestrator::{
    api::{start_server, ApiState},
    config::Settings,
    services::Services,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env()?;

    if settings.llm.api_key.is_empty() {
        eprintln!("AZURE_OPENAI_API_KEY not set in .env; model calls will fail");
    }
    if settings.fallback_cookie.is_none() {
        info!("BANK_COOKIE not set; bank tools rely on the request cookie header");
    }

    info!(port = settings.port, bank = %settings.bank_base_url, "Banking assistant API starting");

    let services = Services::from_settings(&settings)?;

    start_server(ApiState::from(&services), settings.port).await?;

    Ok(())
}
