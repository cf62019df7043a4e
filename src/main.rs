use agent_gateway::{logging, AppContext, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    logging::init(&settings.log_level);
    tracing::info!("Agent gateway booting...");

    let context = AppContext::from_settings(&settings).await?;
    context.start().await?;
    tracing::info!(health = %context.health().await, "Agent gateway ready. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    let stats = context.shutdown().await?;
    tracing::info!("Relay forwarded {} envelopes from other instances", stats.forwarded);
    Ok(())
}
