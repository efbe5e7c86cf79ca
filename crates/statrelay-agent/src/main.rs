mod config;
mod supervisor;

use anyhow::Result;
use supervisor::Supervisor;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("statrelay_agent=info".parse()?)
                .add_directive("statrelay_collector=info".parse()?),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/statrelay.toml".to_string());

    let config = config::AgentConfig::load(&config_path)?;
    tracing::info!(
        path = %config_path,
        targets = config.servers.len(),
        "statrelay agent starting"
    );

    let mut supervisor = Supervisor::new(config.repository);
    supervisor.sync(config.servers);

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            _ = sighup.recv() => {
                tracing::info!("SIGHUP received, re-reading configuration");
                match config::AgentConfig::load(&config_path) {
                    Ok(new_config) => supervisor.sync(new_config.servers),
                    Err(e) => {
                        tracing::error!(error = %e, "configuration reload failed, keeping current fleet");
                    }
                }
            }
            _ = sigterm.recv() => {
                tracing::info!("SIGTERM received");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received");
                break;
            }
        }
    }

    tracing::info!("shutting down workers");
    supervisor.shutdown().await;
    tracing::info!("statrelay agent stopped");
    Ok(())
}
