//! Doctor tool: run one refresh against a log-only sink and print status.
//!
//! Useful for verifying the store contents and refresh behaviour on a
//! development host where no platform notification service exists.

use pitchside::refresher::RefreshTrigger;
use pitchside::sink::LogOnlySink;
use pitchside::{NotifyConfig, QueueRefresher, SqliteActivityStore};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("pitchside-doctor failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> pitchside::Result<()> {
    let config_path = NotifyConfig::default_config_path();
    let config = if config_path.is_file() {
        NotifyConfig::from_file(&config_path)?
    } else {
        NotifyConfig::default()
    };

    let store = SqliteActivityStore::new(&config.store.resolved_root(), &config.reminders)
        .map_err(pitchside::NotifyError::from)?;
    let refresher = QueueRefresher::new(
        Arc::new(store),
        Arc::new(LogOnlySink),
        config.scheduler.clone(),
    )?;

    refresher.refresh(RefreshTrigger::AppStart).await?;
    let status = refresher.status().await;

    let json = serde_json::to_string_pretty(&status)
        .map_err(|e| pitchside::NotifyError::Refresh(format!("cannot encode status: {e}")))?;
    println!("{json}");
    Ok(())
}
