use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

use krill::KrillError;
use krill::config::fetch_config;
use krill::pipeline;
use krill::store::PgOhlcStore;

#[tokio::main]
async fn main() -> Result<(), KrillError> {
    // Initialize tracing subscriber for logging output.
    tracing_subscriber::fmt::init();

    let config = fetch_config()?;

    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&config.database_url)
        .await?;
    let store = PgOhlcStore::new(pool);
    store.ensure_schema().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = signal::ctrl_c().await;
        info!("Interrupt received, shutting down");
        let _ = shutdown_tx.send(true);
    });

    pipeline::run(&config, store, shutdown_rx).await
}
