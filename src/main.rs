use anyhow::{Context, Result};

use ganbaru::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Begin logger
    env_logger::init();

    // Load configuration (.env first, then the environment)
    let config = config::Config::from_env()?;
    log::info!(
        "Starting with database {} in timezone {}",
        config.db_path.display(),
        config.timezone
    );

    // Initialize database
    let database = db::Database::new(&config.db_path);
    database.initialize().context("Could not initialize the ledger database")?;

    // Start the event trigger and catch up on anything left uncredited
    let (trigger, worker) = trigger::spawn_worker(database.clone(), config.timezone);
    let requeued = trigger::redeliver_pending(&database, &trigger)?;
    if requeued > 0 {
        log::info!("Requeued {requeued} uncredited event(s) from a previous run.");
    }

    // Serve the admin endpoints
    let app = api::router(api::AppState::new(database, trigger, &config));
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Could not bind {}", config.bind_addr))?;
    log::info!("Listening on {}", config.bind_addr);

    if let Err(why) = axum::serve(listener, app).await {
        log::error!("Server error: {why:?}");
    }

    worker.abort();
    Ok(())
}
