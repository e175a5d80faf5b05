// Entry point for the pawpost message server
use log::{error, info};
use pawpost::server::{auth, config::ServerConfig, connection::Server, database::Database};
use pawpost::utils::{logger, performance};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();
    logger::init(&config.log_level);

    let database = Arc::new(Database::connect(&config.database_url).await?);

    info!("Running database migrations...");
    database.migrate().await.map_err(|e| {
        error!("Database migration failed: {}", e);
        e
    })?;
    info!("Database migrations completed");

    // Expired sessions are swept hourly
    let sweep_db = database.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            auth::cleanup_expired_sessions(&sweep_db).await;
        }
    });

    let perf_db = database.clone();
    let perf_log_path = config.performance_log_path.clone();
    tokio::spawn(async move {
        info!("Starting performance logger - logging every 120 seconds to: {}", perf_log_path);
        performance::start_performance_logger(perf_db, &perf_log_path).await;
    });

    let server = Server::new(database, config.clone());
    server.run(&config.bind_addr()).await?;
    Ok(())
}
