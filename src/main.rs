use pawpost::client::cli;
use pawpost::server::config::ClientConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // load .env so INBOX_* and KEYRING_FALLBACK can be set there for development
    let _ = dotenvy::dotenv();
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());
    pawpost::utils::logger::init(&level);

    let config = ClientConfig::from_env();
    cli::run(config).await
}
