use std::env;
use std::path::PathBuf;

use crate::common::models::MAX_MESSAGE_CHARS;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub log_level: String,
    pub session_expiry_days: u32,
    pub argon2_salt_length: u32,
    pub max_message_length: usize,
    pub performance_log_path: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("SERVER_PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(5000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:data/pawpost.db".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            session_expiry_days: env::var("SESSION_EXPIRY_DAYS").ok().and_then(|v| v.parse().ok()).unwrap_or(7),
            argon2_salt_length: env::var("ARGON2_SALT_LENGTH").ok().and_then(|v| v.parse().ok()).unwrap_or(16),
            max_message_length: env::var("MAX_MESSAGE_LENGTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(|v: usize| v.min(MAX_MESSAGE_CHARS))
                .unwrap_or(MAX_MESSAGE_CHARS),
            performance_log_path: env::var("PERFORMANCE_LOG_PATH")
                .unwrap_or_else(|_| "data/pawpost_performance.log".to_string()),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            database_url: "sqlite::memory:".to_string(),
            log_level: "info".to_string(),
            session_expiry_days: 7,
            argon2_salt_length: 16,
            max_message_length: MAX_MESSAGE_CHARS,
            performance_log_path: "data/pawpost_performance.log".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `host:port` of the message server. `None` selects offline mode.
    pub remote_host: Option<String>,
    /// Directory holding the offline mirrors.
    pub mirror_dir: PathBuf,
    pub keyring_fallback: bool,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let remote_host = env::var("INBOX_REMOTE_HOST")
            .ok()
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .map(|host| {
                let port = env::var("INBOX_REMOTE_PORT").ok().and_then(|p| p.parse::<u16>().ok()).unwrap_or(5000);
                format!("{}:{}", host, port)
            });
        Self {
            remote_host,
            mirror_dir: env::var("INBOX_MIRROR_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data").join("mirror")),
            keyring_fallback: env::var("KEYRING_FALLBACK").unwrap_or_default() == "true",
        }
    }

    pub fn is_offline(&self) -> bool {
        self.remote_host.is_none()
    }
}
