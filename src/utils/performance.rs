use chrono::Utc;
use log::{error, info, warn};
use std::{fs::OpenOptions, io::Write, sync::Arc, time::Duration};
use sysinfo::System;
use tokio::time;

use crate::server::database::Database;

const INTERVAL: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageStats {
    pub users: i64,
    pub messages: i64,
    pub unread: i64,
}

async fn count(db: &Database, sql: &str, what: &str) -> i64 {
    match sqlx::query_scalar::<_, i64>(sql).fetch_one(&db.pool).await {
        Ok(count) => count,
        Err(e) => {
            warn!("Failed to query {}: {}", what, e);
            -1
        }
    }
}

/// Row counts used by the performance log. Failed queries report -1.
pub async fn collect_stats(db: &Database) -> MessageStats {
    MessageStats {
        users: count(db, "SELECT COUNT(*) FROM users", "users").await,
        messages: count(db, "SELECT COUNT(*) FROM messages", "messages").await,
        unread: count(db, "SELECT COUNT(*) FROM messages WHERE read = 0", "unread messages").await,
    }
}

pub async fn start_performance_logger(db: Arc<Database>, log_path: &str) {
    let mut system = System::new_all();

    if let Some(parent) = std::path::Path::new(log_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }
    let mut file = match OpenOptions::new().create(true).append(true).open(log_path) {
        Ok(f) => f,
        Err(e) => {
            error!("Unable to open performance log file '{}': {}", log_path, e);
            return;
        }
    };

    if file.metadata().map(|m| m.len()).unwrap_or(0) == 0 {
        if let Err(e) = writeln!(file, "# Timestamp, Users, Messages, Unread, CPU_Usage") {
            error!("Failed to write header to performance log: {}", e);
            return;
        }
        info!("Performance log initialized: {}", log_path);
    }

    loop {
        system.refresh_all();
        let cpus = system.cpus();
        let cpu_usage = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32
        };
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let stats = collect_stats(&db).await;

        info!(
            "Performance - Users: {}, Messages: {}, Unread: {}, CPU: {:.1}%",
            stats.users, stats.messages, stats.unread, cpu_usage
        );

        if let Err(e) = writeln!(
            file,
            "{}, {}, {}, {}, {:.1}%",
            timestamp, stats.users, stats.messages, stats.unread, cpu_usage
        ) {
            error!("Failed to write to performance log: {}", e);
        } else if let Err(e) = file.flush() {
            error!("Failed to flush performance log: {}", e);
        }

        time::sleep(INTERVAL).await;
    }
}
