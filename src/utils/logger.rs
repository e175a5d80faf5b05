use chrono::Utc;
use std::io::Write;

/// Install the env_logger formatter used by every binary.
///
/// `default_level` applies when `RUST_LOG` is not set.
pub fn init(default_level: &str) {
    let env = env_logger::Env::default().default_filter_or(default_level);
    let result = env_logger::Builder::from_env(env)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] [{}:{}] {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .try_init();

    if result.is_ok() {
        log::info!("pawpost logger initialized (default level {})", default_level);
    }
}
