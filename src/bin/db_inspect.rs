use pawpost::server::config::ServerConfig;
use pawpost::server::database::Database;
use sqlx::Row;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();
    let db_path = std::env::args().nth(1).unwrap_or(config.database_url);
    println!("Connecting to {}", db_path);
    let db = Database::connect(&db_path).await?;

    println!("\n-- users --");
    let rows = sqlx::query("SELECT id, username, city, phone, created_at FROM users ORDER BY created_at")
        .fetch_all(&db.pool)
        .await?;
    for r in rows.iter() {
        let id: String = r.try_get("id").unwrap_or_default();
        let username: String = r.try_get("username").unwrap_or_default();
        let city: String = r.try_get("city").unwrap_or_default();
        let phone: String = r.try_get("phone").unwrap_or_default();
        let created_at: i64 = r.try_get("created_at").unwrap_or(0);
        println!("id={} username={} city={} phone={} created_at={}", id, username, city, phone, created_at);
    }

    println!("\n-- sessions --");
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions").fetch_one(&db.pool).await?;
    println!("active rows={}", count);

    println!("\n-- messages (last 10) --");
    let rows = sqlx::query(
        "SELECT id, sender_id, receiver_id, text, created_at, read FROM messages ORDER BY created_at DESC LIMIT 10",
    )
    .fetch_all(&db.pool)
    .await?;
    for r in rows.iter() {
        let id: String = r.try_get("id").unwrap_or_default();
        let sender_id: String = r.try_get("sender_id").unwrap_or_default();
        let receiver_id: String = r.try_get("receiver_id").unwrap_or_default();
        let text: String = r.try_get("text").unwrap_or_default();
        let created_at: i64 = r.try_get("created_at").unwrap_or(0);
        let read: bool = r.try_get("read").unwrap_or(false);
        println!(
            "id={} from={} to={} text_len={} created_at={} read={}",
            id,
            sender_id,
            receiver_id,
            text.chars().count(),
            created_at,
            read
        );
    }

    Ok(())
}
