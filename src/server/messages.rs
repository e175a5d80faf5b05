use sqlx::Row;

use crate::common::models::{from_millis, now_millis, validate_text, MessagePayload, ThreadSummary, UserProfile};
use crate::common::threads::{aggregate_threads, MessageRecord};
use crate::server::auth;
use crate::server::config::ServerConfig;
use crate::server::database::Database;

/// Thread summaries for `user_id`, newest conversation first.
pub async fn list_threads(db: &Database, user_id: &str) -> Result<Vec<ThreadSummary>, String> {
    let rows = sqlx::query(
        r#"
        SELECT m.id, m.text, m.created_at, m.read,
               s.id AS s_id, s.username AS s_name, s.city AS s_city, s.phone AS s_phone,
               r.id AS r_id, r.username AS r_name, r.city AS r_city, r.phone AS r_phone
        FROM messages m
        JOIN users s ON s.id = m.sender_id
        JOIN users r ON r.id = m.receiver_id
        WHERE m.sender_id = ? OR m.receiver_id = ?
        ORDER BY m.created_at DESC, m.rowid DESC
        "#,
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(&db.pool)
    .await
    .map_err(|e| {
        log::error!("[MSG] Error loading threads for {}: {}", user_id, e);
        format!("Failed to load threads: {}", e)
    })?;

    let records: Vec<MessageRecord> = rows
        .iter()
        .map(|r| MessageRecord {
            id: r.get("id"),
            text: r.get("text"),
            created_at: from_millis(r.get::<i64, _>("created_at")),
            read: r.get::<i64, _>("read") != 0,
            sender: UserProfile {
                id: r.get("s_id"),
                name: r.get("s_name"),
                city: r.get("s_city"),
                phone: r.get("s_phone"),
            },
            receiver: UserProfile {
                id: r.get("r_id"),
                name: r.get("r_name"),
                city: r.get("r_city"),
                phone: r.get("r_phone"),
            },
        })
        .collect();

    let threads = aggregate_threads(user_id, &records);
    log::debug!("[MSG] {} messages aggregated into {} threads for {}", records.len(), threads.len(), user_id);
    Ok(threads)
}

/// Full history between `user_id` and `other_id`, oldest first.
///
/// Everything `other_id` sent to `user_id` is marked read afterwards; the
/// returned payloads carry the read flag as it was before marking.
pub async fn conversation_with(db: &Database, user_id: &str, other_id: &str) -> Result<Vec<MessagePayload>, String> {
    if other_id.trim().is_empty() {
        return Err("Invalid user id".to_string());
    }
    let rows = sqlx::query(
        r#"
        SELECT rowid AS seq, id, sender_id, text, created_at, read
        FROM messages
        WHERE (sender_id = ? AND receiver_id = ?) OR (sender_id = ? AND receiver_id = ?)
        ORDER BY created_at ASC, rowid ASC
        "#,
    )
    .bind(user_id)
    .bind(other_id)
    .bind(other_id)
    .bind(user_id)
    .fetch_all(&db.pool)
    .await
    .map_err(|e| format!("Failed to load conversation: {}", e))?;

    // only what was returned gets marked; later arrivals stay unread
    let newest_seen = rows.iter().map(|r| r.get::<i64, _>("seq")).max();
    if let Some(newest_seen) = newest_seen {
        mark_read_through(db, user_id, other_id, newest_seen).await?;
    }

    Ok(rows
        .iter()
        .map(|r| MessagePayload {
            id: r.get("id"),
            text: r.get("text"),
            timestamp: from_millis(r.get::<i64, _>("created_at")),
            author_id: r.get("sender_id"),
            read: Some(r.get::<i64, _>("read") != 0),
            receiver_id: None,
        })
        .collect())
}

/// Marks messages from `other_id` to `user_id` read, up to and including `rowid`.
async fn mark_read_through(db: &Database, user_id: &str, other_id: &str, rowid: i64) -> Result<u64, String> {
    let marked = sqlx::query(
        "UPDATE messages SET read = 1 WHERE sender_id = ? AND receiver_id = ? AND read = 0 AND rowid <= ?",
    )
    .bind(other_id)
    .bind(user_id)
    .bind(rowid)
    .execute(&db.pool)
    .await
    .map_err(|e| format!("Failed to mark messages read: {}", e))?;
    if marked.rows_affected() > 0 {
        log::info!("[MSG] Marked {} messages from {} read for {}", marked.rows_affected(), other_id, user_id);
    }
    Ok(marked.rows_affected())
}

pub async fn send_message(
    db: &Database,
    user_id: &str,
    to_id: &str,
    text: &str,
    config: &ServerConfig,
) -> Result<MessagePayload, String> {
    let text = validate_text(text, config.max_message_length)?;
    if to_id.trim().is_empty() {
        return Err("Invalid user id".to_string());
    }
    if to_id == user_id {
        return Err("Cannot message yourself".to_string());
    }
    if auth::get_profile(db, to_id).await?.is_none() {
        return Err("User not found".to_string());
    }

    // timestamps never go backwards inside one conversation
    let latest: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT MAX(created_at) FROM messages
        WHERE (sender_id = ? AND receiver_id = ?) OR (sender_id = ? AND receiver_id = ?)
        "#,
    )
    .bind(user_id)
    .bind(to_id)
    .bind(to_id)
    .bind(user_id)
    .fetch_one(&db.pool)
    .await
    .map_err(|e| format!("Failed to send message: {}", e))?;
    let created_at = now_millis().max(latest.unwrap_or(0));

    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO messages (id, sender_id, receiver_id, text, created_at, read) VALUES (?, ?, ?, ?, ?, 0)")
        .bind(&id)
        .bind(user_id)
        .bind(to_id)
        .bind(&text)
        .bind(created_at)
        .execute(&db.pool)
        .await
        .map_err(|e| {
            log::error!("[MSG] Error sending message from {} to {}: {}", user_id, to_id, e);
            format!("Failed to send message: {}", e)
        })?;

    log::info!("[MSG] Message {} sent to {} by {}", id, to_id, user_id);
    Ok(MessagePayload {
        id,
        text,
        timestamp: from_millis(created_at),
        author_id: user_id.to_string(),
        read: None,
        receiver_id: Some(to_id.to_string()),
    })
}
