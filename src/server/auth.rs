use argon2::{Argon2, password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString}};
use rand::RngCore;
use sqlx::Row;

use crate::common::models::UserProfile;
use crate::server::config::ServerConfig;
use crate::server::database::Database;

fn hash_password(password: &str, salt_length: u32) -> Result<String, String> {
    // SaltString accepts 4..=64 base64 chars
    let mut salt_bytes = vec![0u8; salt_length.clamp(8, 48) as usize];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| format!("Salt encoding failed: {}", e))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| format!("Password hashing failed: {}", e))
}

fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            log::warn!("[AUTH] Stored password hash is unreadable: {}", e);
            false
        }
    }
}

fn generate_session_token() -> String {
    let mut random = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut random);
    let suffix: String = random.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}-{}", uuid::Uuid::new_v4(), suffix)
}

async fn create_session(db: &Database, user_id: &str, config: &ServerConfig) -> Result<String, String> {
    let mut tx = db.pool.begin().await.map_err(|e| format!("Login failed: {}", e))?;
    // one live session per user
    sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| format!("Login failed: {}", e))?;
    let session_token = generate_session_token();
    let now = chrono::Utc::now().timestamp();
    let expires = now + 60 * 60 * 24 * config.session_expiry_days as i64;
    sqlx::query("INSERT INTO sessions (user_id, session_token, created_at, expires_at) VALUES (?, ?, ?, ?)")
        .bind(user_id)
        .bind(&session_token)
        .bind(now)
        .bind(expires)
        .execute(&mut *tx)
        .await
        .map_err(|e| format!("Login failed: {}", e))?;
    tx.commit().await.map_err(|e| format!("Login failed: {}", e))?;
    Ok(session_token)
}

/// Create an account and open its first session.
pub async fn register(
    db: &Database,
    username: &str,
    password: &str,
    phone: &str,
    city: &str,
    config: &ServerConfig,
) -> Result<(UserProfile, String), String> {
    log::info!("[AUTH] Register attempt: {}", username);
    if username.trim().is_empty() || password.is_empty() {
        return Err("Username and password are required".to_string());
    }
    let user_id = uuid::Uuid::new_v4().to_string();
    let password_hash = hash_password(password, config.argon2_salt_length)?;
    let created_at = chrono::Utc::now().timestamp();

    let mut tx = db.pool.begin().await.map_err(|e| format!("Registration failed: {}", e))?;
    let res = sqlx::query("INSERT INTO users (id, username, city, phone, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(&user_id)
        .bind(username)
        .bind(city)
        .bind(phone)
        .bind(created_at)
        .execute(&mut *tx)
        .await;
    if let Err(e) = res {
        let err_str = e.to_string();
        log::warn!("[AUTH] Registration failed for {}: {}", username, err_str);
        if err_str.to_lowercase().contains("unique") {
            return Err("Username already used".to_string());
        }
        return Err("Registration failed".to_string());
    }
    sqlx::query("INSERT INTO auth (user_id, password_hash) VALUES (?, ?)")
        .bind(&user_id)
        .bind(&password_hash)
        .execute(&mut *tx)
        .await
        .map_err(|e| format!("Registration failed: {}", e))?;
    tx.commit().await.map_err(|e| format!("Registration failed: {}", e))?;

    let token = create_session(db, &user_id, config).await?;
    log::info!("[AUTH] Registered user {} (id={})", username, user_id);
    let profile = UserProfile {
        id: user_id,
        name: username.to_string(),
        city: city.to_string(),
        phone: phone.to_string(),
    };
    Ok((profile, token))
}

pub async fn login(
    db: &Database,
    username: &str,
    password: &str,
    config: &ServerConfig,
) -> Result<(UserProfile, String), String> {
    log::info!("[AUTH] Login attempt: {}", username);
    let row = sqlx::query(
        "SELECT users.id, users.username, users.city, users.phone, auth.password_hash \
         FROM users JOIN auth ON users.id = auth.user_id WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(&db.pool)
    .await
    .map_err(|e| format!("Login failed: {}", e))?;

    let Some(row) = row else {
        log::info!("[AUTH] Login failed for {}: user not found", username);
        return Err("User not found".to_string());
    };
    let password_hash: String = row.get("password_hash");
    if !verify_password(&password_hash, password) {
        log::info!("[AUTH] Login failed for {}: wrong password", username);
        return Err("Wrong password".to_string());
    }
    let profile = UserProfile {
        id: row.get("id"),
        name: row.get("username"),
        city: row.get("city"),
        phone: row.get("phone"),
    };
    let token = create_session(db, &profile.id, config).await?;
    log::info!("[AUTH] Login success for {} (id={})", username, profile.id);
    Ok((profile, token))
}

pub async fn logout(db: &Database, session_token: &str) -> Result<(), String> {
    let res = sqlx::query("DELETE FROM sessions WHERE session_token = ?")
        .bind(session_token)
        .execute(&db.pool)
        .await
        .map_err(|e| format!("Logout failed: {}", e))?;
    if res.rows_affected() == 0 {
        return Err("Session not found".to_string());
    }
    log::info!("[AUTH] Logout (token masked)");
    Ok(())
}

/// Resolve a session token to its user id. Expired tokens resolve to `None`.
pub async fn validate_session(db: &Database, session_token: &str) -> Option<String> {
    let now = chrono::Utc::now().timestamp();
    let row = sqlx::query("SELECT user_id FROM sessions WHERE session_token = ? AND expires_at > ?")
        .bind(session_token)
        .bind(now)
        .fetch_optional(&db.pool)
        .await
        .map_err(|e| log::error!("[AUTH] Session lookup failed: {}", e))
        .ok()??;
    Some(row.get("user_id"))
}

fn profile_from_row(row: &sqlx::sqlite::SqliteRow) -> UserProfile {
    UserProfile {
        id: row.get("id"),
        name: row.get("username"),
        city: row.get("city"),
        phone: row.get("phone"),
    }
}

pub async fn get_profile(db: &Database, user_id: &str) -> Result<Option<UserProfile>, String> {
    sqlx::query("SELECT id, username, city, phone FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&db.pool)
        .await
        .map(|row| row.as_ref().map(profile_from_row))
        .map_err(|e| format!("User lookup failed: {}", e))
}

pub async fn find_by_username(db: &Database, username: &str) -> Result<Option<UserProfile>, String> {
    sqlx::query("SELECT id, username, city, phone FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(&db.pool)
        .await
        .map(|row| row.as_ref().map(profile_from_row))
        .map_err(|e| format!("User lookup failed: {}", e))
}

/// Drop expired sessions. Safe to run periodically.
pub async fn cleanup_expired_sessions(db: &Database) {
    let now = chrono::Utc::now().timestamp();
    match sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(now)
        .execute(&db.pool)
        .await
    {
        Ok(res) => log::info!("[AUTH] Cleaned up {} expired sessions", res.rows_affected()),
        Err(e) => log::error!("[AUTH] Failed to cleanup sessions: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn db() -> Database {
        let db = Database::connect("sqlite::memory:").await.expect("connect");
        db.migrate().await.expect("migrate");
        db
    }

    #[tokio::test]
    async fn register_login_and_validate() {
        let db = db().await;
        let config = ServerConfig::default();
        let (sam, first_token) = register(&db, "sam", "pw", "555-0100", "Turin", &config).await.unwrap();
        assert_eq!(validate_session(&db, &first_token).await, Some(sam.id.clone()));

        let (again, token) = login(&db, "sam", "pw", &config).await.unwrap();
        assert_eq!(again, sam);
        assert_eq!(validate_session(&db, &token).await, Some(sam.id.clone()));
        // logging in replaces the previous session
        assert_eq!(validate_session(&db, &first_token).await, None);

        assert_eq!(login(&db, "sam", "nope", &config).await.unwrap_err(), "Wrong password");
        assert_eq!(login(&db, "kim", "pw", &config).await.unwrap_err(), "User not found");
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let db = db().await;
        let config = ServerConfig::default();
        register(&db, "sam", "pw", "", "", &config).await.unwrap();
        let err = register(&db, "sam", "pw2", "", "", &config).await.unwrap_err();
        assert_eq!(err, "Username already used");
    }

    #[tokio::test]
    async fn logout_invalidates_token() {
        let db = db().await;
        let config = ServerConfig::default();
        let (_, token) = register(&db, "sam", "pw", "", "", &config).await.unwrap();
        logout(&db, &token).await.unwrap();
        assert_eq!(validate_session(&db, &token).await, None);
        assert!(logout(&db, &token).await.is_err());
    }

    #[tokio::test]
    async fn profile_lookups() {
        let db = db().await;
        let config = ServerConfig::default();
        let (sam, _) = register(&db, "sam", "pw", "555", "Turin", &config).await.unwrap();
        assert_eq!(get_profile(&db, &sam.id).await.unwrap(), Some(sam.clone()));
        assert_eq!(find_by_username(&db, "sam").await.unwrap(), Some(sam));
        assert_eq!(find_by_username(&db, "kim").await.unwrap(), None);
    }
}
