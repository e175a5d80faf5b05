use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::client::services::chat_service::ChatService;
use crate::common::error::{InboxError, Result};
use crate::common::models::{MessagePayload, ThreadSummary, UserProfile};
use crate::common::protocol::{extract_session, Command, Response, INVALID_SESSION};

/// The authenticated calls the server mode needs from the message store.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn fetch_threads(&self, token: &str) -> Result<Vec<ThreadSummary>>;

    /// Full history with one counterpart, oldest first. Marks it read remotely.
    async fn fetch_history(&self, token: &str, counterpart_id: &str) -> Result<Vec<MessagePayload>>;

    async fn send_message(&self, token: &str, counterpart_id: &str, text: &str) -> Result<MessagePayload>;

    /// Identity bootstrap.
    async fn whoami(&self, token: &str) -> Result<UserProfile>;
}

/// [`RemoteApi`] over the line protocol.
#[derive(Clone)]
pub struct TcpRemoteApi {
    service: Arc<Mutex<ChatService>>,
    host: String,
}

impl TcpRemoteApi {
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_service(Arc::new(Mutex::new(ChatService::new())), host)
    }

    pub fn with_service(service: Arc<Mutex<ChatService>>, host: impl Into<String>) -> Self {
        Self { service, host: host.into() }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    async fn call(&self, cmd: Command) -> Result<String> {
        let mut guard = self.service.lock().await;
        let raw = guard
            .send_command(&self.host, cmd.to_line())
            .await
            .map_err(|e| InboxError::Transport(e.to_string()))?;
        match Response::parse(&raw) {
            Response::Ok(body) => Ok(body),
            Response::Err(msg) if msg == INVALID_SESSION => Err(InboxError::Unauthorized(msg)),
            Response::Err(msg) => Err(InboxError::Remote(msg)),
        }
    }

    async fn call_json<T: DeserializeOwned>(&self, cmd: Command) -> Result<T> {
        let body = self.call(cmd).await?;
        serde_json::from_str(&body).map_err(|e| InboxError::InvalidRecord(format!("bad response body: {}", e)))
    }

    /// Log in and return the session token.
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        let body = self
            .call(Command::Login { username: username.to_string(), password: password.to_string() })
            .await?;
        extract_session(&body).ok_or_else(|| InboxError::Remote("login response without session".to_string()))
    }

    pub async fn register(&self, username: &str, password: &str, phone: &str, city: &str) -> Result<String> {
        let body = self
            .call(Command::Register {
                username: username.to_string(),
                password: password.to_string(),
                phone: phone.to_string(),
                city: city.to_string(),
            })
            .await?;
        extract_session(&body).ok_or_else(|| InboxError::Remote("register response without session".to_string()))
    }

    pub async fn logout(&self, token: &str) -> Result<()> {
        self.call(Command::Logout { token: token.to_string() }).await.map(|_| ())
    }

    pub async fn lookup(&self, token: &str, username: &str) -> Result<UserProfile> {
        self.call_json(Command::Lookup { token: token.to_string(), username: username.to_string() })
            .await
    }
}

#[async_trait]
impl RemoteApi for TcpRemoteApi {
    async fn fetch_threads(&self, token: &str) -> Result<Vec<ThreadSummary>> {
        self.call_json(Command::Threads { token: token.to_string() }).await
    }

    async fn fetch_history(&self, token: &str, counterpart_id: &str) -> Result<Vec<MessagePayload>> {
        self.call_json(Command::History { token: token.to_string(), user_id: counterpart_id.to_string() })
            .await
    }

    async fn send_message(&self, token: &str, counterpart_id: &str, text: &str) -> Result<MessagePayload> {
        self.call_json(Command::Send {
            token: token.to_string(),
            user_id: counterpart_id.to_string(),
            text: text.to_string(),
        })
        .await
    }

    async fn whoami(&self, token: &str) -> Result<UserProfile> {
        self.call_json(Command::Me { token: token.to_string() }).await
    }
}
