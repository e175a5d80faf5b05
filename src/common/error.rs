use thiserror::Error;

pub type Result<T> = std::result::Result<T, InboxError>;

/// Everything that can go wrong inside the inbox.
///
/// None of these are fatal to the application: the caller leaves the
/// conversation state as it was and shows [`InboxError::user_prompt`].
#[derive(Error, Debug)]
pub enum InboxError {
    /// No identity has been set on the inbox.
    #[error("Not signed in")]
    NotSignedIn,

    /// An identity exists but there is no credential to talk to the remote store.
    #[error("Missing session credential")]
    MissingCredential,

    /// The remote store rejected the credential.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Data entering from the wire or from storage failed validation.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// The remote store answered with an `ERR:` line.
    #[error("{0}")]
    Remote(String),

    #[error("Connection error: {0}")]
    Transport(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InboxError {
    /// Authentication absence is a prompt, not an error state.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            InboxError::NotSignedIn | InboxError::MissingCredential | InboxError::Unauthorized(_)
        )
    }

    /// Text shown to the user in a transient notice.
    pub fn user_prompt(&self) -> String {
        match self {
            InboxError::NotSignedIn => "Login to send messages".to_string(),
            InboxError::MissingCredential | InboxError::Unauthorized(_) => {
                "Login again to send messages".to_string()
            }
            other => other.to_string(),
        }
    }
}
