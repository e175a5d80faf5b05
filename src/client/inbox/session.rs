use crate::common::error::{InboxError, Result};
use crate::common::models::UserProfile;

/// The signed-in user and the credential used to reach the message store.
///
/// Built when an identity is set and dropped at sign-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user: UserProfile,
    token: Option<String>,
}

impl Session {
    pub fn new(user: UserProfile, token: Option<String>) -> Self {
        let token = token.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
        Self { user, token }
    }

    pub fn user(&self) -> &UserProfile {
        &self.user
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn require_token(&self) -> Result<&str> {
        self.token().ok_or(InboxError::MissingCredential)
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token.filter(|t| !t.trim().is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_tokens_count_as_missing() {
        let session = Session::new(UserProfile::new("1", "Alex"), Some("  ".into()));
        assert!(matches!(session.require_token(), Err(InboxError::MissingCredential)));
        let mut session = Session::new(UserProfile::new("1", "Alex"), Some("tok".into()));
        assert_eq!(session.require_token().unwrap(), "tok");
        session.set_token(None);
        assert_eq!(session.token(), None);
    }
}
