//! # Socialink Session
//!
//! Browser session handling for the social login round trip. Each provider plugin gets its own
//! [`SessionState`] scope holding the anti-forgery state, the pending access token and the
//! post-login destination. The scopes travel inside a [`BrowserSession`] which a [`SessionStore`]
//! persists between the redirect and the callback request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use socialink_core::{AuthError, SameSite, UserId};
use std::collections::HashMap;

mod memory;
pub use memory::MemoryStore;

#[cfg(feature = "store-redis")]
mod redis_store;
#[cfg(feature = "store-redis")]
pub use redis_store::RedisStore;

/// Transient state for one provider plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Anti-forgery nonce sent to the provider. Single use.
    pub oauth2state: Option<String>,
    /// Access token obtained in the current callback.
    pub access_token: Option<String>,
    /// Where to send the user after a successful login.
    pub login_destination: Option<String>,
}

impl SessionState {
    /// Clear the keys that must not survive a failed authentication.
    pub fn nullify(&mut self) {
        self.oauth2state = None;
        self.access_token = None;
    }

    /// Remove and return the stored anti-forgery state.
    pub fn take_oauth2state(&mut self) -> Option<String> {
        self.oauth2state.take()
    }
}

/// Severity of a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    /// Informational.
    Status,
    /// Something the user should know about.
    Warning,
    /// The action failed.
    Error,
}

/// A message shown to the user on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    /// Severity.
    pub level: MessageLevel,
    /// Rendered text.
    pub text: String,
}

impl FlashMessage {
    /// An error message.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Error,
            text: text.into(),
        }
    }

    /// A warning message.
    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Warning,
            text: text.into(),
        }
    }
}

/// Everything the server remembers about one browser.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrowserSession {
    /// Session id, stored in the session cookie.
    pub id: String,
    /// The logged in local user, if any.
    pub user_id: Option<UserId>,
    /// Per-plugin transient state.
    pub providers: HashMap<String, SessionState>,
    /// Pending user-facing messages.
    pub messages: Vec<FlashMessage>,
    /// Expiry time.
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl BrowserSession {
    /// Start an anonymous session that lives for `max_age`.
    pub fn new(max_age: chrono::Duration) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            providers: HashMap::new(),
            messages: Vec::new(),
            expires_at: chrono::Utc::now() + max_age,
        }
    }

    /// Whether a local user is logged in.
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// The state scope of a provider plugin, created on first access.
    pub fn state_mut(&mut self, plugin_id: &str) -> &mut SessionState {
        self.providers.entry(plugin_id.to_string()).or_default()
    }

    /// The state scope of a provider plugin, if it exists.
    pub fn state(&self, plugin_id: &str) -> Option<&SessionState> {
        self.providers.get(plugin_id)
    }

    /// Finalize a login: record the user and issue a new session id.
    pub fn login(&mut self, user_id: UserId) {
        self.user_id = Some(user_id);
        self.id = uuid::Uuid::new_v4().to_string();
    }

    /// Queue a user-facing message.
    pub fn push_message(&mut self, message: FlashMessage) {
        self.messages.push(message);
    }

    /// Drain the pending messages.
    pub fn take_messages(&mut self) -> Vec<FlashMessage> {
        std::mem::take(&mut self.messages)
    }

    /// Whether the session has expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at <= chrono::Utc::now()
    }
}

/// Configuration for the browser session cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Name of the session cookie.
    pub cookie_name: String,
    /// Cookie path.
    pub path: String,
    /// Whether the cookie should only be sent over HTTPS.
    pub secure: bool,
    /// Whether the cookie is hidden from scripts.
    pub http_only: bool,
    /// Cross-site policy.
    pub same_site: SameSite,
    /// The maximum age of the session.
    pub max_age: Option<chrono::Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "socialink_session".to_string(),
            path: "/".to_string(),
            secure: true,
            http_only: true,
            same_site: SameSite::Lax,
            max_age: Some(chrono::Duration::hours(24)),
        }
    }
}

impl SessionConfig {
    /// Lifetime used for new sessions.
    pub fn session_duration(&self) -> chrono::Duration {
        self.max_age.unwrap_or(chrono::Duration::hours(24))
    }
}

/// Persistence for browser sessions.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Load a live session.
    async fn load_session(&self, id: &str) -> Result<Option<BrowserSession>, AuthError>;
    /// Insert or replace a session.
    async fn save_session(&self, session: &BrowserSession) -> Result<(), AuthError>;
    /// Remove a session.
    async fn delete_session(&self, id: &str) -> Result<(), AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nullify_keeps_destination() {
        let mut state = SessionState {
            oauth2state: Some("nonce".into()),
            access_token: Some("token".into()),
            login_destination: Some("/node/1".into()),
        };
        state.nullify();
        assert_eq!(state.oauth2state, None);
        assert_eq!(state.access_token, None);
        assert_eq!(state.login_destination.as_deref(), Some("/node/1"));
    }

    #[test]
    fn provider_scopes_are_separate() {
        let mut session = BrowserSession::new(chrono::Duration::minutes(5));
        session.state_mut("social_auth_google").oauth2state = Some("a".into());
        assert!(session.state("social_auth_github").is_none());
        assert_eq!(
            session.state("social_auth_google").and_then(|s| s.oauth2state.as_deref()),
            Some("a")
        );
    }

    #[test]
    fn login_rotates_session_id() {
        let mut session = BrowserSession::new(chrono::Duration::minutes(5));
        let before = session.id.clone();
        session.login(7);
        assert!(session.is_authenticated());
        assert_ne!(session.id, before);
    }
}
