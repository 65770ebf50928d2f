use crate::{BrowserSession, SessionStore};
use async_trait::async_trait;
use socialink_core::AuthError;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-process session store. Sessions are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, BrowserSession>>,
}

fn poisoned<T>(_: T) -> AuthError {
    AuthError::Session("memory store lock poisoned".to_string())
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load_session(&self, id: &str) -> Result<Option<BrowserSession>, AuthError> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions.get(id).filter(|s| !s.is_expired()).cloned())
    }

    async fn save_session(&self, session: &BrowserSession) -> Result<(), AuthError> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        sessions.retain(|_, s| !s.is_expired());
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<(), AuthError> {
        self.sessions.write().map_err(poisoned)?.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_load_delete() {
        let store = MemoryStore::default();
        let mut session = BrowserSession::new(chrono::Duration::minutes(10));
        session.state_mut("social_auth_google").oauth2state = Some("nonce".into());
        store.save_session(&session).await.unwrap();

        let loaded = store.load_session(&session.id).await.unwrap().unwrap();
        assert_eq!(
            loaded.state("social_auth_google").unwrap().oauth2state.as_deref(),
            Some("nonce")
        );

        store.delete_session(&session.id).await.unwrap();
        assert!(store.load_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_sessions_are_not_returned() {
        let store = MemoryStore::default();
        let session = BrowserSession::new(chrono::Duration::seconds(-1));
        store.save_session(&session).await.unwrap();
        assert!(store.load_session(&session.id).await.unwrap().is_none());
    }
}
