use crate::{BrowserSession, SessionStore};
use async_trait::async_trait;
use redis::AsyncCommands;
use socialink_core::AuthError;

/// Session store backed by Redis. Entries expire together with the session.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    prefix: String,
}

impl RedisStore {
    /// Connect lazily to `redis_url`, namespacing keys with `prefix`.
    pub fn new(redis_url: &str, prefix: String) -> Result<Self, AuthError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AuthError::Session(format!("Redis client error: {e}")))?;
        Ok(Self { client, prefix })
    }

    fn key(&self, id: &str) -> String {
        format!("{}:session:{}", self.prefix, id)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, AuthError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AuthError::Session(format!("Redis connection error: {e}")))
    }
}

#[async_trait]
impl SessionStore for RedisStore {
    async fn load_session(&self, id: &str) -> Result<Option<BrowserSession>, AuthError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .get(self.key(id))
            .await
            .map_err(|e| AuthError::Session(format!("Redis load_session error: {e}")))?;

        match raw {
            Some(json) => {
                let session: BrowserSession = serde_json::from_str(&json).map_err(|e| {
                    AuthError::Session(format!("Session deserialization error: {e}"))
                })?;
                Ok(Some(session).filter(|s| !s.is_expired()))
            }
            None => Ok(None),
        }
    }

    async fn save_session(&self, session: &BrowserSession) -> Result<(), AuthError> {
        let json = serde_json::to_string(session)
            .map_err(|e| AuthError::Session(format!("Session serialization error: {e}")))?;
        let ttl = (session.expires_at - chrono::Utc::now()).num_seconds().max(1) as u64;

        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(self.key(&session.id), json, ttl)
            .await
            .map_err(|e| AuthError::Session(format!("Redis save_session error: {e}")))
    }

    async fn delete_session(&self, id: &str) -> Result<(), AuthError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(self.key(id))
            .await
            .map_err(|e| AuthError::Session(format!("Redis delete_session error: {e}")))
    }
}
