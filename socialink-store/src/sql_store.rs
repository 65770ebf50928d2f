use async_trait::async_trait;
use chrono::{DateTime, Utc};
use socialink_core::{AuthError, DataMap, IdentityLink, IdentityLinkRepository, NewIdentityLink, UserId};
use sqlx::Database;

type LinkRow = (i64, i64, String, String, String, Option<String>, DateTime<Utc>);

const COLUMNS: &str = "id, user_id, plugin_id, provider_user_id, token, additional_data, created";

/// Identity link repository backed by a SQL table.
///
/// Call [`SqlLinkStore::migrate`] once at startup to create the table.
#[derive(Clone, Debug)]
pub struct SqlLinkStore<DB: Database> {
    pool: sqlx::Pool<DB>,
    table_name: String,
}

impl<DB: Database> SqlLinkStore<DB> {
    pub fn new(pool: sqlx::Pool<DB>) -> Self {
        Self {
            pool,
            table_name: "socialink_links".to_string(),
        }
    }

    pub fn with_table_name(pool: sqlx::Pool<DB>, table_name: String) -> Self {
        Self { pool, table_name }
    }
}

fn db_error(backend: &str, op: &str, e: sqlx::Error) -> AuthError {
    AuthError::Persistence(format!("{backend} {op} error: {e}"))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn encode_data(data: &Option<DataMap>) -> Result<Option<String>, AuthError> {
    data.as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| AuthError::Persistence(format!("Link data serialization error: {e}")))
}

fn into_link(row: LinkRow) -> Result<IdentityLink, AuthError> {
    let (id, user_id, plugin_id, provider_user_id, token, data, created) = row;
    let additional_data = data
        .map(|json| serde_json::from_str::<DataMap>(&json))
        .transpose()
        .map_err(|e| AuthError::Persistence(format!("Link data deserialization error: {e}")))?;
    Ok(IdentityLink {
        id: id as u64,
        user_id: user_id as UserId,
        plugin_id,
        provider_user_id,
        token,
        additional_data,
        created,
    })
}

#[cfg(feature = "sqlite")]
impl SqlLinkStore<sqlx::Sqlite> {
    pub async fn migrate(&self) -> Result<(), AuthError> {
        let query = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                plugin_id TEXT NOT NULL,
                provider_user_id TEXT NOT NULL,
                token TEXT NOT NULL,
                additional_data TEXT,
                created TEXT NOT NULL,
                UNIQUE (plugin_id, provider_user_id)
            )",
            self.table_name
        );
        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Sqlite", "migrate", e))?;
        Ok(())
    }
}

#[cfg(feature = "sqlite")]
#[async_trait]
impl IdentityLinkRepository for SqlLinkStore<sqlx::Sqlite> {
    async fn find_local_user(
        &self,
        plugin_id: &str,
        provider_user_id: &str,
    ) -> Result<Option<UserId>, AuthError> {
        let query = format!(
            "SELECT user_id FROM {} WHERE plugin_id = ?1 AND provider_user_id = ?2",
            self.table_name
        );
        let user_id: Option<i64> = sqlx::query_scalar(&query)
            .bind(plugin_id)
            .bind(provider_user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Sqlite", "find_local_user", e))?;
        Ok(user_id.map(|id| id as UserId))
    }

    async fn create_link(&self, link: NewIdentityLink) -> Result<IdentityLink, AuthError> {
        let query = format!(
            "INSERT INTO {} (user_id, plugin_id, provider_user_id, token, additional_data, created)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             RETURNING {COLUMNS}",
            self.table_name
        );
        let row: LinkRow = sqlx::query_as(&query)
            .bind(link.user_id as i64)
            .bind(&link.plugin_id)
            .bind(&link.provider_user_id)
            .bind(&link.token)
            .bind(encode_data(&link.additional_data)?)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    crate::duplicate_link(&link.plugin_id, &link.provider_user_id)
                } else {
                    db_error("Sqlite", "create_link", e)
                }
            })?;
        into_link(row)
    }

    async fn load_link(&self, id: u64) -> Result<Option<IdentityLink>, AuthError> {
        let query = format!("SELECT {COLUMNS} FROM {} WHERE id = ?1", self.table_name);
        let row: Option<LinkRow> = sqlx::query_as(&query)
            .bind(id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Sqlite", "load_link", e))?;
        row.map(into_link).transpose()
    }

    async fn links_for_user(&self, user_id: UserId) -> Result<Vec<IdentityLink>, AuthError> {
        let query = format!(
            "SELECT {COLUMNS} FROM {} WHERE user_id = ?1 ORDER BY id",
            self.table_name
        );
        let rows: Vec<LinkRow> = sqlx::query_as(&query)
            .bind(user_id as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Sqlite", "links_for_user", e))?;
        rows.into_iter().map(into_link).collect()
    }

    async fn delete_link(&self, id: u64) -> Result<bool, AuthError> {
        let query = format!("DELETE FROM {} WHERE id = ?1", self.table_name);
        let result = sqlx::query(&query)
            .bind(id as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Sqlite", "delete_link", e))?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(feature = "postgres")]
impl SqlLinkStore<sqlx::Postgres> {
    pub async fn migrate(&self) -> Result<(), AuthError> {
        let query = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL,
                plugin_id TEXT NOT NULL,
                provider_user_id TEXT NOT NULL,
                token TEXT NOT NULL,
                additional_data TEXT,
                created TIMESTAMPTZ NOT NULL,
                UNIQUE (plugin_id, provider_user_id)
            )",
            self.table_name
        );
        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Postgres", "migrate", e))?;
        Ok(())
    }
}

#[cfg(feature = "postgres")]
#[async_trait]
impl IdentityLinkRepository for SqlLinkStore<sqlx::Postgres> {
    async fn find_local_user(
        &self,
        plugin_id: &str,
        provider_user_id: &str,
    ) -> Result<Option<UserId>, AuthError> {
        let query = format!(
            "SELECT user_id FROM {} WHERE plugin_id = $1 AND provider_user_id = $2",
            self.table_name
        );
        let user_id: Option<i64> = sqlx::query_scalar(&query)
            .bind(plugin_id)
            .bind(provider_user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Postgres", "find_local_user", e))?;
        Ok(user_id.map(|id| id as UserId))
    }

    async fn create_link(&self, link: NewIdentityLink) -> Result<IdentityLink, AuthError> {
        let query = format!(
            "INSERT INTO {} (user_id, plugin_id, provider_user_id, token, additional_data, created)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {COLUMNS}",
            self.table_name
        );
        let row: LinkRow = sqlx::query_as(&query)
            .bind(link.user_id as i64)
            .bind(&link.plugin_id)
            .bind(&link.provider_user_id)
            .bind(&link.token)
            .bind(encode_data(&link.additional_data)?)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    crate::duplicate_link(&link.plugin_id, &link.provider_user_id)
                } else {
                    db_error("Postgres", "create_link", e)
                }
            })?;
        into_link(row)
    }

    async fn load_link(&self, id: u64) -> Result<Option<IdentityLink>, AuthError> {
        let query = format!("SELECT {COLUMNS} FROM {} WHERE id = $1", self.table_name);
        let row: Option<LinkRow> = sqlx::query_as(&query)
            .bind(id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Postgres", "load_link", e))?;
        row.map(into_link).transpose()
    }

    async fn links_for_user(&self, user_id: UserId) -> Result<Vec<IdentityLink>, AuthError> {
        let query = format!(
            "SELECT {COLUMNS} FROM {} WHERE user_id = $1 ORDER BY id",
            self.table_name
        );
        let rows: Vec<LinkRow> = sqlx::query_as(&query)
            .bind(user_id as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Postgres", "links_for_user", e))?;
        rows.into_iter().map(into_link).collect()
    }

    async fn delete_link(&self, id: u64) -> Result<bool, AuthError> {
        let query = format!("DELETE FROM {} WHERE id = $1", self.table_name);
        let result = sqlx::query(&query)
            .bind(id as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Postgres", "delete_link", e))?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqlLinkStore<sqlx::Sqlite> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqlLinkStore::new(pool);
        store.migrate().await.unwrap();
        store
    }

    fn google_link(user_id: UserId, provider_user_id: &str) -> NewIdentityLink {
        let mut data = DataMap::new();
        data.insert("calendar".into(), serde_json::json!({"items": []}));
        NewIdentityLink {
            user_id,
            plugin_id: "social_auth_google".into(),
            provider_user_id: provider_user_id.into(),
            token: "ya29.token".into(),
            additional_data: Some(data),
        }
    }

    #[tokio::test]
    async fn stores_and_resolves_links() {
        let store = store().await;
        let link = store.create_link(google_link(3, "42")).await.unwrap();
        assert_eq!(link.user_id, 3);

        assert_eq!(
            store.find_local_user("social_auth_google", "42").await.unwrap(),
            Some(3)
        );
        assert_eq!(store.find_local_user("social_auth_github", "42").await.unwrap(), None);

        let loaded = store.load_link(link.id).await.unwrap().unwrap();
        assert_eq!(loaded.token, "ya29.token");
        assert!(loaded.additional_data.unwrap().contains_key("calendar"));
    }

    #[tokio::test]
    async fn unique_constraint_maps_to_persistence_error() {
        let store = store().await;
        store.create_link(google_link(3, "42")).await.unwrap();
        let err = store.create_link(google_link(4, "42")).await.unwrap_err();
        assert!(matches!(err, AuthError::Persistence(msg) if msg.contains("already exists")));
        assert_eq!(store.links_for_user(4).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_was_removed() {
        let store = store().await;
        let link = store.create_link(google_link(3, "42")).await.unwrap();
        assert!(store.delete_link(link.id).await.unwrap());
        assert!(!store.delete_link(link.id).await.unwrap());
    }
}
