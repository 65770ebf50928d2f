use async_trait::async_trait;
use socialink_core::{
    AuthError, IdentityLink, IdentityLinkRepository, LocalUser, NewIdentityLink, UserFields,
    UserId, UserStore,
};
use std::collections::BTreeMap;
use std::sync::Mutex;

fn poisoned<T>(_: T) -> AuthError {
    AuthError::Persistence("memory store lock poisoned".to_string())
}

#[derive(Debug, Default)]
struct Links {
    next_id: u64,
    records: BTreeMap<u64, IdentityLink>,
}

/// In-process identity link repository.
///
/// Duplicate detection and insertion happen under one lock, so of two concurrent writers for
/// the same `(plugin_id, provider_user_id)` exactly one succeeds.
#[derive(Debug, Default)]
pub struct MemoryLinkStore {
    inner: Mutex<Links>,
}

impl MemoryLinkStore {
    /// Number of stored links.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|l| l.records.len()).unwrap_or(0)
    }

    /// Whether no link is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl IdentityLinkRepository for MemoryLinkStore {
    async fn find_local_user(
        &self,
        plugin_id: &str,
        provider_user_id: &str,
    ) -> Result<Option<UserId>, AuthError> {
        let links = self.inner.lock().map_err(poisoned)?;
        Ok(links
            .records
            .values()
            .find(|l| l.plugin_id == plugin_id && l.provider_user_id == provider_user_id)
            .map(|l| l.user_id))
    }

    async fn create_link(&self, link: NewIdentityLink) -> Result<IdentityLink, AuthError> {
        let mut links = self.inner.lock().map_err(poisoned)?;
        let exists = links.records.values().any(|l| {
            l.plugin_id == link.plugin_id && l.provider_user_id == link.provider_user_id
        });
        if exists {
            return Err(crate::duplicate_link(&link.plugin_id, &link.provider_user_id));
        }

        links.next_id += 1;
        let record = IdentityLink {
            id: links.next_id,
            user_id: link.user_id,
            plugin_id: link.plugin_id,
            provider_user_id: link.provider_user_id,
            token: link.token,
            additional_data: link.additional_data,
            created: chrono::Utc::now(),
        };
        links.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn load_link(&self, id: u64) -> Result<Option<IdentityLink>, AuthError> {
        Ok(self.inner.lock().map_err(poisoned)?.records.get(&id).cloned())
    }

    async fn links_for_user(&self, user_id: UserId) -> Result<Vec<IdentityLink>, AuthError> {
        let links = self.inner.lock().map_err(poisoned)?;
        Ok(links
            .records
            .values()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_link(&self, id: u64) -> Result<bool, AuthError> {
        Ok(self
            .inner
            .lock()
            .map_err(poisoned)?
            .records
            .remove(&id)
            .is_some())
    }
}

#[derive(Debug, Default)]
struct Users {
    next_id: UserId,
    records: BTreeMap<UserId, LocalUser>,
}

/// In-process local account storage.
///
/// Email and name lookups are case-insensitive.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    inner: Mutex<Users>,
}

impl MemoryUserStore {
    /// Insert an account directly, assigning the next id.
    pub fn add_user(
        &self,
        name: &str,
        email: Option<&str>,
        roles: &[&str],
        active: bool,
    ) -> Result<LocalUser, AuthError> {
        let mut users = self.inner.lock().map_err(poisoned)?;
        users.next_id += 1;
        let user = LocalUser {
            id: users.next_id,
            name: name.to_string(),
            email: email.map(str::to_string),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            active,
            picture: None,
            langcode: "en".to_string(),
        };
        users.records.insert(user.id, user.clone());
        Ok(user)
    }

    /// Block or unblock an account.
    pub fn set_active(&self, id: UserId, active: bool) -> Result<(), AuthError> {
        let mut users = self.inner.lock().map_err(poisoned)?;
        match users.records.get_mut(&id) {
            Some(user) => {
                user.active = active;
                Ok(())
            }
            None => Err(AuthError::Persistence(format!("user {id} not found"))),
        }
    }

    /// Number of stored accounts.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|u| u.records.len()).unwrap_or(0)
    }

    /// Whether no account is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find(&self, pred: impl Fn(&LocalUser) -> bool) -> Result<Option<LocalUser>, AuthError> {
        let users = self.inner.lock().map_err(poisoned)?;
        Ok(users.records.values().find(|u| pred(u)).cloned())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn load_by_id(&self, id: UserId) -> Result<Option<LocalUser>, AuthError> {
        Ok(self.inner.lock().map_err(poisoned)?.records.get(&id).cloned())
    }

    async fn load_by_email(&self, email: &str) -> Result<Option<LocalUser>, AuthError> {
        self.find(|u| {
            u.email
                .as_deref()
                .is_some_and(|m| m.eq_ignore_ascii_case(email))
        })
    }

    async fn load_by_name(&self, name: &str) -> Result<Option<LocalUser>, AuthError> {
        self.find(|u| u.name.eq_ignore_ascii_case(name))
    }

    async fn create_user(&self, fields: UserFields) -> Result<LocalUser, AuthError> {
        let mut users = self.inner.lock().map_err(poisoned)?;
        if users
            .records
            .values()
            .any(|u| u.name.eq_ignore_ascii_case(&fields.name))
        {
            return Err(AuthError::Persistence(format!(
                "username {} is already taken",
                fields.name
            )));
        }

        users.next_id += 1;
        let user = LocalUser {
            id: users.next_id,
            name: fields.name,
            email: fields.mail,
            roles: fields.roles,
            active: fields.status,
            picture: fields.user_picture,
            langcode: fields.langcode,
        };
        users.records.insert(user.id, user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_link(user_id: UserId, plugin: &str, provider_user_id: &str) -> NewIdentityLink {
        NewIdentityLink {
            user_id,
            plugin_id: plugin.to_string(),
            provider_user_id: provider_user_id.to_string(),
            token: "token".to_string(),
            additional_data: None,
        }
    }

    #[tokio::test]
    async fn created_link_resolves_to_its_user() {
        let store = MemoryLinkStore::default();
        for (uid, plugin, puid) in [
            (1, "social_auth_google", "42"),
            (2, "social_auth_github", "42"),
            (1, "social_auth_github", "7"),
        ] {
            store.create_link(new_link(uid, plugin, puid)).await.unwrap();
            assert_eq!(
                store.find_local_user(plugin, puid).await.unwrap(),
                Some(uid)
            );
        }
        assert_eq!(store.links_for_user(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn second_link_for_same_identity_fails() {
        let store = MemoryLinkStore::default();
        store
            .create_link(new_link(1, "social_auth_google", "42"))
            .await
            .unwrap();
        let err = store
            .create_link(new_link(2, "social_auth_google", "42"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Persistence(_)));
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.find_local_user("social_auth_google", "42").await.unwrap(),
            Some(1)
        );
    }

    #[tokio::test]
    async fn delete_removes_link() {
        let store = MemoryLinkStore::default();
        let link = store
            .create_link(new_link(1, "social_auth_google", "42"))
            .await
            .unwrap();
        assert!(store.delete_link(link.id).await.unwrap());
        assert!(!store.delete_link(link.id).await.unwrap());
        assert!(store
            .find_local_user("social_auth_google", "42")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn user_lookups_ignore_case() {
        let users = MemoryUserStore::default();
        let jane = users
            .add_user("janedoe", Some("Jane@Example.com"), &[], true)
            .unwrap();
        assert_eq!(
            users.load_by_email("jane@example.com").await.unwrap(),
            Some(jane.clone())
        );
        assert_eq!(users.load_by_name("JaneDoe").await.unwrap(), Some(jane));
    }

    #[tokio::test]
    async fn create_user_rejects_taken_name() {
        let users = MemoryUserStore::default();
        users.add_user("janedoe", None, &[], true).unwrap();
        let fields = UserFields {
            name: "janedoe".into(),
            ..Default::default()
        };
        assert!(users.create_user(fields).await.is_err());
    }
}
