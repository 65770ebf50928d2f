//! Who may see and remove identity link records.

use socialink_core::{AuthError, IdentityLink, IdentityLinkRepository, UserId};
use std::collections::HashSet;

/// Grants every operation on every user's links.
pub const ADMINISTER_USERS: &str = "administer users";
/// Grants every operation on link records.
pub const ADMINISTER_PROFILES: &str = "administer social auth profiles";
/// Lets an account list and delete its own links.
pub const DELETE_OWN: &str = "delete own social auth profile";

/// Operation attempted on a link record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOperation {
    ViewLabel,
    View,
    Delete,
}

/// The account performing an operation, with its granted permissions.
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub user_id: UserId,
    pub permissions: HashSet<String>,
}

impl Actor {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            permissions: HashSet::new(),
        }
    }

    pub fn with_permission(mut self, permission: &str) -> Self {
        self.permissions.insert(permission.to_string());
        self
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    fn is_admin(&self) -> bool {
        self.has_permission(ADMINISTER_USERS) || self.has_permission(ADMINISTER_PROFILES)
    }
}

/// Decide whether `actor` may perform `op` on a link owned by `owner`.
pub fn check_access(actor: &Actor, op: LinkOperation, owner: UserId) -> bool {
    match op {
        LinkOperation::ViewLabel => true,
        LinkOperation::View | LinkOperation::Delete => {
            actor.is_admin() || (actor.has_permission(DELETE_OWN) && actor.user_id == owner)
        }
    }
}

/// List the links owned by `owner`, if `actor` may see them.
pub async fn links_for<R>(
    repo: &R,
    actor: &Actor,
    owner: UserId,
) -> Result<Vec<IdentityLink>, AuthError>
where
    R: IdentityLinkRepository + ?Sized,
{
    if !check_access(actor, LinkOperation::View, owner) {
        return Err(AuthError::AccessDenied(format!(
            "user {} may not list links of user {owner}",
            actor.user_id
        )));
    }
    repo.links_for_user(owner).await
}

/// Delete link `id` on behalf of `actor`. Returns `Ok(false)` if the link does not exist.
pub async fn delete_link_as<R>(repo: &R, actor: &Actor, id: u64) -> Result<bool, AuthError>
where
    R: IdentityLinkRepository + ?Sized,
{
    let Some(link) = repo.load_link(id).await? else {
        return Ok(false);
    };
    if !check_access(actor, LinkOperation::Delete, link.user_id) {
        return Err(AuthError::AccessDenied(format!(
            "user {} may not delete link {id}",
            actor.user_id
        )));
    }
    log::info!(
        target: link.plugin_id.as_str(),
        "Link {} for user {} deleted by user {}",
        id,
        link.user_id,
        actor.user_id
    );
    repo.delete_link(id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryLinkStore;
    use socialink_core::NewIdentityLink;

    async fn store_with_link(owner: UserId) -> (MemoryLinkStore, u64) {
        let store = MemoryLinkStore::default();
        let link = store
            .create_link(NewIdentityLink {
                user_id: owner,
                plugin_id: "social_auth_google".into(),
                provider_user_id: "42".into(),
                token: "t".into(),
                additional_data: None,
            })
            .await
            .unwrap();
        (store, link.id)
    }

    #[test]
    fn view_label_is_always_allowed() {
        assert!(check_access(&Actor::new(9), LinkOperation::ViewLabel, 1));
    }

    #[test]
    fn delete_rules() {
        let owner = Actor::new(1).with_permission(DELETE_OWN);
        let stranger = Actor::new(2).with_permission(DELETE_OWN);
        let admin = Actor::new(3).with_permission(ADMINISTER_USERS);
        let profile_admin = Actor::new(4).with_permission(ADMINISTER_PROFILES);

        assert!(check_access(&owner, LinkOperation::Delete, 1));
        assert!(!check_access(&stranger, LinkOperation::Delete, 1));
        assert!(!check_access(&Actor::new(1), LinkOperation::Delete, 1));
        assert!(check_access(&admin, LinkOperation::Delete, 1));
        assert!(check_access(&profile_admin, LinkOperation::Delete, 1));
    }

    #[tokio::test]
    async fn stranger_cannot_delete() {
        let (store, id) = store_with_link(1).await;
        let err = delete_link_as(&store, &Actor::new(2).with_permission(DELETE_OWN), id)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccessDenied(_)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn owner_deletes_and_lists() {
        let (store, id) = store_with_link(1).await;
        let owner = Actor::new(1).with_permission(DELETE_OWN);
        assert_eq!(links_for(&store, &owner, 1).await.unwrap().len(), 1);
        assert!(delete_link_as(&store, &owner, id).await.unwrap());
        assert!(store.is_empty());
        assert!(!delete_link_as(&store, &owner, id).await.unwrap());
    }
}
