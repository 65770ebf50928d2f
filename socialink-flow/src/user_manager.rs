use crate::hooks::{UserCreatedEvent, UserFieldsEvent};
use crate::FlowContext;
use socialink_core::{
    state::random_token, AuthError, ExternalProfile, IdentityLink, LocalUser, NewIdentityLink,
    UserFields, UserId,
};

/// Maximum length of a generated account name.
pub const USERNAME_MAX_LENGTH: usize = 60;

const PASSWORD_LENGTH: usize = 32;

/// Normalize a display name into an account name base: spaces removed, lowercased, truncated.
///
/// Truncation comes last since lowercasing may expand a character.
pub fn username_base(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| *c != ' ')
        .take(USERNAME_MAX_LENGTH)
        .collect()
}

/// The `i`-th candidate for `base`, truncating `base` so the result stays within the limit.
pub fn username_candidate(base: &str, i: usize) -> String {
    let suffix = i.to_string();
    let keep = USERNAME_MAX_LENGTH.saturating_sub(suffix.len() + 1);
    let mut candidate: String = base.chars().take(keep).collect();
    candidate.push_str(&suffix);
    candidate
}

/// Creates local accounts and identity links for one provider plugin.
pub struct UserManager {
    plugin_id: String,
    ctx: FlowContext,
}

impl UserManager {
    /// A manager acting for the provider `plugin_id`.
    pub fn new(plugin_id: impl Into<String>, ctx: FlowContext) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            ctx,
        }
    }

    /// The provider plugin id.
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// The local user linked to `provider_user_id` through this plugin.
    pub async fn linked_user_id(&self, provider_user_id: &str) -> Result<Option<UserId>, AuthError> {
        self.ctx
            .links
            .find_local_user(&self.plugin_id, provider_user_id)
            .await
    }

    /// Load a local account by id.
    pub async fn load_user_by_id(&self, id: UserId) -> Result<Option<LocalUser>, AuthError> {
        self.ctx.users.load_by_id(id).await
    }

    /// Load a local account by email address.
    pub async fn load_user_by_email(&self, email: &str) -> Result<Option<LocalUser>, AuthError> {
        self.ctx.users.load_by_email(email).await
    }

    /// Link `user_id` to the provider identity of `profile`.
    pub async fn add_user_record(
        &self,
        user_id: UserId,
        profile: &ExternalProfile,
    ) -> Result<IdentityLink, AuthError> {
        if profile.provider_user_id.is_empty() {
            log::error!(
                target: self.plugin_id.as_str(),
                "Failed to add user record. User id: {}, provider user id is empty",
                user_id
            );
            return Err(AuthError::Persistence("empty provider user id".into()));
        }

        let link = self
            .ctx
            .links
            .create_link(NewIdentityLink {
                user_id,
                plugin_id: self.plugin_id.clone(),
                provider_user_id: profile.provider_user_id.clone(),
                token: profile.access_token.clone(),
                additional_data: profile.additional_data.clone(),
            })
            .await
            .inspect_err(|e| {
                log::error!(target: self.plugin_id.as_str(), "Failed to add user record: {e}")
            })?;

        log::info!(
            target: self.plugin_id.as_str(),
            "Linked provider user {} to user {}",
            link.provider_user_id,
            user_id
        );
        Ok(link)
    }

    /// Derive a free account name from a display name.
    pub async fn generate_unique_username(&self, name: &str) -> Result<String, AuthError> {
        let base = username_base(name);
        let mut candidate = base.clone();
        let mut i = 1;
        while self.ctx.users.load_by_name(&candidate).await?.is_some() {
            candidate = username_candidate(&base, i);
            i += 1;
        }
        Ok(candidate.trim().to_string())
    }

    /// Assemble the initial fields of a new account and let hooks alter them.
    pub async fn user_fields(
        &self,
        profile: &mut ExternalProfile,
        langcode: &str,
    ) -> Result<UserFields, AuthError> {
        let mut fields = UserFields {
            name: self.generate_unique_username(&profile.name).await?,
            mail: profile.email.clone(),
            init: profile.email.clone(),
            pass: random_token(PASSWORD_LENGTH),
            status: !self.ctx.settings.is_approval_required(),
            langcode: langcode.to_string(),
            preferred_langcode: langcode.to_string(),
            preferred_admin_langcode: langcode.to_string(),
            user_picture: profile.picture.clone(),
            ..Default::default()
        };

        self.ctx.hooks.dispatch_user_fields(&mut UserFieldsEvent {
            plugin_id: &self.plugin_id,
            profile,
            fields: &mut fields,
        })?;
        Ok(fields)
    }

    /// Register a new account for `profile` and link it.
    ///
    /// Downloads the profile picture first when a picture store is configured. Hook failures
    /// come back as [`AuthError::Hook`]; every other error means no usable account exists.
    pub async fn create_new_user(
        &self,
        profile: &mut ExternalProfile,
        langcode: &str,
    ) -> Result<LocalUser, AuthError> {
        if profile.picture_url.is_some() {
            self.set_profile_picture(profile).await;
        }

        let user = self.create_user(profile, langcode).await?;
        self.add_user_record(user.id, profile).await?;
        Ok(user)
    }

    async fn create_user(
        &self,
        profile: &mut ExternalProfile,
        langcode: &str,
    ) -> Result<LocalUser, AuthError> {
        let plugin = self.plugin_id.as_str();
        if self.ctx.settings.is_registration_disabled() {
            log::warn!(
                target: plugin,
                "Failed to create user. User registration is disabled. Name: {}, email: {:?}",
                profile.name,
                profile.email
            );
            return Err(AuthError::RegistrationDisabled);
        }

        if profile.name.trim().is_empty() {
            log::error!(target: plugin, "Failed to create user. Name: {}", profile.name);
            return Err(AuthError::ProfileFetch("profile has no name".into()));
        }

        let fields = self.user_fields(profile, langcode).await?;
        let user = self
            .ctx
            .users
            .create_user(fields)
            .await
            .inspect_err(|e| log::error!(target: plugin, "Could not create new user: {e}"))?;

        log::info!(
            target: plugin,
            "New user created. Username {}, UID: {}",
            user.name,
            user.id
        );

        self.ctx.hooks.dispatch_user_created(&UserCreatedEvent {
            plugin_id: plugin,
            user: &user,
            profile: &*profile,
        })?;
        Ok(user)
    }

    async fn set_profile_picture(&self, profile: &mut ExternalProfile) {
        let (Some(store), Some(url)) = (&self.ctx.pictures, profile.picture_url.as_deref()) else {
            return;
        };
        match store
            .save_picture(&self.plugin_id, &profile.provider_user_id, url)
            .await
        {
            Ok(file_id) => profile.picture = Some(file_id),
            Err(e) => log::error!(
                target: self.plugin_id.as_str(),
                "Could not download profile picture from url {url}: {e}"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{Hooks, UserCreatedHook, UserFieldsHook};
    use crate::settings::{SiteRegistration, SocialAuthSettings};
    use async_trait::async_trait;
    use socialink_core::PictureStore;
    use socialink_store::{MemoryLinkStore, MemoryUserStore};
    use std::sync::{Arc, Mutex};

    fn manager_with(
        users: Arc<MemoryUserStore>,
        settings: SocialAuthSettings,
        hooks: Hooks,
    ) -> UserManager {
        let ctx = FlowContext::new(users, Arc::new(MemoryLinkStore::default()))
            .with_settings(settings)
            .with_hooks(hooks);
        UserManager::new("social_auth_google", ctx)
    }

    fn manager(users: Arc<MemoryUserStore>) -> UserManager {
        manager_with(users, SocialAuthSettings::default(), Hooks::default())
    }

    #[test]
    fn base_is_lowercased_without_spaces() {
        assert_eq!(username_base("Jane Doe"), "janedoe");
        assert_eq!(username_base(&"a".repeat(80)).len(), USERNAME_MAX_LENGTH);
    }

    #[tokio::test]
    async fn expanding_lowercase_stays_within_limit() {
        // 'İ' lowercases to two chars.
        assert_eq!(username_base("İ").chars().count(), 2);
        assert_eq!(
            username_base(&"İ".repeat(USERNAME_MAX_LENGTH)).chars().count(),
            USERNAME_MAX_LENGTH
        );

        let users = Arc::new(MemoryUserStore::default());
        let manager = manager(users.clone());
        let long = "İ".repeat(USERNAME_MAX_LENGTH);
        let first = manager.generate_unique_username(&long).await.unwrap();
        assert!(first.chars().count() <= USERNAME_MAX_LENGTH);
        users.add_user(&first, None, &[], true).unwrap();

        let second = manager.generate_unique_username(&long).await.unwrap();
        assert_ne!(first, second);
        assert!(second.chars().count() <= USERNAME_MAX_LENGTH);
    }

    #[test]
    fn candidates_stay_within_limit() {
        let base = "x".repeat(USERNAME_MAX_LENGTH);
        for i in [1, 9, 10, 99, 100, 12345] {
            let candidate = username_candidate(&base, i);
            assert!(candidate.len() < USERNAME_MAX_LENGTH);
            assert!(candidate.ends_with(&i.to_string()));
        }
        assert_eq!(username_candidate("janedoe", 2), "janedoe2");
    }

    #[tokio::test]
    async fn suffixes_increase_until_free() {
        let users = Arc::new(MemoryUserStore::default());
        let manager = manager(users.clone());
        let mut names = Vec::new();
        for _ in 0..4 {
            let name = manager.generate_unique_username("Jane Doe").await.unwrap();
            users.add_user(&name, None, &[], true).unwrap();
            names.push(name);
        }
        assert_eq!(names, vec!["janedoe", "janedoe1", "janedoe2", "janedoe3"]);
    }

    #[tokio::test]
    async fn approval_creates_blocked_accounts() {
        let users = Arc::new(MemoryUserStore::default());
        let settings = SocialAuthSettings {
            site_registration: SiteRegistration::VisitorsAdminApproval,
            ..Default::default()
        };
        let manager = manager_with(users, settings, Hooks::default());
        let fields = manager
            .user_fields(&mut ExternalProfile::new("Jane Doe", "42", "t"), "fr")
            .await
            .unwrap();
        assert!(!fields.status);
        assert_eq!(fields.pass.len(), 32);
        assert_eq!(fields.preferred_admin_langcode, "fr");
    }

    struct AddRole;

    impl UserFieldsHook for AddRole {
        fn on_user_fields(&self, event: &mut UserFieldsEvent<'_>) -> Result<(), AuthError> {
            event.fields.roles.push("social".into());
            Ok(())
        }
    }

    #[tokio::test]
    async fn fields_hook_reaches_storage() {
        let users = Arc::new(MemoryUserStore::default());
        let manager = manager_with(
            users.clone(),
            SocialAuthSettings::default(),
            Hooks::builder().user_fields(AddRole).build(),
        );
        let mut profile = ExternalProfile::new("Jane Doe", "42", "t").with_email("jane@example.com");
        let user = manager.create_new_user(&mut profile, "en").await.unwrap();
        assert_eq!(user.roles, vec!["social"]);
        assert_eq!(
            manager.linked_user_id("42").await.unwrap(),
            Some(user.id)
        );
    }

    struct StampSource;

    impl UserFieldsHook for StampSource {
        fn on_user_fields(&self, event: &mut UserFieldsEvent<'_>) -> Result<(), AuthError> {
            event
                .profile
                .add_data("source", serde_json::json!(event.plugin_id));
            Ok(())
        }
    }

    struct ReadSource(Arc<Mutex<Option<serde_json::Value>>>);

    impl UserCreatedHook for ReadSource {
        fn on_user_created(&self, event: &UserCreatedEvent<'_>) -> Result<(), AuthError> {
            *self.0.lock().unwrap() = event.profile.data("source").cloned();
            Ok(())
        }
    }

    #[tokio::test]
    async fn custom_data_flows_from_fields_hook_to_created_hook() {
        let seen = Arc::new(Mutex::new(None));
        let manager = manager_with(
            Arc::new(MemoryUserStore::default()),
            SocialAuthSettings::default(),
            Hooks::builder()
                .user_fields(StampSource)
                .user_created(ReadSource(seen.clone()))
                .build(),
        );
        let mut profile = ExternalProfile::new("Jane Doe", "42", "t");
        manager.create_new_user(&mut profile, "en").await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            Some(serde_json::json!("social_auth_google"))
        );
        assert_eq!(
            profile.data("source"),
            Some(&serde_json::json!("social_auth_google"))
        );
    }

    #[tokio::test]
    async fn nameless_profiles_are_rejected() {
        let users = Arc::new(MemoryUserStore::default());
        let manager = manager(users.clone());
        let mut profile = ExternalProfile::new("  ", "42", "t");
        assert!(manager.create_new_user(&mut profile, "en").await.is_err());
        assert!(users.is_empty());
    }

    struct FixedPicture;

    #[async_trait]
    impl PictureStore for FixedPicture {
        async fn save_picture(&self, plugin_id: &str, id: &str, _: &str) -> Result<String, AuthError> {
            Ok(format!("public://pictures/{plugin_id}_{id}.jpg"))
        }
    }

    #[tokio::test]
    async fn picture_is_stored_on_the_account() {
        let users = Arc::new(MemoryUserStore::default());
        let ctx = FlowContext::new(users, Arc::new(MemoryLinkStore::default()))
            .with_picture_store(Arc::new(FixedPicture));
        let manager = UserManager::new("social_auth_google", ctx);
        let mut profile =
            ExternalProfile::new("Jane Doe", "42", "t").with_picture_url("https://cdn/p.jpg");
        let user = manager.create_new_user(&mut profile, "en").await.unwrap();
        assert_eq!(
            user.picture.as_deref(),
            Some("public://pictures/social_auth_google_42.jpg")
        );
    }
}
