//! # Socialink Core
//!
//! `socialink-core` provides the foundational traits and types for the Socialink social login framework.
//! It defines the provider adapter contract, the local account and identity link abstractions, and
//! the error taxonomy shared by every other crate in the workspace.

#![warn(missing_docs)]

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Errors that can occur during the authentication process.
pub mod error;
pub use crate::error::{AuthError, GateFailure};

/// Profiles, tokens, local users and identity links.
pub mod state;
pub use crate::state::{
    DataMap, ExternalProfile, IdentityLink, LocalUser, NewIdentityLink, OAuthToken, UserFields,
    UserId,
};

/// Controls whether a cookie is sent with cross-site requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    /// The cookie is sent with "safe" cross-site requests (e.g., following a link).
    Lax,
    /// The cookie is only sent for same-site requests.
    Strict,
    /// The cookie is sent with all requests, including cross-site. Requires `Secure`.
    None,
}

/// Trait for an OAuth2-compatible provider adapter.
///
/// Side effects are confined to outbound HTTP calls to the provider. Every failure is
/// reported as a typed [`AuthError`].
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Get the provider plugin identifier (e.g. `social_auth_google`).
    fn provider_id(&self) -> &str;

    /// Scopes always requested, before any configured extras.
    fn base_scopes(&self) -> &[&str];

    /// Generate a fresh anti-forgery state nonce for the next authorization request.
    fn new_state(&self) -> String {
        state::random_token(32)
    }

    /// Helper to get the authorization URL.
    fn get_authorization_url(&self, state: &str, scopes: &[&str]) -> String;

    /// Exchange an authorization code for an access token.
    async fn exchange_code_for_token(&self, code: &str) -> Result<OAuthToken, AuthError>;

    /// Fetch the external profile of the token's owner.
    async fn fetch_profile(&self, token: &OAuthToken) -> Result<ExternalProfile, AuthError>;

    /// Request an arbitrary provider API path with the given token and return the parsed body.
    async fn request_endpoint(
        &self,
        _token: &OAuthToken,
        _path: &str,
    ) -> Result<serde_json::Value, AuthError> {
        Err(AuthError::Provider(
            "Endpoint requests not supported by this provider".into(),
        ))
    }
}

/// Access to the local account storage.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Load a user by id.
    async fn load_by_id(&self, id: UserId) -> Result<Option<LocalUser>, AuthError>;

    /// Load a user by email address.
    async fn load_by_email(&self, email: &str) -> Result<Option<LocalUser>, AuthError>;

    /// Load a user by account name.
    async fn load_by_name(&self, name: &str) -> Result<Option<LocalUser>, AuthError>;

    /// Persist a new user built from the given fields.
    async fn create_user(&self, fields: UserFields) -> Result<LocalUser, AuthError>;
}

/// Persistent mapping of `(plugin_id, provider_user_id)` to local users.
///
/// Implementations must reject a second link for the same pair with
/// [`AuthError::Persistence`].
#[async_trait]
pub trait IdentityLinkRepository: Send + Sync {
    /// Find the local user linked to the given provider identity.
    async fn find_local_user(
        &self,
        plugin_id: &str,
        provider_user_id: &str,
    ) -> Result<Option<UserId>, AuthError>;

    /// Create a new link.
    async fn create_link(&self, link: NewIdentityLink) -> Result<IdentityLink, AuthError>;

    /// Load a link record by id.
    async fn load_link(&self, id: u64) -> Result<Option<IdentityLink>, AuthError>;

    /// List every link owned by a local user.
    async fn links_for_user(&self, user_id: UserId) -> Result<Vec<IdentityLink>, AuthError>;

    /// Delete a link record. Returns whether a record was removed.
    async fn delete_link(&self, id: u64) -> Result<bool, AuthError>;
}

/// Stores downloaded profile pictures and hands back a local file id.
#[async_trait]
pub trait PictureStore: Send + Sync {
    /// Download `url` for the given provider identity and return the stored file id.
    async fn save_picture(
        &self,
        plugin_id: &str,
        provider_user_id: &str,
        url: &str,
    ) -> Result<String, AuthError>;
}
