use rand::{distr::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier of a local account.
pub type UserId = u64;

/// Free-form provider or hook supplied data.
pub type DataMap = HashMap<String, serde_json::Value>;

/// Generate a random alphanumeric token of the given length.
pub fn random_token(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Represents the tokens returned by an OAuth2 provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthToken {
    /// The access token used for authorization.
    pub access_token: String,
    /// The type of the token (e.g., "Bearer").
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// The duration in seconds until the access token expires.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// An optional refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Space separated scopes granted by the provider.
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl OAuthToken {
    /// Create a bearer token with only an access token set.
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            expires_in: None,
            refresh_token: None,
            scope: None,
        }
    }
}

/// A profile returned by an external identity provider.
///
/// Produced fresh on every callback and never persisted directly. The engine fills in
/// `picture` once a profile picture has been downloaded, and hooks may append to
/// `custom_data`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExternalProfile {
    /// Display name.
    pub name: String,
    /// The user's id at the provider.
    pub provider_user_id: String,
    /// Access token used to fetch this profile.
    pub access_token: String,
    /// Email address, if the provider shared one.
    pub email: Option<String>,
    /// Remote profile picture.
    pub picture_url: Option<String>,
    /// Given name.
    pub first_name: Option<String>,
    /// Family name.
    pub last_name: Option<String>,
    /// Data collected from configured extra endpoints.
    pub additional_data: Option<DataMap>,
    /// Data appended by hooks.
    pub custom_data: DataMap,
    /// Local file id of the downloaded picture.
    pub picture: Option<String>,
}

impl ExternalProfile {
    /// Create a profile with the mandatory fields.
    pub fn new(
        name: impl Into<String>,
        provider_user_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            provider_user_id: provider_user_id.into(),
            access_token: access_token.into(),
            ..Default::default()
        }
    }

    /// Set the email address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set the remote picture URL.
    pub fn with_picture_url(mut self, url: impl Into<String>) -> Self {
        self.picture_url = Some(url.into());
        self
    }

    /// Store a custom value under `key`.
    pub fn add_data(&mut self, key: impl Into<String>, value: serde_json::Value) -> &mut Self {
        self.custom_data.insert(key.into(), value);
        self
    }

    /// Read a custom value.
    pub fn data(&self, key: &str) -> Option<&serde_json::Value> {
        self.custom_data.get(key)
    }
}

/// A local account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalUser {
    /// Account id.
    pub id: UserId,
    /// Unique account name.
    pub name: String,
    /// Email address.
    pub email: Option<String>,
    /// Role identifiers held by the account.
    pub roles: Vec<String>,
    /// Whether the account may log in.
    pub active: bool,
    /// Local file id of the profile picture.
    pub picture: Option<String>,
    /// Preferred language.
    pub langcode: String,
}

/// The field set a new local account is created from.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UserFields {
    /// Unique account name.
    pub name: String,
    /// Email address.
    pub mail: Option<String>,
    /// Email address the account was initially registered with.
    pub init: Option<String>,
    /// Generated password.
    pub pass: String,
    /// `true` for active, `false` for blocked.
    pub status: bool,
    /// Language of the account.
    pub langcode: String,
    /// Preferred UI language.
    pub preferred_langcode: String,
    /// Preferred administration language.
    pub preferred_admin_langcode: String,
    /// Local file id of the profile picture.
    pub user_picture: Option<String>,
    /// Roles granted on creation.
    pub roles: Vec<String>,
    /// Any other field a hook wants persisted.
    pub extra: DataMap,
}

/// Persistent association between a local account and one provider identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentityLink {
    /// Record id.
    pub id: u64,
    /// Owning local account.
    pub user_id: UserId,
    /// Provider plugin id.
    pub plugin_id: String,
    /// The user's id at the provider.
    pub provider_user_id: String,
    /// Access token captured when the link was created.
    pub token: String,
    /// Extra profile data captured when the link was created.
    pub additional_data: Option<DataMap>,
    /// Creation time.
    pub created: chrono::DateTime<chrono::Utc>,
}

/// Values for a link that has not been stored yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewIdentityLink {
    /// Owning local account.
    pub user_id: UserId,
    /// Provider plugin id.
    pub plugin_id: String,
    /// The user's id at the provider.
    pub provider_user_id: String,
    /// Access token.
    pub token: String,
    /// Extra profile data.
    pub additional_data: Option<DataMap>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_token_has_requested_length() {
        let token = random_token(32);
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, random_token(32));
    }

    #[test]
    fn token_defaults_to_bearer() {
        let token: OAuthToken = serde_json::from_str(r#"{"access_token":"abc"}"#).unwrap();
        assert_eq!(token, OAuthToken::bearer("abc"));
    }

    #[test]
    fn profile_custom_data() {
        let mut profile = ExternalProfile::new("Jane Doe", "42", "tok").with_email("jane@example.com");
        profile.add_data("team", serde_json::json!("blue"));
        assert_eq!(profile.data("team"), Some(&serde_json::json!("blue")));
        assert_eq!(profile.email.as_deref(), Some("jane@example.com"));
        assert!(profile.additional_data.is_none());
    }
}
