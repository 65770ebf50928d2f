use serde::{Deserialize, Serialize};
use socialink_core::{AuthError, UserId};
use std::str::FromStr;

const ENV_PREFIX: &str = "SOCIALINK_";

/// Whether social login may register new local accounts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAllowed {
    /// Register unknown users and log them in.
    #[default]
    Register,
    /// Only log in users that already exist.
    Login,
}

impl FromStr for UserAllowed {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "register" => Ok(Self::Register),
            "login" => Ok(Self::Login),
            other => Err(AuthError::Configuration(format!(
                "unknown user_allowed value '{other}'"
            ))),
        }
    }
}

/// The site-wide account registration policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteRegistration {
    /// Visitors can create accounts.
    #[default]
    Visitors,
    /// Visitors can create accounts but an administrator must approve them.
    VisitorsAdminApproval,
    /// Only administrators create accounts.
    AdminOnly,
}

impl FromStr for SiteRegistration {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "visitors" => Ok(Self::Visitors),
            "visitors_admin_approval" => Ok(Self::VisitorsAdminApproval),
            "admin_only" => Ok(Self::AdminOnly),
            other => Err(AuthError::Configuration(format!(
                "unknown site_registration value '{other}'"
            ))),
        }
    }
}

/// Paths of the site pages the flow redirects to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Routes {
    /// The login form.
    pub login: String,
    /// The neutral front page.
    pub front: String,
    /// The account edit form. `{id}` is replaced by the user id.
    pub user_form: String,
}

impl Default for Routes {
    fn default() -> Self {
        Self {
            login: "/user/login".to_string(),
            front: "/".to_string(),
            user_form: "/user/{id}/edit".to_string(),
        }
    }
}

impl Routes {
    /// The edit form path of a given user.
    pub fn user_form(&self, id: UserId) -> String {
        self.user_form.replace("{id}", &id.to_string())
    }
}

/// Global social login settings, shared by every provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialAuthSettings {
    /// Where users land after logging in when no destination was captured.
    pub post_login: String,
    /// Whether unknown users may register.
    pub user_allowed: UserAllowed,
    /// Send newly registered users to their account form.
    pub redirect_user_form: bool,
    /// Refuse social login for the super-admin account.
    pub disable_admin_login: bool,
    /// Roles that may not log in through social login.
    pub disabled_roles: Vec<String>,
    /// Site-wide registration policy.
    pub site_registration: SiteRegistration,
    /// Id of the super-admin account.
    pub super_admin_id: UserId,
    /// Language assigned to new accounts when the request carries none.
    pub default_langcode: String,
    /// Redirect targets.
    pub routes: Routes,
}

impl Default for SocialAuthSettings {
    fn default() -> Self {
        Self {
            post_login: "/user".to_string(),
            user_allowed: UserAllowed::Register,
            redirect_user_form: false,
            disable_admin_login: false,
            disabled_roles: Vec::new(),
            site_registration: SiteRegistration::Visitors,
            super_admin_id: 1,
            default_langcode: "en".to_string(),
            routes: Routes::default(),
        }
    }
}

impl SocialAuthSettings {
    /// Whether new accounts may not be created.
    pub fn is_registration_disabled(&self) -> bool {
        self.user_allowed == UserAllowed::Login
            || self.site_registration == SiteRegistration::AdminOnly
    }

    /// Whether new accounts are created blocked, pending approval.
    pub fn is_approval_required(&self) -> bool {
        self.site_registration == SiteRegistration::VisitorsAdminApproval
    }

    /// Whether `role` is in the disabled set.
    pub fn is_role_disabled(&self, role: &str) -> bool {
        self.disabled_roles.iter().any(|r| r == role)
    }

    /// Load settings from `SOCIALINK_*` environment variables, keeping defaults for unset ones.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut settings = Self::default();

        if let Some(v) = get("POST_LOGIN") {
            settings.post_login = v;
        }
        if let Some(v) = get("USER_ALLOWED") {
            settings.user_allowed = v.trim().parse()?;
        }
        if let Some(v) = get("REDIRECT_USER_FORM") {
            settings.redirect_user_form = parse_bool("REDIRECT_USER_FORM", &v)?;
        }
        if let Some(v) = get("DISABLE_ADMIN_LOGIN") {
            settings.disable_admin_login = parse_bool("DISABLE_ADMIN_LOGIN", &v)?;
        }
        if let Some(v) = get("DISABLED_ROLES") {
            settings.disabled_roles = split_list(&v, ',');
        }
        if let Some(v) = get("SITE_REGISTRATION") {
            settings.site_registration = v.trim().parse()?;
        }
        if let Some(v) = get("SUPER_ADMIN_ID") {
            settings.super_admin_id = v.trim().parse().map_err(|_| {
                AuthError::Configuration(format!("SUPER_ADMIN_ID is not a user id: '{v}'"))
            })?;
        }
        if let Some(v) = get("DEFAULT_LANGCODE") {
            settings.default_langcode = v;
        }
        if let Some(v) = get("LOGIN_ROUTE") {
            settings.routes.login = v;
        }
        if let Some(v) = get("FRONT_ROUTE") {
            settings.routes.front = v;
        }
        if let Some(v) = get("USER_FORM_ROUTE") {
            settings.routes.user_form = v;
        }
        Ok(settings)
    }
}

/// An extra provider API endpoint requested after login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    /// Path relative to the provider's API domain.
    pub path: String,
    /// Key under which the response is stored in the profile's additional data.
    pub name: String,
}

/// Per-provider settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// OAuth2 client id.
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: String,
    /// Comma-separated scopes requested on top of the provider's base scopes.
    pub scopes: String,
    /// Newline-separated `path|name` pairs.
    pub endpoints: String,
}

impl ProviderSettings {
    /// Settings with the given client credentials and no extras.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            ..Default::default()
        }
    }

    /// Set the comma-separated extra scopes.
    pub fn with_scopes(mut self, scopes: impl Into<String>) -> Self {
        self.scopes = scopes.into();
        self
    }

    /// Set the newline-separated `path|name` endpoints.
    pub fn with_endpoints(mut self, endpoints: impl Into<String>) -> Self {
        self.endpoints = endpoints.into();
        self
    }

    /// Both client credentials are present.
    pub fn is_configured(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }

    /// The configured extra scopes, trimmed, without empties.
    pub fn extra_scopes(&self) -> Vec<String> {
        split_list(&self.scopes, ',')
    }

    /// Parse the endpoint lines. Malformed lines are returned as `Err(line)`.
    pub fn endpoints(&self) -> Vec<Result<EndpointSpec, String>> {
        self.endpoints
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| match line.split_once('|') {
                Some((path, name)) if !path.trim().is_empty() && !name.trim().is_empty() => {
                    Ok(EndpointSpec {
                        path: path.trim().to_string(),
                        name: name.trim().to_string(),
                    })
                }
                _ => Err(line.to_string()),
            })
            .collect()
    }

    /// Load `SOCIALINK_<PROVIDER>_CLIENT_ID`, `_CLIENT_SECRET`, `_SCOPES` and `_ENDPOINTS`.
    pub fn from_env(provider: &str) -> Self {
        Self::from_lookup(provider, |key| std::env::var(key).ok())
    }

    /// Load provider settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(provider: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = format!("{ENV_PREFIX}{}_", provider.to_ascii_uppercase());
        let get = |name: &str| lookup(&format!("{prefix}{name}")).unwrap_or_default();
        Self {
            client_id: get("CLIENT_ID"),
            client_secret: get("CLIENT_SECRET"),
            scopes: get("SCOPES"),
            // Environment values cannot hold raw newlines in most shells.
            endpoints: get("ENDPOINTS").replace("\\n", "\n"),
        }
    }
}

fn split_list(value: &str, sep: char) -> Vec<String> {
    value
        .split(sep)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(name: &str, value: &str) -> Result<bool, AuthError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(AuthError::Configuration(format!(
            "{name} is not a boolean: '{value}'"
        ))),
    }
}
