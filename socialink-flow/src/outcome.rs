use crate::settings::Routes;
use socialink_core::{AuthError, UserId};
use socialink_session::FlashMessage;

/// Where the browser is sent when a request ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectTarget {
    /// The provider's authorization page.
    Provider(String),
    /// The post-login destination (captured destination or configured path).
    PostLogin(String),
    /// The account form of a newly registered user.
    UserForm(UserId),
    /// The login form.
    LoginForm,
    /// The neutral front page. Used where redirecting to the login form could loop.
    Front,
    /// A redirect supplied by an extension hook.
    Custom(String),
}

impl RedirectTarget {
    /// Resolve the target to a `Location` value.
    pub fn location(&self, routes: &Routes) -> String {
        match self {
            RedirectTarget::Provider(url)
            | RedirectTarget::PostLogin(url)
            | RedirectTarget::Custom(url) => url.clone(),
            RedirectTarget::UserForm(id) => routes.user_form(*id),
            RedirectTarget::LoginForm => routes.login.clone(),
            RedirectTarget::Front => routes.front.clone(),
        }
    }
}

/// The terminal result of a redirect or callback request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    /// Redirect destination.
    pub target: RedirectTarget,
    /// User-facing messages to show on the next page.
    pub messages: Vec<FlashMessage>,
}

impl AuthOutcome {
    /// An outcome without messages.
    pub fn redirect(target: RedirectTarget) -> Self {
        Self {
            target,
            messages: Vec::new(),
        }
    }

    /// Attach an error message.
    pub fn with_error(mut self, text: impl Into<String>) -> Self {
        self.messages.push(FlashMessage::error(text));
        self
    }

    /// Attach a warning message.
    pub fn with_warning(mut self, text: impl Into<String>) -> Self {
        self.messages.push(FlashMessage::warning(text));
        self
    }

    /// Whether any error message was attached.
    pub fn has_errors(&self) -> bool {
        self.messages
            .iter()
            .any(|m| m.level == socialink_session::MessageLevel::Error)
    }
}

/// The fixed vocabulary of callback failures shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackError {
    /// Provider credentials are not configured.
    Config,
    /// The anti-forgery state did not match.
    OAuth,
    /// No access token could be obtained.
    Token,
    /// The profile could not be loaded.
    UserInfo,
    /// The provider client failed unexpectedly.
    Exception,
    /// Anything else.
    Unknown,
}

impl CallbackError {
    /// The short error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackError::Config => "config",
            CallbackError::OAuth => "oauth",
            CallbackError::Token => "token",
            CallbackError::UserInfo => "user_info",
            CallbackError::Exception => "exception",
            CallbackError::Unknown => "unknown",
        }
    }

    /// Parse a code, falling back to [`CallbackError::Unknown`].
    pub fn from_code(code: &str) -> Self {
        match code {
            "config" => CallbackError::Config,
            "oauth" => CallbackError::OAuth,
            "token" => CallbackError::Token,
            "user_info" => CallbackError::UserInfo,
            "exception" => CallbackError::Exception,
            _ => CallbackError::Unknown,
        }
    }

    /// The user-facing message. `module` names the provider module for configuration errors.
    pub fn message(&self, module: &str) -> String {
        match self {
            CallbackError::Config => {
                format!("{module} not configured properly. Contact site administrator.")
            }
            CallbackError::OAuth => "Login failed. Invalid OAuth2 state.".to_string(),
            CallbackError::Token => "Authentication failed. Contact site administrator.".to_string(),
            CallbackError::UserInfo => {
                "Login failed, could not load user profile. Contact site administrator.".to_string()
            }
            CallbackError::Exception => "There has been an error when creating plugin.".to_string(),
            CallbackError::Unknown => "Unknown error.".to_string(),
        }
    }
}

impl From<&AuthError> for CallbackError {
    fn from(err: &AuthError) -> Self {
        match err {
            AuthError::Configuration(_) => CallbackError::Config,
            AuthError::StateMismatch => CallbackError::OAuth,
            AuthError::TokenExchange(_) => CallbackError::Token,
            AuthError::ProfileFetch(_) => CallbackError::UserInfo,
            AuthError::Provider(_) => CallbackError::Exception,
            _ => CallbackError::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_messages() {
        for code in ["config", "oauth", "token", "user_info", "exception", "unknown"] {
            assert_eq!(CallbackError::from_code(code).as_str(), code);
        }
        assert_eq!(CallbackError::from_code("bogus"), CallbackError::Unknown);
        assert_eq!(
            CallbackError::Config.message("Social Auth Google"),
            "Social Auth Google not configured properly. Contact site administrator."
        );
        assert_eq!(
            CallbackError::OAuth.message("x"),
            "Login failed. Invalid OAuth2 state."
        );
    }

    #[test]
    fn error_mapping() {
        assert_eq!(
            CallbackError::from(&AuthError::TokenExchange("bad code".into())),
            CallbackError::Token
        );
        assert_eq!(
            CallbackError::from(&AuthError::Network("reset".into())),
            CallbackError::Unknown
        );
    }

    #[test]
    fn locations() {
        let routes = Routes::default();
        assert_eq!(RedirectTarget::LoginForm.location(&routes), "/user/login");
        assert_eq!(RedirectTarget::Front.location(&routes), "/");
        assert_eq!(RedirectTarget::UserForm(3).location(&routes), "/user/3/edit");
        assert_eq!(
            RedirectTarget::PostLogin("/node/1".into()).location(&routes),
            "/node/1"
        );
    }
}
