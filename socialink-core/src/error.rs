use serde::{Deserialize, Serialize};

/// The reason a resolved local account was refused a login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateFailure {
    /// The account is the super-admin and social login is disabled for it.
    AdminDisabled,
    /// One of the account's roles is in the disabled set.
    RoleDisabled(String),
    /// The account is blocked or awaiting approval.
    Inactive,
}

impl std::fmt::Display for GateFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateFailure::AdminDisabled => write!(f, "admin login disabled"),
            GateFailure::RoleDisabled(role) => write!(f, "role '{role}' disabled"),
            GateFailure::Inactive => write!(f, "account inactive"),
        }
    }
}

/// Errors that can occur during the authentication process.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Missing or invalid client credentials.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The callback state did not match the stored anti-forgery state.
    #[error("OAuth2 state mismatch")]
    StateMismatch,
    /// The authorization code could not be exchanged for a token.
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),
    /// The provider profile could not be loaded.
    #[error("Profile fetch failed: {0}")]
    ProfileFetch(String),
    /// Local registration is administratively disabled.
    #[error("User registration is disabled")]
    RegistrationDisabled,
    /// A gate check refused the login.
    #[error("Login refused: {0}")]
    AccountGate(GateFailure),
    /// A user or link could not be stored or loaded.
    #[error("Persistence error: {0}")]
    Persistence(String),
    /// Unanticipated provider SDK failure.
    #[error("Provider error: {0}")]
    Provider(String),
    /// Transport failure talking to the provider.
    #[error("Network error: {0}")]
    Network(String),
    /// Session storage failure.
    #[error("Session error: {0}")]
    Session(String),
    /// The acting account may not perform the operation.
    #[error("Access denied: {0}")]
    AccessDenied(String),
    /// An extension hook aborted the flow.
    #[error("Hook error: {0}")]
    Hook(String),
}
