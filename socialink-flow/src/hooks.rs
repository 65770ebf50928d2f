//! Extension points invoked by the flow.
//!
//! Each extension point is an ordered list of hook objects, invoked in registration order on the
//! request that triggered it. A hook returning `Err` stops the remaining hooks and aborts the
//! request with that error.

use socialink_core::{AuthError, ExternalProfile, LocalUser, UserFields, UserId};
use socialink_session::SessionState;

/// Fired on the redirect endpoint, after the anti-forgery state is stored.
pub struct BeforeRedirectEvent<'a> {
    /// Provider plugin id.
    pub plugin_id: &'a str,
    /// The captured post-login destination, if any.
    pub destination: Option<&'a str>,
    /// The plugin's session scope.
    pub state: &'a mut SessionState,
}

/// Fired when the provider reports an error on the callback.
pub struct FailedAuthenticationEvent<'a> {
    /// Provider plugin id.
    pub plugin_id: &'a str,
    /// The provider's `error` value.
    pub error: Option<&'a str>,
    /// The plugin's session scope.
    pub state: &'a mut SessionState,
    response: Option<String>,
}

impl<'a> FailedAuthenticationEvent<'a> {
    pub(crate) fn new(
        plugin_id: &'a str,
        error: Option<&'a str>,
        state: &'a mut SessionState,
    ) -> Self {
        Self {
            plugin_id,
            error,
            state,
            response: None,
        }
    }

    /// Replace the default login-form redirect.
    pub fn set_response(&mut self, location: impl Into<String>) {
        self.response = Some(location.into());
    }

    /// The redirect set by a hook, if any.
    pub fn response(&self) -> Option<&str> {
        self.response.as_deref()
    }
}

/// Fired after the initial fields of a new account are assembled, before it is stored.
pub struct UserFieldsEvent<'a> {
    /// Provider plugin id.
    pub plugin_id: &'a str,
    /// The profile the account is created from. Hooks may append custom data.
    pub profile: &'a mut ExternalProfile,
    /// The fields to persist. Hooks may change them.
    pub fields: &'a mut UserFields,
}

/// Fired after a new account is stored.
pub struct UserCreatedEvent<'a> {
    /// Provider plugin id.
    pub plugin_id: &'a str,
    /// The stored account.
    pub user: &'a LocalUser,
    /// The profile it was created from.
    pub profile: &'a ExternalProfile,
}

/// Fired when a callback ends with an authenticated session.
pub struct UserLoginEvent<'a> {
    /// Provider plugin id.
    pub plugin_id: &'a str,
    /// The logged in account.
    pub user_id: UserId,
    /// The profile returned by the provider.
    pub profile: &'a ExternalProfile,
}

/// Hook for [`BeforeRedirectEvent`].
pub trait BeforeRedirectHook: Send + Sync {
    /// Observe or mutate the state before the browser leaves for the provider.
    fn before_redirect(&self, event: &mut BeforeRedirectEvent<'_>) -> Result<(), AuthError>;
}

/// Hook for [`FailedAuthenticationEvent`].
pub trait FailedAuthenticationHook: Send + Sync {
    /// React to a provider-reported failure. May set a response.
    fn on_failed_authentication(
        &self,
        event: &mut FailedAuthenticationEvent<'_>,
    ) -> Result<(), AuthError>;
}

/// Hook for [`UserFieldsEvent`].
pub trait UserFieldsHook: Send + Sync {
    /// Alter the fields of a new account.
    fn on_user_fields(&self, event: &mut UserFieldsEvent<'_>) -> Result<(), AuthError>;
}

/// Hook for [`UserCreatedEvent`].
pub trait UserCreatedHook: Send + Sync {
    /// Observe a newly stored account.
    fn on_user_created(&self, event: &UserCreatedEvent<'_>) -> Result<(), AuthError>;
}

/// Hook for [`UserLoginEvent`].
pub trait UserLoginHook: Send + Sync {
    /// Observe a completed login.
    fn on_user_login(&self, event: &UserLoginEvent<'_>) -> Result<(), AuthError>;
}

/// The registered hooks of every extension point.
#[derive(Default)]
pub struct Hooks {
    before_redirect: Vec<Box<dyn BeforeRedirectHook>>,
    failed_authentication: Vec<Box<dyn FailedAuthenticationHook>>,
    user_fields: Vec<Box<dyn UserFieldsHook>>,
    user_created: Vec<Box<dyn UserCreatedHook>>,
    user_login: Vec<Box<dyn UserLoginHook>>,
}

impl Hooks {
    /// Create a new builder.
    pub fn builder() -> HooksBuilder {
        HooksBuilder::default()
    }

    pub(crate) fn dispatch_before_redirect(
        &self,
        event: &mut BeforeRedirectEvent<'_>,
    ) -> Result<(), AuthError> {
        for hook in &self.before_redirect {
            hook.before_redirect(event)?;
        }
        Ok(())
    }

    pub(crate) fn dispatch_failed_authentication(
        &self,
        event: &mut FailedAuthenticationEvent<'_>,
    ) -> Result<(), AuthError> {
        for hook in &self.failed_authentication {
            hook.on_failed_authentication(event)?;
        }
        Ok(())
    }

    pub(crate) fn dispatch_user_fields(
        &self,
        event: &mut UserFieldsEvent<'_>,
    ) -> Result<(), AuthError> {
        for hook in &self.user_fields {
            hook.on_user_fields(event)?;
        }
        Ok(())
    }

    pub(crate) fn dispatch_user_created(&self, event: &UserCreatedEvent<'_>) -> Result<(), AuthError> {
        for hook in &self.user_created {
            hook.on_user_created(event)?;
        }
        Ok(())
    }

    pub(crate) fn dispatch_user_login(&self, event: &UserLoginEvent<'_>) -> Result<(), AuthError> {
        for hook in &self.user_login {
            hook.on_user_login(event)?;
        }
        Ok(())
    }
}

/// Builder for [`Hooks`].
#[derive(Default)]
pub struct HooksBuilder {
    hooks: Hooks,
}

impl HooksBuilder {
    /// Add a before-redirect hook.
    pub fn before_redirect<H>(mut self, hook: H) -> Self
    where
        H: BeforeRedirectHook + 'static,
    {
        self.hooks.before_redirect.push(Box::new(hook));
        self
    }

    /// Add a failed-authentication hook.
    pub fn failed_authentication<H>(mut self, hook: H) -> Self
    where
        H: FailedAuthenticationHook + 'static,
    {
        self.hooks.failed_authentication.push(Box::new(hook));
        self
    }

    /// Add a user-fields hook.
    pub fn user_fields<H>(mut self, hook: H) -> Self
    where
        H: UserFieldsHook + 'static,
    {
        self.hooks.user_fields.push(Box::new(hook));
        self
    }

    /// Add a user-created hook.
    pub fn user_created<H>(mut self, hook: H) -> Self
    where
        H: UserCreatedHook + 'static,
    {
        self.hooks.user_created.push(Box::new(hook));
        self
    }

    /// Add a user-login hook.
    pub fn user_login<H>(mut self, hook: H) -> Self
    where
        H: UserLoginHook + 'static,
    {
        self.hooks.user_login.push(Box::new(hook));
        self
    }

    /// Build the [`Hooks`].
    pub fn build(self) -> Hooks {
        self.hooks
    }
}
