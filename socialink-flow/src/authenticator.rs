use crate::outcome::{AuthOutcome, RedirectTarget};
use crate::user_manager::UserManager;
use crate::FlowContext;
use socialink_core::{AuthError, ExternalProfile, GateFailure, LocalUser};
use socialink_session::BrowserSession;

const AUTH_FAILED: &str = "You could not be authenticated, please contact the administrator.";

/// Decides what an authenticated provider profile means for the local site: log in, link,
/// register, or refuse.
pub struct UserAuthenticator {
    plugin_id: String,
    ctx: FlowContext,
    manager: UserManager,
}

impl UserAuthenticator {
    /// An authenticator acting for the provider `plugin_id`.
    pub fn new(plugin_id: impl Into<String>, ctx: FlowContext) -> Self {
        let plugin_id = plugin_id.into();
        Self {
            manager: UserManager::new(plugin_id.clone(), ctx.clone()),
            plugin_id,
            ctx,
        }
    }

    /// The account manager backing this authenticator.
    pub fn user_manager(&self) -> &UserManager {
        &self.manager
    }

    /// Reconcile `profile` with the local accounts and compute the final redirect.
    ///
    /// Only hook failures are returned as `Err`.
    pub async fn authenticate_user(
        &self,
        session: &mut BrowserSession,
        profile: &mut ExternalProfile,
        langcode: &str,
    ) -> Result<AuthOutcome, AuthError> {
        let linked = match self.manager.linked_user_id(&profile.provider_user_id).await {
            Ok(linked) => linked,
            Err(e) => return self.failure(session, e),
        };

        if let Some(current) = session.user_id {
            if linked.is_some() {
                log::debug!(
                    target: self.plugin_id.as_str(),
                    "Provider user {} already linked, user {} stays logged in",
                    profile.provider_user_id,
                    current
                );
                return Ok(self.post_login_redirect(session));
            }
            return Ok(match self.manager.add_user_record(current, profile).await {
                Ok(_) => self.post_login_redirect(session),
                Err(_) => AuthOutcome::redirect(RedirectTarget::LoginForm)
                    .with_error("New provider could not be associated."),
            });
        }

        if let Some(user_id) = linked {
            return match self.manager.load_user_by_id(user_id).await {
                Ok(Some(user)) => Ok(self.authenticate_existing_user(session, &user)),
                Ok(None) => self.failure(
                    session,
                    AuthError::Persistence(format!("linked user {user_id} does not exist")),
                ),
                Err(e) => self.failure(session, e),
            };
        }

        if let Some(email) = profile.email.clone() {
            match self.manager.load_user_by_email(&email).await {
                Ok(Some(user)) => {
                    if let Err(e) = self.manager.add_user_record(user.id, profile).await {
                        return self.failure(session, e);
                    }
                    return Ok(self.authenticate_existing_user(session, &user));
                }
                Ok(None) => {}
                Err(e) => {
                    log::error!(target: self.plugin_id.as_str(), "Failed to load user: {e}");
                }
            }
        }

        if self.ctx.settings.is_registration_disabled() {
            return Ok(AuthOutcome::redirect(RedirectTarget::Front)
                .with_error("User registration is disabled, please contact the administrator."));
        }

        match self.manager.create_new_user(profile, langcode).await {
            Ok(user) => Ok(self.authenticate_new_user(session, &user)),
            Err(e) => self.failure(session, e),
        }
    }

    /// Run the gate checks on an existing account and log it in.
    pub fn authenticate_existing_user(
        &self,
        session: &mut BrowserSession,
        user: &LocalUser,
    ) -> AuthOutcome {
        match self.check_account(user) {
            Ok(()) => {
                self.login_user(session, user);
                self.post_login_redirect(session)
            }
            Err(AuthError::AccountGate(failure)) => self.refusal(session, user, failure),
            Err(other) => {
                log::error!(target: self.plugin_id.as_str(), "Failed to authenticate user: {other}");
                self.nullify(session);
                AuthOutcome::redirect(RedirectTarget::LoginForm).with_error(AUTH_FAILED)
            }
        }
    }

    /// Run the gate checks on a freshly registered account, then log it in unless approval is
    /// pending.
    ///
    /// The active flag is checked after the approval policy, so a new account awaiting approval
    /// gets the approval notice rather than a refusal.
    pub fn authenticate_new_user(
        &self,
        session: &mut BrowserSession,
        user: &LocalUser,
    ) -> AuthOutcome {
        if let Some(failure) = self.gate_failure(user) {
            return self.refusal(session, user, failure);
        }

        if self.ctx.settings.is_approval_required() {
            self.nullify(session);
            return AuthOutcome::redirect(RedirectTarget::LoginForm)
                .with_warning("Your account was created, but it needs administrator's approval.");
        }

        if user.active {
            self.login_user(session, user);
            if self.ctx.settings.redirect_user_form {
                return AuthOutcome::redirect(RedirectTarget::UserForm(user.id));
            }
            return self.post_login_redirect(session);
        }

        log::warn!(
            target: self.plugin_id.as_str(),
            "Login for user {} prevented. Account is blocked.",
            user.name
        );
        self.nullify(session);
        AuthOutcome::redirect(RedirectTarget::LoginForm)
            .with_error("You could not be authenticated. Contact site administrator.")
    }

    /// The first role or admin gate `user` fails, if any.
    pub fn gate_failure(&self, user: &LocalUser) -> Option<GateFailure> {
        let settings = &self.ctx.settings;
        if settings.disable_admin_login && user.id == settings.super_admin_id {
            return Some(GateFailure::AdminDisabled);
        }
        user.roles
            .iter()
            .find(|role| settings.is_role_disabled(role))
            .map(|role| GateFailure::RoleDisabled(role.clone()))
    }

    /// Every gate an existing account must pass: super-admin, disabled roles, then active status.
    pub fn check_account(&self, user: &LocalUser) -> Result<(), AuthError> {
        if let Some(failure) = self.gate_failure(user) {
            return Err(AuthError::AccountGate(failure));
        }
        if !user.active {
            return Err(AuthError::AccountGate(GateFailure::Inactive));
        }
        Ok(())
    }

    fn refusal(
        &self,
        session: &mut BrowserSession,
        user: &LocalUser,
        failure: GateFailure,
    ) -> AuthOutcome {
        log::warn!(
            target: self.plugin_id.as_str(),
            "Login for user {} refused: {}",
            user.name,
            failure
        );
        let outcome = AuthOutcome::redirect(RedirectTarget::LoginForm);
        match failure {
            GateFailure::AdminDisabled => {
                self.nullify(session);
                outcome.with_error("Authentication for Admin (user 1) is disabled.")
            }
            GateFailure::RoleDisabled(role) => {
                outcome.with_error(format!("Authentication for '{role}' role is disabled."))
            }
            GateFailure::Inactive => {
                self.nullify(session);
                outcome.with_error(
                    "Your account has not been approved yet or might have been canceled, please contact the administrator.",
                )
            }
        }
    }

    fn login_user(&self, session: &mut BrowserSession, user: &LocalUser) {
        session.login(user.id);
        log::debug!(target: self.plugin_id.as_str(), "User {} logged in", user.id);
    }

    /// Consume the captured destination, falling back to the configured post-login path.
    pub fn post_login_redirect(&self, session: &mut BrowserSession) -> AuthOutcome {
        let destination = session
            .state_mut(&self.plugin_id)
            .login_destination
            .take()
            .unwrap_or_else(|| self.ctx.settings.post_login.clone());
        AuthOutcome::redirect(RedirectTarget::PostLogin(destination))
    }

    fn nullify(&self, session: &mut BrowserSession) {
        session.state_mut(&self.plugin_id).nullify();
    }

    fn failure(
        &self,
        session: &mut BrowserSession,
        err: AuthError,
    ) -> Result<AuthOutcome, AuthError> {
        match err {
            AuthError::Hook(_) => Err(err),
            AuthError::RegistrationDisabled => Ok(AuthOutcome::redirect(RedirectTarget::Front)
                .with_error("User registration is disabled, please contact the administrator.")),
            other => {
                log::error!(
                    target: self.plugin_id.as_str(),
                    "Failed to authenticate user: {other}"
                );
                self.nullify(session);
                Ok(AuthOutcome::redirect(RedirectTarget::LoginForm).with_error(AUTH_FAILED))
            }
        }
    }
}
