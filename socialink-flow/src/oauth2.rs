use crate::authenticator::UserAuthenticator;
use crate::hooks::{BeforeRedirectEvent, FailedAuthenticationEvent, UserLoginEvent};
use crate::outcome::{AuthOutcome, CallbackError, RedirectTarget};
use crate::settings::{ProviderSettings, Routes};
use crate::{ErasedOAuthFlow, FlowContext};
use async_trait::async_trait;
use serde::Deserialize;
use socialink_core::{AuthError, DataMap, ExternalProfile, OAuthProvider, OAuthToken};
use socialink_session::BrowserSession;

/// Query parameters of the callback request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    /// Authorization code.
    pub code: Option<String>,
    /// Anti-forgery state echoed by the provider.
    pub state: Option<String>,
    /// Error reported by the provider instead of a code.
    pub error: Option<String>,
    /// UI language of the request, used for new accounts.
    #[serde(skip)]
    pub langcode: Option<String>,
}

/// Orchestrates the OAuth2 Authorization Code login for one provider.
pub struct OAuth2Flow<P: OAuthProvider> {
    provider: P,
    settings: ProviderSettings,
    short_name: String,
    module: String,
    ctx: FlowContext,
    authenticator: UserAuthenticator,
}

impl<P: OAuthProvider> OAuth2Flow<P> {
    /// Create a flow for `provider`. The short name defaults to the plugin id without its
    /// `social_auth_` prefix.
    pub fn new(provider: P, settings: ProviderSettings, ctx: FlowContext) -> Self {
        let plugin_id = provider.provider_id().to_string();
        let short_name = plugin_id
            .strip_prefix("social_auth_")
            .unwrap_or(&plugin_id)
            .to_string();
        Self {
            authenticator: UserAuthenticator::new(plugin_id.clone(), ctx.clone()),
            module: plugin_id,
            provider,
            settings,
            short_name,
            ctx,
        }
    }

    /// Override the path segment identifying this provider.
    pub fn with_short_name(mut self, short_name: impl Into<String>) -> Self {
        self.short_name = short_name.into();
        self
    }

    /// Set the module name shown in configuration errors.
    pub fn with_module_name(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The authenticator used for callbacks.
    pub fn authenticator(&self) -> &UserAuthenticator {
        &self.authenticator
    }

    /// The redirect routes from the global settings.
    pub fn routes(&self) -> &Routes {
        &self.ctx.settings.routes
    }

    fn plugin_id(&self) -> &str {
        self.provider.provider_id()
    }

    /// Base scopes followed by the configured extras, without duplicates.
    pub fn scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = Vec::new();
        let extras = self.settings.extra_scopes();
        for scope in self
            .provider
            .base_scopes()
            .iter()
            .map(|s| s.to_string())
            .chain(extras)
        {
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }
        scopes
    }

    /// Send the browser to the provider, storing a fresh anti-forgery state.
    pub async fn redirect_to_provider(
        &self,
        session: &mut BrowserSession,
        destination: Option<&str>,
    ) -> Result<AuthOutcome, AuthError> {
        let plugin = self.plugin_id();
        if !self.settings.is_configured() {
            log::error!(target: plugin, "Define Client ID and Client Secret on module settings.");
            return Ok(AuthOutcome::redirect(RedirectTarget::LoginForm)
                .with_error(CallbackError::Config.message(&self.module)));
        }

        let scopes = self.scopes();
        let scope_refs: Vec<&str> = scopes.iter().map(String::as_str).collect();
        let oauth_state = self.provider.new_state();
        let url = self.provider.get_authorization_url(&oauth_state, &scope_refs);

        let state = session.state_mut(plugin);
        if let Some(destination) = destination {
            state.login_destination = Some(destination.to_string());
        }
        state.oauth2state = Some(oauth_state);

        self.ctx.hooks.dispatch_before_redirect(&mut BeforeRedirectEvent {
            plugin_id: plugin,
            destination,
            state,
        })?;

        log::debug!(target: plugin, "Redirecting to provider with scopes {scopes:?}");
        Ok(AuthOutcome::redirect(RedirectTarget::Provider(url)))
    }

    /// Handle the provider's return and reconcile the profile with the local accounts.
    pub async fn callback(
        &self,
        session: &mut BrowserSession,
        params: CallbackParams,
    ) -> Result<AuthOutcome, AuthError> {
        let plugin = self.plugin_id();

        if let Some(error) = params.error.as_deref() {
            return self.failed_authentication(session, error);
        }

        let mut profile = match self.process_callback(session, &params).await {
            Ok(profile) => profile,
            Err(code) => {
                log::debug!(target: plugin, "Callback failed with '{}'", code.as_str());
                // The login form may itself start this flow, so failures land on the front page.
                return Ok(AuthOutcome::redirect(RedirectTarget::Front)
                    .with_error(code.message(&self.module)));
            }
        };

        let langcode = params
            .langcode
            .unwrap_or_else(|| self.ctx.settings.default_langcode.clone());
        let outcome = self
            .authenticator
            .authenticate_user(session, &mut profile, &langcode)
            .await?;

        if let Some(user_id) = session.user_id {
            self.ctx.hooks.dispatch_user_login(&UserLoginEvent {
                plugin_id: plugin,
                user_id,
                profile: &profile,
            })?;
        }
        Ok(outcome)
    }

    fn failed_authentication(
        &self,
        session: &mut BrowserSession,
        error: &str,
    ) -> Result<AuthOutcome, AuthError> {
        let plugin = self.plugin_id();
        log::warn!(target: plugin, "Provider reported an authentication error: {error}");

        let mut event = FailedAuthenticationEvent::new(plugin, Some(error), session.state_mut(plugin));
        self.ctx.hooks.dispatch_failed_authentication(&mut event)?;
        let target = match event.response() {
            Some(location) => RedirectTarget::Custom(location.to_string()),
            None => RedirectTarget::LoginForm,
        };
        Ok(AuthOutcome::redirect(target).with_error("You could not be authenticated."))
    }

    async fn process_callback(
        &self,
        session: &mut BrowserSession,
        params: &CallbackParams,
    ) -> Result<ExternalProfile, CallbackError> {
        let plugin = self.plugin_id();
        if !self.settings.is_configured() {
            log::error!(target: plugin, "Define Client ID and Client Secret on module settings.");
            return Err(CallbackError::Config);
        }

        let state = session.state_mut(plugin);
        let expected = state.take_oauth2state();
        let received = params.state.as_deref().unwrap_or_default();
        if received.is_empty() || expected.as_deref() != Some(received) {
            log::warn!(target: plugin, "{}", AuthError::StateMismatch);
            state.nullify();
            return Err(CallbackError::OAuth);
        }

        let Some(code) = params.code.as_deref().filter(|c| !c.is_empty()) else {
            log::error!(target: plugin, "Callback carries no authorization code");
            return Err(CallbackError::Token);
        };

        let token = self
            .provider
            .exchange_code_for_token(code)
            .await
            .map_err(|e| self.stage_error(&e, CallbackError::Token))?;
        if token.access_token.is_empty() {
            log::error!(target: plugin, "Provider returned an empty access token");
            return Err(CallbackError::Token);
        }
        session.state_mut(plugin).access_token = Some(token.access_token.clone());

        let mut profile = self
            .provider
            .fetch_profile(&token)
            .await
            .map_err(|e| self.stage_error(&e, CallbackError::UserInfo))?;
        if profile.access_token.is_empty() {
            profile.access_token = token.access_token.clone();
        }

        self.request_endpoints(&token, &mut profile).await;
        Ok(profile)
    }

    fn stage_error(&self, err: &AuthError, stage: CallbackError) -> CallbackError {
        log::error!(target: self.plugin_id(), "{err}");
        match CallbackError::from(err) {
            CallbackError::Exception => CallbackError::Exception,
            _ => stage,
        }
    }

    async fn request_endpoints(&self, token: &OAuthToken, profile: &mut ExternalProfile) {
        let plugin = self.plugin_id();
        let mut data = DataMap::new();
        for endpoint in self.settings.endpoints() {
            let endpoint = match endpoint {
                Ok(endpoint) => endpoint,
                Err(line) => {
                    log::warn!(target: plugin, "Skipping malformed endpoint line '{line}'");
                    continue;
                }
            };
            let value = match self.provider.request_endpoint(token, &endpoint.path).await {
                Ok(value) => value,
                Err(e) => {
                    log::error!(
                        target: plugin,
                        "Failed to request endpoint {}: {e}",
                        endpoint.path
                    );
                    serde_json::Value::Null
                }
            };
            data.insert(endpoint.name, value);
        }
        if !data.is_empty() {
            profile.additional_data.get_or_insert_with(DataMap::new).extend(data);
        }
    }
}

#[async_trait]
impl<P: OAuthProvider> ErasedOAuthFlow for OAuth2Flow<P> {
    fn plugin_id(&self) -> &str {
        self.provider.provider_id()
    }

    fn short_name(&self) -> &str {
        &self.short_name
    }

    async fn redirect_to_provider(
        &self,
        session: &mut BrowserSession,
        destination: Option<&str>,
    ) -> Result<AuthOutcome, AuthError> {
        OAuth2Flow::redirect_to_provider(self, session, destination).await
    }

    async fn callback(
        &self,
        session: &mut BrowserSession,
        params: CallbackParams,
    ) -> Result<AuthOutcome, AuthError> {
        OAuth2Flow::callback(self, session, params).await
    }
}
