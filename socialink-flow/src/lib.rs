//! # Socialink Flow
//!
//! `socialink-flow` runs the social login round trip: it sends the browser to the provider,
//! validates the callback, and reconciles the returned profile with the local accounts. It is
//! the bridge between the core traits and the framework-specific adapters.
//!
//! ## Key Components
//!
//! - **[`OAuth2Flow`]**: The redirect and callback endpoints of one provider.
//! - **[`UserAuthenticator`]**: Decides whether a profile logs in, links, registers, or is refused.
//! - **[`UserManager`]**: Creates accounts with unique names and stores identity links.
//! - **[`Hooks`]**: Ordered extension points invoked during the flow.
//! - **[`Socialink`]**: The registry of provider flows, built with [`SocialinkBuilder`].

#![warn(missing_docs)]

use async_trait::async_trait;
use socialink_core::{AuthError, IdentityLinkRepository, PictureStore, UserStore};
pub use socialink_session::{BrowserSession, SessionConfig, SessionStore};
use std::collections::HashMap;
use std::sync::Arc;

/// Reconciliation of provider profiles with local accounts.
pub mod authenticator;
/// Extension points.
pub mod hooks;
/// OAuth2 Authorization Code flow.
pub mod oauth2;
/// Request results and the user-facing error vocabulary.
pub mod outcome;
/// Profile picture download.
pub mod picture;
/// Global and per-provider settings.
pub mod settings;
/// Account creation and identity links.
pub mod user_manager;

pub use authenticator::UserAuthenticator;
pub use hooks::{Hooks, HooksBuilder};
pub use oauth2::{CallbackParams, OAuth2Flow};
pub use outcome::{AuthOutcome, CallbackError, RedirectTarget};
pub use picture::HttpPictureStore;
pub use settings::{ProviderSettings, Routes, SiteRegistration, SocialAuthSettings, UserAllowed};
pub use user_manager::UserManager;

/// The collaborators shared by every provider flow.
#[derive(Clone)]
pub struct FlowContext {
    /// Local account storage.
    pub users: Arc<dyn UserStore>,
    /// Identity link storage.
    pub links: Arc<dyn IdentityLinkRepository>,
    /// Where downloaded profile pictures go. Pictures are skipped when unset.
    pub pictures: Option<Arc<dyn PictureStore>>,
    /// Global settings.
    pub settings: Arc<SocialAuthSettings>,
    /// Extension hooks.
    pub hooks: Arc<Hooks>,
}

impl FlowContext {
    /// Default settings, no hooks, no picture store.
    pub fn new(users: Arc<dyn UserStore>, links: Arc<dyn IdentityLinkRepository>) -> Self {
        Self {
            users,
            links,
            pictures: None,
            settings: Arc::new(SocialAuthSettings::default()),
            hooks: Arc::new(Hooks::default()),
        }
    }

    /// Set the global settings.
    pub fn with_settings(mut self, settings: SocialAuthSettings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    /// Set the extension hooks.
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Enable profile picture download.
    pub fn with_picture_store(mut self, store: Arc<dyn PictureStore>) -> Self {
        self.pictures = Some(store);
        self
    }
}

/// A provider flow with its provider type erased, so flows can share one registry.
#[async_trait]
pub trait ErasedOAuthFlow: Send + Sync {
    /// The provider plugin id.
    fn plugin_id(&self) -> &str;

    /// The path segment identifying the provider.
    fn short_name(&self) -> &str;

    /// Handle the redirect endpoint.
    async fn redirect_to_provider(
        &self,
        session: &mut BrowserSession,
        destination: Option<&str>,
    ) -> Result<AuthOutcome, AuthError>;

    /// Handle the callback endpoint.
    async fn callback(
        &self,
        session: &mut BrowserSession,
        params: CallbackParams,
    ) -> Result<AuthOutcome, AuthError>;
}

/// Marker for a missing component in the typestate pattern.
#[derive(Clone, Default)]
pub struct Missing;

/// Marker for a configured component in the typestate pattern.
#[derive(Clone)]
pub struct Configured<T>(pub T);

/// Marker for a configured session store.
pub type HasSessionStoreMarker = Configured<Arc<dyn SessionStore>>;

/// The registry of provider flows.
pub struct Socialink<S = Missing> {
    /// Flows keyed by short name.
    pub providers: HashMap<String, Arc<dyn ErasedOAuthFlow>>,
    /// The session storage backend.
    pub session_store: S,
    /// Configuration for the session cookie.
    pub session_config: SessionConfig,
    /// Redirect routes used to resolve outcomes.
    pub routes: Routes,
}

impl<S: Clone> Clone for Socialink<S> {
    fn clone(&self) -> Self {
        Self {
            providers: self.providers.clone(),
            session_store: self.session_store.clone(),
            session_config: self.session_config.clone(),
            routes: self.routes.clone(),
        }
    }
}

impl Socialink<Missing> {
    /// Create a new [`SocialinkBuilder`].
    pub fn builder() -> SocialinkBuilder<Missing> {
        SocialinkBuilder::default()
    }
}

impl<S> Socialink<S> {
    /// The flow registered under `short_name`.
    pub fn flow(&self, short_name: &str) -> Option<Arc<dyn ErasedOAuthFlow>> {
        self.providers.get(short_name).cloned()
    }
}

impl Socialink<HasSessionStoreMarker> {
    /// Load the session with `id`, or start a new anonymous one.
    pub async fn load_or_create_session(
        &self,
        id: Option<&str>,
    ) -> Result<BrowserSession, AuthError> {
        if let Some(id) = id {
            if let Some(session) = self.session_store.0.load_session(id).await? {
                return Ok(session);
            }
        }
        Ok(BrowserSession::new(self.session_config.session_duration()))
    }
}

/// Trait for registries that have a session store configured.
pub trait HasSessionStore {
    /// Returns the session store.
    fn session_store(&self) -> Arc<dyn SessionStore>;
}

impl HasSessionStore for Socialink<HasSessionStoreMarker> {
    fn session_store(&self) -> Arc<dyn SessionStore> {
        self.session_store.0.clone()
    }
}

/// A registry with a session store, as used by web adapters.
pub type StatefulSocialink = Socialink<HasSessionStoreMarker>;

/// A builder for [`Socialink`].
pub struct SocialinkBuilder<S> {
    providers: HashMap<String, Arc<dyn ErasedOAuthFlow>>,
    session_store: S,
    session_config: SessionConfig,
    routes: Option<Routes>,
}

impl Default for SocialinkBuilder<Missing> {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            session_store: Missing,
            session_config: SessionConfig::default(),
            routes: None,
        }
    }
}

impl<S> SocialinkBuilder<S> {
    /// Register a provider flow under its short name.
    ///
    /// Unless set with [`SocialinkBuilder::routes`], the registry uses the routes of the first
    /// flow's settings.
    pub fn provider<P>(mut self, flow: OAuth2Flow<P>) -> Self
    where
        P: socialink_core::OAuthProvider + 'static,
    {
        if self.routes.is_none() {
            self.routes = Some(flow.routes().clone());
        }
        let name = ErasedOAuthFlow::short_name(&flow).to_string();
        self.providers.insert(name, Arc::new(flow));
        self
    }

    /// Set the session store.
    pub fn session_store(self, store: Arc<dyn SessionStore>) -> SocialinkBuilder<HasSessionStoreMarker> {
        SocialinkBuilder {
            providers: self.providers,
            session_store: Configured(store),
            session_config: self.session_config,
            routes: self.routes,
        }
    }

    /// Set the session cookie configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Override the redirect routes.
    pub fn routes(mut self, routes: Routes) -> Self {
        self.routes = Some(routes);
        self
    }

    /// Build the [`Socialink`] instance.
    pub fn build(self) -> Socialink<S> {
        Socialink {
            providers: self.providers,
            session_store: self.session_store,
            session_config: self.session_config,
            routes: self.routes.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use socialink_core::{ExternalProfile, OAuthProvider, OAuthToken};
    use socialink_store::{MemoryLinkStore, MemoryUserStore};

    struct StaticProvider;

    #[async_trait]
    impl OAuthProvider for StaticProvider {
        fn provider_id(&self) -> &str {
            "social_auth_static"
        }

        fn base_scopes(&self) -> &[&str] {
            &[]
        }

        fn get_authorization_url(&self, state: &str, _scopes: &[&str]) -> String {
            format!("https://idp.test/auth?state={state}")
        }

        async fn exchange_code_for_token(&self, _code: &str) -> Result<OAuthToken, AuthError> {
            Ok(OAuthToken::bearer("token"))
        }

        async fn fetch_profile(&self, token: &OAuthToken) -> Result<ExternalProfile, AuthError> {
            Ok(ExternalProfile::new("Jane", "1", token.access_token.clone()))
        }
    }

    fn flow(routes: Routes) -> OAuth2Flow<StaticProvider> {
        let ctx = FlowContext::new(
            Arc::new(MemoryUserStore::default()),
            Arc::new(MemoryLinkStore::default()),
        )
        .with_settings(SocialAuthSettings {
            routes,
            ..Default::default()
        });
        OAuth2Flow::new(StaticProvider, ProviderSettings::new("id", "secret"), ctx)
    }

    fn custom_routes() -> Routes {
        Routes {
            login: "/account/login".into(),
            front: "/home".into(),
            user_form: "/account/{id}".into(),
        }
    }

    #[test]
    fn registry_routes_come_from_flow_settings() {
        let socialink = Socialink::builder().provider(flow(custom_routes())).build();
        assert_eq!(socialink.routes, custom_routes());
        assert!(socialink.flow("static").is_some());
    }

    #[test]
    fn explicit_routes_win_over_flow_settings() {
        let socialink = Socialink::builder()
            .routes(Routes::default())
            .provider(flow(custom_routes()))
            .build();
        assert_eq!(socialink.routes, Routes::default());

        assert_eq!(Socialink::builder().build().routes, Routes::default());
    }
}
