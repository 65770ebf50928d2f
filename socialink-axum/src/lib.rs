//! Axum routes and extractors for socialink.
//!
//! Mount the router returned by [`SocialinkAxumExt::axum_router`] next to your own routes and
//! add a `tower_cookies::CookieManagerLayer`. The router serves:
//!
//! - `GET {login}/{network}`: redirect to the provider (optional `?destination=/path`)
//! - `GET {login}/{network}/callback`: provider return
//! - `GET /user/logout`

use axum::extract::{FromRef, FromRequestParts};
use axum::http::{request::Parts, StatusCode};
use axum::response::{IntoResponse, Response};
use socialink_core::AuthError;
use socialink_session::FlashMessage;
pub use socialink_flow::{
    BrowserSession, HasSessionStore, SessionConfig, Socialink, StatefulSocialink,
};
use tower_cookies::Cookies;

pub mod helpers;

pub use helpers::*;

/// Ready-made application state holding the registry.
#[derive(Clone)]
pub struct SocialinkState {
    pub socialink: StatefulSocialink,
}

impl From<StatefulSocialink> for SocialinkState {
    fn from(socialink: StatefulSocialink) -> Self {
        Self { socialink }
    }
}

impl FromRef<SocialinkState> for StatefulSocialink {
    fn from_ref(state: &SocialinkState) -> Self {
        state.socialink.clone()
    }
}

/// Errors returned by the socialink handlers and extractors.
#[derive(Debug, thiserror::Error)]
pub enum SocialinkAxumError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AuthError> for SocialinkAxumError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::AccessDenied(msg) => SocialinkAxumError::Forbidden(msg),
            other => SocialinkAxumError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for SocialinkAxumError {
    fn into_response(self) -> Response {
        match self {
            SocialinkAxumError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            SocialinkAxumError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, msg).into_response()
            }
            SocialinkAxumError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg).into_response(),
            SocialinkAxumError::Internal(msg) => {
                log::error!(target: "socialink_axum", "{msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

async fn request_session<S>(
    parts: &mut Parts,
    state: &S,
) -> Result<(StatefulSocialink, Cookies, BrowserSession), SocialinkAxumError>
where
    S: Send + Sync,
    StatefulSocialink: FromRef<S>,
{
    let socialink = StatefulSocialink::from_ref(state);
    let cookies = Cookies::from_request_parts(parts, state)
        .await
        .map_err(|e| SocialinkAxumError::Internal(e.1.to_string()))?;
    let session = helpers::get_session(&socialink, &cookies).await?;
    Ok((socialink, cookies, session))
}

/// The extractor for a logged in session. Rejects anonymous requests.
pub struct AuthSession(pub BrowserSession);

impl<S> FromRequestParts<S> for AuthSession
where
    S: Send + Sync,
    StatefulSocialink: FromRef<S>,
{
    type Rejection = SocialinkAxumError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let (_, _, session) = request_session(parts, state).await?;
        if !session.is_authenticated() {
            return Err(SocialinkAxumError::Unauthorized(
                "Not logged in".to_string(),
            ));
        }
        Ok(AuthSession(session))
    }
}

/// Drains the messages queued for the current session.
pub struct FlashMessages(pub Vec<FlashMessage>);

impl<S> FromRequestParts<S> for FlashMessages
where
    S: Send + Sync,
    StatefulSocialink: FromRef<S>,
{
    type Rejection = SocialinkAxumError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let (socialink, cookies, mut session) = request_session(parts, state).await?;
        let messages = session.take_messages();
        if !messages.is_empty() {
            let id = session.id.clone();
            helpers::save_session(&socialink, &cookies, &id, &session).await?;
        }
        Ok(FlashMessages(messages))
    }
}

/// Mounts the login, callback and logout routes.
pub trait SocialinkAxumExt {
    fn axum_router<AppState>(&self) -> axum::Router<AppState>
    where
        AppState: Clone + Send + Sync + 'static,
        StatefulSocialink: FromRef<AppState>;
}

impl SocialinkAxumExt for StatefulSocialink {
    fn axum_router<AppState>(&self) -> axum::Router<AppState>
    where
        AppState: Clone + Send + Sync + 'static,
        StatefulSocialink: FromRef<AppState>,
    {
        use axum::routing::get;
        let login = self.routes.login.trim_end_matches('/');
        axum::Router::new()
            .route(
                &format!("{login}/{{network}}"),
                get(helpers::axum_login_handler),
            )
            .route(
                &format!("{login}/{{network}}/callback"),
                get(helpers::axum_callback_handler),
            )
            .route("/user/logout", get(helpers::axum_logout_handler))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request};
    use axum::routing::get;
    use axum::Router;
    use socialink_core::{ExternalProfile, OAuthProvider, OAuthToken};
    use socialink_flow::{FlowContext, OAuth2Flow, ProviderSettings};
    use socialink_session::MemoryStore;
    use socialink_store::{MemoryLinkStore, MemoryUserStore};
    use std::sync::Arc;
    use tower::ServiceExt;
    use tower_cookies::CookieManagerLayer;

    struct FakeProvider;

    #[async_trait]
    impl OAuthProvider for FakeProvider {
        fn provider_id(&self) -> &str {
            "social_auth_fake"
        }

        fn base_scopes(&self) -> &[&str] {
            &["email"]
        }

        fn get_authorization_url(&self, state: &str, _scopes: &[&str]) -> String {
            format!("https://idp.test/auth?state={state}")
        }

        async fn exchange_code_for_token(&self, code: &str) -> Result<OAuthToken, AuthError> {
            Ok(OAuthToken::bearer(format!("token-{code}")))
        }

        async fn fetch_profile(&self, token: &OAuthToken) -> Result<ExternalProfile, AuthError> {
            Ok(ExternalProfile::new("Jane Doe", "fake-1", token.access_token.clone())
                .with_email("jane@example.com"))
        }
    }

    async fn whoami(AuthSession(session): AuthSession) -> String {
        session.user_id.map(|id| id.to_string()).unwrap_or_default()
    }

    async fn messages(FlashMessages(messages): FlashMessages) -> String {
        messages
            .into_iter()
            .map(|m| m.text)
            .collect::<Vec<_>>()
            .join("|")
    }

    fn app() -> Router {
        let ctx = FlowContext::new(
            Arc::new(MemoryUserStore::default()),
            Arc::new(MemoryLinkStore::default()),
        );
        let flow = OAuth2Flow::new(
            FakeProvider,
            ProviderSettings::new("client", "secret"),
            ctx,
        );
        let socialink = Socialink::builder()
            .provider(flow)
            .session_store(Arc::new(MemoryStore::default()))
            .session_config(SessionConfig {
                secure: false,
                ..Default::default()
            })
            .build();

        Router::new()
            .route("/whoami", get(whoami))
            .route("/messages", get(messages))
            .merge(socialink.axum_router())
            .layer(CookieManagerLayer::new())
            .with_state(SocialinkState::from(socialink))
    }

    fn request(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn location(response: &Response) -> String {
        response.headers()[header::LOCATION]
            .to_str()
            .unwrap()
            .to_string()
    }

    fn session_cookie(response: &Response) -> String {
        let value = response.headers()[header::SET_COOKIE].to_str().unwrap();
        value.split(';').next().unwrap().to_string()
    }

    async fn body(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn full_login_round_trip() {
        let app = app();

        let response = app
            .clone()
            .oneshot(request("/user/login/fake?destination=/welcome", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let provider_url = location(&response);
        let state = provider_url
            .split("state=")
            .nth(1)
            .unwrap()
            .to_string();
        let anonymous = session_cookie(&response);

        let response = app
            .clone()
            .oneshot(request(
                &format!("/user/login/fake/callback?code=abc&state={state}"),
                Some(&anonymous),
            ))
            .await
            .unwrap();
        assert_eq!(location(&response), "/welcome");
        let logged_in = session_cookie(&response);
        assert_ne!(logged_in, anonymous);

        let response = app
            .clone()
            .oneshot(request("/whoami", Some(&logged_in)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await, "1");

        // The pre-login id is gone.
        let response = app
            .clone()
            .oneshot(request("/whoami", Some(&anonymous)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .clone()
            .oneshot(request("/user/logout", Some(&logged_in)))
            .await
            .unwrap();
        assert_eq!(location(&response), "/");
        let response = app
            .oneshot(request("/whoami", Some(&logged_in)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn forged_state_lands_on_front_page_with_message() {
        let app = app();

        let response = app
            .clone()
            .oneshot(request("/user/login/fake", None))
            .await
            .unwrap();
        let cookie = session_cookie(&response);

        let response = app
            .clone()
            .oneshot(request(
                "/user/login/fake/callback?code=abc&state=forged",
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(location(&response), "/");

        let response = app
            .oneshot(request("/messages", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(
            body(response).await,
            "Login failed. Invalid OAuth2 state."
        );
    }

    #[tokio::test]
    async fn unknown_network_is_not_found() {
        let response = app()
            .oneshot(request("/user/login/nope", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn foreign_destination_is_dropped() {
        let app = app();
        let response = app
            .clone()
            .oneshot(request(
                "/user/login/fake?destination=https://evil.example",
                None,
            ))
            .await
            .unwrap();
        let state = location(&response)
            .split("state=")
            .nth(1)
            .unwrap()
            .to_string();
        let cookie = session_cookie(&response);

        let response = app
            .oneshot(request(
                &format!("/user/login/fake/callback?code=abc&state={state}"),
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(location(&response), "/user");
    }
}
