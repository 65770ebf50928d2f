//! # Axum Google Login Example
//!
//! Sign in with Google, link the Google identity to a local account and show the result.
//!
//! Required environment (a `.env` file works too):
//!
//! - `SOCIALINK_GOOGLE_CLIENT_ID`, `SOCIALINK_GOOGLE_CLIENT_SECRET`
//!
//! Optional:
//!
//! - `SOCIALINK_GOOGLE_REDIRECT_URI` (default `http://localhost:3000/user/login/google/callback`)
//! - `SOCIALINK_GOOGLE_SCOPES`, `SOCIALINK_GOOGLE_ENDPOINTS`, `SOCIALINK_GOOGLE_RESTRICTED_DOMAIN`
//! - `SOCIALINK_DATABASE_URL` to keep identity links in SQLite, e.g. `sqlite://links.db?mode=rwc`
//! - `REDIS_URL` to keep sessions in Redis
//! - any of the global `SOCIALINK_*` settings, e.g. `SOCIALINK_USER_ALLOWED=login`

use axum::{
    extract::State,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use socialink::providers::google::GoogleProvider;
use socialink_axum::{AuthSession, FlashMessages, SocialinkAxumExt, SocialinkState};
use socialink_core::{IdentityLinkRepository, UserStore};
use socialink_flow::{
    FlowContext, HttpPictureStore, OAuth2Flow, ProviderSettings, SessionConfig, Socialink,
    SocialAuthSettings,
};
use socialink_session::SessionStore;
use socialink_store::{MemoryLinkStore, MemoryUserStore, SqlLinkStore};
use std::sync::Arc;
use tower_cookies::CookieManagerLayer;

#[derive(Clone)]
struct AppState {
    socialink: SocialinkState,
    users: Arc<dyn UserStore>,
    links: Arc<dyn IdentityLinkRepository>,
}

impl axum::extract::FromRef<AppState> for socialink_flow::StatefulSocialink {
    fn from_ref(state: &AppState) -> Self {
        state.socialink.socialink.clone()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let settings = SocialAuthSettings::from_env()?;

    let users: Arc<dyn UserStore> = Arc::new(MemoryUserStore::default());
    let links: Arc<dyn IdentityLinkRepository> =
        if let Ok(database_url) = std::env::var("SOCIALINK_DATABASE_URL") {
            log::info!("Storing identity links in {database_url}");
            let pool = sqlx::sqlite::SqlitePoolOptions::new()
                .connect(&database_url)
                .await?;
            let store = SqlLinkStore::new(pool);
            store.migrate().await?;
            Arc::new(store)
        } else {
            log::info!("Storing identity links in memory");
            Arc::new(MemoryLinkStore::default())
        };

    let ctx = FlowContext::new(users.clone(), links.clone())
        .with_settings(settings)
        .with_picture_store(Arc::new(HttpPictureStore::new("pictures")));

    let redirect_uri = std::env::var("SOCIALINK_GOOGLE_REDIRECT_URI")
        .unwrap_or_else(|_| "http://localhost:3000/user/login/google/callback".to_string());
    let provider_settings = ProviderSettings::from_env("google");
    let mut google = GoogleProvider::new(
        provider_settings.client_id.clone(),
        provider_settings.client_secret.clone(),
        redirect_uri,
    );
    if let Ok(domain) = std::env::var("SOCIALINK_GOOGLE_RESTRICTED_DOMAIN") {
        google = google.with_restricted_domain(domain);
    }

    let session_store: Arc<dyn SessionStore> = if let Ok(redis_url) = std::env::var("REDIS_URL") {
        log::info!("Using RedisStore at {redis_url}");
        Arc::new(socialink_session::RedisStore::new(&redis_url, "socialink".into())?)
    } else {
        log::info!("Using MemoryStore");
        Arc::new(socialink_session::MemoryStore::default())
    };

    let socialink = Socialink::builder()
        .provider(OAuth2Flow::new(google, provider_settings, ctx))
        .session_store(session_store)
        .session_config(SessionConfig {
            secure: false,
            ..Default::default()
        })
        .build();

    let state = AppState {
        socialink: SocialinkState::from(socialink.clone()),
        users,
        links,
    };

    let app = Router::new()
        .route("/", get(index))
        .route("/user/login", get(login_form))
        .route("/user", get(account))
        .route("/user/{id}/edit", get(account))
        .merge(socialink.axum_router())
        .layer(CookieManagerLayer::new())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
    log::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

fn render_messages(messages: &[socialink_session::FlashMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("<p class=\"{:?}\">{}</p>", m.level, m.text))
        .collect()
}

async fn index(FlashMessages(messages): FlashMessages) -> impl IntoResponse {
    Html(format!(
        "<h1>Socialink</h1>{}<a href=\"/user/login\">Log in</a> | <a href=\"/user\">My account</a>",
        render_messages(&messages)
    ))
}

async fn login_form(FlashMessages(messages): FlashMessages) -> impl IntoResponse {
    Html(format!(
        "<h1>Log in</h1>{}<a href=\"/user/login/google?destination=/user\">Log in with Google</a>",
        render_messages(&messages)
    ))
}

async fn account(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    FlashMessages(messages): FlashMessages,
) -> impl IntoResponse {
    let Some(user_id) = session.user_id else {
        return Html("Not logged in".to_string());
    };
    let user = match state.users.load_by_id(user_id).await {
        Ok(Some(user)) => user,
        _ => return Html("Account not found".to_string()),
    };
    let linked = state
        .links
        .links_for_user(user_id)
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|l| format!("<li>{} ({})</li>", l.plugin_id, l.provider_user_id))
        .collect::<String>();

    Html(format!(
        "<h1>{}</h1>{}<p>Email: {}</p><p>Linked identities:</p><ul>{}</ul><a href=\"/user/logout\">Log out</a>",
        user.name,
        render_messages(&messages),
        user.email.unwrap_or_default(),
        linked
    ))
}
