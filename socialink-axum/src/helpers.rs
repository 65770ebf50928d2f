use crate::SocialinkAxumError;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::Redirect;
use serde::Deserialize;
use socialink_core::SameSite;
use socialink_flow::{
    AuthOutcome, BrowserSession, CallbackParams, HasSessionStore, SessionConfig, StatefulSocialink,
};
use tower_cookies::{cookie, Cookie, Cookies};

/// Query string of the login route.
#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    /// Local path to return to after a successful login.
    pub destination: Option<String>,
}

/// Build the session cookie for `session_id`.
pub fn session_cookie(config: &SessionConfig, session_id: &str) -> Cookie<'static> {
    let same_site = match config.same_site {
        SameSite::Lax => cookie::SameSite::Lax,
        SameSite::Strict => cookie::SameSite::Strict,
        SameSite::None => cookie::SameSite::None,
    };
    let mut cookie = Cookie::build((config.cookie_name.clone(), session_id.to_string()))
        .path(config.path.clone())
        .secure(config.secure)
        .http_only(config.http_only)
        .same_site(same_site)
        .build();
    if let Some(max_age) = config.max_age {
        cookie.set_max_age(cookie::time::Duration::seconds(max_age.num_seconds()));
    }
    cookie
}

/// Load the session named by the request cookie, or start an anonymous one.
pub async fn get_session(
    socialink: &StatefulSocialink,
    cookies: &Cookies,
) -> Result<BrowserSession, SocialinkAxumError> {
    let id = cookies
        .get(&socialink.session_config.cookie_name)
        .map(|c| c.value().to_string());
    Ok(socialink.load_or_create_session(id.as_deref()).await?)
}

/// Persist `session` and point the cookie at it. A rotated id replaces `previous_id`.
pub async fn save_session(
    socialink: &StatefulSocialink,
    cookies: &Cookies,
    previous_id: &str,
    session: &BrowserSession,
) -> Result<(), SocialinkAxumError> {
    let store = socialink.session_store();
    if previous_id != session.id {
        store.delete_session(previous_id).await?;
    }
    store.save_session(session).await?;
    cookies.add(session_cookie(&socialink.session_config, &session.id));
    Ok(())
}

/// Only local paths are accepted as post-login destinations.
pub fn sanitize_destination(destination: Option<&str>) -> Option<&str> {
    destination.filter(|d| d.starts_with('/') && !d.starts_with("//") && !d.contains('\\'))
}

/// The primary language of the first `Accept-Language` entry.
pub fn preferred_langcode(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::ACCEPT_LANGUAGE)?.to_str().ok()?;
    let first = value.split(',').next()?.split(';').next()?.trim();
    let primary = first.split('-').next()?.trim().to_ascii_lowercase();
    (!primary.is_empty() && primary != "*").then_some(primary)
}

async fn finish(
    socialink: &StatefulSocialink,
    cookies: &Cookies,
    previous_id: &str,
    mut session: BrowserSession,
    outcome: AuthOutcome,
) -> Result<Redirect, SocialinkAxumError> {
    let location = outcome.target.location(&socialink.routes);
    for message in outcome.messages {
        session.push_message(message);
    }
    save_session(socialink, cookies, previous_id, &session).await?;
    Ok(Redirect::to(&location))
}

/// `GET {login}/{network}`: send the browser to the provider.
pub async fn axum_login_handler(
    Path(network): Path<String>,
    Query(query): Query<LoginQuery>,
    State(socialink): State<StatefulSocialink>,
    cookies: Cookies,
) -> Result<Redirect, SocialinkAxumError> {
    let flow = socialink
        .flow(&network)
        .ok_or_else(|| SocialinkAxumError::NotFound(format!("Unknown provider '{network}'")))?;

    let mut session = get_session(&socialink, &cookies).await?;
    let previous_id = session.id.clone();
    let destination = sanitize_destination(query.destination.as_deref());
    if query.destination.is_some() && destination.is_none() {
        log::warn!(target: flow.plugin_id(), "Ignoring non-local destination");
    }

    let outcome = flow.redirect_to_provider(&mut session, destination).await?;
    finish(&socialink, &cookies, &previous_id, session, outcome).await
}

/// `GET {login}/{network}/callback`: complete the login.
pub async fn axum_callback_handler(
    Path(network): Path<String>,
    Query(mut params): Query<CallbackParams>,
    State(socialink): State<StatefulSocialink>,
    headers: HeaderMap,
    cookies: Cookies,
) -> Result<Redirect, SocialinkAxumError> {
    let flow = socialink
        .flow(&network)
        .ok_or_else(|| SocialinkAxumError::NotFound(format!("Unknown provider '{network}'")))?;

    params.langcode = preferred_langcode(&headers);
    let mut session = get_session(&socialink, &cookies).await?;
    let previous_id = session.id.clone();

    let outcome = flow.callback(&mut session, params).await?;
    finish(&socialink, &cookies, &previous_id, session, outcome).await
}

/// `GET /user/logout`: drop the session and return to the front page.
pub async fn axum_logout_handler(
    State(socialink): State<StatefulSocialink>,
    cookies: Cookies,
) -> Result<Redirect, SocialinkAxumError> {
    let cookie_name = socialink.session_config.cookie_name.clone();
    if let Some(cookie) = cookies.get(&cookie_name) {
        socialink.session_store().delete_session(cookie.value()).await?;
        cookies.remove(
            Cookie::build((cookie_name, ""))
                .path(socialink.session_config.path.clone())
                .build(),
        );
    }
    Ok(Redirect::to(&socialink.routes.front))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn destinations_must_be_local() {
        assert_eq!(sanitize_destination(Some("/node/1")), Some("/node/1"));
        assert_eq!(sanitize_destination(Some("//evil.example")), None);
        assert_eq!(sanitize_destination(Some("https://evil.example")), None);
        assert_eq!(sanitize_destination(Some("/\\evil.example")), None);
        assert_eq!(sanitize_destination(None), None);
    }

    #[test]
    fn langcode_from_accept_language() {
        let mut headers = HeaderMap::new();
        assert_eq!(preferred_langcode(&headers), None);

        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("fr-CH, fr;q=0.9, en;q=0.8"),
        );
        assert_eq!(preferred_langcode(&headers).as_deref(), Some("fr"));

        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("*"));
        assert_eq!(preferred_langcode(&headers), None);
    }

    #[test]
    fn cookie_follows_config() {
        let config = SessionConfig {
            secure: false,
            same_site: SameSite::Strict,
            ..Default::default()
        };
        let cookie = session_cookie(&config, "abc");
        assert_eq!(cookie.name(), "socialink_session");
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.secure(), Some(false));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(cookie::SameSite::Strict));
        assert_eq!(
            cookie.max_age(),
            Some(cookie::time::Duration::seconds(24 * 3600))
        );
    }
}
