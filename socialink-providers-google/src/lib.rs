//! Google provider adapter.
//!
//! Requests the `email` and `profile` scopes plus any configured extras, asks for offline
//! access, and can restrict sign-in to one hosted domain.

use async_trait::async_trait;
use serde::Deserialize;
use socialink_core::{AuthError, ExternalProfile, OAuthProvider, OAuthToken};

const PLUGIN_ID: &str = "social_auth_google";
const BASE_SCOPES: &[&str] = &["email", "profile"];

const AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const API_DOMAIN: &str = "https://www.googleapis.com";

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    name: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    email: Option<String>,
    picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// The Google OAuth2 provider.
#[derive(Clone)]
pub struct GoogleProvider {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    restricted_domain: Option<String>,
    http_client: reqwest::Client,
    authorization_url: String,
    token_url: String,
    userinfo_url: String,
    api_domain: String,
}

impl GoogleProvider {
    /// Create a provider with the given client credentials and callback URL.
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_uri,
            restricted_domain: None,
            http_client: reqwest::Client::new(),
            authorization_url: AUTHORIZATION_ENDPOINT.to_string(),
            token_url: TOKEN_ENDPOINT.to_string(),
            userinfo_url: USERINFO_ENDPOINT.to_string(),
            api_domain: API_DOMAIN.to_string(),
        }
    }

    /// Only accept accounts of this G Suite domain (the `hd` parameter).
    pub fn with_restricted_domain(mut self, domain: impl Into<String>) -> Self {
        let domain = domain.into();
        self.restricted_domain = (!domain.trim().is_empty()).then(|| domain.trim().to_string());
        self
    }

    /// Override the Google endpoints, e.g. to point at a mock server.
    pub fn with_endpoints(
        mut self,
        authorization_url: String,
        token_url: String,
        userinfo_url: String,
        api_domain: String,
    ) -> Self {
        self.authorization_url = authorization_url;
        self.token_url = token_url;
        self.userinfo_url = userinfo_url;
        self.api_domain = api_domain;
        self
    }

    /// Use a preconfigured HTTP client.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = client;
        self
    }

    async fn error_detail(response: reqwest::Response) -> String {
        let status = response.status();
        match response.json::<GoogleErrorResponse>().await {
            Ok(body) => match body.error_description {
                Some(description) => format!("{status}: {} ({description})", body.error),
                None => format!("{status}: {}", body.error),
            },
            Err(_) => status.to_string(),
        }
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn provider_id(&self) -> &str {
        PLUGIN_ID
    }

    fn base_scopes(&self) -> &[&str] {
        BASE_SCOPES
    }

    fn get_authorization_url(&self, state: &str, scopes: &[&str]) -> String {
        let mut url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&access_type=offline",
            self.authorization_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&scopes.join(" ")),
            urlencoding::encode(state),
        );
        if let Some(domain) = &self.restricted_domain {
            url.push_str(&format!("&hd={}", urlencoding::encode(domain)));
        }
        url
    }

    async fn exchange_code_for_token(&self, code: &str) -> Result<OAuthToken, AuthError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::TokenExchange(Self::error_detail(response).await));
        }

        response
            .json::<OAuthToken>()
            .await
            .map_err(|e| AuthError::TokenExchange(format!("invalid token response: {e}")))
    }

    async fn fetch_profile(&self, token: &OAuthToken) -> Result<ExternalProfile, AuthError> {
        let response = self
            .http_client
            .get(&self.userinfo_url)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::ProfileFetch(Self::error_detail(response).await));
        }

        let info: GoogleUserInfo = response
            .json()
            .await
            .map_err(|e| AuthError::ProfileFetch(format!("invalid userinfo response: {e}")))?;

        let mut profile = ExternalProfile::new(
            info.name.unwrap_or_default(),
            info.sub,
            token.access_token.clone(),
        );
        profile.email = info.email;
        profile.picture_url = info.picture;
        profile.first_name = info.given_name;
        profile.last_name = info.family_name;
        Ok(profile)
    }

    async fn request_endpoint(
        &self,
        token: &OAuthToken,
        path: &str,
    ) -> Result<serde_json::Value, AuthError> {
        let url = format!("{}{}", self.api_domain, path);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::Provider(format!(
                "request to {url} failed: {}",
                Self::error_detail(response).await
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::Provider(format!("invalid response from {url}: {e}")))
    }
}
