use async_trait::async_trait;
use socialink_core::{AuthError, PictureStore};
use std::path::PathBuf;

const MAX_FILENAME_LENGTH: usize = 50;

/// Reduce `input` to `[a-z0-9_]`, at most 50 characters.
pub fn transliterate_filename(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .take(MAX_FILENAME_LENGTH)
        .collect()
}

/// Downloads profile pictures over HTTP into a local directory.
///
/// The returned file id is the path of the written file.
#[derive(Clone)]
pub struct HttpPictureStore {
    client: reqwest::Client,
    directory: PathBuf,
}

impl HttpPictureStore {
    /// Store pictures under `directory`, created on first use.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            directory: directory.into(),
        }
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl PictureStore for HttpPictureStore {
    async fn save_picture(
        &self,
        plugin_id: &str,
        provider_user_id: &str,
        url: &str,
    ) -> Result<String, AuthError> {
        if url.is_empty() || provider_user_id.is_empty() {
            return Err(AuthError::Provider("picture url or user id missing".into()));
        }

        tokio::fs::create_dir_all(&self.directory).await.map_err(|e| {
            AuthError::Persistence(format!(
                "Directory is not writable: {}: {e}",
                self.directory.display()
            ))
        })?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AuthError::Network(format!(
                "picture download returned {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let filename = format!(
            "{}.jpg",
            transliterate_filename(&format!("{plugin_id}_{provider_user_id}"))
        );
        let destination = self.directory.join(filename);
        tokio::fs::write(&destination, &bytes)
            .await
            .map_err(|e| AuthError::Persistence(e.to_string()))?;

        log::debug!(target: plugin_id, "Stored profile picture at {}", destination.display());
        Ok(destination.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn filenames_are_safe_and_bounded() {
        assert_eq!(
            transliterate_filename("social_auth_google_1234"),
            "social_auth_google_1234"
        );
        assert_eq!(transliterate_filename("Ab-c d/é"), "ab_c_d__");
        assert_eq!(transliterate_filename(&"x".repeat(80)).len(), 50);
    }

    #[tokio::test]
    async fn downloads_into_directory() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/photo.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF]))
            .mount(&server)
            .await;

        let dir = std::env::temp_dir().join(format!(
            "socialink-pictures-{}",
            socialink_core::state::random_token(8)
        ));
        let store = HttpPictureStore::new(&dir);
        let file = store
            .save_picture(
                "social_auth_google",
                "42",
                &format!("{}/photo.jpg", server.uri()),
            )
            .await
            .unwrap();

        assert!(file.ends_with("social_auth_google_42.jpg"));
        assert_eq!(tokio::fs::read(&file).await.unwrap(), vec![0xFF, 0xD8, 0xFF]);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn failed_download_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = HttpPictureStore::new(std::env::temp_dir().join("socialink-pictures-404"));
        let err = store
            .save_picture("social_auth_google", "42", &format!("{}/missing.jpg", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Network(_)));
    }
}
