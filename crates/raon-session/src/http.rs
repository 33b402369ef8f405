//! `Backend` over HTTP with reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use raon_core::config::BackendConfig;

use crate::backend::{
    Backend, ConfigurationBundle, CreateSessionRequest, CreatedSession, Credentials,
    MessageSaveRequest, StoredMessage,
};
use crate::error::BackendError;

/// HTTP client for the Raon backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    http: Client,
}

impl HttpBackend {
    /// Create a client pointing at the API root, e.g.
    /// `http://localhost:8086/raon/api`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        Self::new(&config.base_url, config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Parse an error response into a `BackendError`.
    async fn parse_error(&self, response: reqwest::Response) -> BackendError {
        let status = response.status().as_u16();

        // The backend answers failures with `{"error": ..., "message": ...}`.
        match response.json::<ErrorBody>().await {
            Ok(body) => BackendError::Api {
                status,
                message: body
                    .message
                    .or(body.error)
                    .unwrap_or_else(|| format!("HTTP {}", status)),
            },
            Err(_) => BackendError::Api {
                status,
                message: format!("HTTP {}", status),
            },
        }
    }

    /// Parse a successful JSON response or convert an error response.
    async fn json_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, BackendError> {
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(self.parse_error(response).await)
        }
    }

    async fn empty_response(&self, response: reqwest::Response) -> Result<(), BackendError> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.parse_error(response).await)
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

#[async_trait]
impl Backend for HttpBackend {
    async fn credentials(&self) -> Result<Credentials, BackendError> {
        let response = self
            .http
            .get(self.url("/persoai/credentials"))
            .send()
            .await?;
        self.json_response(response).await
    }

    async fn configuration_bundle(
        &self,
        force_refresh: bool,
    ) -> Result<ConfigurationBundle, BackendError> {
        let response = self
            .http
            .get(self.url("/persoai/configurations"))
            .query(&[("forceRefresh", force_refresh)])
            .send()
            .await?;
        self.json_response(response).await
    }

    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CreatedSession, BackendError> {
        tracing::debug!(
            prompt_id = %request.prompt_id,
            previous_chat_room_id = ?request.previous_chat_room_id,
            "POST /sessions/create"
        );
        let response = self
            .http
            .post(self.url("/sessions/create"))
            .json(request)
            .send()
            .await?;
        self.json_response(response).await
    }

    async fn session_messages(&self, session_id: &str) -> Result<Vec<StoredMessage>, BackendError> {
        let response = self
            .http
            .get(self.url(&format!("/sessions/{}/messages", session_id)))
            .send()
            .await?;
        self.json_response(response).await
    }

    async fn chat_room_messages(
        &self,
        chat_room_id: i64,
    ) -> Result<Vec<StoredMessage>, BackendError> {
        let response = self
            .http
            .get(self.url(&format!("/chatrooms/{}/messages", chat_room_id)))
            .send()
            .await?;
        self.json_response(response).await
    }

    async fn save_message(
        &self,
        session_id: &str,
        request: &MessageSaveRequest,
    ) -> Result<(), BackendError> {
        let response = self
            .http
            .post(self.url(&format!("/sessions/{}/messages", session_id)))
            .json(request)
            .send()
            .await?;
        self.empty_response(response).await
    }

    async fn terminate_session(&self, session_id: &str) -> Result<(), BackendError> {
        let response = self
            .http
            .post(self.url(&format!("/sessions/{}/terminate", session_id)))
            .send()
            .await?;
        self.empty_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_trailing_slash() {
        let backend =
            HttpBackend::new("http://localhost:8086/raon/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(backend.base_url(), "http://localhost:8086/raon/api");
        assert_eq!(
            backend.url("/sessions/create"),
            "http://localhost:8086/raon/api/sessions/create"
        );
    }

    #[test]
    fn test_from_default_config() {
        let backend = HttpBackend::from_config(&BackendConfig::default()).unwrap();
        assert_eq!(backend.base_url(), "http://localhost:8086/raon/api");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_request_error() {
        // Port 9 (discard) is not served on loopback in test environments.
        let backend = HttpBackend::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = backend.credentials().await.unwrap_err();
        assert!(matches!(err, BackendError::Request(_)));
    }
}
