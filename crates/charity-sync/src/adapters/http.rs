//! Shared HTTP client for the off-chain services.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::Serialize;
use thiserror::Error;

/// Errors talking to an off-chain service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Request failed in transport or decoding.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Service not reachable.
    #[error("Connection failed: {0}")]
    Connection(String),
    /// Non-success status.
    #[error("{path} returned {status}")]
    Status {
        /// Route that failed
        path: String,
        /// HTTP status code
        status: u16,
    },
}

/// JSON client bound to one service base URL.
#[derive(Clone, Debug)]
pub struct ServiceClient {
    client: Client,
    base_url: String,
}

impl ServiceClient {
    /// Create a client whose requests give up after `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(2)))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Base URL with no trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `GET path`, failing on non-success status.
    pub async fn get(&self, path: &str) -> Result<Response, ServiceError> {
        let sent = self.client.get(self.url(path)).send().await;
        self.check(path, sent)
    }

    /// `POST path` with a JSON body, failing on non-success status.
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Response, ServiceError> {
        let sent = self.client.post(self.url(path)).json(body).send().await;
        self.check(path, sent)
    }

    fn check(
        &self,
        path: &str,
        sent: Result<Response, reqwest::Error>,
    ) -> Result<Response, ServiceError> {
        let response = sent.map_err(|e| {
            if e.is_connect() {
                ServiceError::Connection(format!("Cannot connect to {}", self.base_url))
            } else {
                ServiceError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = ServiceClient::new("http://localhost:3000/mongodb/", Duration::from_secs(1))
            .unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000/mongodb");
        assert_eq!(
            client.url("/saveCharity"),
            "http://localhost:3000/mongodb/saveCharity"
        );
    }

    #[tokio::test]
    async fn test_unreachable_service_is_connection_error() {
        let client = ServiceClient::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let err = client.get("init").await.unwrap_err();
        assert!(matches!(err, ServiceError::Connection(_) | ServiceError::Http(_)));
    }
}
