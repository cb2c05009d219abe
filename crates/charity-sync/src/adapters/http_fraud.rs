//! HTTP fraud screen: `POST {base}/init` and `POST {base}/check`.

use std::time::Duration;

use async_trait::async_trait;

use super::http::{ServiceClient, ServiceError};
use crate::domain::{FraudVerdict, ScreeningRequest, SyncError, SyncResult};
use crate::ports::FraudScreen;

/// Fraud service client.
#[derive(Clone, Debug)]
pub struct HttpFraudScreen {
    client: ServiceClient,
}

impl HttpFraudScreen {
    /// Screen rooted at `base_url` (e.g. `http://localhost:3001/fraud-detection`).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> SyncResult<Self> {
        let client = ServiceClient::new(base_url, timeout).map_err(unavailable)?;
        Ok(Self { client })
    }
}

fn unavailable(e: ServiceError) -> SyncError {
    SyncError::ScreenUnavailable(e.to_string())
}

#[async_trait]
impl FraudScreen for HttpFraudScreen {
    async fn init(&self) -> SyncResult<()> {
        self.client
            .post("init", &serde_json::json!({}))
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn check(&self, request: &ScreeningRequest) -> SyncResult<FraudVerdict> {
        let response = self.client.post("check", request).await.map_err(unavailable)?;
        response
            .json::<FraudVerdict>()
            .await
            .map_err(|e| SyncError::ScreenUnavailable(format!("malformed verdict: {e}")))
    }
}
