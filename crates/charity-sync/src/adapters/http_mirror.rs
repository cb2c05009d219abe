//! # HTTP Mirror Adapter
//!
//! `MirrorStore` over the mirror service routes:
//!
//! | Call                  | Route                     |
//! |-----------------------|---------------------------|
//! | `init`                | `GET  {base}/init`        |
//! | `upsert_charity`      | `POST {base}/saveCharity` |
//! | `upsert_organisation` | `POST {base}/saveOrganisation` |
//! | `append_transaction`  | `POST {base}/saveTransaction` |

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::http::{ServiceClient, ServiceError};
use crate::domain::{CharityRecord, OrganisationRecord, SyncError, SyncResult, TransactionRecord};
use crate::ports::MirrorStore;

/// Mirror service client.
#[derive(Clone, Debug)]
pub struct HttpMirrorStore {
    client: ServiceClient,
}

impl HttpMirrorStore {
    /// Mirror rooted at `base_url` (e.g. `http://localhost:3000/mongodb`).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> SyncResult<Self> {
        let client = ServiceClient::new(base_url, timeout).map_err(unavailable)?;
        Ok(Self { client })
    }

    async fn save<B: serde::Serialize + Sync>(&self, path: &str, body: &B) -> SyncResult<()> {
        self.client.post(path, body).await.map_err(unavailable)?;
        debug!(base = self.client.base_url(), path, "Mirror write accepted");
        Ok(())
    }
}

fn unavailable(e: ServiceError) -> SyncError {
    SyncError::MirrorUnavailable(e.to_string())
}

#[async_trait]
impl MirrorStore for HttpMirrorStore {
    async fn init(&self) -> SyncResult<()> {
        self.client.get("init").await.map_err(unavailable)?;
        Ok(())
    }

    async fn upsert_charity(&self, record: &CharityRecord) -> SyncResult<()> {
        self.save("saveCharity", record).await
    }

    async fn upsert_organisation(&self, record: &OrganisationRecord) -> SyncResult<()> {
        self.save("saveOrganisation", record).await
    }

    async fn append_transaction(&self, record: &TransactionRecord) -> SyncResult<()> {
        self.save("saveTransaction", record).await
    }
}
