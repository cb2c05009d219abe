//! Binding and serving the two services.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::OffchainConfig;
use crate::fraud::{fraud_routes, FraudState};
use crate::mirror::mirror_routes;
use crate::store::MirrorDb;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Listener could not bind.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Requested address
        addr: SocketAddr,
        /// Underlying I/O error
        source: std::io::Error,
    },
    /// Server loop failed.
    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Mirror service app: routes nested under `prefix`, permissive CORS.
pub fn mirror_app(prefix: &str, db: Arc<MirrorDb>) -> Router {
    Router::new()
        .nest(prefix, mirror_routes(db))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Fraud service app: routes nested under `prefix`.
pub fn fraud_app(prefix: &str, state: Arc<FraudState>) -> Router {
    Router::new()
        .nest(prefix, fraud_routes(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// A running service.
pub struct RunningService {
    /// Bound address (resolved when port 0 was requested).
    pub addr: SocketAddr,
    /// Serve task.
    pub handle: JoinHandle<Result<(), ServerError>>,
}

/// Bind `addr` and serve `app` in the background.
pub async fn spawn_service(
    name: &'static str,
    addr: SocketAddr,
    app: Router,
) -> Result<RunningService, ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    let addr = listener.local_addr()?;
    info!(service = name, %addr, "Listening");

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.map_err(|e| {
            error!(service = name, error = %e, "Server stopped");
            ServerError::Serve(e)
        })
    });
    Ok(RunningService { addr, handle })
}

/// Both services, started from one config.
pub struct OffchainServices {
    /// Mirror service.
    pub mirror: RunningService,
    /// Fraud service.
    pub fraud: RunningService,
    /// Collections behind the mirror.
    pub db: Arc<MirrorDb>,
    /// Fraud service state.
    pub fraud_state: Arc<FraudState>,
}

impl OffchainServices {
    /// Bind both services on the configured addresses.
    pub async fn start(
        config: &OffchainConfig,
        fraud_state: Arc<FraudState>,
    ) -> Result<Self, ServerError> {
        let db = Arc::new(MirrorDb::new());
        let mirror = spawn_service(
            "mirror",
            config.mirror_addr(),
            mirror_app(&config.mirror_prefix, Arc::clone(&db)),
        )
        .await?;
        let fraud = spawn_service(
            "fraud",
            config.fraud_addr(),
            fraud_app(&config.fraud_prefix, Arc::clone(&fraud_state)),
        )
        .await?;

        Ok(Self {
            mirror,
            fraud,
            db,
            fraud_state,
        })
    }

    /// Base URL of the mirror routes, e.g. `http://127.0.0.1:3000/mongodb`.
    pub fn mirror_url(&self, config: &OffchainConfig) -> String {
        format!("http://{}{}", self.mirror.addr, config.mirror_prefix)
    }

    /// Base URL of the fraud routes.
    pub fn fraud_url(&self, config: &OffchainConfig) -> String {
        format!("http://{}{}", self.fraud.addr, config.fraud_prefix)
    }

    /// Stop both serve tasks.
    pub fn abort(&self) {
        self.mirror.handle.abort();
        self.fraud.handle.abort();
    }
}
