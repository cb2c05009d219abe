//! # Fraud Service
//!
//! `GET|POST /init` and `POST /check`. Classification is delegated to a
//! [`FraudClassifier`]; the default one clears every donation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use charity_sync::domain::{FraudVerdict, ScreeningRequest};
use tracing::{info, warn};

/// Decides whether a donation looks fraudulent.
pub trait FraudClassifier: Send + Sync {
    /// `true` flags the donation.
    fn classify(&self, request: &ScreeningRequest) -> bool;
}

/// Classifier that never flags.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysClear;

impl FraudClassifier for AlwaysClear {
    fn classify(&self, _request: &ScreeningRequest) -> bool {
        false
    }
}

/// Shared state of the fraud service.
pub struct FraudState {
    classifier: Arc<dyn FraudClassifier>,
    checks: AtomicU64,
}

impl FraudState {
    /// State answering with `classifier`.
    pub fn new(classifier: Arc<dyn FraudClassifier>) -> Self {
        Self {
            classifier,
            checks: AtomicU64::new(0),
        }
    }

    /// Checks answered so far.
    pub fn checks(&self) -> u64 {
        self.checks.load(Ordering::Relaxed)
    }
}

impl Default for FraudState {
    fn default() -> Self {
        Self::new(Arc::new(AlwaysClear))
    }
}

/// Routes of the fraud service, relative to its prefix.
pub fn fraud_routes(state: Arc<FraudState>) -> Router {
    Router::new()
        .route("/init", get(init).post(init))
        .route("/check", post(check))
        .with_state(state)
}

async fn init() -> impl IntoResponse {
    (StatusCode::OK, "Fraud detection model initialized")
}

async fn check(
    State(state): State<Arc<FraudState>>,
    Json(request): Json<ScreeningRequest>,
) -> Json<FraudVerdict> {
    state.checks.fetch_add(1, Ordering::Relaxed);
    let is_fraud = state.classifier.classify(&request);
    if is_fraud {
        warn!(from = %request.from, to = %request.to, amount = %request.amount, "Donation flagged");
    } else {
        info!(from = %request.from, to = %request.to, "Donation cleared");
    }
    Json(FraudVerdict { is_fraud })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LargeAmounts;

    impl FraudClassifier for LargeAmounts {
        fn classify(&self, request: &ScreeningRequest) -> bool {
            request.amount.len() > 3
        }
    }

    fn request(amount: &str) -> ScreeningRequest {
        ScreeningRequest {
            from: "0xabc".into(),
            to: "charity#1".into(),
            amount: amount.into(),
        }
    }

    #[tokio::test]
    async fn test_default_classifier_clears() {
        let state = Arc::new(FraudState::default());
        let Json(verdict) = check(State(Arc::clone(&state)), Json(request("5"))).await;
        assert!(!verdict.is_fraud);
        assert_eq!(state.checks(), 1);
    }

    #[tokio::test]
    async fn test_custom_classifier() {
        let state = Arc::new(FraudState::new(Arc::new(LargeAmounts)));
        let Json(verdict) = check(State(state), Json(request("10000"))).await;
        assert!(verdict.is_fraud);
    }
}
