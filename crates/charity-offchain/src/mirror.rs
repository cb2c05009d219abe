//! # Mirror Service
//!
//! | Route                    | Body                 |
//! |--------------------------|----------------------|
//! | `GET  /init`             | -                    |
//! | `POST /saveCharity`      | `CharityRecord`      |
//! | `POST /saveOrganisation` | `OrganisationRecord` |
//! | `POST /saveTransaction`  | `TransactionRecord`  |
//! | `GET  /charities`        | -                    |
//! | `GET  /organisations`    | -                    |
//! | `GET  /transactions`     | -                    |

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use charity_sync::domain::{CharityRecord, OrganisationRecord, TransactionRecord};
use tracing::info;

use crate::store::{MirrorDb, SaveOutcome};

/// Routes of the mirror service, relative to its prefix.
pub fn mirror_routes(db: Arc<MirrorDb>) -> Router {
    Router::new()
        .route("/init", get(init))
        .route("/saveCharity", post(save_charity))
        .route("/saveOrganisation", post(save_organisation))
        .route("/saveTransaction", post(save_transaction))
        .route("/charities", get(list_charities))
        .route("/organisations", get(list_organisations))
        .route("/transactions", get(list_transactions))
        .with_state(db)
}

async fn init() -> impl IntoResponse {
    (StatusCode::OK, "Mirror initialized successfully")
}

fn saved(kind: &'static str, outcome: SaveOutcome) -> impl IntoResponse {
    let replaced = matches!(outcome, SaveOutcome::Replaced(_));
    info!(kind, id = %outcome.id(), replaced, "Record saved");
    (StatusCode::OK, format!("{kind} saved successfully"))
}

async fn save_charity(
    State(db): State<Arc<MirrorDb>>,
    Json(record): Json<CharityRecord>,
) -> impl IntoResponse {
    saved("Charity", db.charities.save(record))
}

async fn save_organisation(
    State(db): State<Arc<MirrorDb>>,
    Json(record): Json<OrganisationRecord>,
) -> impl IntoResponse {
    saved("Organisation", db.organisations.save(record))
}

async fn save_transaction(
    State(db): State<Arc<MirrorDb>>,
    Json(record): Json<TransactionRecord>,
) -> impl IntoResponse {
    saved("Transaction", db.transactions.save(record))
}

async fn list_charities(State(db): State<Arc<MirrorDb>>) -> impl IntoResponse {
    Json(db.charities.all())
}

async fn list_organisations(State(db): State<Arc<MirrorDb>>) -> impl IntoResponse {
    Json(db.organisations.all())
}

async fn list_transactions(State(db): State<Arc<MirrorDb>>) -> impl IntoResponse {
    Json(db.transactions.all())
}
