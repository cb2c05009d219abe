//! # Charity Off-chain Services
//!
//! The mirror service (stores created charities, organisations and donation
//! records) and the fraud service (classifies donations). Both are axum
//! routers over in-memory state.
//!
//! ## Module Structure
//!
//! ```text
//! charity-offchain/
//! ├── store.rs     # MirrorDb collections, upsert by ledgerId
//! ├── mirror.rs    # /init, /saveCharity, /saveOrganisation, /saveTransaction
//! ├── fraud.rs     # /init, /check, FraudClassifier
//! ├── server.rs    # Binding, CORS, tracing
//! └── config.rs    # OffchainConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod fraud;
pub mod mirror;
pub mod server;
pub mod store;

pub use config::OffchainConfig;
pub use fraud::{AlwaysClear, FraudClassifier, FraudState};
pub use server::{fraud_app, mirror_app, spawn_service, OffchainServices, ServerError};
pub use store::{MirrorDb, SaveOutcome, Stored};
