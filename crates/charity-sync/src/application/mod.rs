//! # Application Module
//!
//! The sync engine, its listener registry and the wallet event bridge.

pub mod engine;
pub mod publisher;
pub mod wallet;

pub use engine::SyncEngine;
pub use publisher::{ListenerRegistry, Subscription};
pub use wallet::spawn_wallet_listener;
