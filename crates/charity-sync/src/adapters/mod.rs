//! # Adapters Module
//!
//! Implementations of the outbound ports: in-memory doubles, the JSON-RPC
//! ledger and HTTP clients for the off-chain services.

pub mod abi;
pub mod http;
pub mod http_fraud;
pub mod http_mirror;
pub mod json_rpc;
pub mod memory;
pub mod wallet_poller;

pub use abi::{AbiError, ContractDescriptor, Token};
pub use http_fraud::HttpFraudScreen;
pub use http_mirror::HttpMirrorStore;
pub use json_rpc::JsonRpcLedger;
pub use memory::{InMemoryLedger, InMemoryMirror, MirrorCall, StaticFraudScreen};
pub use wallet_poller::spawn_wallet_poller;
