//! # Sync Configuration
//!
//! Engine tuning and service endpoints. Both read `CHARITY_*` environment
//! variables and fall back to the defaults below.

use crate::domain::{DEFAULT_GAS_LIMIT, DEFAULT_LATEST_CHARITIES};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// SyncEngine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Bound on one ledger read round trip.
    pub call_timeout_ms: u64,

    /// Bound on one ledger write, including inclusion.
    pub write_timeout_ms: u64,

    /// Bound on one mirror or fraud screen call.
    pub side_call_timeout_ms: u64,

    /// Length of the most-recent-first charity slice.
    pub latest_charities: usize,

    /// Gas attached to writes.
    pub gas_limit: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 30_000,
            write_timeout_ms: 120_000,
            side_call_timeout_ms: 5_000,
            latest_charities: DEFAULT_LATEST_CHARITIES,
            gas_limit: DEFAULT_GAS_LIMIT,
        }
    }
}

impl SyncConfig {
    /// Create a config for testing (short timeouts).
    pub fn for_testing() -> Self {
        Self {
            call_timeout_ms: 500,
            write_timeout_ms: 1_000,
            side_call_timeout_ms: 200,
            ..Self::default()
        }
    }

    /// Create configuration from environment variables.
    ///
    /// - `CHARITY_CALL_TIMEOUT_MS`
    /// - `CHARITY_WRITE_TIMEOUT_MS`
    /// - `CHARITY_SIDE_CALL_TIMEOUT_MS`
    /// - `CHARITY_LATEST_CHARITIES`
    /// - `CHARITY_GAS_LIMIT`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            call_timeout_ms: env_or("CHARITY_CALL_TIMEOUT_MS", defaults.call_timeout_ms),
            write_timeout_ms: env_or("CHARITY_WRITE_TIMEOUT_MS", defaults.write_timeout_ms),
            side_call_timeout_ms: env_or(
                "CHARITY_SIDE_CALL_TIMEOUT_MS",
                defaults.side_call_timeout_ms,
            ),
            latest_charities: env_or("CHARITY_LATEST_CHARITIES", defaults.latest_charities),
            gas_limit: env_or("CHARITY_GAS_LIMIT", defaults.gas_limit),
        }
    }

    /// `call_timeout_ms` as a `Duration`.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// `write_timeout_ms` as a `Duration`.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// `side_call_timeout_ms` as a `Duration`.
    pub fn side_call_timeout(&self) -> Duration {
        Duration::from_millis(self.side_call_timeout_ms)
    }
}

/// Where the ledger node, contract descriptor and off-chain services live.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// JSON-RPC endpoint of the wallet/node.
    pub rpc_url: String,

    /// Truffle-style contract artifact.
    pub descriptor_path: String,

    /// Base URL of the mirror service.
    pub mirror_url: String,

    /// Base URL of the fraud service.
    pub fraud_url: String,

    /// Wallet account/chain polling interval.
    pub wallet_poll_ms: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            descriptor_path: "Charity.json".to_string(),
            mirror_url: "http://localhost:3000/mongodb".to_string(),
            fraud_url: "http://localhost:3001/fraud-detection".to_string(),
            wallet_poll_ms: 1_000,
        }
    }
}

impl EndpointConfig {
    /// Create configuration from environment variables.
    ///
    /// - `CHARITY_RPC_URL`
    /// - `CHARITY_DESCRIPTOR_PATH`
    /// - `CHARITY_MIRROR_URL`
    /// - `CHARITY_FRAUD_URL`
    /// - `CHARITY_WALLET_POLL_MS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            rpc_url: env::var("CHARITY_RPC_URL").unwrap_or(defaults.rpc_url),
            descriptor_path: env::var("CHARITY_DESCRIPTOR_PATH")
                .unwrap_or(defaults.descriptor_path),
            mirror_url: env::var("CHARITY_MIRROR_URL").unwrap_or(defaults.mirror_url),
            fraud_url: env::var("CHARITY_FRAUD_URL").unwrap_or(defaults.fraud_url),
            wallet_poll_ms: env_or("CHARITY_WALLET_POLL_MS", defaults.wallet_poll_ms),
        }
    }

    /// `wallet_poll_ms` as a `Duration`.
    pub fn wallet_poll_interval(&self) -> Duration {
        Duration::from_millis(self.wallet_poll_ms)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.latest_charities, 3);
        assert_eq!(config.gas_limit, 3_000_000);
        assert_eq!(config.call_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_testing_config() {
        let config = SyncConfig::for_testing();
        assert!(config.call_timeout_ms < SyncConfig::default().call_timeout_ms);
        assert_eq!(config.gas_limit, DEFAULT_GAS_LIMIT);
    }

    #[test]
    fn test_default_endpoints() {
        let endpoints = EndpointConfig::default();
        assert_eq!(endpoints.mirror_url, "http://localhost:3000/mongodb");
        assert_eq!(endpoints.fraud_url, "http://localhost:3001/fraud-detection");
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        assert_eq!(env_or("CHARITY_TEST_UNSET_KEY", 7u64), 7);
    }
}
