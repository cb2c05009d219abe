//! Off-chain service configuration.

use serde::{Deserialize, Serialize};
use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Where the mirror and fraud services listen.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OffchainConfig {
    /// Bind address for both services.
    pub host: IpAddr,
    /// Mirror service port.
    pub mirror_port: u16,
    /// Fraud service port.
    pub fraud_port: u16,
    /// Path prefix of the mirror routes.
    pub mirror_prefix: String,
    /// Path prefix of the fraud routes.
    pub fraud_prefix: String,
}

impl Default for OffchainConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            mirror_port: 3000,
            fraud_port: 3001,
            mirror_prefix: "/mongodb".to_string(),
            fraud_prefix: "/fraud-detection".to_string(),
        }
    }
}

impl OffchainConfig {
    /// Ephemeral ports on localhost.
    pub fn for_testing() -> Self {
        Self {
            mirror_port: 0,
            fraud_port: 0,
            ..Self::default()
        }
    }

    /// Create configuration from environment variables.
    ///
    /// - `CHARITY_OFFCHAIN_HOST`
    /// - `CHARITY_MIRROR_PORT`
    /// - `CHARITY_FRAUD_PORT`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_or("CHARITY_OFFCHAIN_HOST", defaults.host),
            mirror_port: env_or("CHARITY_MIRROR_PORT", defaults.mirror_port),
            fraud_port: env_or("CHARITY_FRAUD_PORT", defaults.fraud_port),
            ..defaults
        }
    }

    /// Mirror listen address.
    pub fn mirror_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.mirror_port)
    }

    /// Fraud listen address.
    pub fn fraud_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.fraud_port)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports() {
        let config = OffchainConfig::default();
        assert_eq!(config.mirror_addr().port(), 3000);
        assert_eq!(config.fraud_addr().port(), 3001);
        assert_eq!(config.mirror_prefix, "/mongodb");
    }

    #[test]
    fn test_for_testing_uses_ephemeral_ports() {
        let config = OffchainConfig::for_testing();
        assert_eq!(config.mirror_port, 0);
        assert_eq!(config.fraud_port, 0);
    }
}
