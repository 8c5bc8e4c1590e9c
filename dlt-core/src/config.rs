//! Configuration for the ledger
//!
//! These fields feed the signing-domain separator; they are fixed at
//! construction and cannot change for the lifetime of a ledger instance.

use crate::error::{Error, Result};
use crate::types::Address;
use serde::{Deserialize, Serialize};

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Human-readable token name (signing-domain input)
    pub name: String,

    /// Short ticker symbol
    pub symbol: String,

    /// Signing-domain version string
    pub version: String,

    /// Network/chain identifier bound into permit signatures
    pub chain_id: u64,

    /// This ledger instance's own identity (signing-domain input)
    pub ledger_address: Address,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "Dual Layer Token".to_string(),
            symbol: "DLT".to_string(),
            version: "1.0".to_string(),
            chain_id: 1,
            ledger_address: Address::ZERO,
        }
    }
}

impl Config {
    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config: {e}")))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(name) = std::env::var("DLT_NAME") {
            config.name = name;
        }

        if let Ok(symbol) = std::env::var("DLT_SYMBOL") {
            config.symbol = symbol;
        }

        if let Ok(version) = std::env::var("DLT_VERSION") {
            config.version = version;
        }

        if let Ok(chain_id) = std::env::var("DLT_CHAIN_ID") {
            config.chain_id = chain_id
                .parse()
                .map_err(|e| Error::Config(format!("invalid DLT_CHAIN_ID: {e}")))?;
        }

        if let Ok(address) = std::env::var("DLT_ADDRESS") {
            config.ledger_address = address
                .parse()
                .map_err(|e| Error::Config(format!("invalid DLT_ADDRESS: {e}")))?;
        }

        Ok(config)
    }
}
