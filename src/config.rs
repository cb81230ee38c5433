//! Configuration management for the Warden relayer
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::chain::ChainRole;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub relayer: RelayerConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    pub chains: ChainsConfig,
    pub wallet: WalletConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayerConfig {
    /// Sleep between scan cycles when the cursor has no new confirmed blocks
    pub poll_interval_ms: u64,
    /// Broadcast attempts per transaction before the cycle gives up
    pub max_send_attempts: u32,
    pub send_timeout_secs: u64,
    /// Deadline for a submitted transaction to produce a receipt
    pub confirm_timeout_secs: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

/// Exactly two chains: the bridge's native side and the wrapped side.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainsConfig {
    pub source: ChainConfig,
    pub destination: ChainConfig,
}

impl ChainsConfig {
    pub fn get(&self, role: ChainRole) -> &ChainConfig {
        match role {
            ChainRole::Source => &self.source,
            ChainRole::Destination => &self.destination,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
    pub contract_address: String,
    /// Blocks that must follow a block before it is scanned
    pub confirmation_blocks: u64,
    /// Upper bound on blocks per scan after downtime
    pub max_scan_window: u64,
    pub gas: GasConfig,
}

/// Gas policy: a fixed value, a percentage buffer over an estimate, or the
/// node's price under a hard ceiling.
#[derive(Debug, Clone, Deserialize)]
pub struct GasConfig {
    /// Fixed gas limit; estimated with a buffer when absent
    pub gas_limit: Option<u64>,
    #[serde(default = "default_limit_buffer")]
    pub gas_limit_buffer_percent: u64,
    /// Fixed gas price in gwei; node price with a buffer when absent
    pub gas_price_gwei: Option<u64>,
    #[serde(default = "default_price_buffer")]
    pub gas_price_buffer_percent: u64,
    pub max_gas_price_gwei: u64,
}

fn default_limit_buffer() -> u64 {
    20
}

fn default_price_buffer() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Name of the environment variable holding the relay account's key
    pub private_key_env: String,
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> Result<Self> {
        let config_path = env::var("WARDEN_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        for role in [ChainRole::Source, ChainRole::Destination] {
            let chain = self.chains.get(role);
            if chain.rpc_urls.is_empty() {
                anyhow::bail!("Chain {} has no RPC URLs configured", chain.name);
            }
            if chain.contract_address.is_empty() {
                anyhow::bail!("Chain {} has no contract address", chain.name);
            }
            if chain.max_scan_window == 0 {
                anyhow::bail!("Chain {} max_scan_window must be at least 1", chain.name);
            }
            if chain.gas.max_gas_price_gwei == 0 {
                anyhow::bail!("Chain {} max_gas_price_gwei must be positive", chain.name);
            }
        }

        if self.chains.source.chain_id == self.chains.destination.chain_id {
            anyhow::bail!("Source and destination chains must have distinct chain ids");
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_duplicate_chain_ids_rejected() {
        let settings: Settings = toml::from_str(&sample_config(43113, 43113)).unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_sample_config_parses() {
        let settings: Settings = toml::from_str(&sample_config(43113, 97)).unwrap();
        settings.validate().unwrap();
        assert_eq!(settings.chains.get(ChainRole::Source).chain_id, 43113);
        assert_eq!(settings.chains.get(ChainRole::Destination).chain_id, 97);
        assert_eq!(settings.chains.source.gas.gas_limit_buffer_percent, 20);
        assert_eq!(settings.chains.source.gas.gas_price_buffer_percent, 10);
    }

    fn sample_config(source_id: u64, destination_id: u64) -> String {
        format!(
            r#"
            [relayer]
            poll_interval_ms = 2000
            max_send_attempts = 3
            send_timeout_secs = 30
            confirm_timeout_secs = 120
            backoff_base_ms = 500
            backoff_max_ms = 60000

            [database]
            url = "postgres://localhost/warden"
            max_connections = 10
            min_connections = 1

            [api]
            host = "127.0.0.1"
            port = 8080

            [metrics]
            enabled = false
            port = 9090

            [wallet]
            private_key_env = "WARDEN_RELAYER_KEY"

            [chains.source]
            chain_id = {source_id}
            name = "avalanche-fuji"
            rpc_urls = ["https://api.avax-test.network/ext/bc/C/rpc"]
            contract_address = "0x85ac2e065d4526FBeE6a2253389669a12318A412"
            confirmation_blocks = 3
            max_scan_window = 2048

            [chains.source.gas]
            gas_limit = 500000
            max_gas_price_gwei = 100

            [chains.destination]
            chain_id = {destination_id}
            name = "bsc-testnet"
            rpc_urls = ["https://data-seed-prebsc-1-s1.binance.org:8545"]
            contract_address = "0xC9C2a4E28465b9A95C1Ac6bbEC5b1d2a0045C83B"
            confirmation_blocks = 5
            max_scan_window = 2048

            [chains.destination.gas]
            max_gas_price_gwei = 50
            "#
        )
    }
}
