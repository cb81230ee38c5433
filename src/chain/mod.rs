//! Chain module - RPC access and scan-position tracking
//!
//! This module provides:
//! - The ChainClient capability used by the engine and submitter
//! - An EVM implementation with multi-RPC failover
//! - The confirmation-lagged event cursor

pub mod client;
pub mod cursor;

pub use client::{ChainClient, EvmChainClient};
pub use cursor::{EventCursor, ScanRange};

use crate::config::ChainConfig;
use crate::error::{RelayerError, RelayerResult};

use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Which of the two bridged chains a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainRole {
    Source,
    Destination,
}

impl ChainRole {
    pub fn opposite(self) -> Self {
        match self {
            ChainRole::Source => ChainRole::Destination,
            ChainRole::Destination => ChainRole::Source,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChainRole::Source => "source",
            ChainRole::Destination => "destination",
        }
    }
}

impl fmt::Display for ChainRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A connected chain: its role, client, and bridge contract.
#[derive(Clone)]
pub struct ChainContext {
    pub role: ChainRole,
    pub chain_id: u64,
    pub name: String,
    pub client: Arc<dyn ChainClient>,
    pub contract: Address,
}

impl ChainContext {
    pub fn new(
        role: ChainRole,
        config: &ChainConfig,
        client: Arc<dyn ChainClient>,
    ) -> RelayerResult<Self> {
        let contract: Address = config.contract_address.parse().map_err(|e| {
            RelayerError::Config(format!(
                "invalid contract address for chain {}: {}",
                config.name, e
            ))
        })?;

        Ok(Self {
            role,
            chain_id: config.chain_id,
            name: config.name.clone(),
            client,
            contract,
        })
    }
}
