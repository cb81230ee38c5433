//! Gas limit and price selection
//!
//! Policy comes from configuration: fixed values, or node estimates with a
//! percentage buffer, always under the configured gwei ceiling.

use crate::chain::ChainClient;
use crate::config::GasConfig;
use crate::error::RelayerResult;

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::U256;
use tracing::debug;

const WEI_PER_GWEI: u64 = 1_000_000_000;

pub struct GasEstimator {
    config: GasConfig,
}

impl GasEstimator {
    pub fn new(config: GasConfig) -> Self {
        Self { config }
    }

    /// Gas limit for a call: the configured fixed limit, or the node's
    /// estimate with a buffer.
    pub async fn gas_limit(
        &self,
        client: &dyn ChainClient,
        tx: &TypedTransaction,
    ) -> RelayerResult<U256> {
        if let Some(limit) = self.config.gas_limit {
            return Ok(U256::from(limit));
        }

        let estimate = client.estimate_gas(tx).await?;
        let buffer = estimate * self.config.gas_limit_buffer_percent / 100;
        Ok(estimate + buffer)
    }

    /// Gas price: fixed gwei, or node price with a buffer; capped either way.
    pub async fn gas_price(&self, client: &dyn ChainClient) -> RelayerResult<U256> {
        let price = match self.config.gas_price_gwei {
            Some(gwei) => U256::from(gwei) * WEI_PER_GWEI,
            None => {
                let price = client.gas_price().await?;
                price + price * self.config.gas_price_buffer_percent / 100
            }
        };

        let capped = std::cmp::min(price, self.max_price());
        debug!("Gas price for chain {}: {}", client.chain_id(), capped);
        Ok(capped)
    }

    /// Reprice after an "underpriced" rejection, still honoring the ceiling.
    pub fn bump_price(&self, current: U256, percent: u64) -> U256 {
        let bumped = current + current * percent / 100;
        std::cmp::min(bumped, self.max_price())
    }

    fn max_price(&self) -> U256 {
        U256::from(self.config.max_gas_price_gwei) * WEI_PER_GWEI
    }
}
