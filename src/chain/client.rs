//! Chain client capability and its EVM implementation
//!
//! The engine and submitter only see the `ChainClient` trait; the production
//! implementation wraps multiple HTTP providers with automatic failover.

use crate::config::ChainConfig;
use crate::error::{RelayerError, RelayerResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider, ProviderError};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// RPC capability of one chain.
///
/// Reads must be idempotent and `current_height` monotonically non-decreasing
/// for a healthy endpoint; everything above this trait depends on that.
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn chain_id(&self) -> u64;

    async fn current_height(&self) -> RelayerResult<u64>;

    /// Fetch logs emitted by `address` with the given first topic in the
    /// inclusive block range [from, to].
    async fn get_logs(
        &self,
        address: Address,
        topic0: H256,
        from: u64,
        to: u64,
    ) -> RelayerResult<Vec<Log>>;

    async fn get_nonce(&self, address: Address) -> RelayerResult<u64>;

    async fn estimate_gas(&self, tx: &TypedTransaction) -> RelayerResult<U256>;

    async fn gas_price(&self) -> RelayerResult<U256>;

    async fn send_raw_transaction(&self, raw: Bytes) -> RelayerResult<H256>;

    async fn get_receipt(&self, tx_hash: H256) -> RelayerResult<Option<TransactionReceipt>>;

    /// Read-only contract call (eth_call against latest state).
    async fn call(&self, tx: &TypedTransaction) -> RelayerResult<Bytes>;
}

/// Multi-provider EVM client with automatic failover
pub struct EvmChainClient {
    config: ChainConfig,
    http_providers: Vec<Provider<Http>>,
    current_provider: AtomicUsize,
}

impl EvmChainClient {
    pub fn new(config: ChainConfig) -> RelayerResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", config.chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(RelayerError::Rpc {
                chain_id: config.chain_id,
                message: "No valid RPC providers".to_string(),
            });
        }

        Ok(Self {
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.config.chain_id, next);
    }

    fn rpc_error(&self, message: impl ToString) -> RelayerError {
        RelayerError::Rpc {
            chain_id: self.config.chain_id,
            message: message.to_string(),
        }
    }

    /// Run an RPC call against the active provider, rotating through the
    /// remaining providers on failure.
    async fn with_failover<T, F, Fut>(&self, op: &str, f: F) -> RelayerResult<T>
    where
        F: Fn(Provider<Http>) -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let mut last_err = None;
        for _ in 0..self.http_providers.len() {
            match f(self.http().clone()).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(
                        "{} failed on chain {}: {}",
                        op, self.config.chain_id, e
                    );
                    last_err = Some(e);
                    self.failover();
                }
            }
        }

        Err(self.rpc_error(format!(
            "all providers failed for {}: {}",
            op,
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

}

#[async_trait]
impl ChainClient for EvmChainClient {
    fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    async fn current_height(&self) -> RelayerResult<u64> {
        self.with_failover("get_block_number", |p| async move {
            p.get_block_number().await
        })
        .await
        .map(|b| b.as_u64())
    }

    async fn get_logs(
        &self,
        address: Address,
        topic0: H256,
        from: u64,
        to: u64,
    ) -> RelayerResult<Vec<Log>> {
        let filter = Filter::new()
            .address(address)
            .topic0(topic0)
            .from_block(from)
            .to_block(to);

        self.with_failover("get_logs", |p| {
            let filter = filter.clone();
            async move { p.get_logs(&filter).await }
        })
        .await
    }

    async fn get_nonce(&self, address: Address) -> RelayerResult<u64> {
        self.http()
            .get_transaction_count(address, None)
            .await
            .map(|n| n.as_u64())
            .map_err(|e| self.rpc_error(e))
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> RelayerResult<U256> {
        self.http()
            .estimate_gas(tx, None)
            .await
            .map_err(|e| RelayerError::GasEstimation(e.to_string()))
    }

    async fn gas_price(&self) -> RelayerResult<U256> {
        self.http().get_gas_price().await.map_err(|e| self.rpc_error(e))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> RelayerResult<H256> {
        let pending = self
            .http()
            .send_raw_transaction(raw)
            .await
            .map_err(|e| self.rpc_error(e))?;
        Ok(pending.tx_hash())
    }

    async fn get_receipt(&self, tx_hash: H256) -> RelayerResult<Option<TransactionReceipt>> {
        self.http()
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| self.rpc_error(e))
    }

    async fn call(&self, tx: &TypedTransaction) -> RelayerResult<Bytes> {
        self.http()
            .call(tx, None)
            .await
            .map_err(|e| self.rpc_error(e))
    }
}
