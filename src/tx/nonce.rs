//! Exclusive nonce ownership per (chain, account)
//!
//! The next-unused nonce for the relay account is read from the chain once at
//! startup and then owned in memory. A lease holds the chain's nonce mutex
//! across sign+broadcast, so submissions from both relay directions serialize
//! per chain and the sequence has no repeats or gaps. Re-reading the nonce
//! from the chain happens only at init or after a mismatch.

use crate::chain::ChainClient;
use crate::error::{RelayerError, RelayerResult};

use dashmap::DashMap;
use ethers::types::Address;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Manages the relay account's nonce on each chain
pub struct NonceManager {
    wallet_address: Address,
    chain_state: DashMap<u64, Arc<Mutex<u64>>>,
}

/// Exclusive hold on a chain's next-unused nonce.
///
/// Dropping the lease without `commit` leaves the nonce unconsumed, so a
/// failed broadcast does not burn a sequence number.
pub struct NonceLease {
    guard: OwnedMutexGuard<u64>,
}

impl NonceLease {
    /// The nonce this lease reserves
    pub fn current(&self) -> u64 {
        *self.guard
    }

    /// Consume the nonce after a successful broadcast
    pub fn commit(&mut self) {
        *self.guard += 1;
    }

    /// Overwrite from chain state after a mismatch
    pub fn set(&mut self, nonce: u64) {
        *self.guard = nonce;
    }
}

impl NonceManager {
    pub fn new(wallet_address: Address) -> Self {
        Self {
            wallet_address,
            chain_state: DashMap::new(),
        }
    }

    /// Register a chain with a known next-unused nonce
    pub fn register(&self, chain_id: u64, nonce: u64) {
        debug!("Initialized nonce for chain {}: {}", chain_id, nonce);
        self.chain_state.insert(chain_id, Arc::new(Mutex::new(nonce)));
    }

    /// Fetch the account's nonce from the chain and register it
    pub async fn init_from_chain(&self, client: &dyn ChainClient) -> RelayerResult<()> {
        let nonce = client.get_nonce(self.wallet_address).await?;
        self.register(client.chain_id(), nonce);
        Ok(())
    }

    /// Take exclusive ownership of a chain's nonce
    pub async fn lease(&self, chain_id: u64) -> RelayerResult<NonceLease> {
        let mutex = self
            .chain_state
            .get(&chain_id)
            .map(|entry| entry.value().clone())
            .ok_or(RelayerError::ChainNotFound { chain_id })?;

        Ok(NonceLease {
            guard: mutex.lock_owned().await,
        })
    }

    /// Re-read the chain's view of the nonce into an existing lease
    pub async fn resync(
        &self,
        client: &dyn ChainClient,
        lease: &mut NonceLease,
    ) -> RelayerResult<u64> {
        let on_chain = client.get_nonce(self.wallet_address).await?;
        debug!(
            "Resynced nonce for chain {}: {} -> {}",
            client.chain_id(),
            lease.current(),
            on_chain
        );
        lease.set(on_chain);
        Ok(on_chain)
    }
}
