//! Transaction submission and confirmation
//!
//! Builds, signs, broadcasts, and confirms bridge calls on a target chain.
//! The nonce lease is held across sign+broadcast, so both relay directions
//! serialize their submissions per chain.

use super::gas::GasEstimator;
use super::nonce::NonceManager;
use crate::chain::{ChainContext, ChainRole};
use crate::config::{GasConfig, RelayerConfig};
use crate::error::{RelayerError, RelayerResult};
use crate::translate::FunctionCall;

use ethers::abi::ParamType;
use ethers::prelude::*;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

/// Outcome of waiting for a submitted transaction's receipt.
///
/// `TimedOut` is a value, not an error: the transaction may still land, so
/// the caller must re-check the receipt before ever resubmitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Success { block_number: u64 },
    Reverted { block_number: u64 },
    TimedOut,
}

/// Broadcast failure classes (from the RPC error message, the only signal
/// most nodes give)
enum SendFailure {
    NonceConflict,
    Underpriced,
    InsufficientFunds,
    Reverted,
    Transient,
}

fn classify_send_error(message: &str) -> SendFailure {
    let lower = message.to_lowercase();
    if lower.contains("nonce too low") || lower.contains("invalid nonce") {
        SendFailure::NonceConflict
    } else if lower.contains("underpriced") {
        SendFailure::Underpriced
    } else if lower.contains("insufficient funds") {
        SendFailure::InsufficientFunds
    } else if lower.contains("revert") || lower.contains("execution reverted") {
        SendFailure::Reverted
    } else {
        SendFailure::Transient
    }
}

struct Target {
    context: ChainContext,
    gas: GasEstimator,
}

/// Transaction sender shared by both relay directions
pub struct Submitter {
    targets: HashMap<ChainRole, Target>,
    wallet: LocalWallet,
    nonces: Arc<NonceManager>,
    config: RelayerConfig,
    shutdown: Arc<RwLock<bool>>,
}

impl Submitter {
    pub fn new(
        chains: Vec<(ChainContext, GasConfig)>,
        wallet: LocalWallet,
        nonces: Arc<NonceManager>,
        config: RelayerConfig,
        shutdown: Arc<RwLock<bool>>,
    ) -> Self {
        let targets = chains
            .into_iter()
            .map(|(context, gas_config)| {
                (
                    context.role,
                    Target {
                        context,
                        gas: GasEstimator::new(gas_config),
                    },
                )
            })
            .collect();

        Self {
            targets,
            wallet,
            nonces,
            config,
            shutdown,
        }
    }

    pub fn wallet_address(&self) -> Address {
        self.wallet.address()
    }

    fn target(&self, role: ChainRole) -> RelayerResult<&Target> {
        self.targets
            .get(&role)
            .ok_or(RelayerError::Internal(format!("no chain configured for role {}", role)))
    }

    /// Submit a bridge call to the target chain. Returns the transaction
    /// hash once the broadcast is accepted.
    pub async fn submit(&self, role: ChainRole, call: &FunctionCall) -> RelayerResult<H256> {
        let target = self.target(role)?;
        let ctx = &target.context;
        let calldata = call.calldata();
        debug!(
            "Prepared {} call for chain {}: 0x{}",
            call.name(),
            ctx.chain_id,
            hex::encode(&calldata)
        );

        // Exclusive nonce ownership for this chain until we return
        let mut lease = self.nonces.lease(ctx.chain_id).await?;

        let mut gas_price = target.gas.gas_price(ctx.client.as_ref()).await?;
        let mut attempts = 0u32;
        let mut nonce_resynced = false;

        loop {
            attempts += 1;
            let nonce = lease.current();

            let request = TransactionRequest::new()
                .to(ctx.contract)
                .data(calldata.clone())
                .nonce(nonce)
                .chain_id(ctx.chain_id)
                .gas_price(gas_price);
            let mut tx: TypedTransaction = request.into();

            let gas_limit = match target.gas.gas_limit(ctx.client.as_ref(), &tx).await {
                Ok(limit) => limit,
                Err(RelayerError::GasEstimation(message)) => {
                    // An estimate that reverts means the call itself would
                    if matches!(classify_send_error(&message), SendFailure::Reverted) {
                        return Err(RelayerError::Reverted {
                            chain_id: ctx.chain_id,
                            tx_hash: "<preflight>".to_string(),
                        });
                    }
                    return Err(RelayerError::GasEstimation(message));
                }
                Err(e) => return Err(e),
            };
            tx.set_gas(gas_limit);

            let wallet = self.wallet.clone().with_chain_id(ctx.chain_id);
            let signature = wallet
                .sign_transaction(&tx)
                .await
                .map_err(|e| RelayerError::Wallet(e.to_string()))?;
            let raw = tx.rlp_signed(&signature);

            let send_timeout = Duration::from_secs(self.config.send_timeout_secs);
            let sent = timeout(send_timeout, ctx.client.send_raw_transaction(raw)).await;

            let error = match sent {
                Ok(Ok(tx_hash)) => {
                    lease.commit();
                    info!(
                        chain = %ctx.name,
                        call = call.name(),
                        nonce,
                        "Transaction sent: {:?} (attempt {})",
                        tx_hash,
                        attempts
                    );
                    return Ok(tx_hash);
                }
                Ok(Err(e)) => e,
                Err(_) => RelayerError::Timeout {
                    operation: "send transaction".to_string(),
                },
            };

            match classify_send_error(&error.to_string()) {
                SendFailure::NonceConflict if !nonce_resynced => {
                    warn!("Nonce conflict on chain {}, resyncing", ctx.chain_id);
                    self.nonces.resync(ctx.client.as_ref(), &mut lease).await?;
                    nonce_resynced = true;
                    continue;
                }
                SendFailure::NonceConflict => {
                    return Err(RelayerError::NonceConflict {
                        chain_id: ctx.chain_id,
                        message: error.to_string(),
                    });
                }
                SendFailure::Underpriced if attempts < self.config.max_send_attempts => {
                    gas_price = target.gas.bump_price(gas_price, 25);
                    warn!(
                        "Transaction underpriced on chain {}, repricing to {}",
                        ctx.chain_id, gas_price
                    );
                    continue;
                }
                SendFailure::InsufficientFunds => {
                    return Err(RelayerError::InsufficientFunds {
                        chain_id: ctx.chain_id,
                    });
                }
                SendFailure::Reverted => {
                    return Err(RelayerError::Reverted {
                        chain_id: ctx.chain_id,
                        tx_hash: "<broadcast>".to_string(),
                    });
                }
                SendFailure::Underpriced | SendFailure::Transient => {
                    if attempts >= self.config.max_send_attempts {
                        return Err(RelayerError::Rpc {
                            chain_id: ctx.chain_id,
                            message: error.to_string(),
                        });
                    }
                    warn!(
                        "Broadcast failed on chain {} (attempt {}): {}",
                        ctx.chain_id, attempts, error
                    );
                    sleep(Duration::from_millis(self.config.backoff_base_ms)).await;
                }
            }
        }
    }

    /// Poll for the receipt with bounded exponential backoff up to the
    /// configured deadline.
    pub async fn confirm(&self, role: ChainRole, tx_hash: H256) -> RelayerResult<ConfirmOutcome> {
        let target = self.target(role)?;
        let ctx = &target.context;

        let deadline = Instant::now() + Duration::from_secs(self.config.confirm_timeout_secs);
        let mut delay = Duration::from_millis(500);
        let max_delay = Duration::from_secs(8);

        loop {
            match ctx.client.get_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    let block_number = receipt.block_number.map(|b| b.as_u64()).unwrap_or(0);
                    let outcome = if receipt.status == Some(1.into()) {
                        ConfirmOutcome::Success { block_number }
                    } else {
                        ConfirmOutcome::Reverted { block_number }
                    };
                    debug!("Receipt for {:?} on chain {}: {:?}", tx_hash, ctx.chain_id, outcome);
                    return Ok(outcome);
                }
                Ok(None) => {}
                Err(e) => {
                    // Transient while polling: the deadline bounds it
                    warn!("Receipt poll failed on chain {}: {}", ctx.chain_id, e);
                }
            }

            if *self.shutdown.read().await {
                info!("Shutdown requested, abandoning receipt wait for {:?}", tx_hash);
                return Ok(ConfirmOutcome::TimedOut);
            }
            if Instant::now() >= deadline {
                return Ok(ConfirmOutcome::TimedOut);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            sleep(std::cmp::min(delay, remaining)).await;
            delay = std::cmp::min(delay * 2, max_delay);
        }
    }

    /// Read-only boolean contract probe (`approved`, `hasRole`).
    pub async fn check_call(&self, role: ChainRole, call: &FunctionCall) -> RelayerResult<bool> {
        let target = self.target(role)?;
        let ctx = &target.context;

        let request = TransactionRequest::new()
            .to(ctx.contract)
            .data(call.calldata());
        let tx: TypedTransaction = request.into();

        let output = ctx.client.call(&tx).await?;
        let tokens = ethers::abi::decode(&[ParamType::Bool], &output).map_err(|e| {
            RelayerError::Internal(format!(
                "{} on chain {} returned undecodable output: {}",
                call.name(),
                ctx.chain_id,
                e
            ))
        })?;

        Ok(matches!(tokens.first(), Some(ethers::abi::Token::Bool(true))))
    }
}
