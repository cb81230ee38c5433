//! Test support: a scripted in-process chain
//!
//! `FakeChainClient` implements the full `ChainClient` capability against
//! in-memory state, so the submitter and engine run their real code paths
//! (signing included) without a node.

use crate::chain::ChainClient;
use crate::error::{RelayerError, RelayerResult};

use async_trait::async_trait;
use ethers::abi::Token;
use ethers::signers::LocalWallet;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, Bytes, Log, NameOrAddress, TransactionReceipt, H256, U256, U64,
};
use ethers::utils::keccak256;
use ethers::utils::rlp::Rlp;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// Hardhat's well-known first dev account key
pub fn test_wallet() -> LocalWallet {
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
        .parse()
        .unwrap()
}

/// A broadcast the fake chain accepted, decoded for assertions
#[derive(Debug, Clone)]
pub struct SentTx {
    pub hash: H256,
    pub nonce: u64,
    pub to: Address,
    pub data: Bytes,
    pub gas_price: U256,
}

pub struct FakeChainClient {
    chain_id: u64,
    height: AtomicU64,
    onchain_nonce: AtomicU64,
    logs: Mutex<Vec<Log>>,
    sent: Mutex<Vec<SentTx>>,
    send_failures: Mutex<VecDeque<String>>,
    receipts: Mutex<HashMap<H256, TransactionReceipt>>,
    /// Receipt statuses for upcoming sends; empty queue means success
    receipt_statuses: Mutex<VecDeque<u64>>,
    auto_receipts: AtomicBool,
    call_responses: Mutex<HashMap<Vec<u8>, Bytes>>,
    estimate_gas_error: Mutex<Option<String>>,
}

impl FakeChainClient {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            height: AtomicU64::new(100),
            onchain_nonce: AtomicU64::new(0),
            logs: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            send_failures: Mutex::new(VecDeque::new()),
            receipts: Mutex::new(HashMap::new()),
            receipt_statuses: Mutex::new(VecDeque::new()),
            auto_receipts: AtomicBool::new(true),
            call_responses: Mutex::new(HashMap::new()),
            estimate_gas_error: Mutex::new(None),
        }
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn set_onchain_nonce(&self, nonce: u64) {
        self.onchain_nonce.store(nonce, Ordering::SeqCst);
    }

    pub fn push_log(&self, log: Log) {
        self.logs.lock().unwrap().push(log);
    }

    /// Script an error message for the next broadcast
    pub fn push_send_failure(&self, message: &str) {
        self.send_failures.lock().unwrap().push_back(message.to_string());
    }

    /// Script the receipt status of an upcoming broadcast (default 1)
    pub fn push_receipt_status(&self, status: u64) {
        self.receipt_statuses.lock().unwrap().push_back(status);
    }

    /// When disabled, broadcasts never produce a receipt
    pub fn set_auto_receipts(&self, enabled: bool) {
        self.auto_receipts.store(enabled, Ordering::SeqCst);
    }

    /// Script the boolean result of a read-only probe (default true)
    pub fn set_call_response(&self, calldata: &Bytes, value: bool) {
        self.call_responses.lock().unwrap().insert(
            calldata.to_vec(),
            Bytes::from(ethers::abi::encode(&[Token::Bool(value)])),
        );
    }

    /// Register a receipt for a transaction hash directly
    pub fn insert_receipt(&self, hash: H256, status: u64, block: u64) {
        let receipt = TransactionReceipt {
            transaction_hash: hash,
            status: Some(U64::from(status)),
            block_number: Some(U64::from(block)),
            ..Default::default()
        };
        self.receipts.lock().unwrap().insert(hash, receipt);
    }

    pub fn set_estimate_gas_error(&self, message: &str) {
        *self.estimate_gas_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn sent_transactions(&self) -> Vec<SentTx> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for FakeChainClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn current_height(&self) -> RelayerResult<u64> {
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn get_logs(
        &self,
        address: Address,
        topic0: H256,
        from: u64,
        to: u64,
    ) -> RelayerResult<Vec<Log>> {
        let logs = self.logs.lock().unwrap();
        Ok(logs
            .iter()
            .filter(|log| {
                let block = log.block_number.map(|b| b.as_u64()).unwrap_or(0);
                log.address == address
                    && log.topics.first() == Some(&topic0)
                    && block >= from
                    && block <= to
            })
            .cloned()
            .collect())
    }

    async fn get_nonce(&self, _address: Address) -> RelayerResult<u64> {
        Ok(self.onchain_nonce.load(Ordering::SeqCst))
    }

    async fn estimate_gas(&self, _tx: &TypedTransaction) -> RelayerResult<U256> {
        if let Some(message) = self.estimate_gas_error.lock().unwrap().clone() {
            return Err(RelayerError::GasEstimation(message));
        }
        Ok(U256::from(100_000u64))
    }

    async fn gas_price(&self) -> RelayerResult<U256> {
        Ok(U256::from(2_000_000_000u64))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> RelayerResult<H256> {
        if let Some(message) = self.send_failures.lock().unwrap().pop_front() {
            return Err(RelayerError::Rpc {
                chain_id: self.chain_id,
                message,
            });
        }

        let (tx, _signature) = TypedTransaction::decode_signed(&Rlp::new(&raw))
            .map_err(|e| RelayerError::Internal(format!("undecodable raw tx: {}", e)))?;

        let hash = H256(keccak256(&raw));
        let to = match tx.to() {
            Some(NameOrAddress::Address(addr)) => *addr,
            _ => Address::zero(),
        };

        self.sent.lock().unwrap().push(SentTx {
            hash,
            nonce: tx.nonce().copied().unwrap_or_default().as_u64(),
            to,
            data: tx.data().cloned().unwrap_or_default(),
            gas_price: tx.gas_price().unwrap_or_default(),
        });

        if self.auto_receipts.load(Ordering::SeqCst) {
            let status = self
                .receipt_statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(1);
            let receipt = TransactionReceipt {
                transaction_hash: hash,
                status: Some(U64::from(status)),
                block_number: Some(U64::from(self.height.load(Ordering::SeqCst))),
                ..Default::default()
            };
            self.receipts.lock().unwrap().insert(hash, receipt);
        }

        Ok(hash)
    }

    async fn get_receipt(&self, tx_hash: H256) -> RelayerResult<Option<TransactionReceipt>> {
        Ok(self.receipts.lock().unwrap().get(&tx_hash).cloned())
    }

    async fn call(&self, tx: &TypedTransaction) -> RelayerResult<Bytes> {
        let calldata = tx.data().cloned().unwrap_or_default().to_vec();
        let responses = self.call_responses.lock().unwrap();
        Ok(responses
            .get(&calldata)
            .cloned()
            .unwrap_or_else(|| Bytes::from(ethers::abi::encode(&[Token::Bool(true)]))))
    }
}
