//! Bridge event types and log decoding
//!
//! The source contract emits `Deposit(token, recipient, amount)`, the
//! destination contract emits `Unwrap(underlying_token, to, amount)`. The
//! participants are indexed topics; the amount is the single data word.

use crate::chain::ChainRole;
use crate::error::{RelayerError, RelayerResult};

use ethers::types::{Address, Log, H256, U256};
use ethers::utils::keccak256;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    pub static ref DEPOSIT_TOPIC: H256 = H256(keccak256("Deposit(address,address,uint256)"));
    pub static ref UNWRAP_TOPIC: H256 = H256(keccak256("Unwrap(address,address,uint256)"));
}

/// Kind of bridge event observed on chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Deposit,
    Unwrap,
}

impl EventKind {
    /// The event kind scanned on a given chain
    pub fn observed_on(role: ChainRole) -> Self {
        match role {
            ChainRole::Source => EventKind::Deposit,
            ChainRole::Destination => EventKind::Unwrap,
        }
    }

    pub fn topic(self) -> H256 {
        match self {
            EventKind::Deposit => *DEPOSIT_TOPIC,
            EventKind::Unwrap => *UNWRAP_TOPIC,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Deposit => "deposit",
            EventKind::Unwrap => "unwrap",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an observed on-chain event, the idempotency key.
///
/// (chain, transaction, log index) never collides for two distinct events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelayEventId {
    pub chain_id: u64,
    pub tx_hash: H256,
    pub log_index: u64,
}

impl fmt::Display for RelayEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:#x}:{}", self.chain_id, self.tx_hash, self.log_index)
    }
}

/// A decoded bridge event. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEvent {
    pub id: RelayEventId,
    pub block_number: u64,
    pub block_hash: H256,
    pub kind: EventKind,
    pub token: Address,
    pub recipient: Address,
    pub amount: U256,
}

/// Extract the event identity from a raw log, if the log is mined.
///
/// Available even for logs that fail to decode, so the ledger can pin a
/// permanent failure to the right identity.
pub fn event_id_of(chain_id: u64, log: &Log) -> Option<RelayEventId> {
    Some(RelayEventId {
        chain_id,
        tx_hash: log.transaction_hash?,
        log_index: log.log_index?.as_u64(),
    })
}

/// Decode a raw log into a typed `RelayEvent`.
///
/// Rejects logs with a missing identity, wrong topic arity, or a malformed
/// amount word; these are the InvalidEventData cases and the only place the
/// crate produces them.
pub fn decode_log(chain_id: u64, kind: EventKind, log: &Log) -> RelayerResult<RelayEvent> {
    let id = event_id_of(chain_id, log).ok_or_else(|| RelayerError::InvalidEvent {
        id: format!("{}:<pending>", chain_id),
        message: "log is not mined (missing tx hash or log index)".to_string(),
    })?;

    let invalid = |message: String| RelayerError::InvalidEvent {
        id: id.to_string(),
        message,
    };

    let block_number = log
        .block_number
        .ok_or_else(|| invalid("missing block number".to_string()))?
        .as_u64();
    let block_hash = log
        .block_hash
        .ok_or_else(|| invalid("missing block hash".to_string()))?;

    if log.topics.len() != 3 {
        return Err(invalid(format!(
            "expected 3 topics (signature, token, recipient), got {}",
            log.topics.len()
        )));
    }
    if log.topics[0] != kind.topic() {
        return Err(invalid(format!(
            "topic0 {:#x} does not match {} signature",
            log.topics[0], kind
        )));
    }

    // Indexed address topics are left-padded to 32 bytes
    let token = Address::from_slice(&log.topics[1].as_bytes()[12..]);
    let recipient = Address::from_slice(&log.topics[2].as_bytes()[12..]);

    if log.data.len() != 32 {
        return Err(invalid(format!(
            "expected a single 32-byte amount word, got {} bytes",
            log.data.len()
        )));
    }
    let amount = U256::from_big_endian(&log.data);

    Ok(RelayEvent {
        id,
        block_number,
        block_hash,
        kind,
        token,
        recipient,
        amount,
    })
}

/// Fix the deterministic processing order: block number ascending, then log
/// index ascending.
pub fn sort_events(events: &mut [RelayEvent]) {
    events.sort_by_key(|e| (e.block_number, e.id.log_index));
}
