//! Relay idempotency ledger
//!
//! The single source of truth preventing double relay. Every observed event
//! gets exactly one record, keyed by `RelayEventId`; status moves forward
//! only. The ledger also persists each chain's scan cursor so both survive a
//! restart together.

pub mod memory;
pub mod postgres;

pub use memory::MemoryRelayLedger;
pub use postgres::PgRelayLedger;

use crate::error::RelayerResult;
use crate::events::{EventKind, RelayEvent, RelayEventId};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers::types::H256;
use serde::Serialize;
use std::fmt;

/// Processing state of a relay record.
///
/// Transitions: Seen -> Submitted -> Confirmed, with Failed reachable from
/// Seen and Submitted. Failed is terminal unless the operator retry path
/// moves it back to Seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayStatus {
    Seen,
    Submitted,
    Confirmed,
    Failed,
}

impl RelayStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RelayStatus::Seen => "seen",
            RelayStatus::Submitted => "submitted",
            RelayStatus::Confirmed => "confirmed",
            RelayStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "seen" => Some(RelayStatus::Seen),
            "submitted" => Some(RelayStatus::Submitted),
            "confirmed" => Some(RelayStatus::Confirmed),
            "failed" => Some(RelayStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for RelayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed event and what happened to it. Owned by the ledger.
#[derive(Debug, Clone)]
pub struct RelayRecord {
    pub id: RelayEventId,
    pub block_number: u64,
    pub kind: EventKind,
    pub status: RelayStatus,
    pub destination_tx_hash: Option<H256>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

/// Record counts by status, for the status API and logs
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LedgerStats {
    pub seen: u64,
    pub submitted: u64,
    pub confirmed: u64,
    pub failed: u64,
}

#[async_trait]
pub trait RelayLedger: Send + Sync {
    /// Atomic test-and-set keyed by the event identity. Returns the record
    /// and whether this call created it; callers must skip re-submission for
    /// any settled record.
    async fn record_if_new(&self, event: &RelayEvent) -> RelayerResult<(bool, RelayRecord)>;

    /// Insert a record directly in Failed for a log that cannot be decoded.
    /// A no-op if the identity is already known.
    async fn record_malformed(
        &self,
        id: RelayEventId,
        block_number: u64,
        kind: EventKind,
        error: &str,
    ) -> RelayerResult<()>;

    /// Seen -> Submitted. Rejecting any other origin status signals a caller
    /// bug: a second submission for the same identity.
    async fn mark_submitted(&self, id: RelayEventId, destination_tx_hash: H256)
        -> RelayerResult<()>;

    /// Submitted -> Confirmed
    async fn mark_confirmed(&self, id: RelayEventId) -> RelayerResult<()>;

    /// Seen|Submitted -> Failed. Never regresses a Confirmed record.
    async fn mark_failed(&self, id: RelayEventId, error: &str) -> RelayerResult<()>;

    /// Explicit operator path: Failed -> Seen, re-arming the relay.
    async fn retry_failed(&self, id: RelayEventId) -> RelayerResult<()>;

    async fn get(&self, id: RelayEventId) -> RelayerResult<Option<RelayRecord>>;

    async fn load_cursor(&self, chain_id: u64) -> RelayerResult<Option<u64>>;

    async fn save_cursor(&self, chain_id: u64, block: u64) -> RelayerResult<()>;

    async fn stats(&self) -> RelayerResult<LedgerStats>;
}
