//! In-memory ledger for tests and dry runs
//!
//! Same transition semantics as the PostgreSQL store, without durability.

use super::{LedgerStats, RelayLedger, RelayRecord, RelayStatus};
use crate::error::{RelayerError, RelayerResult};
use crate::events::{EventKind, RelayEvent, RelayEventId};

use async_trait::async_trait;
use chrono::Utc;
use ethers::types::H256;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
struct Inner {
    records: HashMap<RelayEventId, RelayRecord>,
    cursors: HashMap<u64, u64>,
}

#[derive(Default)]
pub struct MemoryRelayLedger {
    inner: Mutex<Inner>,
}

impl MemoryRelayLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn transition_error(id: RelayEventId, from: RelayStatus, to: RelayStatus) -> RelayerError {
        RelayerError::Ledger {
            id: id.to_string(),
            message: format!("cannot transition {} -> {}", from, to),
        }
    }
}

#[async_trait]
impl RelayLedger for MemoryRelayLedger {
    async fn record_if_new(&self, event: &RelayEvent) -> RelayerResult<(bool, RelayRecord)> {
        let mut inner = self.inner.lock().await;

        if let Some(existing) = inner.records.get(&event.id) {
            return Ok((false, existing.clone()));
        }

        let now = Utc::now();
        let record = RelayRecord {
            id: event.id,
            block_number: event.block_number,
            kind: event.kind,
            status: RelayStatus::Seen,
            destination_tx_hash: None,
            attempts: 0,
            last_error: None,
            first_seen_at: now,
            last_updated_at: now,
        };
        inner.records.insert(event.id, record.clone());
        Ok((true, record))
    }

    async fn record_malformed(
        &self,
        id: RelayEventId,
        block_number: u64,
        kind: EventKind,
        error: &str,
    ) -> RelayerResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.records.contains_key(&id) {
            return Ok(());
        }

        let now = Utc::now();
        inner.records.insert(
            id,
            RelayRecord {
                id,
                block_number,
                kind,
                status: RelayStatus::Failed,
                destination_tx_hash: None,
                attempts: 0,
                last_error: Some(error.to_string()),
                first_seen_at: now,
                last_updated_at: now,
            },
        );
        Ok(())
    }

    async fn mark_submitted(
        &self,
        id: RelayEventId,
        destination_tx_hash: H256,
    ) -> RelayerResult<()> {
        let mut inner = self.inner.lock().await;
        let record = inner.records.get_mut(&id).ok_or_else(|| RelayerError::Ledger {
            id: id.to_string(),
            message: "unknown record".to_string(),
        })?;

        if record.status != RelayStatus::Seen {
            return Err(Self::transition_error(id, record.status, RelayStatus::Submitted));
        }

        record.status = RelayStatus::Submitted;
        record.destination_tx_hash = Some(destination_tx_hash);
        record.attempts += 1;
        record.last_updated_at = Utc::now();
        Ok(())
    }

    async fn mark_confirmed(&self, id: RelayEventId) -> RelayerResult<()> {
        let mut inner = self.inner.lock().await;
        let record = inner.records.get_mut(&id).ok_or_else(|| RelayerError::Ledger {
            id: id.to_string(),
            message: "unknown record".to_string(),
        })?;

        if record.status != RelayStatus::Submitted {
            return Err(Self::transition_error(id, record.status, RelayStatus::Confirmed));
        }

        record.status = RelayStatus::Confirmed;
        record.last_updated_at = Utc::now();
        Ok(())
    }

    async fn mark_failed(&self, id: RelayEventId, error: &str) -> RelayerResult<()> {
        let mut inner = self.inner.lock().await;
        let record = inner.records.get_mut(&id).ok_or_else(|| RelayerError::Ledger {
            id: id.to_string(),
            message: "unknown record".to_string(),
        })?;

        if !matches!(record.status, RelayStatus::Seen | RelayStatus::Submitted) {
            return Err(Self::transition_error(id, record.status, RelayStatus::Failed));
        }

        record.status = RelayStatus::Failed;
        record.last_error = Some(error.to_string());
        record.last_updated_at = Utc::now();
        Ok(())
    }

    async fn retry_failed(&self, id: RelayEventId) -> RelayerResult<()> {
        let mut inner = self.inner.lock().await;
        let record = inner.records.get_mut(&id).ok_or_else(|| RelayerError::Ledger {
            id: id.to_string(),
            message: "unknown record".to_string(),
        })?;

        if record.status != RelayStatus::Failed {
            return Err(Self::transition_error(id, record.status, RelayStatus::Seen));
        }

        record.status = RelayStatus::Seen;
        record.destination_tx_hash = None;
        record.last_updated_at = Utc::now();
        Ok(())
    }

    async fn get(&self, id: RelayEventId) -> RelayerResult<Option<RelayRecord>> {
        Ok(self.inner.lock().await.records.get(&id).cloned())
    }

    async fn load_cursor(&self, chain_id: u64) -> RelayerResult<Option<u64>> {
        Ok(self.inner.lock().await.cursors.get(&chain_id).copied())
    }

    async fn save_cursor(&self, chain_id: u64, block: u64) -> RelayerResult<()> {
        self.inner.lock().await.cursors.insert(chain_id, block);
        Ok(())
    }

    async fn stats(&self) -> RelayerResult<LedgerStats> {
        let inner = self.inner.lock().await;
        let mut stats = LedgerStats::default();
        for record in inner.records.values() {
            match record.status {
                RelayStatus::Seen => stats.seen += 1,
                RelayStatus::Submitted => stats.submitted += 1,
                RelayStatus::Confirmed => stats.confirmed += 1,
                RelayStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}
