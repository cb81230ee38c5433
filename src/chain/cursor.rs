//! Confirmation-lagged scan cursor
//!
//! Decides the next block range to scan. Only blocks with at least
//! `confirmation_blocks` descendants are eligible, so a later reorganization
//! of the chain head never replaces a block we already acted on. The scan
//! position is persisted through the ledger and is advanced only after the
//! whole range has been processed; re-scanning a range is always safe because
//! the ledger deduplicates events.

use crate::chain::ChainClient;
use crate::error::RelayerResult;
use crate::ledger::RelayLedger;

use std::sync::Arc;
use tracing::{debug, info, warn};

/// Inclusive block range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRange {
    pub from: u64,
    pub to: u64,
}

impl ScanRange {
    pub fn block_count(&self) -> u64 {
        self.to - self.from + 1
    }
}

/// Per-chain persisted scan position
pub struct EventCursor {
    chain_id: u64,
    confirmation_blocks: u64,
    max_scan_window: u64,
    client: Arc<dyn ChainClient>,
    ledger: Arc<dyn RelayLedger>,
    last_scanned: u64,
}

impl EventCursor {
    /// Restore the cursor from the ledger, or initialize it at the current
    /// confirmed tip on first run (history before the relayer existed is not
    /// replayed).
    pub async fn load(
        chain_id: u64,
        confirmation_blocks: u64,
        max_scan_window: u64,
        client: Arc<dyn ChainClient>,
        ledger: Arc<dyn RelayLedger>,
    ) -> RelayerResult<Self> {
        let last_scanned = match ledger.load_cursor(chain_id).await? {
            Some(block) => {
                info!("Chain {} cursor resumes at block {}", chain_id, block);
                block
            }
            None => {
                let tip = client
                    .current_height()
                    .await?
                    .saturating_sub(confirmation_blocks);
                ledger.save_cursor(chain_id, tip).await?;
                info!("Chain {} cursor initialized at block {}", chain_id, tip);
                tip
            }
        };

        Ok(Self {
            chain_id,
            confirmation_blocks,
            max_scan_window,
            client,
            ledger,
            last_scanned,
        })
    }

    /// Compute the next range of confirmed blocks to scan.
    ///
    /// Returns `None` when no new confirmed blocks exist - a normal no-op.
    pub async fn next_range(&self) -> RelayerResult<Option<ScanRange>> {
        let height = self.client.current_height().await?;
        crate::metrics::record_chain_height(self.chain_id, height);
        let range = plan_range(
            self.last_scanned,
            height,
            self.confirmation_blocks,
            self.max_scan_window,
        );

        if let Some(range) = range {
            if range.from > self.last_scanned + 1 {
                // Events in the skipped blocks are reported, not silently lost.
                warn!(
                    "Chain {} scan window exceeded: skipping blocks {}..={} ({} behind)",
                    self.chain_id,
                    self.last_scanned + 1,
                    range.from - 1,
                    range.from - self.last_scanned - 1,
                );
            }
            debug!(
                "Chain {}: next scan range {}..={} ({} blocks, height {})",
                self.chain_id,
                range.from,
                range.to,
                range.block_count(),
                height
            );
        }

        Ok(range)
    }

    /// Persist a new scan position. At-least-once: a failed save is logged
    /// and retried implicitly by re-scanning the same range after restart.
    pub async fn advance(&mut self, to: u64) -> RelayerResult<()> {
        if to <= self.last_scanned {
            return Ok(());
        }

        self.last_scanned = to;
        crate::metrics::record_cursor_position(self.chain_id, to);
        if let Err(e) = self.ledger.save_cursor(self.chain_id, to).await {
            warn!("Chain {} failed to save cursor at {}: {}", self.chain_id, to, e);
        }
        Ok(())
    }
}

/// Pure range arithmetic: `to` lags the head by the confirmation depth and
/// never regresses; `from` is bounded by the scan window.
fn plan_range(
    last_scanned: u64,
    height: u64,
    confirmation_blocks: u64,
    max_scan_window: u64,
) -> Option<ScanRange> {
    let to = height.saturating_sub(confirmation_blocks);
    if to <= last_scanned {
        return None;
    }

    let mut from = last_scanned + 1;
    if to - from + 1 > max_scan_window {
        from = to + 1 - max_scan_window;
    }

    Some(ScanRange { from, to })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lags_head_by_confirmation_depth() {
        // Head at 100 with depth 12: nothing above block 88 is scanned.
        let range = plan_range(80, 100, 12, 1000).unwrap();
        assert_eq!(range, ScanRange { from: 81, to: 88 });
    }

    #[test]
    fn empty_when_no_new_confirmed_blocks() {
        assert_eq!(plan_range(88, 100, 12, 1000), None);
        assert_eq!(plan_range(95, 100, 12, 1000), None);
        // Depth larger than the chain height clamps to zero, not underflow.
        assert_eq!(plan_range(0, 5, 12, 1000), None);
    }

    #[test]
    fn empty_when_head_regresses() {
        // A lagging RPC replica reporting an older head must not produce a
        // backwards range.
        assert_eq!(plan_range(90, 80, 5, 1000), None);
    }

    #[test]
    fn window_bounds_catch_up_after_downtime() {
        let range = plan_range(0, 10_000, 10, 500).unwrap();
        assert_eq!(range.to, 9_990);
        assert_eq!(range.from, 9_491);
        assert_eq!(range.block_count(), 500);
    }

    #[test]
    fn small_backlog_is_not_clamped() {
        let range = plan_range(100, 150, 10, 500).unwrap();
        assert_eq!(range, ScanRange { from: 101, to: 140 });
    }
}
