//! Relay engine: one scan -> translate -> submit loop per direction
//!
//! Each engine owns one direction (Deposits on source minting on
//! destination, or Unwraps on destination releasing on source). The two
//! engines share only the ledger and the submitter's per-chain nonce owner.

pub mod backoff;

use backoff::Backoff;

use crate::chain::{ChainContext, ChainRole, EventCursor};
use crate::config::RelayerConfig;
use crate::error::RelayerResult;
use crate::events::{self, EventKind, RelayEvent, RelayEventId};
use crate::ledger::{RelayLedger, RelayStatus};
use crate::metrics;
use crate::translate::{approved_call, translate};
use crate::tx::{ConfirmOutcome, Submitter};

use ethers::types::H256;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

/// Engine loop state, published for the status API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Idle,
    Scanning,
    Translating,
    Relaying,
    Backoff,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineState::Idle => "idle",
            EngineState::Scanning => "scanning",
            EngineState::Translating => "translating",
            EngineState::Relaying => "relaying",
            EngineState::Backoff => "backoff",
        };
        f.write_str(s)
    }
}

pub struct RelayEngine {
    direction: String,
    origin: ChainContext,
    kind: EventKind,
    cursor: EventCursor,
    ledger: Arc<dyn RelayLedger>,
    submitter: Arc<Submitter>,
    config: RelayerConfig,
    state: Arc<RwLock<EngineState>>,
    shutdown: Arc<RwLock<bool>>,
}

impl RelayEngine {
    pub fn new(
        origin: ChainContext,
        cursor: EventCursor,
        ledger: Arc<dyn RelayLedger>,
        submitter: Arc<Submitter>,
        config: RelayerConfig,
        shutdown: Arc<RwLock<bool>>,
    ) -> Self {
        let kind = EventKind::observed_on(origin.role);
        let direction = format!("{}->{}", origin.role, origin.role.opposite());

        Self {
            direction,
            origin,
            kind,
            cursor,
            ledger,
            submitter,
            config,
            state: Arc::new(RwLock::new(EngineState::Idle)),
            shutdown,
        }
    }

    pub fn direction(&self) -> &str {
        &self.direction
    }

    pub fn state_handle(&self) -> Arc<RwLock<EngineState>> {
        self.state.clone()
    }

    async fn set_state(&self, state: EngineState) {
        *self.state.write().await = state;
    }

    /// Main loop: scan, relay, repeat. Transient failures back off with
    /// jitter; a clean cycle resets the schedule.
    pub async fn run(mut self) -> RelayerResult<()> {
        let mut backoff = Backoff::new(
            Duration::from_millis(self.config.backoff_base_ms),
            Duration::from_millis(self.config.backoff_max_ms),
        );

        info!("Relay engine {} started", self.direction);

        loop {
            if *self.shutdown.read().await {
                break;
            }

            match self.cycle().await {
                Ok(true) => {
                    backoff.reset();
                }
                Ok(false) => {
                    backoff.reset();
                    self.set_state(EngineState::Idle).await;
                    sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
                }
                Err(e) => {
                    warn!("Relay engine {} cycle failed: {}", self.direction, e);
                    self.set_state(EngineState::Backoff).await;
                    sleep(backoff.next_delay()).await;
                }
            }
        }

        info!("Relay engine {} stopped", self.direction);
        Ok(())
    }

    /// One scan cycle. Returns false when there was no new confirmed range.
    ///
    /// The cursor advances only after every event in the range is at least
    /// Submitted (Failed counts: a poisoned event must not pin the cursor).
    /// Any error aborts the cycle before the advance, so the same range is
    /// re-scanned; the ledger makes that safe.
    async fn cycle(&mut self) -> RelayerResult<bool> {
        self.set_state(EngineState::Scanning).await;
        let range = match self.cursor.next_range().await? {
            Some(range) => range,
            None => return Ok(false),
        };

        let logs = self
            .origin
            .client
            .get_logs(self.origin.contract, self.kind.topic(), range.from, range.to)
            .await?;

        self.set_state(EngineState::Translating).await;
        let mut batch: Vec<RelayEvent> = Vec::with_capacity(logs.len());
        for log in &logs {
            match events::decode_log(self.origin.chain_id, self.kind, log) {
                Ok(event) => {
                    metrics::record_event_observed(self.origin.chain_id, self.kind.as_str());
                    batch.push(event);
                }
                Err(e) => match events::event_id_of(self.origin.chain_id, log) {
                    Some(id) => {
                        error!("Undecodable {} log {}: {}", self.kind, id, e);
                        let block = log.block_number.map(|b| b.as_u64()).unwrap_or(range.from);
                        self.ledger
                            .record_malformed(id, block, self.kind, &e.to_string())
                            .await?;
                        metrics::record_relay_failed(&self.direction);
                    }
                    None => {
                        warn!(
                            "Skipping unidentifiable log on chain {}: {}",
                            self.origin.chain_id, e
                        );
                    }
                },
            }
        }
        events::sort_events(&mut batch);

        if !batch.is_empty() {
            info!(
                "Relay engine {}: {} event(s) in blocks {}..={}",
                self.direction,
                batch.len(),
                range.from,
                range.to
            );
        }

        self.set_state(EngineState::Relaying).await;
        for event in &batch {
            self.process_event(event).await?;
        }

        self.cursor.advance(range.to).await?;
        self.set_state(EngineState::Idle).await;
        Ok(true)
    }

    /// Relay one event. Returns Err only for failures that should abort the
    /// cycle (and thus hold the cursor back); permanent per-event failures
    /// mark the record and let the scan continue.
    async fn process_event(&self, event: &RelayEvent) -> RelayerResult<()> {
        let instruction = translate(event);
        let (is_new, record) = self.ledger.record_if_new(event).await?;

        if !is_new {
            match record.status {
                // Crash after recording, before submission: finish the job
                RelayStatus::Seen => {}
                RelayStatus::Submitted => {
                    // A submission we lost track of (timeout or crash).
                    // Re-check the receipt; never submit again on top of it.
                    return match record.destination_tx_hash {
                        Some(tx_hash) => {
                            debug!("Re-checking receipt for {} ({:?})", event.id, tx_hash);
                            self.settle(event.id, instruction.target, tx_hash, None).await
                        }
                        None => {
                            error!("Record {} is Submitted without a tx hash", event.id);
                            Ok(())
                        }
                    };
                }
                RelayStatus::Confirmed | RelayStatus::Failed => {
                    debug!("Skipping {} ({})", event.id, record.status);
                    metrics::record_relay_skipped(&self.direction);
                    return Ok(());
                }
            }
        }

        // Precondition from the bridge contracts: the token must be
        // registered on the chain executing the call.
        let probe = approved_call(event.token);
        match self.submitter.check_call(instruction.target, &probe).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    "Token {:?} not approved on {}, failing {}",
                    event.token, instruction.target, event.id
                );
                return self
                    .fail(event.id, "precondition: token not approved on target chain")
                    .await;
            }
            Err(e) if e.is_retryable() => return Err(e),
            Err(e) => return self.fail(event.id, &e.to_string()).await,
        }

        info!(
            direction = %self.direction,
            event = %self.kind,
            token = ?event.token,
            recipient = ?event.recipient,
            amount = %event.amount,
            block = event.block_number,
            "Relaying {} as {}",
            event.id,
            instruction.call.name()
        );

        let started = Instant::now();
        match self.submitter.submit(instruction.target, &instruction.call).await {
            Ok(tx_hash) => {
                self.ledger.mark_submitted(event.id, tx_hash).await?;
                metrics::record_relay_submitted(&self.direction);
                self.settle(event.id, instruction.target, tx_hash, Some(started))
                    .await
            }
            Err(e) if e.is_permanent() => self.fail(event.id, &e.to_string()).await,
            Err(e) => Err(e),
        }
    }

    /// Wait for the receipt of a submitted relay and record the outcome.
    /// A timeout leaves the record Submitted; the next scan re-checks it.
    async fn settle(
        &self,
        id: RelayEventId,
        target: ChainRole,
        tx_hash: H256,
        started: Option<Instant>,
    ) -> RelayerResult<()> {
        match self.submitter.confirm(target, tx_hash).await? {
            ConfirmOutcome::Success { block_number } => {
                self.ledger.mark_confirmed(id).await?;
                metrics::record_relay_confirmed(&self.direction);
                if let Some(started) = started {
                    metrics::record_relay_latency(&self.direction, started.elapsed().as_secs_f64());
                }
                info!(
                    "Relay {} confirmed on {} in block {} ({:?})",
                    id, target, block_number, tx_hash
                );
                Ok(())
            }
            ConfirmOutcome::Reverted { block_number } => {
                self.fail(
                    id,
                    &format!("transaction {:?} reverted in block {}", tx_hash, block_number),
                )
                .await
            }
            ConfirmOutcome::TimedOut => {
                warn!(
                    "Receipt for {:?} not found before deadline; {} stays submitted",
                    tx_hash, id
                );
                Ok(())
            }
        }
    }

    async fn fail(&self, id: RelayEventId, reason: &str) -> RelayerResult<()> {
        error!("Relay {} failed: {}", id, reason);
        self.ledger.mark_failed(id, reason).await?;
        metrics::record_relay_failed(&self.direction);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainClient, ChainContext};
    use crate::config::GasConfig;
    use crate::events::{decode_log, DEPOSIT_TOPIC, UNWRAP_TOPIC};
    use crate::ledger::MemoryRelayLedger;
    use crate::testutil::{test_wallet, FakeChainClient};
    use crate::tx::NonceManager;

    use ethers::signers::Signer;
    use ethers::types::{Address, Bytes, Log, U256, U64};
    use ethers::utils::id;

    const SOURCE_CHAIN: u64 = 43113;
    const DEST_CHAIN: u64 = 97;

    fn source_contract() -> Address {
        Address::repeat_byte(0xa1)
    }

    fn dest_contract() -> Address {
        Address::repeat_byte(0xa2)
    }

    fn relayer_config() -> RelayerConfig {
        RelayerConfig {
            poll_interval_ms: 10,
            max_send_attempts: 3,
            send_timeout_secs: 5,
            confirm_timeout_secs: 1,
            backoff_base_ms: 1,
            backoff_max_ms: 50,
        }
    }

    fn gas_config() -> GasConfig {
        GasConfig {
            gas_limit: Some(500_000),
            gas_limit_buffer_percent: 20,
            gas_price_gwei: Some(5),
            gas_price_buffer_percent: 10,
            max_gas_price_gwei: 100,
        }
    }

    fn bridge_log(
        kind: EventKind,
        contract: Address,
        block: u64,
        log_index: u64,
        token: Address,
    ) -> Log {
        let mut data = [0u8; 32];
        U256::from(100u64).to_big_endian(&mut data);

        let topic0 = match kind {
            EventKind::Deposit => *DEPOSIT_TOPIC,
            EventKind::Unwrap => *UNWRAP_TOPIC,
        };

        // Distinct tx hash per (block, index)
        let mut hash = [0u8; 32];
        hash[0] = block as u8;
        hash[1] = log_index as u8;
        hash[31] = 0xee;

        Log {
            address: contract,
            topics: vec![topic0, H256::from(token), H256::from(Address::repeat_byte(0x22))],
            data: Bytes::from(data.to_vec()),
            block_hash: Some(H256::repeat_byte(0xb1)),
            block_number: Some(U64::from(block)),
            transaction_hash: Some(H256::from(hash)),
            transaction_index: Some(U64::from(0)),
            log_index: Some(U256::from(log_index)),
            ..Default::default()
        }
    }

    struct Rig {
        source: Arc<FakeChainClient>,
        dest: Arc<FakeChainClient>,
        ledger: Arc<MemoryRelayLedger>,
        submitter: Arc<Submitter>,
        shutdown: Arc<RwLock<bool>>,
    }

    impl Rig {
        fn new() -> Self {
            let source = Arc::new(FakeChainClient::new(SOURCE_CHAIN));
            let dest = Arc::new(FakeChainClient::new(DEST_CHAIN));
            let ledger = Arc::new(MemoryRelayLedger::new());
            let shutdown = Arc::new(RwLock::new(false));

            let nonces = Arc::new(NonceManager::new(test_wallet().address()));
            nonces.register(SOURCE_CHAIN, 0);
            nonces.register(DEST_CHAIN, 0);

            let submitter = Arc::new(Submitter::new(
                vec![
                    (Self::context(ChainRole::Source, source.clone()), gas_config()),
                    (Self::context(ChainRole::Destination, dest.clone()), gas_config()),
                ],
                test_wallet(),
                nonces,
                relayer_config(),
                shutdown.clone(),
            ));

            Self {
                source,
                dest,
                ledger,
                submitter,
                shutdown,
            }
        }

        fn context(role: ChainRole, client: Arc<FakeChainClient>) -> ChainContext {
            ChainContext {
                role,
                chain_id: client.chain_id(),
                name: role.as_str().to_string(),
                client,
                contract: match role {
                    ChainRole::Source => source_contract(),
                    ChainRole::Destination => dest_contract(),
                },
            }
        }

        fn origin_client(&self, role: ChainRole) -> Arc<FakeChainClient> {
            match role {
                ChainRole::Source => self.source.clone(),
                ChainRole::Destination => self.dest.clone(),
            }
        }

        /// Engine whose cursor resumes from whatever the ledger holds
        async fn engine(&self, origin_role: ChainRole) -> RelayEngine {
            let client = self.origin_client(origin_role);
            let cursor = EventCursor::load(
                client.chain_id(),
                3,
                1000,
                client.clone(),
                self.ledger.clone(),
            )
            .await
            .unwrap();

            RelayEngine::new(
                Rig::context(origin_role, client),
                cursor,
                self.ledger.clone(),
                self.submitter.clone(),
                relayer_config(),
                self.shutdown.clone(),
            )
        }
    }

    #[test]
    fn engine_state_serializes_lowercase_for_the_status_api() {
        assert_eq!(
            serde_json::to_string(&EngineState::Scanning).unwrap(),
            "\"scanning\""
        );
        assert_eq!(serde_json::to_string(&EngineState::Idle).unwrap(), "\"idle\"");
    }

    #[tokio::test]
    async fn deposit_is_relayed_once_end_to_end() {
        let rig = Rig::new();
        // Cursor initializes at 47 - 3 = 44
        rig.source.set_height(47);
        let mut engine = rig.engine(ChainRole::Source).await;

        rig.source.set_height(55);
        let log = bridge_log(
            EventKind::Deposit,
            source_contract(),
            50,
            0,
            Address::repeat_byte(0x11),
        );
        rig.source.push_log(log.clone());

        assert!(engine.cycle().await.unwrap());

        let sent = rig.dest.sent_transactions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, dest_contract());
        assert_eq!(&sent[0].data[..4], &id("wrap(address,address,uint256)")[..]);

        let event = decode_log(SOURCE_CHAIN, EventKind::Deposit, &log).unwrap();
        let record = rig.ledger.get(event.id).await.unwrap().unwrap();
        assert_eq!(record.status, RelayStatus::Confirmed);
        assert_eq!(record.destination_tx_hash, Some(sent[0].hash));

        assert_eq!(rig.ledger.load_cursor(SOURCE_CHAIN).await.unwrap(), Some(52));

        // A repeat scan of the overlapping range does not resubmit
        rig.ledger.save_cursor(SOURCE_CHAIN, 44).await.unwrap();
        let mut engine = rig.engine(ChainRole::Source).await;
        assert!(engine.cycle().await.unwrap());
        assert_eq!(rig.dest.sent_transactions().len(), 1);
    }

    #[tokio::test]
    async fn unconfirmed_blocks_wait_for_depth() {
        let rig = Rig::new();
        rig.source.set_height(47);
        let mut engine = rig.engine(ChainRole::Source).await;

        rig.source.set_height(55);
        // Block 54 is within the confirmation window at height 55 (depth 3)
        rig.source.push_log(bridge_log(
            EventKind::Deposit,
            source_contract(),
            54,
            0,
            Address::repeat_byte(0x11),
        ));

        assert!(engine.cycle().await.unwrap());
        assert!(rig.dest.sent_transactions().is_empty());

        // Once enough blocks follow, the event is relayed
        rig.source.set_height(58);
        assert!(engine.cycle().await.unwrap());
        assert_eq!(rig.dest.sent_transactions().len(), 1);
    }

    #[tokio::test]
    async fn rescan_completes_only_the_unfinished_event() {
        let rig = Rig::new();
        rig.source.set_height(47);
        let mut engine = rig.engine(ChainRole::Source).await;
        rig.source.set_height(55);

        let logs: Vec<Log> = (0..3)
            .map(|i| {
                bridge_log(
                    EventKind::Deposit,
                    source_contract(),
                    50 + i,
                    0,
                    Address::repeat_byte(0x11),
                )
            })
            .collect();
        for log in &logs {
            rig.source.push_log(log.clone());
        }

        // Simulate the previous run: first and third relayed to completion,
        // second recorded but crashed before submission.
        let events: Vec<RelayEvent> = logs
            .iter()
            .map(|l| decode_log(SOURCE_CHAIN, EventKind::Deposit, l).unwrap())
            .collect();
        for event in [&events[0], &events[2]] {
            rig.ledger.record_if_new(event).await.unwrap();
            rig.ledger
                .mark_submitted(event.id, H256::repeat_byte(0xd0))
                .await
                .unwrap();
            rig.ledger.mark_confirmed(event.id).await.unwrap();
        }
        rig.ledger.record_if_new(&events[1]).await.unwrap();

        assert!(engine.cycle().await.unwrap());

        // Exactly one submission: the unfinished middle event
        let sent = rig.dest.sent_transactions();
        assert_eq!(sent.len(), 1);
        let record = rig.ledger.get(events[1].id).await.unwrap().unwrap();
        assert_eq!(record.status, RelayStatus::Confirmed);
        assert_eq!(record.destination_tx_hash, Some(sent[0].hash));
    }

    #[tokio::test]
    async fn reverted_withdraw_fails_record_and_cursor_still_advances() {
        let rig = Rig::new();
        rig.dest.set_height(47);
        let mut engine = rig.engine(ChainRole::Destination).await;
        rig.dest.set_height(55);

        // Two unwraps; the first one's withdraw reverts on source
        rig.dest.push_log(bridge_log(
            EventKind::Unwrap,
            dest_contract(),
            50,
            0,
            Address::repeat_byte(0x31),
        ));
        rig.dest.push_log(bridge_log(
            EventKind::Unwrap,
            dest_contract(),
            51,
            0,
            Address::repeat_byte(0x32),
        ));
        rig.source.push_receipt_status(0);

        assert!(engine.cycle().await.unwrap());

        let sent = rig.source.sent_transactions();
        assert_eq!(sent.len(), 2);
        assert_eq!(&sent[0].data[..4], &id("withdraw(address,address,uint256)")[..]);

        let first = decode_log(
            DEST_CHAIN,
            EventKind::Unwrap,
            &bridge_log(EventKind::Unwrap, dest_contract(), 50, 0, Address::repeat_byte(0x31)),
        )
        .unwrap();
        let second = decode_log(
            DEST_CHAIN,
            EventKind::Unwrap,
            &bridge_log(EventKind::Unwrap, dest_contract(), 51, 0, Address::repeat_byte(0x32)),
        )
        .unwrap();

        let failed = rig.ledger.get(first.id).await.unwrap().unwrap();
        assert_eq!(failed.status, RelayStatus::Failed);
        assert!(failed.last_error.unwrap().contains("reverted"));

        let confirmed = rig.ledger.get(second.id).await.unwrap().unwrap();
        assert_eq!(confirmed.status, RelayStatus::Confirmed);

        // The poisoned event did not pin the cursor
        assert_eq!(rig.ledger.load_cursor(DEST_CHAIN).await.unwrap(), Some(52));
    }

    #[tokio::test]
    async fn unapproved_token_is_failed_without_submission() {
        let rig = Rig::new();
        rig.source.set_height(47);
        let mut engine = rig.engine(ChainRole::Source).await;
        rig.source.set_height(55);

        let token = Address::repeat_byte(0x41);
        let log = bridge_log(EventKind::Deposit, source_contract(), 50, 0, token);
        rig.source.push_log(log.clone());
        rig.dest
            .set_call_response(&approved_call(token).calldata(), false);

        assert!(engine.cycle().await.unwrap());

        assert!(rig.dest.sent_transactions().is_empty());
        let event = decode_log(SOURCE_CHAIN, EventKind::Deposit, &log).unwrap();
        let record = rig.ledger.get(event.id).await.unwrap().unwrap();
        assert_eq!(record.status, RelayStatus::Failed);
        assert!(record.last_error.unwrap().contains("not approved"));
        assert_eq!(rig.ledger.load_cursor(SOURCE_CHAIN).await.unwrap(), Some(52));
    }

    #[tokio::test]
    async fn malformed_log_is_failed_and_scan_continues() {
        let rig = Rig::new();
        rig.source.set_height(47);
        let mut engine = rig.engine(ChainRole::Source).await;
        rig.source.set_height(55);

        let mut bad = bridge_log(
            EventKind::Deposit,
            source_contract(),
            50,
            0,
            Address::repeat_byte(0x11),
        );
        bad.data = Bytes::from(vec![0u8; 16]);
        rig.source.push_log(bad.clone());
        rig.source.push_log(bridge_log(
            EventKind::Deposit,
            source_contract(),
            51,
            0,
            Address::repeat_byte(0x11),
        ));

        assert!(engine.cycle().await.unwrap());

        assert_eq!(rig.dest.sent_transactions().len(), 1);
        let bad_id = events::event_id_of(SOURCE_CHAIN, &bad).unwrap();
        let record = rig.ledger.get(bad_id).await.unwrap().unwrap();
        assert_eq!(record.status, RelayStatus::Failed);
        assert_eq!(rig.ledger.load_cursor(SOURCE_CHAIN).await.unwrap(), Some(52));
    }

    #[tokio::test]
    async fn timed_out_submission_settles_on_rescan_without_resubmitting() {
        let rig = Rig::new();
        rig.source.set_height(47);
        let mut engine = rig.engine(ChainRole::Source).await;
        rig.source.set_height(55);

        let log = bridge_log(
            EventKind::Deposit,
            source_contract(),
            50,
            0,
            Address::repeat_byte(0x11),
        );
        rig.source.push_log(log.clone());
        rig.dest.set_auto_receipts(false);

        assert!(engine.cycle().await.unwrap());

        let event = decode_log(SOURCE_CHAIN, EventKind::Deposit, &log).unwrap();
        let record = rig.ledger.get(event.id).await.unwrap().unwrap();
        assert_eq!(record.status, RelayStatus::Submitted);
        // Timeout still advances the cursor: the record blocks resubmission
        assert_eq!(rig.ledger.load_cursor(SOURCE_CHAIN).await.unwrap(), Some(52));

        // The transaction lands later; a rescan settles the record
        let sent = rig.dest.sent_transactions();
        assert_eq!(sent.len(), 1);
        rig.dest.insert_receipt(sent[0].hash, 1, 56);

        rig.ledger.save_cursor(SOURCE_CHAIN, 44).await.unwrap();
        let mut engine = rig.engine(ChainRole::Source).await;
        assert!(engine.cycle().await.unwrap());

        assert_eq!(rig.dest.sent_transactions().len(), 1);
        let record = rig.ledger.get(event.id).await.unwrap().unwrap();
        assert_eq!(record.status, RelayStatus::Confirmed);
    }

    #[tokio::test]
    async fn rpc_failure_aborts_cycle_without_advancing() {
        let rig = Rig::new();
        rig.source.set_height(47);
        let mut engine = rig.engine(ChainRole::Source).await;
        rig.source.set_height(55);

        rig.source.push_log(bridge_log(
            EventKind::Deposit,
            source_contract(),
            50,
            0,
            Address::repeat_byte(0x11),
        ));
        // Every broadcast attempt fails transiently
        for _ in 0..3 {
            rig.dest.push_send_failure("connection reset by peer");
        }

        let err = engine.cycle().await.unwrap_err();
        assert!(err.is_retryable());

        // Cursor held back: the range will be re-scanned
        assert_eq!(rig.ledger.load_cursor(SOURCE_CHAIN).await.unwrap(), Some(44));

        // Next cycle succeeds and completes the relay exactly once
        assert!(engine.cycle().await.unwrap());
        assert_eq!(rig.dest.sent_transactions().len(), 1);
        assert_eq!(rig.ledger.load_cursor(SOURCE_CHAIN).await.unwrap(), Some(52));
    }
}
