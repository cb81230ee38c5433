//! PostgreSQL-backed relay ledger

use super::{LedgerStats, RelayLedger, RelayRecord, RelayStatus};
use crate::config::DatabaseConfig;
use crate::error::{RelayerError, RelayerResult};
use crate::events::{EventKind, RelayEvent, RelayEventId};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers::types::H256;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};

pub struct PgRelayLedger {
    pool: PgPool,
}

impl PgRelayLedger {
    pub async fn connect(config: &DatabaseConfig) -> RelayerResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    /// Create tables if they do not exist. Idempotent.
    pub async fn run_migrations(&self) -> RelayerResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS relay_records (
                chain_id BIGINT NOT NULL,
                tx_hash VARCHAR(66) NOT NULL,
                log_index BIGINT NOT NULL,
                block_number BIGINT NOT NULL,
                event_kind VARCHAR(16) NOT NULL,
                status VARCHAR(16) NOT NULL,
                destination_tx_hash VARCHAR(66),
                attempts INT NOT NULL DEFAULT 0,
                last_error TEXT,
                first_seen_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                last_updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (chain_id, tx_hash, log_index)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_relay_records_status
            ON relay_records (status)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scan_cursors (
                chain_id BIGINT PRIMARY KEY,
                last_scanned_block BIGINT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Database migrations complete");
        Ok(())
    }

    fn record_from_row(row: &PgRow) -> RelayerResult<RelayRecord> {
        let tx_hash: String = row.get("tx_hash");
        let tx_hash: H256 = tx_hash
            .parse()
            .map_err(|e| RelayerError::Internal(format!("bad tx hash in ledger: {}", e)))?;

        let destination_tx_hash: Option<String> = row.get("destination_tx_hash");
        let destination_tx_hash = destination_tx_hash
            .map(|s| s.parse::<H256>())
            .transpose()
            .map_err(|e| RelayerError::Internal(format!("bad dest tx hash in ledger: {}", e)))?;

        let status: String = row.get("status");
        let status = RelayStatus::parse(&status)
            .ok_or_else(|| RelayerError::Internal(format!("unknown status '{}'", status)))?;

        let kind: String = row.get("event_kind");
        let kind = match kind.as_str() {
            "deposit" => EventKind::Deposit,
            "unwrap" => EventKind::Unwrap,
            other => {
                return Err(RelayerError::Internal(format!("unknown event kind '{}'", other)))
            }
        };

        Ok(RelayRecord {
            id: RelayEventId {
                chain_id: row.get::<i64, _>("chain_id") as u64,
                tx_hash,
                log_index: row.get::<i64, _>("log_index") as u64,
            },
            block_number: row.get::<i64, _>("block_number") as u64,
            kind,
            status,
            destination_tx_hash,
            attempts: row.get::<i32, _>("attempts") as u32,
            last_error: row.get("last_error"),
            first_seen_at: row.get::<DateTime<Utc>, _>("first_seen_at"),
            last_updated_at: row.get::<DateTime<Utc>, _>("last_updated_at"),
        })
    }

    fn hash_text(hash: H256) -> String {
        format!("{:#x}", hash)
    }

    async fn guarded_transition(
        &self,
        id: RelayEventId,
        query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
        target: RelayStatus,
    ) -> RelayerResult<()> {
        let result = query.execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            let current = self
                .get(id)
                .await?
                .map(|r| r.status.to_string())
                .unwrap_or_else(|| "missing".to_string());
            return Err(RelayerError::Ledger {
                id: id.to_string(),
                message: format!("cannot transition {} -> {}", current, target),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RelayLedger for PgRelayLedger {
    async fn record_if_new(&self, event: &RelayEvent) -> RelayerResult<(bool, RelayRecord)> {
        // ON CONFLICT DO NOTHING RETURNING yields a row only for the insert
        // that won, which makes the test-and-set atomic.
        let inserted = sqlx::query(
            r#"
            INSERT INTO relay_records
                (chain_id, tx_hash, log_index, block_number, event_kind, status)
            VALUES ($1, $2, $3, $4, $5, 'seen')
            ON CONFLICT (chain_id, tx_hash, log_index) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(event.id.chain_id as i64)
        .bind(Self::hash_text(event.id.tx_hash))
        .bind(event.id.log_index as i64)
        .bind(event.block_number as i64)
        .bind(event.kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            debug!("Recorded new relay event {}", event.id);
            return Ok((true, Self::record_from_row(&row)?));
        }

        let existing = self
            .get(event.id)
            .await?
            .ok_or_else(|| RelayerError::Internal(format!("lost race on record {}", event.id)))?;
        Ok((false, existing))
    }

    async fn record_malformed(
        &self,
        id: RelayEventId,
        block_number: u64,
        kind: EventKind,
        error: &str,
    ) -> RelayerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO relay_records
                (chain_id, tx_hash, log_index, block_number, event_kind, status, last_error)
            VALUES ($1, $2, $3, $4, $5, 'failed', $6)
            ON CONFLICT (chain_id, tx_hash, log_index) DO NOTHING
            "#,
        )
        .bind(id.chain_id as i64)
        .bind(Self::hash_text(id.tx_hash))
        .bind(id.log_index as i64)
        .bind(block_number as i64)
        .bind(kind.as_str())
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_submitted(
        &self,
        id: RelayEventId,
        destination_tx_hash: H256,
    ) -> RelayerResult<()> {
        let query = sqlx::query(
            r#"
            UPDATE relay_records
            SET status = 'submitted', destination_tx_hash = $4,
                attempts = attempts + 1, last_updated_at = NOW()
            WHERE chain_id = $1 AND tx_hash = $2 AND log_index = $3
              AND status = 'seen'
            "#,
        )
        .bind(id.chain_id as i64)
        .bind(Self::hash_text(id.tx_hash))
        .bind(id.log_index as i64)
        .bind(Self::hash_text(destination_tx_hash));

        self.guarded_transition(id, query, RelayStatus::Submitted).await
    }

    async fn mark_confirmed(&self, id: RelayEventId) -> RelayerResult<()> {
        let query = sqlx::query(
            r#"
            UPDATE relay_records
            SET status = 'confirmed', last_updated_at = NOW()
            WHERE chain_id = $1 AND tx_hash = $2 AND log_index = $3
              AND status = 'submitted'
            "#,
        )
        .bind(id.chain_id as i64)
        .bind(Self::hash_text(id.tx_hash))
        .bind(id.log_index as i64);

        self.guarded_transition(id, query, RelayStatus::Confirmed).await
    }

    async fn mark_failed(&self, id: RelayEventId, error: &str) -> RelayerResult<()> {
        let query = sqlx::query(
            r#"
            UPDATE relay_records
            SET status = 'failed', last_error = $4, last_updated_at = NOW()
            WHERE chain_id = $1 AND tx_hash = $2 AND log_index = $3
              AND status IN ('seen', 'submitted')
            "#,
        )
        .bind(id.chain_id as i64)
        .bind(Self::hash_text(id.tx_hash))
        .bind(id.log_index as i64)
        .bind(error);

        self.guarded_transition(id, query, RelayStatus::Failed).await
    }

    async fn retry_failed(&self, id: RelayEventId) -> RelayerResult<()> {
        let query = sqlx::query(
            r#"
            UPDATE relay_records
            SET status = 'seen', destination_tx_hash = NULL, last_updated_at = NOW()
            WHERE chain_id = $1 AND tx_hash = $2 AND log_index = $3
              AND status = 'failed'
            "#,
        )
        .bind(id.chain_id as i64)
        .bind(Self::hash_text(id.tx_hash))
        .bind(id.log_index as i64);

        self.guarded_transition(id, query, RelayStatus::Seen).await
    }

    async fn get(&self, id: RelayEventId) -> RelayerResult<Option<RelayRecord>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM relay_records
            WHERE chain_id = $1 AND tx_hash = $2 AND log_index = $3
            "#,
        )
        .bind(id.chain_id as i64)
        .bind(Self::hash_text(id.tx_hash))
        .bind(id.log_index as i64)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Self::record_from_row(&r)).transpose()
    }

    async fn load_cursor(&self, chain_id: u64) -> RelayerResult<Option<u64>> {
        let row = sqlx::query(
            "SELECT last_scanned_block FROM scan_cursors WHERE chain_id = $1",
        )
        .bind(chain_id as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get::<i64, _>("last_scanned_block") as u64))
    }

    async fn save_cursor(&self, chain_id: u64, block: u64) -> RelayerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO scan_cursors (chain_id, last_scanned_block, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (chain_id)
            DO UPDATE SET last_scanned_block = $2, updated_at = NOW()
            "#,
        )
        .bind(chain_id as i64)
        .bind(block as i64)
        .execute(&self.pool)
        .await?;

        debug!("Saved cursor for chain {}: block {}", chain_id, block);
        Ok(())
    }

    async fn stats(&self) -> RelayerResult<LedgerStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'seen') as seen,
                COUNT(*) FILTER (WHERE status = 'submitted') as submitted,
                COUNT(*) FILTER (WHERE status = 'confirmed') as confirmed,
                COUNT(*) FILTER (WHERE status = 'failed') as failed
            FROM relay_records
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(LedgerStats {
            seen: row.get::<i64, _>("seen") as u64,
            submitted: row.get::<i64, _>("submitted") as u64,
            confirmed: row.get::<i64, _>("confirmed") as u64,
            failed: row.get::<i64, _>("failed") as u64,
        })
    }
}
