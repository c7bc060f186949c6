//! Batch repository: creation, submission claims, and confirmation updates.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgExecutor;

use anchora_core::model::InvoiceBatch;
use anchora_core::status::BatchStatus;

use crate::error::StoreError;

const BATCH_COLUMNS: &str = "id, batch_id, count, merkle_root, batch_cid, status, tx_hash, \
     block_number, confirmed_at, created_at, updated_at";

/// Create a batch shell in `Processing`, returning its primary key.
pub async fn create(
    exec: impl PgExecutor<'_>,
    batch_id: &str,
    count: i32,
) -> Result<i64, StoreError> {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO invoice_batches (batch_id, count, status) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(batch_id)
    .bind(count)
    .bind(BatchStatus::Processing.code())
    .fetch_one(exec)
    .await?;
    Ok(row.0)
}

/// Correct the member count after claiming (contention may shrink it).
pub async fn set_count(exec: impl PgExecutor<'_>, id: i64, count: i32) -> Result<bool, StoreError> {
    let result =
        sqlx::query("UPDATE invoice_batches SET count = $1, updated_at = now() WHERE id = $2")
            .bind(count)
            .bind(id)
            .execute(exec)
            .await?;
    Ok(result.rows_affected() > 0)
}

/// Record the Merkle root and metadata CID: `Processing → ReadyToSend`.
pub async fn finalize(
    exec: impl PgExecutor<'_>,
    id: i64,
    merkle_root: &str,
    batch_cid: &str,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE invoice_batches SET merkle_root = $1, batch_cid = $2, status = $3, \
         updated_at = now() WHERE id = $4 AND status = $5",
    )
    .bind(merkle_root)
    .bind(batch_cid)
    .bind(BatchStatus::ReadyToSend.code())
    .bind(id)
    .bind(BatchStatus::Processing.code())
    .execute(exec)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Batches awaiting submission, FIFO by creation time.
pub async fn fetch_ready(
    exec: impl PgExecutor<'_>,
    limit: i64,
) -> Result<Vec<InvoiceBatch>, StoreError> {
    let sql = format!(
        "SELECT {BATCH_COLUMNS} FROM invoice_batches \
         WHERE status = $1 AND merkle_root IS NOT NULL AND tx_hash IS NULL \
         ORDER BY created_at ASC LIMIT $2"
    );
    let rows = sqlx::query_as::<_, BatchRow>(&sql)
        .bind(BatchStatus::ReadyToSend.code())
        .bind(limit)
        .fetch_all(exec)
        .await?;
    rows.into_iter().map(BatchRow::into_record).collect()
}

/// Claim a batch for submission: `ReadyToSend → BlockchainPending`.
pub async fn claim_for_submit(exec: impl PgExecutor<'_>, id: i64) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE invoice_batches SET status = $1, updated_at = now() \
         WHERE id = $2 AND status = $3 AND tx_hash IS NULL",
    )
    .bind(BatchStatus::BlockchainPending.code())
    .bind(id)
    .bind(BatchStatus::ReadyToSend.code())
    .execute(exec)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Reverse a submission claim before anything was sent (cancellation path).
pub async fn release_submit_claim(exec: impl PgExecutor<'_>, id: i64) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE invoice_batches SET status = $1, updated_at = now() \
         WHERE id = $2 AND status = $3 AND tx_hash IS NULL",
    )
    .bind(BatchStatus::ReadyToSend.code())
    .bind(id)
    .bind(BatchStatus::BlockchainPending.code())
    .execute(exec)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Record the anchor transaction hash on a claimed batch.
pub async fn record_tx_hash(
    exec: impl PgExecutor<'_>,
    id: i64,
    tx_hash: &str,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE invoice_batches SET tx_hash = $1, updated_at = now() \
         WHERE id = $2 AND status = $3 AND tx_hash IS NULL",
    )
    .bind(tx_hash)
    .bind(id)
    .bind(BatchStatus::BlockchainPending.code())
    .execute(exec)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Batches whose anchor transaction awaits confirmation.
pub async fn fetch_pending(exec: impl PgExecutor<'_>) -> Result<Vec<InvoiceBatch>, StoreError> {
    let sql = format!(
        "SELECT {BATCH_COLUMNS} FROM invoice_batches \
         WHERE status = $1 AND tx_hash IS NOT NULL ORDER BY created_at ASC"
    );
    let rows = sqlx::query_as::<_, BatchRow>(&sql)
        .bind(BatchStatus::BlockchainPending.code())
        .fetch_all(exec)
        .await?;
    rows.into_iter().map(BatchRow::into_record).collect()
}

/// Record a confirmed anchor: `BlockchainPending → BlockchainConfirmed`.
pub async fn mark_confirmed(
    exec: impl PgExecutor<'_>,
    id: i64,
    block_number: i64,
    confirmed_at: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE invoice_batches SET status = $1, block_number = $2, confirmed_at = $3, \
         updated_at = now() WHERE id = $4 AND status = $5",
    )
    .bind(BatchStatus::BlockchainConfirmed.code())
    .bind(block_number)
    .bind(confirmed_at)
    .bind(id)
    .bind(BatchStatus::BlockchainPending.code())
    .execute(exec)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Record a terminal batch failure from any live state.
pub async fn mark_failed(exec: impl PgExecutor<'_>, id: i64) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE invoice_batches SET status = $1, updated_at = now() \
         WHERE id = $2 AND status = ANY($3)",
    )
    .bind(BatchStatus::BlockchainFailed.code())
    .bind(id)
    .bind(vec![
        BatchStatus::Processing.code(),
        BatchStatus::ReadyToSend.code(),
        BatchStatus::BlockchainPending.code(),
    ])
    .execute(exec)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Fetch a batch by primary key.
pub async fn get(exec: impl PgExecutor<'_>, id: i64) -> Result<Option<InvoiceBatch>, StoreError> {
    let sql = format!("SELECT {BATCH_COLUMNS} FROM invoice_batches WHERE id = $1");
    let row = sqlx::query_as::<_, BatchRow>(&sql)
        .bind(id)
        .fetch_optional(exec)
        .await?;
    row.map(BatchRow::into_record).transpose()
}

/// Fetch a batch by its human identifier.
pub async fn get_by_batch_id(
    exec: impl PgExecutor<'_>,
    batch_id: &str,
) -> Result<Option<InvoiceBatch>, StoreError> {
    let sql = format!("SELECT {BATCH_COLUMNS} FROM invoice_batches WHERE batch_id = $1");
    let row = sqlx::query_as::<_, BatchRow>(&sql)
        .bind(batch_id)
        .fetch_optional(exec)
        .await?;
    row.map(BatchRow::into_record).transpose()
}

#[derive(sqlx::FromRow)]
struct BatchRow {
    id: i64,
    batch_id: String,
    count: i32,
    merkle_root: Option<String>,
    batch_cid: Option<String>,
    status: i32,
    tx_hash: Option<String>,
    block_number: Option<i64>,
    confirmed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BatchRow {
    fn into_record(self) -> Result<InvoiceBatch, StoreError> {
        let status = BatchStatus::from_code(self.status)?;
        Ok(InvoiceBatch {
            id: self.id,
            batch_id: self.batch_id,
            count: self.count,
            merkle_root: self.merkle_root,
            batch_cid: self.batch_cid,
            status,
            tx_hash: self.tx_hash,
            block_number: self.block_number,
            confirmed_at: self.confirmed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
