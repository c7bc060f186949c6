//! Invoice repository: work queries, claims, and pipeline-field updates.
//!
//! Claims pin the row's expected current status in the `WHERE` clause;
//! `rows_affected()` tells the caller whether it owns the row. Functions
//! that participate in multi-row claims take an executor so they run
//! equally against a pool or an open transaction.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgExecutor;

use anchora_core::model::{ContactInfo, Invoice, InvoiceLine};
use anchora_core::status::InvoiceStatus;

use crate::error::StoreError;

const INVOICE_COLUMNS: &str = "id, invoice_number, form_number, serial, tenant_org_id, \
     issued_by_user_id, seller_name, seller_tax_id, seller_address, seller_email, \
     seller_phone, customer_name, customer_tax_id, customer_address, customer_email, \
     customer_phone, status, issued_date, sub_total, tax_amount, discount_amount, \
     total_amount, currency, note, batch_id, immutable_hash, cid, cid_hash, \
     merkle_proof, created_at, updated_at";

/// Fetch a single invoice by id.
pub async fn get(exec: impl PgExecutor<'_>, id: i64) -> Result<Option<Invoice>, StoreError> {
    let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1");
    let row = sqlx::query_as::<_, InvoiceRow>(&sql)
        .bind(id)
        .fetch_optional(exec)
        .await?;
    row.map(InvoiceRow::into_record).transpose()
}

/// Line items for an invoice, ascending by line number.
pub async fn lines_for(
    exec: impl PgExecutor<'_>,
    invoice_id: i64,
) -> Result<Vec<InvoiceLine>, StoreError> {
    let rows = sqlx::query_as::<_, LineRow>(
        "SELECT id, invoice_id, line_number, description, unit, quantity, unit_price, \
         discount, tax_rate, tax_amount, line_total \
         FROM invoice_lines WHERE invoice_id = $1 ORDER BY line_number",
    )
    .bind(invoice_id)
    .fetch_all(exec)
    .await?;
    Ok(rows.into_iter().map(LineRow::into_record).collect())
}

/// Invoices eligible for IPFS upload: still `Uploaded`, no CID, and created
/// before `cutoff` (the quiescence window), oldest first.
pub async fn fetch_upload_candidates(
    exec: impl PgExecutor<'_>,
    cutoff: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Invoice>, StoreError> {
    let sql = format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices \
         WHERE status = $1 AND (cid IS NULL OR cid = '') AND created_at < $2 \
         ORDER BY created_at ASC LIMIT $3"
    );
    let rows = sqlx::query_as::<_, InvoiceRow>(&sql)
        .bind(InvoiceStatus::Uploaded.code())
        .bind(cutoff)
        .bind(limit)
        .fetch_all(exec)
        .await?;
    rows.into_iter().map(InvoiceRow::into_record).collect()
}

/// Claim an invoice for upload: `Uploaded → IpfsInFlight`.
pub async fn claim_for_upload(exec: impl PgExecutor<'_>, id: i64) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE invoices SET status = $1, updated_at = now() \
         WHERE id = $2 AND status = $3 AND (cid IS NULL OR cid = '')",
    )
    .bind(InvoiceStatus::IpfsInFlight.code())
    .bind(id)
    .bind(InvoiceStatus::Uploaded.code())
    .execute(exec)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Reverse an upload claim without marking failure (cancellation path).
pub async fn release_upload_claim(exec: impl PgExecutor<'_>, id: i64) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE invoices SET status = $1, updated_at = now() WHERE id = $2 AND status = $3",
    )
    .bind(InvoiceStatus::Uploaded.code())
    .bind(id)
    .bind(InvoiceStatus::IpfsInFlight.code())
    .execute(exec)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Record a successful pin: `IpfsInFlight → IpfsStored` plus the produced
/// CID and digests.
pub async fn complete_upload(
    exec: impl PgExecutor<'_>,
    id: i64,
    cid: &str,
    cid_hash: &str,
    immutable_hash: &str,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE invoices SET status = $1, cid = $2, cid_hash = $3, immutable_hash = $4, \
         updated_at = now() WHERE id = $5 AND status = $6",
    )
    .bind(InvoiceStatus::IpfsStored.code())
    .bind(cid)
    .bind(cid_hash)
    .bind(immutable_hash)
    .bind(id)
    .bind(InvoiceStatus::IpfsInFlight.code())
    .execute(exec)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Record a terminal upload failure: `IpfsInFlight → IpfsFailed`.
pub async fn mark_ipfs_failed(exec: impl PgExecutor<'_>, id: i64) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE invoices SET status = $1, updated_at = now() WHERE id = $2 AND status = $3",
    )
    .bind(InvoiceStatus::IpfsFailed.code())
    .bind(id)
    .bind(InvoiceStatus::IpfsInFlight.code())
    .execute(exec)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Invoices eligible for batching: `IpfsStored`, with a CID, unbatched,
/// oldest first.
pub async fn fetch_batch_candidates(
    exec: impl PgExecutor<'_>,
    limit: i64,
) -> Result<Vec<Invoice>, StoreError> {
    let sql = format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices \
         WHERE status = $1 AND cid IS NOT NULL AND cid <> '' AND batch_id IS NULL \
         ORDER BY created_at ASC LIMIT $2"
    );
    let rows = sqlx::query_as::<_, InvoiceRow>(&sql)
        .bind(InvoiceStatus::IpfsStored.code())
        .bind(limit)
        .fetch_all(exec)
        .await?;
    rows.into_iter().map(InvoiceRow::into_record).collect()
}

/// Claim an invoice into a batch: `IpfsStored → Batched` with membership.
/// The `batch_id IS NULL` predicate makes re-batching impossible.
pub async fn claim_for_batch(
    exec: impl PgExecutor<'_>,
    invoice_id: i64,
    batch_pk: i64,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE invoices SET status = $1, batch_id = $2, updated_at = now() \
         WHERE id = $3 AND status = $4 AND batch_id IS NULL",
    )
    .bind(InvoiceStatus::Batched.code())
    .bind(batch_pk)
    .bind(invoice_id)
    .bind(InvoiceStatus::IpfsStored.code())
    .execute(exec)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Attach a Merkle proof: `Batched → BlockchainPending`.
pub async fn record_merkle_proof(
    exec: impl PgExecutor<'_>,
    invoice_id: i64,
    proof_json: &str,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE invoices SET status = $1, merkle_proof = $2, updated_at = now() \
         WHERE id = $3 AND status = $4",
    )
    .bind(InvoiceStatus::BlockchainPending.code())
    .bind(proof_json)
    .bind(invoice_id)
    .bind(InvoiceStatus::Batched.code())
    .execute(exec)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Roll back a failed batch's members to the claimable state:
/// `{Batched, BlockchainPending} → IpfsStored`, membership and proof
/// cleared.
pub async fn release_batch_members(
    exec: impl PgExecutor<'_>,
    batch_pk: i64,
) -> Result<u64, StoreError> {
    let result = sqlx::query(
        "UPDATE invoices SET status = $1, batch_id = NULL, merkle_proof = NULL, \
         updated_at = now() WHERE batch_id = $2 AND status = ANY($3)",
    )
    .bind(InvoiceStatus::IpfsStored.code())
    .bind(batch_pk)
    .bind(vec![
        InvoiceStatus::Batched.code(),
        InvoiceStatus::BlockchainPending.code(),
    ])
    .execute(exec)
    .await?;
    Ok(result.rows_affected())
}

/// Move every member of a batch currently in one of `from` to `to`.
/// Used to propagate batch confirmation or failure.
pub async fn transition_members(
    exec: impl PgExecutor<'_>,
    batch_pk: i64,
    from: &[InvoiceStatus],
    to: InvoiceStatus,
) -> Result<u64, StoreError> {
    let from_codes: Vec<i32> = from.iter().map(|s| s.code()).collect();
    let result = sqlx::query(
        "UPDATE invoices SET status = $1, updated_at = now() \
         WHERE batch_id = $2 AND status = ANY($3)",
    )
    .bind(to.code())
    .bind(batch_pk)
    .bind(from_codes)
    .execute(exec)
    .await?;
    Ok(result.rows_affected())
}

/// All member invoices of a batch, oldest first.
pub async fn members_of(
    exec: impl PgExecutor<'_>,
    batch_pk: i64,
) -> Result<Vec<Invoice>, StoreError> {
    let sql = format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE batch_id = $1 ORDER BY created_at ASC"
    );
    let rows = sqlx::query_as::<_, InvoiceRow>(&sql)
        .bind(batch_pk)
        .fetch_all(exec)
        .await?;
    rows.into_iter().map(InvoiceRow::into_record).collect()
}

/// Live member count of a batch.
pub async fn count_members(exec: impl PgExecutor<'_>, batch_pk: i64) -> Result<i64, StoreError> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM invoices WHERE batch_id = $1")
        .bind(batch_pk)
        .fetch_one(exec)
        .await?;
    Ok(row.0)
}

#[derive(sqlx::FromRow)]
struct InvoiceRow {
    id: i64,
    invoice_number: String,
    form_number: Option<String>,
    serial: Option<String>,
    tenant_org_id: Option<i64>,
    issued_by_user_id: Option<i64>,
    seller_name: String,
    seller_tax_id: Option<String>,
    seller_address: Option<String>,
    seller_email: Option<String>,
    seller_phone: Option<String>,
    customer_name: String,
    customer_tax_id: Option<String>,
    customer_address: Option<String>,
    customer_email: Option<String>,
    customer_phone: Option<String>,
    status: i32,
    issued_date: DateTime<Utc>,
    sub_total: BigDecimal,
    tax_amount: BigDecimal,
    discount_amount: BigDecimal,
    total_amount: BigDecimal,
    currency: String,
    note: Option<String>,
    batch_id: Option<i64>,
    immutable_hash: Option<String>,
    cid: Option<String>,
    cid_hash: Option<String>,
    merkle_proof: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl InvoiceRow {
    fn into_record(self) -> Result<Invoice, StoreError> {
        let status = InvoiceStatus::from_code(self.status)?;
        Ok(Invoice {
            id: self.id,
            invoice_number: self.invoice_number,
            form_number: self.form_number,
            serial: self.serial,
            tenant_org_id: self.tenant_org_id,
            issued_by_user_id: self.issued_by_user_id,
            seller: ContactInfo {
                name: self.seller_name,
                tax_id: self.seller_tax_id,
                address: self.seller_address,
                email: self.seller_email,
                phone: self.seller_phone,
            },
            customer: ContactInfo {
                name: self.customer_name,
                tax_id: self.customer_tax_id,
                address: self.customer_address,
                email: self.customer_email,
                phone: self.customer_phone,
            },
            status,
            issued_date: self.issued_date,
            sub_total: self.sub_total,
            tax_amount: self.tax_amount,
            discount_amount: self.discount_amount,
            total_amount: self.total_amount,
            currency: self.currency,
            note: self.note,
            batch_id: self.batch_id,
            immutable_hash: self.immutable_hash,
            cid: self.cid,
            cid_hash: self.cid_hash,
            merkle_proof: self.merkle_proof,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LineRow {
    id: i64,
    invoice_id: i64,
    line_number: i32,
    description: String,
    unit: Option<String>,
    quantity: BigDecimal,
    unit_price: BigDecimal,
    discount: BigDecimal,
    tax_rate: BigDecimal,
    tax_amount: BigDecimal,
    line_total: BigDecimal,
}

impl LineRow {
    fn into_record(self) -> InvoiceLine {
        InvoiceLine {
            id: self.id,
            invoice_id: self.invoice_id,
            line_number: self.line_number,
            description: self.description,
            unit: self.unit,
            quantity: self.quantity,
            unit_price: self.unit_price,
            discount: self.discount,
            tax_rate: self.tax_rate,
            tax_amount: self.tax_amount,
            line_total: self.line_total,
        }
    }
}
