//! Domain records for invoices, their line items, and anchoring batches.
//!
//! Invoices are created by the surrounding application; the pipeline only
//! ever mutates their pipeline attributes (status, CID, hashes, batch
//! membership, proof). Nothing here is ever destroyed.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::{BatchStatus, InvoiceStatus};

/// Contact block for one party of an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub name: String,
    pub tax_id: Option<String>,
    pub address: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// A business invoice moving through the anchoring pipeline.
///
/// Monetary totals carry scale 2; see [`InvoiceLine`] for per-line scales.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub invoice_number: String,
    pub form_number: Option<String>,
    pub serial: Option<String>,
    pub tenant_org_id: Option<i64>,
    pub issued_by_user_id: Option<i64>,
    pub seller: ContactInfo,
    pub customer: ContactInfo,
    pub status: InvoiceStatus,
    pub issued_date: DateTime<Utc>,
    pub sub_total: BigDecimal,
    pub tax_amount: BigDecimal,
    pub discount_amount: BigDecimal,
    pub total_amount: BigDecimal,
    pub currency: String,
    pub note: Option<String>,
    /// Primary key of the containing [`InvoiceBatch`], once batched.
    pub batch_id: Option<i64>,
    /// SHA-256 of the canonical bytes, lowercase hex, no prefix.
    pub immutable_hash: Option<String>,
    /// IPFS content identifier of the pinned canonical document.
    pub cid: Option<String>,
    /// SHA-256 of the CID string, lowercase hex, no prefix.
    pub cid_hash: Option<String>,
    /// JSON array of `0x`-prefixed sibling hashes, recorded at batch time.
    pub merkle_proof: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One line item of an invoice.
///
/// `line_number` is unique within the invoice. Quantity carries scale 4,
/// the tax rate scale 2, and all monetary fields scale 2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub id: i64,
    pub invoice_id: i64,
    pub line_number: i32,
    pub description: String,
    pub unit: Option<String>,
    pub quantity: BigDecimal,
    pub unit_price: BigDecimal,
    pub discount: BigDecimal,
    pub tax_rate: BigDecimal,
    pub tax_amount: BigDecimal,
    pub line_total: BigDecimal,
}

/// An aggregation of invoices sharing one Merkle root, anchored on-chain in
/// a single transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceBatch {
    pub id: i64,
    /// Human-readable unique identifier, `BATCH-{unixSeconds}-{rand4}`.
    pub batch_id: String,
    pub count: i32,
    /// `0x`-prefixed Keccak-256 Merkle root over member CIDs.
    pub merkle_root: Option<String>,
    /// CID of the pinned batch metadata document (`{"cids": [...]}`).
    pub batch_cid: Option<String>,
    pub status: BatchStatus,
    pub tx_hash: Option<String>,
    pub block_number: Option<i64>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
