//! Invoice verification against the anchored root.
//!
//! Serves the control surface's `verifyInvoice` query: read the invoice and
//! its batch, replay the stored proof through the contract's read-only
//! verifier, and return the anchored batch view plus the pinned metadata
//! document.

use std::sync::Arc;

use sqlx::PgPool;

use anchora_chain::{AnchoredBatch, ChainClient, ChainError};
use anchora_ipfs::PinataClient;
use anchora_store::{batches, invoices, StoreError};

/// Outcome of a verification query.
#[derive(Debug, Clone)]
pub struct VerificationReport {
    /// Whether the contract verified the invoice's proof against the root.
    pub is_valid: bool,
    /// The anchored batch tuple, when the root is known on-chain.
    pub batch_info: Option<AnchoredBatch>,
    /// The pinned batch metadata document, when retrievable.
    pub metadata: Option<serde_json::Value>,
}

/// Errors from verification queries.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// No such invoice.
    #[error("invoice {0} not found")]
    NotFound(i64),

    /// The invoice has not completed anchoring.
    #[error("invoice {invoice_id} is not verifiable: {reason}")]
    NotAnchored {
        /// The invoice in question.
        invoice_id: i64,
        /// What is missing.
        reason: String,
    },

    /// Database failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Chain read failure.
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Read-side service combining store, chain, and pinning reads.
pub struct VerificationService {
    pool: PgPool,
    chain: Arc<ChainClient>,
    ipfs: Arc<PinataClient>,
}

impl VerificationService {
    pub fn new(pool: PgPool, chain: Arc<ChainClient>, ipfs: Arc<PinataClient>) -> Self {
        Self { pool, chain, ipfs }
    }

    /// Verify one invoice against its anchored batch root.
    pub async fn verify_invoice(&self, invoice_id: i64) -> Result<VerificationReport, VerifyError> {
        let invoice = invoices::get(&self.pool, invoice_id)
            .await?
            .ok_or(VerifyError::NotFound(invoice_id))?;

        let cid = invoice.cid.as_deref().ok_or_else(|| VerifyError::NotAnchored {
            invoice_id,
            reason: "no cid recorded".to_string(),
        })?;
        let batch_pk = invoice.batch_id.ok_or_else(|| VerifyError::NotAnchored {
            invoice_id,
            reason: "not part of any batch".to_string(),
        })?;
        let batch = batches::get(&self.pool, batch_pk)
            .await?
            .ok_or_else(|| VerifyError::NotAnchored {
                invoice_id,
                reason: format!("batch {batch_pk} missing"),
            })?;
        let root = batch.merkle_root.as_deref().ok_or_else(|| VerifyError::NotAnchored {
            invoice_id,
            reason: "batch has no merkle root".to_string(),
        })?;
        let proof: Vec<String> = invoice
            .merkle_proof
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| VerifyError::NotAnchored {
                invoice_id,
                reason: format!("malformed merkle proof: {e}"),
            })?
            .ok_or_else(|| VerifyError::NotAnchored {
                invoice_id,
                reason: "no merkle proof recorded".to_string(),
            })?;

        let is_valid = self.chain.verify_invoice_by_cid(root, cid, &proof).await?;
        let batch_info = self.chain.get_batch(root).await?;

        let metadata = match &batch.batch_cid {
            Some(batch_cid) => match self.ipfs.get_json(batch_cid).await {
                Ok(value) => value,
                Err(e) => {
                    // Metadata retrieval is informational; a gateway outage
                    // must not mask the verification verdict.
                    tracing::warn!(invoice_id, "batch metadata fetch failed: {e}");
                    None
                }
            },
            None => None,
        };

        tracing::info!(invoice_id, is_valid, "invoice verification completed");
        Ok(VerificationReport {
            is_valid,
            batch_info,
            metadata,
        })
    }
}
