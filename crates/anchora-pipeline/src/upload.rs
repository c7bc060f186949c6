//! UploadToIpfsJob: canonicalize invoices and pin them to IPFS.
//!
//! Claim discipline: an invoice moves `Uploaded → IpfsInFlight` before the
//! pin and `IpfsInFlight → IpfsStored` only after the pin returns a CID, so
//! a crash mid-pin can never strand a CID-less `IpfsStored` row.
//! Cancellation reverses the claim instead of marking failure.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::Semaphore;

use anchora_core::canonical::CanonicalBytes;
use anchora_core::digest;
use anchora_ipfs::PinataClient;
use anchora_store::invoices;

use crate::config::PipelineConfig;
use crate::job::{JobContext, JobError, JobReport, PipelineJob};

/// Recurring job that publishes `Uploaded` invoices to IPFS.
pub struct UploadToIpfsJob {
    pool: PgPool,
    ipfs: Arc<PinataClient>,
    config: PipelineConfig,
}

enum ItemOutcome {
    Success,
    Failure,
    Skipped,
}

impl UploadToIpfsJob {
    pub fn new(pool: PgPool, ipfs: Arc<PinataClient>, config: PipelineConfig) -> Self {
        Self { pool, ipfs, config }
    }
}

#[async_trait]
impl PipelineJob for UploadToIpfsJob {
    fn name(&self) -> &'static str {
        "upload_to_ipfs"
    }

    async fn execute(&self, ctx: JobContext) -> Result<JobReport, JobError> {
        let cutoff = if ctx.force_run {
            Utc::now()
        } else {
            Utc::now()
                - chrono::Duration::from_std(self.config.min_invoice_age)
                    .unwrap_or_else(|_| chrono::Duration::zero())
        };
        let candidates = invoices::fetch_upload_candidates(
            &self.pool,
            cutoff,
            self.config.max_invoices_per_run,
        )
        .await?;
        if candidates.is_empty() {
            tracing::debug!("no invoices awaiting upload");
            return Ok(JobReport::default());
        }
        tracing::info!(count = candidates.len(), "uploading invoices to IPFS");

        let semaphore = Arc::new(Semaphore::new(self.config.concurrent_uploads.max(1)));
        let mut handles = Vec::with_capacity(candidates.len());
        for invoice in candidates {
            if ctx.cancelled() {
                break;
            }
            let pool = self.pool.clone();
            let ipfs = self.ipfs.clone();
            let ctx = ctx.clone();
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return ItemOutcome::Skipped,
                };
                upload_one(&pool, &ipfs, invoice, &ctx).await
            }));
        }

        let mut report = JobReport::default();
        for handle in handles {
            match handle.await {
                Ok(ItemOutcome::Success) => report.success(),
                Ok(ItemOutcome::Failure) => report.failure(),
                Ok(ItemOutcome::Skipped) => {}
                Err(e) => {
                    tracing::error!("upload task panicked: {e}");
                    report.failure();
                }
            }
        }
        tracing::info!(
            success = report.success_count,
            failure = report.failure_count,
            "upload run complete"
        );
        Ok(report)
    }
}

/// Pin object name: `invoice-{id}-{unixSeconds}.json`.
fn pin_object_name(invoice_id: i64, now: DateTime<Utc>) -> String {
    format!("invoice-{}-{}.json", invoice_id, now.timestamp())
}

async fn upload_one(
    pool: &PgPool,
    ipfs: &PinataClient,
    invoice: anchora_core::Invoice,
    ctx: &JobContext,
) -> ItemOutcome {
    let invoice_id = invoice.id;

    let lines = match invoices::lines_for(pool, invoice_id).await {
        Ok(lines) => lines,
        Err(e) => {
            tracing::warn!(invoice_id, "failed to load invoice lines: {e}");
            return ItemOutcome::Failure;
        }
    };
    let canonical = CanonicalBytes::from_invoice(&invoice, &lines);

    if ctx.dry_run {
        return match canonical {
            Ok(bytes) => {
                tracing::info!(
                    invoice_id,
                    immutable_hash = %bytes.sha256_hex(),
                    "dry-run: would pin invoice"
                );
                ItemOutcome::Success
            }
            Err(e) => {
                tracing::warn!(invoice_id, "dry-run: canonicalization failed: {e}");
                ItemOutcome::Failure
            }
        };
    }
    if ctx.cancelled() {
        return ItemOutcome::Skipped;
    }

    match invoices::claim_for_upload(pool, invoice_id).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(invoice_id, "invoice claimed by another worker");
            return ItemOutcome::Skipped;
        }
        Err(e) => {
            tracing::warn!(invoice_id, "upload claim failed: {e}");
            return ItemOutcome::Failure;
        }
    }

    // Post-claim failures are terminal for the invoice.
    let canonical = match canonical {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(invoice_id, "canonicalization failed: {e}");
            mark_failed(pool, invoice_id).await;
            return ItemOutcome::Failure;
        }
    };
    let immutable_hash = canonical.sha256_hex();
    let content: serde_json::Value = match serde_json::from_slice(canonical.as_bytes()) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(invoice_id, "canonical bytes are not valid JSON: {e}");
            mark_failed(pool, invoice_id).await;
            return ItemOutcome::Failure;
        }
    };

    let name = pin_object_name(invoice_id, Utc::now());
    let mut shutdown = ctx.shutdown.clone();
    tokio::select! {
        result = ipfs.pin_json(&content, &name) => match result {
            Ok(cid) => {
                let cid_hash = digest::cid_hash(&cid);
                match invoices::complete_upload(pool, invoice_id, &cid, &cid_hash, &immutable_hash)
                    .await
                {
                    Ok(true) => {
                        tracing::info!(invoice_id, cid = %cid, "invoice pinned to IPFS");
                        ItemOutcome::Success
                    }
                    Ok(false) => {
                        tracing::warn!(invoice_id, "upload commit lost its claim");
                        ItemOutcome::Skipped
                    }
                    Err(e) => {
                        tracing::warn!(invoice_id, "failed to record pin result: {e}");
                        ItemOutcome::Failure
                    }
                }
            }
            Err(e) => {
                tracing::warn!(invoice_id, "pin failed: {e}");
                mark_failed(pool, invoice_id).await;
                ItemOutcome::Failure
            }
        },
        _ = shutdown.changed() => {
            // Unwind: the invoice stays claimable on the next tick.
            if let Err(e) = invoices::release_upload_claim(pool, invoice_id).await {
                tracing::warn!(invoice_id, "failed to release upload claim: {e}");
            }
            ItemOutcome::Skipped
        }
    }
}

async fn mark_failed(pool: &PgPool, invoice_id: i64) {
    if let Err(e) = invoices::mark_ipfs_failed(pool, invoice_id).await {
        tracing::warn!(invoice_id, "failed to record terminal upload failure: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn pin_names_embed_id_and_timestamp() {
        let now = chrono::Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap();
        assert_eq!(pin_object_name(42, now), "invoice-42-1773480600.json");
    }
}
