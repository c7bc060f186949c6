//! CreateBatchJob: group pinned invoices under one Merkle root.
//!
//! Membership is claimed inside a single short transaction; the Merkle
//! build, metadata pin, and proof recording happen outside it. Any failure
//! after the claim rolls the members back to `IpfsStored` with membership
//! and proofs cleared, so they are picked up again next run; the abandoned
//! batch shell is marked `BlockchainFailed`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use sqlx::PgPool;

use anchora_core::model::Invoice;
use anchora_ipfs::PinataClient;
use anchora_store::{batches, invoices, StoreError};

use crate::config::PipelineConfig;
use crate::job::{JobContext, JobError, JobReport, PipelineJob};

/// Recurring job that assembles `IpfsStored` invoices into batches.
pub struct CreateBatchJob {
    pool: PgPool,
    ipfs: Arc<PinataClient>,
    config: PipelineConfig,
}

impl CreateBatchJob {
    pub fn new(pool: PgPool, ipfs: Arc<PinataClient>, config: PipelineConfig) -> Self {
        Self { pool, ipfs, config }
    }

    /// Claim a group of invoices into a new batch and assemble its Merkle
    /// artifacts. `Ok(None)` means the whole group was claimed elsewhere.
    async fn process_group(
        &self,
        group: &[Invoice],
        ctx: &JobContext,
    ) -> Result<Option<i64>, JobError> {
        let human_id = new_batch_id();

        // Phase 1: create the shell and claim membership in one short
        // transaction; no network I/O happens while it is open.
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        let batch_pk = batches::create(&mut *tx, &human_id, group.len() as i32).await?;
        let mut claimed: Vec<&Invoice> = Vec::new();
        for invoice in group {
            if invoices::claim_for_batch(&mut *tx, invoice.id, batch_pk).await? {
                claimed.push(invoice);
            } else {
                tracing::debug!(
                    invoice_id = invoice.id,
                    "invoice claimed elsewhere; dropped from batch"
                );
            }
        }
        if claimed.is_empty() {
            tx.rollback().await.map_err(StoreError::from)?;
            tracing::debug!(batch_id = %human_id, "no invoices claimed; batch abandoned");
            return Ok(None);
        }
        if claimed.len() != group.len() {
            batches::set_count(&mut *tx, batch_pk, claimed.len() as i32).await?;
        }
        tx.commit().await.map_err(StoreError::from)?;

        // Phase 2: external I/O. Failures roll the members back.
        match self.assemble(batch_pk, &human_id, &claimed, ctx).await {
            Ok(()) => {
                tracing::info!(
                    batch_id = %human_id,
                    count = claimed.len(),
                    "batch ready to send"
                );
                Ok(Some(batch_pk))
            }
            Err(e) => {
                tracing::warn!(
                    batch_id = %human_id,
                    "batch assembly failed, releasing members: {e}"
                );
                if let Err(inner) = batches::mark_failed(&self.pool, batch_pk).await {
                    tracing::warn!(batch_id = %human_id, "failed to mark batch failed: {inner}");
                }
                match invoices::release_batch_members(&self.pool, batch_pk).await {
                    Ok(released) => tracing::debug!(batch_id = %human_id, released, "members released"),
                    Err(inner) => {
                        tracing::warn!(batch_id = %human_id, "failed to release members: {inner}")
                    }
                }
                Err(e)
            }
        }
    }

    /// Build the tree, pin the metadata document, and record proofs and the
    /// root. Runs entirely outside database transactions.
    async fn assemble(
        &self,
        batch_pk: i64,
        human_id: &str,
        claimed: &[&Invoice],
        ctx: &JobContext,
    ) -> Result<(), JobError> {
        let cids: Vec<String> = claimed
            .iter()
            .map(|invoice| {
                invoice.cid.clone().ok_or_else(|| {
                    JobError::Inconsistent(format!(
                        "invoice {} is IpfsStored without a cid",
                        invoice.id
                    ))
                })
            })
            .collect::<Result<_, _>>()?;

        let tree = anchora_merkle::build_tree(&cids)?;

        let metadata = serde_json::json!({ "cids": tree.sorted_leaves });
        let name = format!("batch-cids-{}-{}.json", human_id, Utc::now().timestamp());
        let mut shutdown = ctx.shutdown.clone();
        let batch_cid = tokio::select! {
            result = self.ipfs.pin_json(&metadata, &name) => result?,
            _ = shutdown.changed() => return Err(JobError::Cancelled),
        };

        for invoice in claimed {
            let cid = invoice.cid.as_deref().unwrap_or_default();
            let proof = tree.proofs.get(cid).ok_or_else(|| {
                JobError::Inconsistent(format!("no proof generated for cid {cid}"))
            })?;
            let proof_json = serde_json::to_string(proof)
                .map_err(|e| JobError::Inconsistent(format!("proof serialization: {e}")))?;
            if !invoices::record_merkle_proof(&self.pool, invoice.id, &proof_json).await? {
                return Err(JobError::Inconsistent(format!(
                    "invoice {} lost its batch claim mid-assembly",
                    invoice.id
                )));
            }
        }

        if !batches::finalize(&self.pool, batch_pk, &tree.root, &batch_cid).await? {
            return Err(JobError::Inconsistent(format!(
                "batch {human_id} left Processing unexpectedly"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PipelineJob for CreateBatchJob {
    fn name(&self) -> &'static str {
        "create_batch"
    }

    async fn execute(&self, ctx: JobContext) -> Result<JobReport, JobError> {
        let batch_size = self.config.batch_size.max(1);
        let limit = (batch_size * self.config.batches_per_run.max(1)) as i64;
        let candidates = invoices::fetch_batch_candidates(&self.pool, limit).await?;
        if candidates.is_empty() {
            tracing::debug!("no invoices awaiting batching");
            return Ok(JobReport::default());
        }
        if !gate_open(candidates.len(), batch_size, ctx.force_run) {
            tracing::info!(
                candidates = candidates.len(),
                batch_size,
                "fill gate not met; waiting for more invoices"
            );
            return Ok(JobReport::default());
        }

        let mut report = JobReport::default();
        for group in candidates.chunks(batch_size) {
            if ctx.cancelled() {
                break;
            }
            if ctx.dry_run {
                tracing::info!(size = group.len(), "dry-run: would create batch");
                report.success();
                continue;
            }
            match self.process_group(group, &ctx).await {
                Ok(Some(_)) => report.success(),
                Ok(None) => {}
                Err(JobError::Cancelled) => break,
                Err(e) => {
                    tracing::warn!("batch creation failed: {e}");
                    report.failure();
                }
            }
        }
        tracing::info!(
            success = report.success_count,
            failure = report.failure_count,
            "batch run complete"
        );
        Ok(report)
    }
}

/// Batch identifier: `BATCH-{unixSeconds}-{rand4}`.
fn new_batch_id() -> String {
    format!(
        "BATCH-{}-{:04}",
        Utc::now().timestamp(),
        rand::thread_rng().gen_range(0..10_000)
    )
}

/// The fill gate: without `force_run`, at least half a batch must be
/// waiting before any batch is created. The comparison is kept in integer
/// form (`2 * candidates >= batch_size`) so an odd batch size does not
/// truncate the threshold down.
fn gate_open(candidates: usize, batch_size: usize, force_run: bool) -> bool {
    force_run || 2 * candidates >= batch_size
}
