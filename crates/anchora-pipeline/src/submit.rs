//! SubmitToBlockchainJob: anchor ready batches on-chain.
//!
//! Each run first drives the confirmation poller, then submits ready
//! batches FIFO. A batch is claimed `ReadyToSend → BlockchainPending`
//! before the send; the anchor transaction is sent exactly once per claim,
//! and consecutive submissions are paced two seconds apart.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use anchora_chain::{ChainClient, ChainError};
use anchora_core::model::InvoiceBatch;
use anchora_store::{batches, invoices};

use crate::config::PipelineConfig;
use crate::confirm::{self, fail_batch};
use crate::job::{JobContext, JobError, JobReport, PipelineJob};

/// Recurring job that submits `ReadyToSend` batches to the anchor contract.
pub struct SubmitToBlockchainJob {
    pool: PgPool,
    chain: Arc<ChainClient>,
    config: PipelineConfig,
}

impl SubmitToBlockchainJob {
    pub fn new(pool: PgPool, chain: Arc<ChainClient>, config: PipelineConfig) -> Self {
        Self {
            pool,
            chain,
            config,
        }
    }

    /// Submit one batch. `Ok(false)` means the batch was skipped (claimed
    /// elsewhere, already has a transaction, or cancellation).
    async fn submit_one(&self, batch: &InvoiceBatch, ctx: &JobContext) -> Result<bool, JobError> {
        if batch.tx_hash.is_some() {
            // Already sent; the confirmation poller owns it from here.
            return Ok(false);
        }
        let Some(root) = batch.merkle_root.clone() else {
            return self
                .fail_inconsistent(batch, "ReadyToSend without a merkle root")
                .await;
        };
        let Some(metadata_uri) = batch.batch_cid.clone() else {
            return self
                .fail_inconsistent(batch, "ReadyToSend without a batch cid")
                .await;
        };
        let batch_size = if batch.count > 0 {
            batch.count as u64
        } else {
            invoices::count_members(&self.pool, batch.id).await? as u64
        };

        if ctx.dry_run {
            tracing::info!(
                batch_id = %batch.batch_id,
                merkle_root = %root,
                batch_size,
                "dry-run: would anchor batch"
            );
            return Ok(true);
        }

        if !batches::claim_for_submit(&self.pool, batch.id).await? {
            tracing::debug!(batch_id = %batch.batch_id, "batch claimed by another worker");
            return Ok(false);
        }

        let mut shutdown = ctx.shutdown.clone();
        let outcome = tokio::select! {
            result = self.chain.anchor_batch(&root, batch_size, &metadata_uri) => result,
            _ = shutdown.changed() => {
                // Unwind before anything was sent; claimable next tick.
                if let Err(e) = batches::release_submit_claim(&self.pool, batch.id).await {
                    tracing::warn!(batch_id = %batch.batch_id, "failed to release submit claim: {e}");
                }
                return Ok(false);
            }
        };

        match outcome {
            Ok(tx_hash) => {
                if !batches::record_tx_hash(&self.pool, batch.id, &tx_hash).await? {
                    return Err(JobError::Inconsistent(format!(
                        "batch {} lost its submit claim after sending",
                        batch.batch_id
                    )));
                }
                tracing::info!(
                    batch_id = %batch.batch_id,
                    tx_hash = %tx_hash,
                    "anchor transaction recorded"
                );
                if self.config.register_invoices {
                    self.register_members(batch, &root).await;
                }
                Ok(true)
            }
            Err(e @ ChainError::NoSigner { .. }) => {
                // Configuration problem, not a batch problem: leave the
                // batch claimable and stop the job.
                if let Err(inner) = batches::release_submit_claim(&self.pool, batch.id).await {
                    tracing::warn!(batch_id = %batch.batch_id, "failed to release submit claim: {inner}");
                }
                Err(JobError::Chain(e))
            }
            Err(e) => {
                tracing::warn!(batch_id = %batch.batch_id, "anchor failed: {e}");
                fail_batch(&self.pool, batch.id).await?;
                Err(JobError::Chain(e))
            }
        }
    }

    /// Mark a structurally broken batch failed and surface the reason.
    async fn fail_inconsistent(
        &self,
        batch: &InvoiceBatch,
        reason: &str,
    ) -> Result<bool, JobError> {
        fail_batch(&self.pool, batch.id).await?;
        Err(JobError::Inconsistent(format!(
            "batch {}: {reason}",
            batch.batch_id
        )))
    }

    /// Best-effort per-invoice indexing writes; failures are logged only.
    async fn register_members(&self, batch: &InvoiceBatch, root: &str) {
        let members = match invoices::members_of(&self.pool, batch.id).await {
            Ok(members) => members,
            Err(e) => {
                tracing::warn!(batch_id = %batch.batch_id, "failed to load members for registration: {e}");
                return;
            }
        };
        for member in members {
            let (Some(cid), Some(hash)) = (member.cid.as_deref(), member.immutable_hash.as_deref())
            else {
                continue;
            };
            if let Err(e) = self
                .chain
                .register_individual_invoice(root, &member.id.to_string(), cid, hash)
                .await
            {
                tracing::warn!(invoice_id = member.id, "individual registration failed: {e}");
            }
        }
    }
}

#[async_trait]
impl PipelineJob for SubmitToBlockchainJob {
    fn name(&self) -> &'static str {
        "submit_to_blockchain"
    }

    async fn execute(&self, ctx: JobContext) -> Result<JobReport, JobError> {
        // Phase 1: advance whatever is already in flight.
        let mut report =
            confirm::poll_confirmations(&self.pool, &self.chain, &self.config, ctx.dry_run).await?;

        // Phase 2: submit ready batches, FIFO.
        let ready = batches::fetch_ready(&self.pool, self.config.max_batches_per_submit).await?;
        if ready.is_empty() {
            tracing::debug!("no batches ready to send");
            return Ok(report);
        }
        tracing::info!(count = ready.len(), "submitting batches to the chain");

        let mut submitted_any = false;
        for batch in ready {
            if ctx.cancelled() {
                break;
            }
            if submitted_any && !ctx.dry_run {
                // Pace RPC writes; skipped in dry-run.
                let mut shutdown = ctx.shutdown.clone();
                tokio::select! {
                    _ = tokio::time::sleep(self.config.submit_pause) => {}
                    _ = shutdown.changed() => break,
                }
            }
            match self.submit_one(&batch, &ctx).await {
                Ok(true) => {
                    submitted_any = true;
                    report.success();
                }
                Ok(false) => {}
                Err(e) if e.is_fatal() => {
                    tracing::error!("submission stopped: {e}");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(batch_id = %batch.batch_id, "submission failed: {e}");
                    report.failure();
                }
            }
        }
        tracing::info!(
            success = report.success_count,
            failure = report.failure_count,
            "submit run complete"
        );
        Ok(report)
    }
}
