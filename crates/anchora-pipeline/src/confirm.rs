//! Confirmation poller: advance batches whose anchor transaction is in
//! flight.
//!
//! For every `BlockchainPending` batch with a transaction hash, the poller
//! reads the receipt and the chain head and takes one of four actions:
//! confirm (deep enough, successful), fail (receipt reverted), give up
//! (pending longer than the timeout), or wait. Batch outcomes propagate to
//! member invoices.

use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;

use anchora_chain::{confirmation_depth, ChainClient, TxReceipt};
use anchora_core::status::InvoiceStatus;
use anchora_store::{batches, invoices};

use crate::config::PipelineConfig;
use crate::job::{JobError, JobReport};

/// What to do with one pending batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConfirmDecision {
    /// Successful receipt at sufficient depth.
    Confirm { block_number: u64 },
    /// Receipt exists with failure status.
    Fail,
    /// Pending longer than the configured timeout.
    GiveUp,
    /// Not confirmable yet; leave pending.
    Wait,
}

/// Pure decision function over the receipt, head height, and batch age.
pub(crate) fn decide(
    receipt: Option<&TxReceipt>,
    current_block: u64,
    required_confirmations: u64,
    pending_for: Duration,
    timeout: Duration,
) -> ConfirmDecision {
    let wait_or_give_up = if pending_for > timeout {
        ConfirmDecision::GiveUp
    } else {
        ConfirmDecision::Wait
    };
    match receipt {
        Some(r) if !r.success => ConfirmDecision::Fail,
        Some(r) => match r.block_number {
            Some(mined)
                if confirmation_depth(current_block, mined) >= required_confirmations =>
            {
                ConfirmDecision::Confirm {
                    block_number: mined,
                }
            }
            _ => wait_or_give_up,
        },
        None => wait_or_give_up,
    }
}

/// One poller pass over all pending batches.
pub async fn poll_confirmations(
    pool: &PgPool,
    chain: &ChainClient,
    config: &PipelineConfig,
    dry_run: bool,
) -> Result<JobReport, JobError> {
    let pending = batches::fetch_pending(pool).await?;
    let mut report = JobReport::default();
    if pending.is_empty() {
        return Ok(report);
    }

    let current_block = chain.get_current_block().await?;
    let now = Utc::now();

    for batch in pending {
        let Some(tx_hash) = batch.tx_hash.clone() else {
            continue;
        };
        let receipt = match chain.get_transaction_receipt(&tx_hash).await {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::warn!(
                    batch_id = %batch.batch_id,
                    "receipt lookup failed, leaving pending: {e}"
                );
                continue;
            }
        };
        let pending_for = (now - batch.updated_at).to_std().unwrap_or_default();

        match decide(
            receipt.as_ref(),
            current_block,
            config.confirmation_blocks,
            pending_for,
            config.pending_timeout,
        ) {
            ConfirmDecision::Confirm { block_number } => {
                if dry_run {
                    tracing::info!(batch_id = %batch.batch_id, block_number, "dry-run: would confirm batch");
                    report.success();
                    continue;
                }
                if batches::mark_confirmed(pool, batch.id, block_number as i64, Utc::now()).await? {
                    invoices::transition_members(
                        pool,
                        batch.id,
                        &[InvoiceStatus::BlockchainPending, InvoiceStatus::Batched],
                        InvoiceStatus::BlockchainConfirmed,
                    )
                    .await?;
                    tracing::info!(
                        batch_id = %batch.batch_id,
                        tx_hash = %tx_hash,
                        block_number,
                        "batch confirmed on-chain"
                    );
                    report.success();
                }
            }
            ConfirmDecision::Fail => {
                if dry_run {
                    tracing::info!(batch_id = %batch.batch_id, "dry-run: would fail batch (reverted)");
                    report.failure();
                    continue;
                }
                tracing::warn!(
                    batch_id = %batch.batch_id,
                    tx_hash = %tx_hash,
                    "anchor transaction reverted"
                );
                fail_batch(pool, batch.id).await?;
                report.failure();
            }
            ConfirmDecision::GiveUp => {
                if dry_run {
                    tracing::info!(batch_id = %batch.batch_id, "dry-run: would fail batch (timeout)");
                    report.failure();
                    continue;
                }
                tracing::warn!(
                    batch_id = %batch.batch_id,
                    tx_hash = %tx_hash,
                    pending_for_secs = pending_for.as_secs(),
                    "confirmation timeout exceeded; giving up"
                );
                fail_batch(pool, batch.id).await?;
                report.failure();
            }
            ConfirmDecision::Wait => {
                tracing::debug!(batch_id = %batch.batch_id, "anchor still pending");
            }
        }
    }
    Ok(report)
}

/// Terminal failure for a batch and its members.
pub(crate) async fn fail_batch(pool: &PgPool, batch_pk: i64) -> Result<(), JobError> {
    batches::mark_failed(pool, batch_pk).await?;
    invoices::transition_members(
        pool,
        batch_pk,
        &[InvoiceStatus::Batched, InvoiceStatus::BlockchainPending],
        InvoiceStatus::BlockchainFailed,
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(success: bool, block: Option<u64>) -> TxReceipt {
        TxReceipt {
            tx_hash: "0xabc".into(),
            block_number: block,
            success,
        }
    }

    const YOUNG: Duration = Duration::from_secs(60);
    const OLD: Duration = Duration::from_secs(7200);
    const TIMEOUT: Duration = Duration::from_secs(1800);

    #[test]
    fn deep_successful_receipt_confirms() {
        let r = receipt(true, Some(100));
        assert_eq!(
            decide(Some(&r), 105, 3, YOUNG, TIMEOUT),
            ConfirmDecision::Confirm { block_number: 100 }
        );
    }

    #[test]
    fn depth_boundary_is_inclusive() {
        // Mined at 100, head 102: depth 3 meets required 3.
        let r = receipt(true, Some(100));
        assert_eq!(
            decide(Some(&r), 102, 3, YOUNG, TIMEOUT),
            ConfirmDecision::Confirm { block_number: 100 }
        );
        assert_eq!(decide(Some(&r), 101, 3, YOUNG, TIMEOUT), ConfirmDecision::Wait);
    }

    #[test]
    fn reverted_receipt_fails_regardless_of_age() {
        let r = receipt(false, Some(100));
        assert_eq!(decide(Some(&r), 200, 3, YOUNG, TIMEOUT), ConfirmDecision::Fail);
        assert_eq!(decide(Some(&r), 200, 3, OLD, TIMEOUT), ConfirmDecision::Fail);
    }

    #[test]
    fn missing_receipt_waits_then_gives_up() {
        assert_eq!(decide(None, 200, 3, YOUNG, TIMEOUT), ConfirmDecision::Wait);
        assert_eq!(decide(None, 200, 3, OLD, TIMEOUT), ConfirmDecision::GiveUp);
    }

    #[test]
    fn shallow_receipt_times_out_too() {
        let r = receipt(true, Some(199));
        assert_eq!(decide(Some(&r), 200, 12, OLD, TIMEOUT), ConfirmDecision::GiveUp);
    }

    #[test]
    fn unmined_successful_receipt_waits() {
        let r = receipt(true, None);
        assert_eq!(decide(Some(&r), 200, 3, YOUNG, TIMEOUT), ConfirmDecision::Wait);
    }
}
