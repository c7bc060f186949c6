//! The job capability shared by the three pipeline jobs.

use async_trait::async_trait;
use tokio::sync::watch;

use anchora_chain::ChainError;
use anchora_core::error::CanonicalizationError;
use anchora_ipfs::IpfsError;
use anchora_merkle::MerkleError;
use anchora_store::StoreError;

/// Execution context handed to a job run.
///
/// `dry_run` executes every read path and logs intended writes but commits
/// nothing; `force_run` skips fill gates and quiescence windows. The
/// shutdown channel propagates cancellation into every in-flight item.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub force_run: bool,
    pub dry_run: bool,
    pub shutdown: watch::Receiver<bool>,
}

impl JobContext {
    /// A plain scheduled-run context.
    pub fn new(shutdown: watch::Receiver<bool>) -> Self {
        Self {
            force_run: false,
            dry_run: false,
            shutdown,
        }
    }

    /// A manual-trigger context.
    pub fn manual(force_run: bool, dry_run: bool, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            force_run,
            dry_run,
            shutdown,
        }
    }

    /// Whether cancellation has been signalled.
    pub fn cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// Per-run outcome aggregation. Skipped items (claim contention,
/// cancellation) count as neither success nor failure.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JobReport {
    pub success_count: u32,
    pub failure_count: u32,
}

impl JobReport {
    pub fn success(&mut self) {
        self.success_count += 1;
    }

    pub fn failure(&mut self) {
        self.failure_count += 1;
    }

    pub fn merge(mut self, other: JobReport) -> JobReport {
        self.success_count += other.success_count;
        self.failure_count += other.failure_count;
        self
    }
}

/// Run-level errors. Per-item failures are absorbed into the
/// [`JobReport`]; only failures outside per-item scope surface here.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Database failure outside per-item scope (work query, claim bookkeeping).
    #[error("storage failure: {0}")]
    Store(#[from] StoreError),

    /// Chain failure outside per-item scope (head lookup, missing signer).
    #[error("chain failure: {0}")]
    Chain(#[from] ChainError),

    /// Pinning failure that escaped per-item handling.
    #[error("pinning failure: {0}")]
    Ipfs(#[from] IpfsError),

    /// Merkle construction failure.
    #[error("merkle failure: {0}")]
    Merkle(#[from] MerkleError),

    /// Canonicalization failure that escaped per-item handling.
    #[error("canonicalization failure: {0}")]
    Canonical(#[from] CanonicalizationError),

    /// Stored state contradicts the pipeline invariants.
    #[error("data inconsistency: {0}")]
    Inconsistent(String),

    /// The run was cancelled mid-item; claims have been reversed.
    #[error("run cancelled")]
    Cancelled,
}

impl JobError {
    /// Whether the scheduler should stop driving the job (configuration
    /// problems no tick will fix).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Chain(ChainError::NoSigner { .. }))
    }
}

/// The shape shared by the three recurring jobs. The same entry point
/// serves the scheduler and manual triggers.
#[async_trait]
pub trait PipelineJob: Send + Sync {
    /// Stable job name for logs and schedules.
    fn name(&self) -> &'static str;

    /// Run one pass over the available work.
    async fn execute(&self, ctx: JobContext) -> Result<JobReport, JobError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_merge_adds_counts() {
        let mut a = JobReport::default();
        a.success();
        a.success();
        a.failure();
        let mut b = JobReport::default();
        b.failure();
        let merged = a.merge(b);
        assert_eq!(merged.success_count, 2);
        assert_eq!(merged.failure_count, 2);
    }

    #[test]
    fn context_reflects_shutdown_signal() {
        let (tx, rx) = watch::channel(false);
        let ctx = JobContext::new(rx);
        assert!(!ctx.cancelled());
        tx.send(true).unwrap();
        assert!(ctx.cancelled());
    }

    #[test]
    fn no_signer_is_fatal() {
        let err = JobError::Chain(ChainError::NoSigner {
            operation: "anchorBatch",
        });
        assert!(err.is_fatal());
        let err = JobError::Inconsistent("missing root".into());
        assert!(!err.is_fatal());
    }
}
