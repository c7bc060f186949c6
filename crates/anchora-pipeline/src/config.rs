//! Pipeline configuration, passed explicitly at construction time.

use std::time::Duration;

/// Tunables shared by the three jobs and the confirmation poller.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound on invoices picked up per upload run.
    pub max_invoices_per_run: i64,
    /// Parallel pins within one upload run.
    pub concurrent_uploads: usize,
    /// Quiescence window: invoices younger than this are left for the next
    /// run (skipped under `force_run`).
    pub min_invoice_age: Duration,
    /// Target number of invoices per batch.
    pub batch_size: usize,
    /// Upper bound on batches created per batch run.
    pub batches_per_run: usize,
    /// Upper bound on batches submitted per submit run.
    pub max_batches_per_submit: i64,
    /// Pause between consecutive anchor submissions.
    pub submit_pause: Duration,
    /// Confirmations required before a batch is final.
    pub confirmation_blocks: u64,
    /// How long a batch may sit unconfirmed before the poller gives up.
    pub pending_timeout: Duration,
    /// Whether to issue best-effort per-invoice indexing writes after an
    /// anchor is sent.
    pub register_invoices: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_invoices_per_run: 50,
            concurrent_uploads: 4,
            min_invoice_age: Duration::from_secs(60),
            batch_size: 10,
            batches_per_run: 5,
            max_batches_per_submit: 10,
            submit_pause: Duration::from_secs(2),
            confirmation_blocks: 3,
            pending_timeout: Duration::from_secs(30 * 60),
            register_invoices: false,
        }
    }
}

/// How often the scheduler fires each job.
#[derive(Debug, Clone)]
pub struct JobSchedule {
    /// Upload cadence.
    pub upload_every: Duration,
    /// Batch-creation cadence.
    pub batch_every: Duration,
    /// Submission cadence.
    pub submit_every: Duration,
}

impl Default for JobSchedule {
    fn default() -> Self {
        Self {
            upload_every: Duration::from_secs(10),
            batch_every: Duration::from_secs(15 * 60),
            submit_every: Duration::from_secs(10 * 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_defaults_match_operational_cadence() {
        let schedule = JobSchedule::default();
        assert_eq!(schedule.upload_every, Duration::from_secs(10));
        assert_eq!(schedule.batch_every, Duration::from_secs(900));
        assert_eq!(schedule.submit_every, Duration::from_secs(600));
    }

    #[test]
    fn pipeline_defaults_are_sane() {
        let config = PipelineConfig::default();
        assert!(config.batch_size >= 2);
        assert!(config.concurrent_uploads >= 1);
        assert_eq!(config.submit_pause, Duration::from_secs(2));
        assert_eq!(config.max_batches_per_submit, 10);
    }
}
