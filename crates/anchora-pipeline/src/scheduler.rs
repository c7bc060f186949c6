//! Interval scheduler driving the recurring jobs.
//!
//! One loop per job, each on its own cadence with missed ticks skipped.
//! Every loop selects on the shared shutdown channel; a fatal job error
//! (missing signer) stops that job's loop while the others keep running.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::job::{JobContext, PipelineJob};

/// Drives registered jobs until shutdown.
pub struct Scheduler {
    jobs: Vec<(Arc<dyn PipelineJob>, Duration)>,
    shutdown: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(shutdown: watch::Receiver<bool>) -> Self {
        Self {
            jobs: Vec::new(),
            shutdown,
        }
    }

    /// Register a job to run every `every`.
    pub fn register(&mut self, job: Arc<dyn PipelineJob>, every: Duration) {
        self.jobs.push((job, every));
    }

    /// Run all job loops to completion (i.e. until shutdown).
    pub async fn run(self) {
        let mut handles = Vec::with_capacity(self.jobs.len());
        for (job, every) in self.jobs {
            let mut shutdown = self.shutdown.clone();
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(every);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                tracing::info!(job = job.name(), every_secs = every.as_secs(), "job scheduled");
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let ctx = JobContext::new(shutdown.clone());
                            match job.execute(ctx).await {
                                Ok(report) => tracing::info!(
                                    job = job.name(),
                                    success = report.success_count,
                                    failure = report.failure_count,
                                    "job run finished"
                                ),
                                Err(e) if e.is_fatal() => {
                                    tracing::error!(job = job.name(), "job stopped: {e}");
                                    break;
                                }
                                Err(e) => tracing::error!(job = job.name(), "job run failed: {e}"),
                            }
                        }
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                tracing::info!(job = job.name(), "job loop shutting down");
                                break;
                            }
                        }
                    }
                }
            }));
        }
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("job loop panicked: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobError, JobReport};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingJob {
        runs: Arc<AtomicU32>,
    }

    #[async_trait]
    impl PipelineJob for CountingJob {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn execute(&self, _ctx: JobContext) -> Result<JobReport, JobError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(JobReport::default())
        }
    }

    #[tokio::test]
    async fn scheduler_runs_jobs_and_stops_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let runs = Arc::new(AtomicU32::new(0));
        let mut scheduler = Scheduler::new(rx);
        scheduler.register(
            Arc::new(CountingJob { runs: runs.clone() }),
            Duration::from_millis(10),
        );
        let handle = tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_millis(60)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let count = runs.load(Ordering::SeqCst);
        assert!(count >= 2, "job should have run repeatedly, got {count}");
    }

    #[tokio::test]
    async fn dropped_sender_also_stops_the_loop() {
        let (tx, rx) = watch::channel(false);
        let runs = Arc::new(AtomicU32::new(0));
        let mut scheduler = Scheduler::new(rx);
        scheduler.register(
            Arc::new(CountingJob { runs: runs.clone() }),
            Duration::from_millis(10),
        );
        let handle = tokio::spawn(scheduler.run());
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(tx);
        handle.await.unwrap();
        assert!(runs.load(Ordering::SeqCst) >= 1);
    }
}
