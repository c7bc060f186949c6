//! anchora-daemon — one pipeline worker.
//!
//! Reads configuration from the environment, builds the object graph once
//! (pool, pinning client, chain client, jobs), and drives the scheduler
//! until SIGINT. Any number of workers may run against the same database;
//! the claim protocol keeps them from stepping on each other.

use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use anchora_chain::{ChainClient, ChainClientConfig};
use anchora_ipfs::{PinataClient, PinataConfig};
use anchora_pipeline::{
    CreateBatchJob, JobSchedule, PipelineConfig, Scheduler, SubmitToBlockchainJob, UploadToIpfsJob,
};

struct DaemonConfig {
    database_url: String,
    pinata: PinataConfig,
    chain: ChainClientConfig,
    pipeline: PipelineConfig,
    schedule: JobSchedule,
}

impl DaemonConfig {
    fn from_env() -> Result<Self> {
        let database_url = require("DATABASE_URL")?;

        let mut pinata = PinataConfig::new(require("PINATA_JWT")?);
        if let Some(url) = optional("PINATA_API_URL") {
            pinata.api_url = url;
        }
        if let Some(url) = optional("IPFS_GATEWAY_URL") {
            pinata.gateway_url = url;
        }
        if let Some(rate) = parse_optional::<u32>("IPFS_RATE_PER_MINUTE")? {
            pinata.rate_per_minute = rate;
        }
        if let Some(secs) = parse_optional::<u64>("IPFS_TIMEOUT_SECS")? {
            pinata.timeout_secs = secs;
        }

        let mut chain = ChainClientConfig::new(
            require("RPC_URL")?,
            require("ANCHOR_CONTRACT_ADDRESS")?,
            parse_required::<u64>("CHAIN_ID")?,
        );
        chain.private_key = optional("ANCHOR_PRIVATE_KEY");
        if let Some(max) = parse_optional::<u128>("MAX_GAS_PRICE_WEI")? {
            chain.max_gas_price_wei = max;
        }

        let mut pipeline = PipelineConfig::default();
        if let Some(n) = parse_optional::<i64>("MAX_INVOICES_PER_RUN")? {
            pipeline.max_invoices_per_run = n;
        }
        if let Some(n) = parse_optional::<usize>("CONCURRENT_UPLOADS")? {
            pipeline.concurrent_uploads = n;
        }
        if let Some(n) = parse_optional::<usize>("BATCH_SIZE")? {
            pipeline.batch_size = n;
        }
        if let Some(n) = parse_optional::<usize>("BATCHES_PER_RUN")? {
            pipeline.batches_per_run = n;
        }
        if let Some(n) = parse_optional::<u64>("CONFIRMATION_BLOCKS")? {
            pipeline.confirmation_blocks = n;
        }
        if let Some(ms) = parse_optional::<u64>("PENDING_TIMEOUT_MS")? {
            pipeline.pending_timeout = Duration::from_millis(ms);
        }
        if let Some(flag) = optional("REGISTER_INVOICES") {
            pipeline.register_invoices = matches!(flag.as_str(), "1" | "true" | "yes");
        }

        let mut schedule = JobSchedule::default();
        if let Some(secs) = parse_optional::<u64>("UPLOAD_INTERVAL_SECS")? {
            schedule.upload_every = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_optional::<u64>("BATCH_INTERVAL_SECS")? {
            schedule.batch_every = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_optional::<u64>("SUBMIT_INTERVAL_SECS")? {
            schedule.submit_every = Duration::from_secs(secs);
        }

        Ok(Self {
            database_url,
            pinata,
            chain,
            pipeline,
            schedule,
        })
    }
}

fn require(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{name} must be set"))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_required<T>(name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = require(name)?;
    raw.parse()
        .map_err(|e| anyhow::anyhow!("{name}={raw:?} is not valid: {e}"))
}

fn parse_optional<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match optional(name) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{name}={raw:?} is not valid: {e}")),
        None => Ok(None),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    info!("anchora daemon starting");

    let config = DaemonConfig::from_env()?;
    let pool = anchora_store::connect(&config.database_url)
        .await
        .context("database connection failed")?;
    let ipfs = Arc::new(PinataClient::new(config.pinata)?);
    let chain = Arc::new(ChainClient::new(config.chain)?);
    if !chain.can_sign() {
        warn!("no signing key configured; batch submission will stop at first use");
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let mut scheduler = Scheduler::new(shutdown_rx);
    scheduler.register(
        Arc::new(UploadToIpfsJob::new(
            pool.clone(),
            ipfs.clone(),
            config.pipeline.clone(),
        )),
        config.schedule.upload_every,
    );
    scheduler.register(
        Arc::new(CreateBatchJob::new(
            pool.clone(),
            ipfs.clone(),
            config.pipeline.clone(),
        )),
        config.schedule.batch_every,
    );
    scheduler.register(
        Arc::new(SubmitToBlockchainJob::new(
            pool.clone(),
            chain.clone(),
            config.pipeline.clone(),
        )),
        config.schedule.submit_every,
    );
    let scheduler_handle = tokio::spawn(scheduler.run());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received; draining job loops");
    let _ = shutdown_tx.send(true);
    scheduler_handle.await.context("scheduler task failed")?;
    pool.close().await;
    info!("anchora daemon stopped");
    Ok(())
}
