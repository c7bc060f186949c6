//! # anchora-pipeline — The Anchoring Kernel
//!
//! Three recurring jobs plus an in-process confirmation poller drive every
//! invoice from `Uploaded` to `BlockchainConfirmed`:
//!
//! 1. [`UploadToIpfsJob`] canonicalizes invoices and pins them to IPFS.
//! 2. [`CreateBatchJob`] groups pinned invoices, builds the Merkle tree,
//!    pins the batch metadata document, and records per-invoice proofs.
//! 3. [`SubmitToBlockchainJob`] anchors ready batches on-chain and advances
//!    in-flight ones via the confirmation poller.
//!
//! Any number of workers may run the same jobs concurrently: every
//! transition claims its row through a status-pinned conditional update, so
//! losing a claim race is a silent skip, never double work. A failure in
//! one item never halts a run; per-item outcomes aggregate into a
//! [`JobReport`].
//!
//! The [`Scheduler`] drives each job on its own interval; the same
//! [`PipelineJob::execute`] entry point serves manual triggers with
//! `force_run` / `dry_run` flags. [`VerificationService`] answers the
//! invoice verification query against the anchored root.

pub mod batch;
pub mod config;
pub mod confirm;
pub mod job;
pub mod scheduler;
pub mod submit;
pub mod upload;
pub mod verify;

pub use batch::CreateBatchJob;
pub use config::{JobSchedule, PipelineConfig};
pub use job::{JobContext, JobError, JobReport, PipelineJob};
pub use scheduler::Scheduler;
pub use submit::SubmitToBlockchainJob;
pub use upload::UploadToIpfsJob;
pub use verify::{VerificationReport, VerificationService, VerifyError};
