//! # anchora-store — Postgres Persistence Layer
//!
//! SQLx repositories for invoices, invoice lines, and batches, plus the
//! conditional-update claim primitives every pipeline job builds on.
//!
//! ## Claim protocol
//!
//! Multi-worker safety rests on one pattern: every state transition is an
//! `UPDATE … WHERE id = $n AND status = <expected> AND <claim predicate>`,
//! and `rows_affected()` decides ownership. A zero row count means another
//! worker claimed the row first; callers skip silently. Multi-row claims
//! (batch membership) run inside a single transaction; external I/O never
//! happens while a transaction is open.

pub mod batches;
pub mod error;
pub mod invoices;

pub use error::StoreError;

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

/// Connect to Postgres and apply embedded migrations.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;
    tracing::info!("connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("database migrations applied");

    Ok(pool)
}
