//! Claim-protocol tests against a live Postgres instance.
//!
//! Run with `DATABASE_URL` pointing at a scratch database:
//! `DATABASE_URL=postgres://... cargo test -p anchora-store -- --ignored`.
//!
//! The properties under test: every claim is won by exactly one worker,
//! lost claims are silent skips, rollback restores the claimable state, and
//! re-running a drained work query is a no-op.

use anchora_core::status::{BatchStatus, InvoiceStatus};
use anchora_store::{batches, invoices};
use chrono::Utc;
use sqlx::PgPool;

async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for store tests");
    anchora_store::connect(&url).await.expect("connect + migrate")
}

fn unique(prefix: &str) -> String {
    format!(
        "{}-{}",
        prefix,
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    )
}

async fn insert_invoice(pool: &PgPool, status: InvoiceStatus, cid: Option<&str>) -> i64 {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO invoices (invoice_number, seller_name, customer_name, status, \
         issued_date, currency, cid, created_at) \
         VALUES ($1, 'Seller Co', 'Customer Co', $2, now(), 'EUR', $3, now() - interval '10 minutes') \
         RETURNING id",
    )
    .bind(unique("INV"))
    .bind(status.code())
    .bind(cid)
    .fetch_one(pool)
    .await
    .expect("insert invoice");
    row.0
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn upload_claim_is_won_exactly_once() {
    let pool = test_pool().await;
    let invoice_id = insert_invoice(&pool, InvoiceStatus::Uploaded, None).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            invoices::claim_for_upload(&pool, invoice_id).await.expect("claim query")
        }));
    }
    let mut winners = 0;
    for handle in handles {
        if handle.await.expect("task") {
            winners += 1;
        }
    }
    assert_eq!(winners, 1, "exactly one worker must win the claim");

    let invoice = invoices::get(&pool, invoice_id).await.expect("get").expect("exists");
    assert_eq!(invoice.status, InvoiceStatus::IpfsInFlight);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn completed_upload_leaves_no_rework() {
    let pool = test_pool().await;
    let invoice_id = insert_invoice(&pool, InvoiceStatus::Uploaded, None).await;

    assert!(invoices::claim_for_upload(&pool, invoice_id).await.expect("claim"));
    assert!(
        invoices::complete_upload(&pool, invoice_id, "QmClaimTest", "ab".repeat(32).as_str(), "cd".repeat(32).as_str())
            .await
            .expect("complete")
    );

    let invoice = invoices::get(&pool, invoice_id).await.expect("get").expect("exists");
    assert_eq!(invoice.status, InvoiceStatus::IpfsStored);
    assert_eq!(invoice.cid.as_deref(), Some("QmClaimTest"));

    // Re-running the work query no longer sees the invoice.
    let candidates = invoices::fetch_upload_candidates(&pool, Utc::now(), 1000)
        .await
        .expect("candidates");
    assert!(candidates.iter().all(|i| i.id != invoice_id));

    // A stale worker's claim attempt is a silent skip.
    assert!(!invoices::claim_for_upload(&pool, invoice_id).await.expect("re-claim"));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn released_upload_claim_is_claimable_again() {
    let pool = test_pool().await;
    let invoice_id = insert_invoice(&pool, InvoiceStatus::Uploaded, None).await;

    assert!(invoices::claim_for_upload(&pool, invoice_id).await.expect("claim"));
    assert!(invoices::release_upload_claim(&pool, invoice_id).await.expect("release"));

    let invoice = invoices::get(&pool, invoice_id).await.expect("get").expect("exists");
    assert_eq!(invoice.status, InvoiceStatus::Uploaded);
    assert!(invoices::claim_for_upload(&pool, invoice_id).await.expect("claim again"));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn batch_membership_is_claimed_once_and_rolls_back() {
    let pool = test_pool().await;
    let first = insert_invoice(&pool, InvoiceStatus::IpfsStored, Some("QmBatchA")).await;
    let second = insert_invoice(&pool, InvoiceStatus::IpfsStored, Some("QmBatchB")).await;

    let batch_pk = batches::create(&pool, &unique("BATCH"), 2).await.expect("create batch");
    assert!(invoices::claim_for_batch(&pool, first, batch_pk).await.expect("claim first"));
    assert!(invoices::claim_for_batch(&pool, second, batch_pk).await.expect("claim second"));

    // A competing batch cannot steal members.
    let rival_pk = batches::create(&pool, &unique("BATCH"), 2).await.expect("create rival");
    assert!(!invoices::claim_for_batch(&pool, first, rival_pk).await.expect("rival claim"));

    assert_eq!(invoices::count_members(&pool, batch_pk).await.expect("count"), 2);

    // Rollback: members return to the claimable state with no membership.
    let released = invoices::release_batch_members(&pool, batch_pk).await.expect("release");
    assert_eq!(released, 2);
    let invoice = invoices::get(&pool, first).await.expect("get").expect("exists");
    assert_eq!(invoice.status, InvoiceStatus::IpfsStored);
    assert!(invoice.batch_id.is_none());
    assert!(invoice.merkle_proof.is_none());

    // Now the rival can claim them.
    assert!(invoices::claim_for_batch(&pool, first, rival_pk).await.expect("rival re-claim"));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn submit_claim_and_tx_hash_are_exclusive() {
    let pool = test_pool().await;
    let batch_pk = batches::create(&pool, &unique("BATCH"), 1).await.expect("create");
    assert!(batches::finalize(&pool, batch_pk, &format!("0x{}", "11".repeat(32)), "QmMeta")
        .await
        .expect("finalize"));

    // Exactly one of two workers wins the submit claim.
    let a = batches::claim_for_submit(&pool, batch_pk).await.expect("claim a");
    let b = batches::claim_for_submit(&pool, batch_pk).await.expect("claim b");
    assert!(a ^ b, "exactly one submit claim must win");

    assert!(batches::record_tx_hash(&pool, batch_pk, "0xdeadbeef").await.expect("record"));
    // Recording twice is rejected by the tx_hash IS NULL predicate.
    assert!(!batches::record_tx_hash(&pool, batch_pk, "0xfeedface").await.expect("re-record"));

    let pending = batches::fetch_pending(&pool).await.expect("pending");
    assert!(pending.iter().any(|b| b.id == batch_pk));

    // Ready query no longer returns it.
    let ready = batches::fetch_ready(&pool, 1000).await.expect("ready");
    assert!(ready.iter().all(|b| b.id != batch_pk));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn confirmation_updates_batch_and_members() {
    let pool = test_pool().await;
    let invoice_id = insert_invoice(&pool, InvoiceStatus::IpfsStored, Some("QmConfirm")).await;
    let batch_pk = batches::create(&pool, &unique("BATCH"), 1).await.expect("create");
    assert!(invoices::claim_for_batch(&pool, invoice_id, batch_pk).await.expect("claim"));
    assert!(invoices::record_merkle_proof(&pool, invoice_id, "[]").await.expect("proof"));
    assert!(batches::finalize(&pool, batch_pk, &format!("0x{}", "22".repeat(32)), "QmMeta")
        .await
        .expect("finalize"));
    assert!(batches::claim_for_submit(&pool, batch_pk).await.expect("claim submit"));
    assert!(batches::record_tx_hash(&pool, batch_pk, "0xabc123").await.expect("tx"));

    assert!(batches::mark_confirmed(&pool, batch_pk, 777, Utc::now()).await.expect("confirm"));
    invoices::transition_members(
        &pool,
        batch_pk,
        &[InvoiceStatus::BlockchainPending, InvoiceStatus::Batched],
        InvoiceStatus::BlockchainConfirmed,
    )
    .await
    .expect("members");

    let batch = batches::get(&pool, batch_pk).await.expect("get").expect("exists");
    assert_eq!(batch.status, BatchStatus::BlockchainConfirmed);
    assert_eq!(batch.block_number, Some(777));
    assert!(batch.confirmed_at.is_some());

    let invoice = invoices::get(&pool, invoice_id).await.expect("get").expect("exists");
    assert_eq!(invoice.status, InvoiceStatus::BlockchainConfirmed);

    // Confirming twice is a no-op: the status predicate no longer matches.
    assert!(!batches::mark_confirmed(&pool, batch_pk, 778, Utc::now()).await.expect("re-confirm"));
}
