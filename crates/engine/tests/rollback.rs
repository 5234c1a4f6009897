//! Integration tests for the rollback engine: out-of-order deletion,
//! precondition rejection, and the streamed event contract.

use assert_matches::assert_matches;
use tally_db::models::CreateConstituency;
use tally_db::repositories::{ConstituencyRepo, ResultVersionRepo, UploadRepo};
use tally_db::DbPool;
use tally_engine::events::RollbackEvent;
use tally_engine::ingest::{run as run_ingest, IngestSource};
use tally_engine::rollback::{begin, RollbackError, RollbackOutcome};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn test_pool() -> DbPool {
    let pool = tally_db::create_memory_pool().await.expect("memory pool");
    tally_db::run_migrations(&pool).await.expect("migrations");
    pool
}

async fn seed(pool: &DbPool, names: &[&str]) -> Vec<i64> {
    let mut ids = Vec::new();
    for name in names {
        let c = ConstituencyRepo::create(
            pool,
            &CreateConstituency {
                name: name.to_string(),
                gss_code: None,
                region: None,
            },
        )
        .await
        .expect("seed constituency");
        ids.push(c.id);
    }
    ids
}

/// Ingest content, discarding ingestion events; returns the upload id.
async fn ingest(pool: &DbPool, content: &str) -> i64 {
    let (tx, _rx) = mpsc::unbounded_channel();
    let report = run_ingest(
        pool,
        "test.txt",
        IngestSource::Content(content.to_string()),
        10,
        &tx,
    )
    .await
    .expect("ingest");
    report.upload_id
}

async fn rollback_with_batch(
    pool: &DbPool,
    upload_id: i64,
    batch_size: usize,
) -> (Result<RollbackOutcome, RollbackError>, Vec<RollbackEvent>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = match begin(pool, upload_id).await {
        Ok(job) => job.run(pool, batch_size, &tx).await,
        Err(e) => Err(e),
    };
    drop(tx);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (result, events)
}

async fn rollback(
    pool: &DbPool,
    upload_id: i64,
) -> (Result<RollbackOutcome, RollbackError>, Vec<RollbackEvent>) {
    rollback_with_batch(pool, upload_id, tally_engine::PROGRESS_BATCH_SIZE).await
}

fn names(events: &[RollbackEvent]) -> Vec<&'static str> {
    events
        .iter()
        .map(|e| match e {
            RollbackEvent::Started { .. } => "started",
            RollbackEvent::Progress { .. } => "progress",
            RollbackEvent::Complete { .. } => "complete",
            RollbackEvent::Error { .. } => "error",
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Out-of-order deletion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deleting_the_newer_upload_rolls_back_to_the_older() {
    let pool = test_pool().await;
    let ids = seed(&pool, &["X"]).await;
    let u1 = ingest(&pool, "X,100,C,50,L").await;
    let u2 = ingest(&pool, "X,80,C,120,L").await;

    // U2 is current: winner L, total 200.
    let current = ResultVersionRepo::current_version(&pool, ids[0]).await.unwrap().unwrap();
    assert_eq!(current.winning_party_code.as_deref(), Some("L"));
    assert_eq!(current.total_votes, 200);

    let (outcome, _) = rollback(&pool, u2).await;
    assert_eq!(outcome.unwrap().rolled_back, 1);

    // Back to U1: winner C, total 150.
    let current = ResultVersionRepo::current_version(&pool, ids[0]).await.unwrap().unwrap();
    assert_eq!(current.upload_id, u1);
    assert_eq!(current.winning_party_code.as_deref(), Some("C"));
    assert_eq!(current.total_votes, 150);

    // Deleting U1 as well empties the constituency.
    let (outcome, _) = rollback(&pool, u1).await;
    assert_eq!(outcome.unwrap().rolled_back, 1);
    assert!(ResultVersionRepo::current_version(&pool, ids[0])
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn deleting_a_non_current_upload_changes_nothing_visible() {
    let pool = test_pool().await;
    let ids = seed(&pool, &["X"]).await;
    let u1 = ingest(&pool, "X,100,C,50,L").await;
    let u2 = ingest(&pool, "X,80,C,120,L").await;

    let (outcome, _) = rollback(&pool, u1).await;
    assert_eq!(outcome.unwrap().rolled_back, 1);

    // U1 was not current, so X still shows U2's values.
    let current = ResultVersionRepo::current_version(&pool, ids[0]).await.unwrap().unwrap();
    assert_eq!(current.upload_id, u2);
    assert_eq!(current.total_votes, 200);

    // Now deleting U2 empties X — U1 is already gone.
    rollback(&pool, u2).await.0.unwrap();
    assert!(ResultVersionRepo::current_version(&pool, ids[0])
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn final_state_depends_only_on_the_surviving_set() {
    for delete_newer_first in [true, false] {
        let pool = test_pool().await;
        let ids = seed(&pool, &["X", "Y"]).await;
        let u1 = ingest(&pool, "X,10,C\nY,11,L").await;
        let u2 = ingest(&pool, "X,20,G\nY,21,SNP").await;

        let order = if delete_newer_first { [u2, u1] } else { [u1, u2] };
        for upload_id in order {
            rollback(&pool, upload_id).await.0.unwrap();
        }

        for id in &ids {
            assert!(
                ResultVersionRepo::current_version(&pool, *id).await.unwrap().is_none(),
                "constituency {id} should be empty (newer-first = {delete_newer_first})"
            );
        }
    }
}

#[tokio::test]
async fn rollback_destroys_no_ledger_rows() {
    let pool = test_pool().await;
    let ids = seed(&pool, &["X"]).await;
    let u1 = ingest(&pool, "X,100,C").await;

    rollback(&pool, u1).await.0.unwrap();

    // versionsTouchedBy sees the row regardless of deletion.
    let touched = ResultVersionRepo::versions_touched_by(&pool, u1).await.unwrap();
    assert_eq!(touched, ids);
}

// ---------------------------------------------------------------------------
// Preconditions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn begin_rejects_a_missing_upload() {
    let pool = test_pool().await;
    assert_matches!(begin(&pool, 9999).await, Err(RollbackError::NotFound(9999)));
}

#[tokio::test]
async fn begin_rejects_an_already_deleted_upload() {
    let pool = test_pool().await;
    seed(&pool, &["X"]).await;
    let u1 = ingest(&pool, "X,1,C").await;

    rollback(&pool, u1).await.0.unwrap();
    assert_matches!(begin(&pool, u1).await, Err(RollbackError::AlreadyDeleted(_)));
}

#[tokio::test]
async fn begin_rejects_an_upload_still_processing() {
    let pool = test_pool().await;
    let inflight = UploadRepo::create(&pool, "inflight.txt").await.unwrap();

    assert_matches!(
        begin(&pool, inflight.id).await,
        Err(RollbackError::InvalidState(_))
    );
}

#[tokio::test]
async fn a_begin_run_race_loses_cleanly_with_an_error_event() {
    let pool = test_pool().await;
    seed(&pool, &["X"]).await;
    let u1 = ingest(&pool, "X,1,C").await;

    let first = begin(&pool, u1).await.unwrap();
    let second = begin(&pool, u1).await.unwrap();

    let (tx, _rx) = mpsc::unbounded_channel();
    first.run(&pool, 10, &tx).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = second.run(&pool, 10, &tx).await;
    drop(tx);
    assert_matches!(result, Err(RollbackError::AlreadyDeleted(_)));

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(names(&events), vec!["error"]);
}

// ---------------------------------------------------------------------------
// Event contract
// ---------------------------------------------------------------------------

#[tokio::test]
async fn event_stream_covers_every_affected_constituency() {
    let pool = test_pool().await;
    seed(&pool, &["A", "B", "C3"]).await;
    let u1 = ingest(&pool, "A,1,C\nB,2,L\nC3,3,G").await;

    let (result, events) = rollback_with_batch(&pool, u1, 2).await;
    assert_eq!(result.unwrap().rolled_back, 3);

    assert_eq!(names(&events), vec!["started", "progress", "progress", "complete"]);

    let RollbackEvent::Started { upload_id, total_affected } = &events[0] else {
        panic!("first event must be started");
    };
    assert_eq!(*upload_id, u1);
    assert_eq!(*total_affected, 3);

    let RollbackEvent::Complete { message, rolled_back, .. } = events.last().unwrap() else {
        panic!("last event must be complete");
    };
    assert_eq!(message, "Upload deleted");
    assert_eq!(*rolled_back, 3);
}

#[tokio::test]
async fn an_upload_touching_nothing_rolls_back_zero() {
    let pool = test_pool().await;
    seed(&pool, &["X"]).await;
    // Every line errors; the upload completes but owns no versions.
    let u1 = ingest(&pool, "Nowhere,1,C").await;

    let (result, events) = rollback(&pool, u1).await;
    assert_eq!(result.unwrap().rolled_back, 0);
    assert_eq!(names(&events), vec!["started", "complete"]);
}
