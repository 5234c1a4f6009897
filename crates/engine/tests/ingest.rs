//! Integration tests for the streaming ingestion pipeline.

use tally_core::ingest::IngestErrorKind;
use tally_db::models::{CreateConstituency, UploadStatus};
use tally_db::repositories::{ConstituencyRepo, ResultVersionRepo, UploadRepo};
use tally_db::DbPool;
use tally_engine::events::IngestEvent;
use tally_engine::ingest::{run, IngestReport, IngestSource};
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

async fn ingest_with_batch(
    pool: &DbPool,
    content: &str,
    batch_size: usize,
) -> (IngestReport, Vec<IngestEvent>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let report = run(
        pool,
        "test.txt",
        IngestSource::Content(content.to_string()),
        batch_size,
        &tx,
    )
    .await
    .expect("ingest run");
    drop(tx);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (report, events)
}

async fn ingest(pool: &DbPool, content: &str) -> (IngestReport, Vec<IngestEvent>) {
    ingest_with_batch(pool, content, tally_engine::PROGRESS_BATCH_SIZE).await
}

fn names(events: &[IngestEvent]) -> Vec<&'static str> {
    events
        .iter()
        .map(|e| match e {
            IngestEvent::Created { .. } => "created",
            IngestEvent::Progress { .. } => "progress",
            IngestEvent::Complete { .. } => "complete",
            IngestEvent::Error { .. } => "error",
        })
        .collect()
}

fn percentages(events: &[IngestEvent]) -> Vec<i64> {
    events
        .iter()
        .filter_map(|e| match e {
            IngestEvent::Progress { percentage, .. } => Some(*percentage),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_line_upload_sets_current_state() {
    let pool = test_pool().await;
    let ids = seed(&pool, &["Bedford"]).await;

    let (report, events) = ingest(&pool, "Bedford,6643,C,5276,L").await;

    assert_eq!(report.status, UploadStatus::Completed);
    assert_eq!(report.total_lines, 1);
    assert_eq!(report.processed_lines, 1);
    assert_eq!(report.error_lines, 0);
    assert_eq!(names(&events), vec!["created", "progress", "complete"]);

    let current = ResultVersionRepo::current_version(&pool, ids[0])
        .await
        .unwrap()
        .expect("Bedford has a current result");
    assert_eq!(current.total_votes, 11919);
    assert_eq!(current.winning_party_code.as_deref(), Some("C"));
}

#[tokio::test]
async fn created_and_complete_share_the_upload_id() {
    let pool = test_pool().await;
    seed(&pool, &["Bedford"]).await;

    let (report, events) = ingest(&pool, "Bedford,100,C").await;

    let IngestEvent::Created { upload_id, total_lines } = &events[0] else {
        panic!("first event must be created");
    };
    assert_eq!(*upload_id, report.upload_id);
    assert_eq!(*total_lines, 1);

    let IngestEvent::Complete { upload_id, status, .. } = events.last().unwrap() else {
        panic!("last event must be complete");
    };
    assert_eq!(*upload_id, report.upload_id);
    assert_eq!(*status, UploadStatus::Completed);
}

// ---------------------------------------------------------------------------
// Per-line failures never abort the upload
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unmatched_constituency_is_recorded_and_skipped() {
    let pool = test_pool().await;
    seed(&pool, &["Bedford"]).await;

    let (report, _) = ingest(&pool, "Nowhere,100,C").await;

    assert_eq!(report.status, UploadStatus::Completed);
    assert_eq!(report.processed_lines, 0);
    assert_eq!(report.error_lines, 1);
    assert_eq!(report.errors[0].kind, IngestErrorKind::ConstituencyNotMatched);

    // No version was created.
    let touched = ResultVersionRepo::versions_touched_by(&pool, report.upload_id)
        .await
        .unwrap();
    assert!(touched.is_empty());
}

#[tokio::test]
async fn duplicate_party_line_is_an_error_and_the_upload_completes() {
    let pool = test_pool().await;
    let ids = seed(&pool, &["X"]).await;

    let (report, _) = ingest(&pool, "X,100,C,100,C").await;

    assert_eq!(report.status, UploadStatus::Completed);
    assert_eq!(report.error_lines, 1);
    assert_eq!(report.errors[0].kind, IngestErrorKind::DuplicateParty);
    assert!(ResultVersionRepo::current_version(&pool, ids[0])
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn same_constituency_twice_in_one_file_is_a_conflict_error() {
    let pool = test_pool().await;
    let ids = seed(&pool, &["Bedford"]).await;

    let (report, _) = ingest(&pool, "Bedford,100,C\nBedford,200,C").await;

    assert_eq!(report.processed_lines, 1);
    assert_eq!(report.error_lines, 1);
    assert_eq!(
        report.errors[0].kind,
        IngestErrorKind::DuplicateConstituencyInUpload
    );
    assert_eq!(report.errors[0].line_number, 2);

    // The first line's version stands.
    let current = ResultVersionRepo::current_version(&pool, ids[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.total_votes, 100);
}

#[tokio::test]
async fn mixed_good_and_bad_lines_all_advance_progress() {
    let pool = test_pool().await;
    seed(&pool, &["Bedford", "Oxford East"]).await;

    let content = "Bedford,100,C\nNowhere,200,L\nOxford East,300,G";
    let (report, events) = ingest_with_batch(&pool, content, 1).await;

    assert_eq!(report.processed_lines, 2);
    assert_eq!(report.error_lines, 1);
    // Errors advance the same counter as successes.
    assert_eq!(percentages(&events), vec![33, 66, 100]);
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_of_one_yields_a_progress_event_per_line() {
    let pool = test_pool().await;
    seed(&pool, &["Bedford", "Oxford East"]).await;

    let (_, events) = ingest_with_batch(&pool, "Bedford,100,C\nOxford East,200,L", 1).await;

    assert_eq!(names(&events), vec!["created", "progress", "progress", "complete"]);
    assert_eq!(percentages(&events), vec![50, 100]);
}

#[tokio::test]
async fn progress_is_monotone_and_ends_at_exactly_100() {
    let pool = test_pool().await;
    seed(&pool, &["A1", "A2", "A3", "A4", "A5"]).await;

    let content = "A1,1,C\nA2,1,C\nA3,1,C\nA4,1,C\nA5,1,C";
    let (_, events) = ingest_with_batch(&pool, content, 2).await;

    let pcts = percentages(&events);
    assert_eq!(pcts, vec![40, 80, 100]);
    assert!(pcts.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*pcts.last().unwrap(), 100);
}

// ---------------------------------------------------------------------------
// Edge cases
// ---------------------------------------------------------------------------

#[tokio::test]
async fn blank_lines_are_uncounted_but_numbering_is_preserved() {
    let pool = test_pool().await;
    seed(&pool, &["Bedford"]).await;

    let (report, _) = ingest(&pool, "Bedford,100,C\n\nNowhere,1,C").await;

    assert_eq!(report.total_lines, 2);
    assert_eq!(report.errors[0].line_number, 3);
}

#[tokio::test]
async fn a_file_with_zero_valid_lines_still_completes() {
    let pool = test_pool().await;
    seed(&pool, &["Bedford"]).await;

    let (report, _) = ingest(&pool, "garbage\nNowhere,1,C").await;

    assert_eq!(report.status, UploadStatus::Completed);
    assert_eq!(report.processed_lines, 0);
    assert_eq!(report.error_lines, 2);
}

#[tokio::test]
async fn empty_content_completes_with_no_progress() {
    let pool = test_pool().await;

    let (report, events) = ingest(&pool, "\n  \n").await;

    assert_eq!(report.status, UploadStatus::Completed);
    assert_eq!(report.total_lines, 0);
    assert_eq!(names(&events), vec!["created", "complete"]);
}

#[tokio::test]
async fn resubmitting_a_file_never_merges_with_a_prior_upload() {
    let pool = test_pool().await;
    let ids = seed(&pool, &["Bedford"]).await;

    let (first, _) = ingest(&pool, "Bedford,100,C").await;
    let (second, _) = ingest(&pool, "Bedford,100,C").await;

    assert!(second.upload_id > first.upload_id);

    let surviving = ResultVersionRepo::surviving_versions_for(&pool, ids[0])
        .await
        .unwrap();
    assert_eq!(surviving.len(), 2);

    let current = ResultVersionRepo::current_version(&pool, ids[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.upload_id, second.upload_id);
}

// ---------------------------------------------------------------------------
// File sources and fatal I/O
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ingests_from_a_file_on_disk() {
    let pool = test_pool().await;
    let ids = seed(&pool, &["Bedford"]).await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.txt");
    std::fs::write(&path, "Bedford,6643,C,5276,L\n").unwrap();

    let (tx, _rx) = mpsc::unbounded_channel();
    let report = run(&pool, "results.txt", IngestSource::File(path), 10, &tx)
        .await
        .unwrap();

    assert_eq!(report.processed_lines, 1);
    assert!(ResultVersionRepo::current_version(&pool, ids[0])
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn an_unreadable_file_fails_the_upload_with_a_single_error_event() {
    let pool = test_pool().await;
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.txt");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let report = run(&pool, "missing.txt", IngestSource::File(missing), 10, &tx)
        .await
        .unwrap();
    drop(tx);

    assert_eq!(report.status, UploadStatus::Failed);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(names(&events), vec!["error"]);

    // The upload row records the failure.
    let upload = UploadRepo::find_by_id(&pool, report.upload_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(upload.status, UploadStatus::Failed);
    assert!(upload.completed_at.is_some());
}
