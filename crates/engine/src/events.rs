//! Typed progress events streamed by ingestion and rollback jobs.
//!
//! Both jobs write into an unbounded `mpsc` channel and ignore send
//! failures: a caller that stops consuming (a departed SSE client) never
//! stalls or aborts the server-side job. Events serialize with an internal
//! `"event"` tag, so each SSE `data:` payload is self-describing.

use serde::Serialize;
use tally_core::ingest::LineError;
use tally_core::types::DbId;
use tally_db::models::UploadStatus;
use tokio::sync::mpsc;

/// Events emitted while ingesting one results file.
///
/// Sequence: `created`, zero or more `progress`, then exactly one of
/// `complete` or `error` (fatal I/O; nothing follows it).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IngestEvent {
    Created {
        upload_id: DbId,
        total_lines: i64,
    },
    Progress {
        processed_count: i64,
        total: i64,
        percentage: i64,
    },
    Complete {
        upload_id: DbId,
        status: UploadStatus,
        total_lines: i64,
        processed_lines: i64,
        error_lines: i64,
        errors: Vec<LineError>,
    },
    Error {
        upload_id: DbId,
        detail: String,
    },
}

/// Events emitted while rolling back one upload.
///
/// Sequence: `started`, zero or more `progress`, then `complete` or
/// `error`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RollbackEvent {
    Started {
        upload_id: DbId,
        total_affected: i64,
    },
    Progress {
        processed: i64,
        total: i64,
        percentage: i64,
    },
    Complete {
        upload_id: DbId,
        message: String,
        rolled_back: i64,
    },
    Error {
        upload_id: DbId,
        detail: String,
    },
}

pub type IngestEventSender = mpsc::UnboundedSender<IngestEvent>;
pub type RollbackEventSender = mpsc::UnboundedSender<RollbackEvent>;

/// Integer progress percentage; an empty job reads as fully done.
pub fn percentage(processed: i64, total: i64) -> i64 {
    if total <= 0 {
        100
    } else {
        processed * 100 / total
    }
}
