//! The ingestion pipeline: file -> lines -> parser -> matcher -> ledger.
//!
//! State machine per upload: created -> processing -> completed | failed.
//! Per-line failures are recorded and never abort the file; only an
//! unreadable source fails the upload. Re-submitting an identical file
//! always creates a brand-new upload and new ledger versions.

use std::path::PathBuf;

use tally_core::ingest::{IngestErrorKind, LineError};
use tally_core::parser::parse_line;
use tally_core::types::DbId;
use tally_db::models::{Upload, UploadStatus};
use tally_db::repositories::{LedgerError, ResultVersionRepo, UploadRepo};
use tally_db::DbPool;

use crate::events::{percentage, IngestEvent, IngestEventSender};
use crate::matcher::Matcher;

/// Where the results file comes from.
pub enum IngestSource {
    /// Already-read file content (the HTTP upload path).
    Content(String),
    /// A path to read; a read failure is the fatal-I/O branch.
    File(PathBuf),
}

/// Final counts for one ingestion, mirrored in the `complete` event.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub upload_id: DbId,
    pub status: UploadStatus,
    pub total_lines: i64,
    pub processed_lines: i64,
    pub error_lines: i64,
    pub errors: Vec<LineError>,
}

impl IngestReport {
    fn failed(upload: &Upload) -> Self {
        Self {
            upload_id: upload.id,
            status: UploadStatus::Failed,
            total_lines: upload.total_lines,
            processed_lines: upload.processed_lines,
            error_lines: upload.error_lines,
            errors: Vec::new(),
        }
    }
}

/// Run one ingestion to completion, streaming events into `events`.
///
/// Returns the final report; `Err` is reserved for unexpected database
/// failures (the upload is marked failed best-effort first).
pub async fn run(
    pool: &DbPool,
    filename: &str,
    source: IngestSource,
    batch_size: usize,
    events: &IngestEventSender,
) -> Result<IngestReport, sqlx::Error> {
    let upload = UploadRepo::create(pool, filename).await?;
    tracing::info!(upload_id = upload.id, filename, "Ingestion started");

    let content = match read_source(source).await {
        Ok(content) => content,
        Err(detail) => {
            tracing::error!(upload_id = upload.id, error = %detail, "Results file unreadable");
            let failed = UploadRepo::fail(pool, upload.id).await?;
            let _ = events.send(IngestEvent::Error {
                upload_id: upload.id,
                detail,
            });
            return Ok(IngestReport::failed(&failed));
        }
    };

    // Non-blank lines keyed by their 1-based position in the raw file.
    let lines: Vec<(i64, &str)> = content
        .lines()
        .enumerate()
        .map(|(i, line)| ((i + 1) as i64, line))
        .filter(|(_, line)| !line.trim().is_empty())
        .collect();

    let total = lines.len() as i64;
    UploadRepo::set_total_lines(pool, upload.id, total).await?;
    let _ = events.send(IngestEvent::Created {
        upload_id: upload.id,
        total_lines: total,
    });

    let matcher = Matcher::load(pool).await?;

    let mut errors: Vec<LineError> = Vec::new();
    let mut processed_lines: i64 = 0;

    for (attempted, (line_number, raw)) in lines.into_iter().enumerate() {
        match ingest_line(pool, &matcher, upload.id, line_number, raw).await {
            Ok(IngestedLine::Version) => processed_lines += 1,
            Ok(IngestedLine::Skipped(error)) => {
                tracing::debug!(
                    upload_id = upload.id,
                    line_number,
                    kind = ?error.kind,
                    "Line skipped"
                );
                errors.push(error);
            }
            Err(e) => {
                tracing::error!(upload_id = upload.id, error = %e, "Ingestion aborted");
                let _ = UploadRepo::fail(pool, upload.id).await;
                let _ = events.send(IngestEvent::Error {
                    upload_id: upload.id,
                    detail: "Ingestion failed due to a database error".to_string(),
                });
                return Err(e);
            }
        }

        let attempted = attempted as i64 + 1;
        if batch_size > 0 && (attempted % batch_size as i64 == 0 || attempted == total) {
            let _ = events.send(IngestEvent::Progress {
                processed_count: attempted,
                total,
                percentage: percentage(attempted, total),
            });
        }
    }

    let completed = UploadRepo::complete(pool, upload.id, processed_lines, &errors).await?;
    tracing::info!(
        upload_id = completed.id,
        processed_lines = completed.processed_lines,
        error_lines = completed.error_lines,
        "Ingestion completed"
    );

    let report = IngestReport {
        upload_id: completed.id,
        status: completed.status,
        total_lines: completed.total_lines,
        processed_lines: completed.processed_lines,
        error_lines: completed.error_lines,
        errors: errors.clone(),
    };
    let _ = events.send(IngestEvent::Complete {
        upload_id: completed.id,
        status: completed.status,
        total_lines: completed.total_lines,
        processed_lines: completed.processed_lines,
        error_lines: completed.error_lines,
        errors,
    });
    Ok(report)
}

enum IngestedLine {
    /// The line produced a ledger version.
    Version,
    /// The line was recorded as an error and skipped.
    Skipped(LineError),
}

async fn ingest_line(
    pool: &DbPool,
    matcher: &Matcher,
    upload_id: DbId,
    line_number: i64,
    raw: &str,
) -> Result<IngestedLine, sqlx::Error> {
    let parsed = match parse_line(raw, line_number) {
        Ok(parsed) => parsed,
        Err(error) => return Ok(IngestedLine::Skipped(error)),
    };

    let Some(constituency_id) = matcher.resolve(&parsed.name) else {
        return Ok(IngestedLine::Skipped(LineError::new(
            line_number,
            IngestErrorKind::ConstituencyNotMatched,
            format!("No constituency matches '{}'", parsed.name),
        )));
    };

    match ResultVersionRepo::append_version(pool, constituency_id, upload_id, &parsed.party_votes)
        .await
    {
        Ok(_) => Ok(IngestedLine::Version),
        Err(LedgerError::Conflict { .. }) => Ok(IngestedLine::Skipped(LineError::new(
            line_number,
            IngestErrorKind::DuplicateConstituencyInUpload,
            format!("Constituency '{}' appears more than once in this file", parsed.name),
        ))),
        Err(LedgerError::Db(e)) => Err(e),
    }
}

async fn read_source(source: IngestSource) -> Result<String, String> {
    match source {
        IngestSource::Content(content) => Ok(content),
        IngestSource::File(path) => tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("Failed to read results file: {e}")),
    }
}
