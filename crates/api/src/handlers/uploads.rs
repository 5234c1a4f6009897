//! Upload handlers: file ingestion (plain and streaming), upload history,
//! stats, and upload deletion (plain and streaming rollback).

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tally_core::ingest::LineError;
use tally_core::search::{clamp_limit, clamp_offset, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
use tally_core::types::DbId;
use tally_db::models::{Upload, UploadStats, UploadStatus};
use tally_db::repositories::UploadRepo;
use tally_engine::ingest::{self, IngestSource};
use tally_engine::rollback;
use tally_engine::PROGRESS_BATCH_SIZE;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Query parameters for listing uploads.
#[derive(Debug, Deserialize)]
pub struct ListUploadsParams {
    pub status: Option<UploadStatus>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Final report for a non-streaming upload.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub upload_id: DbId,
    pub status: UploadStatus,
    pub total_lines: i64,
    pub processed_lines: i64,
    pub error_lines: i64,
    pub errors: Vec<LineError>,
}

/// Paginated upload history. Soft-deleted uploads remain listed; their
/// rows carry `deleted_at`.
#[derive(Debug, Serialize)]
pub struct UploadListResponse {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub uploads: Vec<Upload>,
}

/// Result of a non-streaming upload deletion.
#[derive(Debug, Serialize)]
pub struct DeleteUploadResponse {
    pub message: String,
    pub rolled_back: i64,
}

// ---------------------------------------------------------------------------
// Multipart handling
// ---------------------------------------------------------------------------

struct UploadedFile {
    filename: String,
    content: String,
}

/// Extract and validate the `file` field of a multipart upload.
async fn read_upload(multipart: &mut Multipart, max_bytes: usize) -> AppResult<UploadedFile> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|f| !f.is_empty())
            .ok_or_else(|| AppError::BadRequest("No filename provided".to_string()))?;

        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {e}")))?;

        if bytes.len() > max_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "File too large. Maximum size is {} bytes",
                max_bytes
            )));
        }

        let content = String::from_utf8(bytes.to_vec())
            .map_err(|_| AppError::BadRequest("File must be UTF-8 encoded text".to_string()))?;

        if content.trim().is_empty() {
            return Err(AppError::BadRequest("File is empty".to_string()));
        }

        return Ok(UploadedFile { filename, content });
    }

    Err(AppError::BadRequest("Missing 'file' field".to_string()))
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

/// POST /api/upload
///
/// Ingest a results file and respond with the final report once the whole
/// file has been processed.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<UploadResponse>)> {
    let file = read_upload(&mut multipart, state.config.max_upload_bytes).await?;

    // Nobody listens for events on the non-streaming path.
    let (tx, _rx) = mpsc::unbounded_channel();
    let report = ingest::run(
        &state.pool,
        &file.filename,
        IngestSource::Content(file.content),
        PROGRESS_BATCH_SIZE,
        &tx,
    )
    .await?;

    if report.status == UploadStatus::Failed {
        return Err(AppError::InternalError(
            "File processing failed".to_string(),
        ));
    }

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            upload_id: report.upload_id,
            status: report.status,
            total_lines: report.total_lines,
            processed_lines: report.processed_lines,
            error_lines: report.error_lines,
            errors: report.errors,
        }),
    ))
}

/// POST /api/upload/stream
///
/// Ingest a results file, streaming `created` / `progress` / `complete`
/// (or a terminal `error`) as SSE. The job runs to completion even if the
/// client disconnects.
pub async fn upload_stream(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let file = read_upload(&mut multipart, state.config.max_upload_bytes).await?;

    let (tx, rx) = mpsc::unbounded_channel();
    let pool = state.pool.clone();
    tokio::spawn(async move {
        if let Err(e) = ingest::run(
            &pool,
            &file.filename,
            IngestSource::Content(file.content),
            PROGRESS_BATCH_SIZE,
            &tx,
        )
        .await
        {
            tracing::error!(error = %e, "Streaming ingestion failed");
        }
    });

    Ok(sse_stream(rx))
}

// ---------------------------------------------------------------------------
// History and stats
// ---------------------------------------------------------------------------

/// GET /api/uploads
///
/// List upload history, newest first, with optional `status` and filename
/// `search` filters.
pub async fn list_uploads(
    State(state): State<AppState>,
    Query(params): Query<ListUploadsParams>,
) -> AppResult<Json<UploadListResponse>> {
    let limit = clamp_limit(params.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT);
    let offset = clamp_offset(params.offset);
    let search = params.search.as_deref();

    let uploads =
        UploadRepo::list(&state.pool, params.status, search, Some(limit), Some(offset)).await?;
    let total = UploadRepo::count(&state.pool, params.status, search).await?;

    Ok(Json(UploadListResponse {
        total,
        limit,
        offset,
        uploads,
    }))
}

/// GET /api/uploads/stats -- aggregate statistics over non-deleted uploads.
pub async fn upload_stats(State(state): State<AppState>) -> AppResult<Json<UploadStats>> {
    let stats = UploadRepo::stats(&state.pool).await?;
    Ok(Json(stats))
}

// ---------------------------------------------------------------------------
// Rollback
// ---------------------------------------------------------------------------

/// DELETE /api/uploads/{id}
///
/// Soft-delete an upload and roll back every constituency it touched,
/// responding once the rollback has completed.
pub async fn delete_upload(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DeleteUploadResponse>> {
    let job = rollback::begin(&state.pool, id).await.map_err(AppError::from)?;

    let (tx, _rx) = mpsc::unbounded_channel();
    let outcome = job
        .run(&state.pool, PROGRESS_BATCH_SIZE, &tx)
        .await
        .map_err(AppError::from)?;

    Ok(Json(DeleteUploadResponse {
        message: "Upload deleted".to_string(),
        rolled_back: outcome.rolled_back,
    }))
}

/// DELETE /api/uploads/{id}/stream
///
/// Soft-delete an upload, streaming `started` / `progress` / `complete`
/// (or `error`) as SSE. Precondition failures (missing, already deleted,
/// still processing) are HTTP errors before any event is sent.
pub async fn delete_upload_stream(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let job = rollback::begin(&state.pool, id).await.map_err(AppError::from)?;

    let (tx, rx) = mpsc::unbounded_channel();
    let pool = state.pool.clone();
    tokio::spawn(async move {
        if let Err(e) = job.run(&pool, PROGRESS_BATCH_SIZE, &tx).await {
            tracing::error!(upload_id = id, error = %e, "Streaming rollback failed");
        }
    });

    Ok(sse_stream(rx))
}

// ---------------------------------------------------------------------------
// SSE plumbing
// ---------------------------------------------------------------------------

/// Wrap a job's event channel as an SSE response. Each event becomes one
/// `data:` payload carrying its own `"event"` tag; the stream ends when
/// the job drops its sender.
fn sse_stream<T: serde::Serialize + Send + 'static>(
    rx: mpsc::UnboundedReceiver<T>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let stream = UnboundedReceiverStream::new(rx)
        .map(|event| Event::default().json_data(&event));
    Sse::new(stream).keep_alive(KeepAlive::default())
}
