//! Repository for the `uploads` table.

use chrono::Utc;
use sqlx::types::Json;
use tally_core::ingest::LineError;
use tally_core::search::{clamp_limit, clamp_offset, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
use tally_core::types::DbId;

use crate::models::upload::{Upload, UploadStats, UploadStatus};
use crate::DbPool;

/// Column list for uploads queries.
const COLUMNS: &str = "id, filename, status, total_lines, processed_lines, error_lines, \
    errors, started_at, completed_at, deleted_at";

/// A soft-delete precondition failure. Rejected before any mutation.
#[derive(Debug, thiserror::Error)]
pub enum SoftDeleteError {
    #[error("Upload {0} not found")]
    NotFound(DbId),

    #[error("Upload {0} is already deleted")]
    AlreadyDeleted(DbId),

    #[error("Upload {0} is still processing and cannot be deleted")]
    StillProcessing(DbId),

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Provides lifecycle operations for upload records.
pub struct UploadRepo;

impl UploadRepo {
    /// Create a new upload in `processing` state.
    pub async fn create(pool: &DbPool, filename: &str) -> Result<Upload, sqlx::Error> {
        let query = format!(
            "INSERT INTO uploads (filename, status, started_at)
             VALUES (?, 'processing', ?)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Upload>(&query)
            .bind(filename)
            .bind(Utc::now())
            .fetch_one(pool)
            .await
    }

    /// Record the line count once the source has been read.
    pub async fn set_total_lines(
        pool: &DbPool,
        id: DbId,
        total_lines: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE uploads SET total_lines = ? WHERE id = ?")
            .bind(total_lines)
            .bind(id)
            .execute(pool)
            .await
            .map(|_| ())
    }

    /// Transition processing -> completed with the final counts and the
    /// itemized error list.
    pub async fn complete(
        pool: &DbPool,
        id: DbId,
        processed_lines: i64,
        errors: &[LineError],
    ) -> Result<Upload, sqlx::Error> {
        let query = format!(
            "UPDATE uploads SET
                status = 'completed',
                processed_lines = ?,
                error_lines = ?,
                errors = ?,
                completed_at = ?
             WHERE id = ?
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Upload>(&query)
            .bind(processed_lines)
            .bind(errors.len() as i64)
            .bind(Json(errors))
            .bind(Utc::now())
            .bind(id)
            .fetch_one(pool)
            .await
    }

    /// Transition processing -> failed (fatal I/O failure).
    pub async fn fail(pool: &DbPool, id: DbId) -> Result<Upload, sqlx::Error> {
        let query = format!(
            "UPDATE uploads SET status = 'failed', completed_at = ?
             WHERE id = ?
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Upload>(&query)
            .bind(Utc::now())
            .bind(id)
            .fetch_one(pool)
            .await
    }

    /// Find an upload by ID, soft-deleted or not.
    pub async fn find_by_id(pool: &DbPool, id: DbId) -> Result<Option<Upload>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM uploads WHERE id = ?");
        sqlx::query_as::<_, Upload>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List uploads, newest first, with optional status and filename
    /// filters. Soft-deleted uploads remain listed; rows carry
    /// `deleted_at` so callers can tell them apart.
    pub async fn list(
        pool: &DbPool,
        status: Option<UploadStatus>,
        search: Option<&str>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Upload>, sqlx::Error> {
        let limit = clamp_limit(limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT);
        let offset = clamp_offset(offset);

        let mut query = format!("SELECT {COLUMNS} FROM uploads");
        append_filters(&mut query, status, search);
        query.push_str(" ORDER BY id DESC LIMIT ? OFFSET ?");

        let mut q = sqlx::query_as::<_, Upload>(&query);
        if let Some(status) = status {
            q = q.bind(status.as_str());
        }
        if let Some(term) = search {
            q = q.bind(format!("%{term}%"));
        }
        q.bind(limit).bind(offset).fetch_all(pool).await
    }

    /// Number of uploads matching the same filters as [`Self::list`].
    pub async fn count(
        pool: &DbPool,
        status: Option<UploadStatus>,
        search: Option<&str>,
    ) -> Result<i64, sqlx::Error> {
        let mut query = "SELECT COUNT(*) FROM uploads".to_string();
        append_filters(&mut query, status, search);

        let mut q = sqlx::query_scalar::<_, i64>(&query);
        if let Some(status) = status {
            q = q.bind(status.as_str());
        }
        if let Some(term) = search {
            q = q.bind(format!("%{term}%"));
        }
        q.fetch_one(pool).await
    }

    /// Aggregate statistics over non-deleted uploads.
    pub async fn stats(pool: &DbPool) -> Result<UploadStats, sqlx::Error> {
        let (total, completed, failed, total_lines): (i64, i64, i64, i64) = sqlx::query_as(
            "SELECT
                COUNT(*),
                COALESCE(SUM(status = 'completed'), 0),
                COALESCE(SUM(status = 'failed'), 0),
                COALESCE(SUM(processed_lines), 0)
             FROM uploads
             WHERE deleted_at IS NULL",
        )
        .fetch_one(pool)
        .await?;

        let success_rate = if total > 0 {
            (completed as f64 / total as f64 * 10_000.0).round() / 100.0
        } else {
            0.0
        };

        Ok(UploadStats {
            total_uploads: total,
            completed,
            failed,
            success_rate,
            total_lines_processed: total_lines,
        })
    }

    /// Read-only precondition check: would a soft delete succeed right now?
    ///
    /// Lets the HTTP layer reject a doomed rollback before any event
    /// stream is opened.
    pub async fn check_deletable(pool: &DbPool, id: DbId) -> Result<(), SoftDeleteError> {
        let upload = Self::find_by_id(pool, id).await?;
        validate_deletable(id, upload.as_ref())
    }

    /// Soft-delete an upload, returning the ids of every constituency it
    /// ever touched (the rollback engine's work list).
    ///
    /// The precondition re-check, the `deleted_at` flip, and the affected
    /// set are one transaction, so two racing deletes cannot both succeed.
    pub async fn soft_delete(pool: &DbPool, id: DbId) -> Result<Vec<DbId>, SoftDeleteError> {
        let mut tx = pool.begin().await.map_err(SoftDeleteError::Db)?;

        let query = format!("SELECT {COLUMNS} FROM uploads WHERE id = ?");
        let upload = sqlx::query_as::<_, Upload>(&query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        validate_deletable(id, upload.as_ref())?;

        let affected: Vec<DbId> = sqlx::query_scalar(
            "SELECT DISTINCT constituency_id FROM result_versions
             WHERE upload_id = ?
             ORDER BY constituency_id ASC",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query("UPDATE uploads SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await.map_err(SoftDeleteError::Db)?;
        Ok(affected)
    }
}

fn validate_deletable(id: DbId, upload: Option<&Upload>) -> Result<(), SoftDeleteError> {
    match upload {
        None => Err(SoftDeleteError::NotFound(id)),
        Some(u) if u.deleted_at.is_some() => Err(SoftDeleteError::AlreadyDeleted(id)),
        Some(u) if u.status == UploadStatus::Processing => {
            Err(SoftDeleteError::StillProcessing(id))
        }
        Some(_) => Ok(()),
    }
}

/// Append `WHERE`/`AND` clauses for the optional status and filename
/// filters, in bind order.
fn append_filters(query: &mut String, status: Option<UploadStatus>, search: Option<&str>) {
    let mut clauses: Vec<&str> = Vec::new();
    if status.is_some() {
        clauses.push("status = ?");
    }
    if search.is_some() {
        clauses.push("filename LIKE ?");
    }
    if !clauses.is_empty() {
        query.push_str(" WHERE ");
        query.push_str(&clauses.join(" AND "));
    }
}
