//! Upload model: one row per ingestion attempt.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use tally_core::ingest::LineError;
use tally_core::types::{DbId, Timestamp};

/// Upload lifecycle status. Transitions processing -> completed | failed
/// exactly once; there is no way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Processing,
    Completed,
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Processing => "processing",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
        }
    }
}

/// A row from the `uploads` table.
///
/// Append-only: rows are never physically removed. After completion the
/// only permitted mutation is setting `deleted_at` (soft delete), which
/// hides this upload's result versions from every "current" computation.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Upload {
    pub id: DbId,
    pub filename: String,
    pub status: UploadStatus,
    pub total_lines: i64,
    pub processed_lines: i64,
    pub error_lines: i64,
    pub errors: Json<Vec<LineError>>,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub deleted_at: Option<Timestamp>,
}

/// Aggregate statistics over non-deleted uploads.
#[derive(Debug, Clone, Serialize)]
pub struct UploadStats {
    pub total_uploads: i64,
    pub completed: i64,
    pub failed: i64,
    pub success_rate: f64,
    pub total_lines_processed: i64,
}
