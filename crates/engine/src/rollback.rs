//! The rollback engine.
//!
//! Deleting an upload is a soft delete plus a recomputation: the
//! `deleted_at` flip makes the upload's versions invisible to the recency
//! rule, then every constituency the upload ever touched is repointed at
//! its surviving version with the greatest upload id (or emptied). No
//! ledger row is destroyed, so the final state depends only on which
//! uploads survive — never on deletion order.

use tally_core::types::DbId;
use tally_db::repositories::{ResultVersionRepo, SoftDeleteError, UploadRepo};
use tally_db::DbPool;

use crate::events::{percentage, RollbackEvent, RollbackEventSender};

#[derive(Debug, thiserror::Error)]
pub enum RollbackError {
    #[error("Upload {0} not found")]
    NotFound(DbId),

    #[error("Upload {0} is already deleted")]
    AlreadyDeleted(DbId),

    #[error("Upload {0} is still processing and cannot be deleted")]
    InvalidState(DbId),

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl From<SoftDeleteError> for RollbackError {
    fn from(err: SoftDeleteError) -> Self {
        match err {
            SoftDeleteError::NotFound(id) => RollbackError::NotFound(id),
            SoftDeleteError::AlreadyDeleted(id) => RollbackError::AlreadyDeleted(id),
            SoftDeleteError::StillProcessing(id) => RollbackError::InvalidState(id),
            SoftDeleteError::Db(e) => RollbackError::Db(e),
        }
    }
}

/// A validated rollback, ready to run.
#[derive(Debug)]
pub struct Rollback {
    upload_id: DbId,
}

/// Final counts for one rollback, mirrored in the `complete` event.
#[derive(Debug, Clone)]
pub struct RollbackOutcome {
    pub upload_id: DbId,
    pub rolled_back: i64,
}

/// Check the preconditions without mutating anything.
///
/// Lets the HTTP layer answer 404/409 before an event stream is opened;
/// the preconditions are re-checked inside the deleting transaction when
/// the job actually runs.
pub async fn begin(pool: &DbPool, upload_id: DbId) -> Result<Rollback, RollbackError> {
    UploadRepo::check_deletable(pool, upload_id).await?;
    Ok(Rollback { upload_id })
}

impl Rollback {
    pub fn upload_id(&self) -> DbId {
        self.upload_id
    }

    /// Soft-delete the upload and recompute every touched constituency,
    /// streaming events into `events`.
    pub async fn run(
        self,
        pool: &DbPool,
        batch_size: usize,
        events: &RollbackEventSender,
    ) -> Result<RollbackOutcome, RollbackError> {
        let upload_id = self.upload_id;

        // Flip the flag and collect the work list in one transaction. The
        // preconditions are re-checked there: a concurrent delete between
        // begin() and run() loses this race cleanly.
        let affected = match UploadRepo::soft_delete(pool, upload_id).await {
            Ok(affected) => affected,
            Err(e) => {
                let err = RollbackError::from(e);
                let _ = events.send(RollbackEvent::Error {
                    upload_id,
                    detail: err.to_string(),
                });
                return Err(err);
            }
        };

        let total = affected.len() as i64;
        tracing::info!(upload_id, affected = total, "Rollback started");
        let _ = events.send(RollbackEvent::Started {
            upload_id,
            total_affected: total,
        });

        let mut processed: i64 = 0;
        for constituency_id in affected {
            // Each recompute is its own transaction: a constituency is
            // always either fully repointed or untouched.
            if let Err(e) = ResultVersionRepo::recompute_current(pool, constituency_id).await {
                tracing::error!(upload_id, constituency_id, error = %e, "Rollback aborted");
                let _ = events.send(RollbackEvent::Error {
                    upload_id,
                    detail: "Delete failed due to a database error".to_string(),
                });
                return Err(e.into());
            }

            processed += 1;
            if batch_size > 0 && (processed % batch_size as i64 == 0 || processed == total) {
                let _ = events.send(RollbackEvent::Progress {
                    processed,
                    total,
                    percentage: percentage(processed, total),
                });
            }
        }

        tracing::info!(upload_id, rolled_back = processed, "Rollback completed");
        let _ = events.send(RollbackEvent::Complete {
            upload_id,
            message: "Upload deleted".to_string(),
            rolled_back: processed,
        });
        Ok(RollbackOutcome {
            upload_id,
            rolled_back: processed,
        })
    }
}
