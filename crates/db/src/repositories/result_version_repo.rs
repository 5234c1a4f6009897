//! The results ledger: append-only `(constituency, upload)` -> tally
//! versions, plus the maintained current-version pointer.
//!
//! "Current" for a constituency is defined as the version belonging to the
//! non-deleted upload with the greatest id, or nothing. The pointer column
//! `constituencies.current_version_id` materializes exactly that
//! derivation and is only ever updated inside a transaction together with
//! the write that could change it.

use std::collections::BTreeMap;

use chrono::Utc;
use sqlx::types::Json;
use sqlx::{Sqlite, Transaction};
use tally_core::tally;
use tally_core::types::DbId;

use crate::models::result_version::ResultVersion;
use crate::DbPool;

/// Column list for result_versions queries.
const COLUMNS: &str =
    "id, constituency_id, upload_id, party_votes, total_votes, winning_party_code, created_at";

/// Column list qualified for joined queries.
const QUALIFIED_COLUMNS: &str = "rv.id, rv.constituency_id, rv.upload_id, rv.party_votes, \
    rv.total_votes, rv.winning_party_code, rv.created_at";

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// A version already exists for this (constituency, upload) pair — the
    /// file listed the same constituency twice.
    #[error("A result version already exists for constituency {constituency_id} in upload {upload_id}")]
    Conflict {
        constituency_id: DbId,
        upload_id: DbId,
    },

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// The Ledger Store. Exclusive owner of `result_versions` rows and of the
/// `current_version_id` pointer.
pub struct ResultVersionRepo;

impl ResultVersionRepo {
    /// Append one constituency's tally for one upload.
    ///
    /// Computes the total and winner, inserts the immutable version row,
    /// and repoints the constituency's current version — all in one
    /// transaction. Fails with [`LedgerError::Conflict`] if a version
    /// already exists for the pair.
    pub async fn append_version(
        pool: &DbPool,
        constituency_id: DbId,
        upload_id: DbId,
        party_votes: &BTreeMap<String, i64>,
    ) -> Result<ResultVersion, LedgerError> {
        let total_votes = tally::total_votes(party_votes);
        let winning_party = tally::winning_party(party_votes);

        let mut tx = pool.begin().await.map_err(LedgerError::Db)?;

        let query = format!(
            "INSERT INTO result_versions
                (constituency_id, upload_id, party_votes, total_votes,
                 winning_party_code, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING {COLUMNS}"
        );
        let version = sqlx::query_as::<_, ResultVersion>(&query)
            .bind(constituency_id)
            .bind(upload_id)
            .bind(Json(party_votes))
            .bind(total_votes)
            .bind(&winning_party)
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| classify_insert_error(e, constituency_id, upload_id))?;

        repoint_current(&mut tx, constituency_id).await?;
        tx.commit().await.map_err(LedgerError::Db)?;
        Ok(version)
    }

    /// The current version for a constituency, or None if no surviving
    /// upload touches it. Pointer read; kept consistent transactionally.
    pub async fn current_version(
        pool: &DbPool,
        constituency_id: DbId,
    ) -> Result<Option<ResultVersion>, sqlx::Error> {
        let query = format!(
            "SELECT {QUALIFIED_COLUMNS}
             FROM result_versions rv
             JOIN constituencies c ON c.current_version_id = rv.id
             WHERE c.id = ?"
        );
        sqlx::query_as::<_, ResultVersion>(&query)
            .bind(constituency_id)
            .fetch_optional(pool)
            .await
    }

    /// Ids of every constituency for which this upload holds a version,
    /// deleted or not, in ascending order.
    pub async fn versions_touched_by(
        pool: &DbPool,
        upload_id: DbId,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT DISTINCT constituency_id FROM result_versions
             WHERE upload_id = ?
             ORDER BY constituency_id ASC",
        )
        .bind(upload_id)
        .fetch_all(pool)
        .await
    }

    /// All of a constituency's versions whose upload is not deleted,
    /// most recent upload first.
    pub async fn surviving_versions_for(
        pool: &DbPool,
        constituency_id: DbId,
    ) -> Result<Vec<ResultVersion>, sqlx::Error> {
        let query = format!(
            "SELECT {QUALIFIED_COLUMNS}
             FROM result_versions rv
             JOIN uploads u ON u.id = rv.upload_id
             WHERE rv.constituency_id = ? AND u.deleted_at IS NULL
             ORDER BY rv.upload_id DESC"
        );
        sqlx::query_as::<_, ResultVersion>(&query)
            .bind(constituency_id)
            .fetch_all(pool)
            .await
    }

    /// Re-derive and store the current pointer for one constituency,
    /// returning the new current version. Atomic: a reader sees either the
    /// old pointer or the new one, never an intermediate state.
    pub async fn recompute_current(
        pool: &DbPool,
        constituency_id: DbId,
    ) -> Result<Option<ResultVersion>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        repoint_current(&mut tx, constituency_id).await?;

        let query = format!(
            "SELECT {QUALIFIED_COLUMNS}
             FROM result_versions rv
             JOIN constituencies c ON c.current_version_id = rv.id
             WHERE c.id = ?"
        );
        let current = sqlx::query_as::<_, ResultVersion>(&query)
            .bind(constituency_id)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(current)
    }

    /// Every constituency's current version (constituencies with no
    /// surviving result are absent). Input to the national totals.
    pub async fn current_versions(pool: &DbPool) -> Result<Vec<ResultVersion>, sqlx::Error> {
        let query = format!(
            "SELECT {QUALIFIED_COLUMNS}
             FROM result_versions rv
             JOIN constituencies c ON c.current_version_id = rv.id
             ORDER BY rv.constituency_id ASC"
        );
        sqlx::query_as::<_, ResultVersion>(&query).fetch_all(pool).await
    }
}

/// Point `current_version_id` at the version of the greatest surviving
/// upload id, or NULL. Selecting the maximum (rather than assuming the
/// newest write wins) keeps the pointer correct when concurrent uploads
/// append out of id order.
async fn repoint_current(
    tx: &mut Transaction<'_, Sqlite>,
    constituency_id: DbId,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE constituencies SET
            current_version_id = (
                SELECT rv.id FROM result_versions rv
                JOIN uploads u ON u.id = rv.upload_id
                WHERE rv.constituency_id = ?1 AND u.deleted_at IS NULL
                ORDER BY rv.upload_id DESC
                LIMIT 1
            ),
            updated_at = ?2
         WHERE id = ?1",
    )
    .bind(constituency_id)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await
    .map(|_| ())
}

fn classify_insert_error(err: sqlx::Error, constituency_id: DbId, upload_id: DbId) -> LedgerError {
    if let sqlx::Error::Database(db_err) = &err {
        if matches!(db_err.kind(), sqlx::error::ErrorKind::UniqueViolation) {
            return LedgerError::Conflict {
                constituency_id,
                upload_id,
            };
        }
    }
    LedgerError::Db(err)
}
