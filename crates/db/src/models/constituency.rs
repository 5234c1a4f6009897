//! Constituency reference-data model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use tally_core::types::{DbId, Timestamp};

/// A row from the `constituencies` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Constituency {
    pub id: DbId,
    pub name: String,
    pub normalized_name: String,
    pub gss_code: Option<String>,
    pub region: Option<String>,
    /// Pointer to the result version of the most recent non-deleted upload
    /// touching this constituency, or NULL if none survives.
    pub current_version_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a constituency. The normalized key is derived by the
/// repository, not supplied by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateConstituency {
    pub name: String,
    pub gss_code: Option<String>,
    pub region: Option<String>,
}

/// A constituency joined with its current result version (if any).
/// Backing row for list, summary, and detail reads.
#[derive(Debug, Clone, FromRow)]
pub struct ConstituencyCurrentRow {
    pub id: DbId,
    pub name: String,
    pub gss_code: Option<String>,
    pub region: Option<String>,
    pub party_votes: Option<Json<BTreeMap<String, i64>>>,
    pub total_votes: Option<i64>,
    pub winning_party_code: Option<String>,
}
