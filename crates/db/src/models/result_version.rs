//! Ledger entry model.

use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;
use tally_core::types::{DbId, Timestamp};

/// A row from the `result_versions` ledger: one constituency's vote tally
/// as contributed by one specific upload. Immutable once inserted; its
/// recency is its owning upload's id.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ResultVersion {
    pub id: DbId,
    pub constituency_id: DbId,
    pub upload_id: DbId,
    /// party code -> votes; each code appears at most once.
    pub party_votes: Json<BTreeMap<String, i64>>,
    pub total_votes: i64,
    /// Party with strictly the greatest votes; NULL on a first-place tie.
    pub winning_party_code: Option<String>,
    pub created_at: Timestamp,
}
