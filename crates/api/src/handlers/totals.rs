//! National totals: per-party votes and seats over every constituency's
//! current result.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tally_core::party::party_name;
use tally_db::repositories::{ConstituencyRepo, ResultVersionRepo};

use crate::error::AppResult;
use crate::state::AppState;

/// One party's national aggregate.
#[derive(Debug, Serialize)]
pub struct PartyTotal {
    pub party_code: String,
    pub party_name: String,
    pub total_votes: i64,
    /// Constituencies where this party is the sole winner. A first-place
    /// tie awards no seat.
    pub seats: i64,
}

#[derive(Debug, Serialize)]
pub struct TotalsResponse {
    pub total_constituencies: i64,
    pub total_votes: i64,
    pub parties: Vec<PartyTotal>,
}

/// GET /api/totals
///
/// National aggregate over current results only: results from soft-deleted
/// uploads are excluded by construction.
pub async fn get_totals(State(state): State<AppState>) -> AppResult<Json<TotalsResponse>> {
    let versions = ResultVersionRepo::current_versions(&state.pool).await?;

    let mut votes_by_party: BTreeMap<String, i64> = BTreeMap::new();
    let mut seats_by_party: BTreeMap<String, i64> = BTreeMap::new();

    for version in &versions {
        for (code, votes) in version.party_votes.0.iter() {
            *votes_by_party.entry(code.clone()).or_default() += votes;
        }
        if let Some(winner) = &version.winning_party_code {
            *seats_by_party.entry(winner.clone()).or_default() += 1;
        }
    }

    let total_votes = votes_by_party.values().sum();

    let mut parties: Vec<PartyTotal> = votes_by_party
        .iter()
        .map(|(code, votes)| PartyTotal {
            party_code: code.clone(),
            party_name: party_name(code).to_string(),
            total_votes: *votes,
            seats: seats_by_party.get(code).copied().unwrap_or(0),
        })
        .collect();
    parties.sort_by(|a, b| {
        b.seats
            .cmp(&a.seats)
            .then(b.total_votes.cmp(&a.total_votes))
            .then(a.party_code.cmp(&b.party_code))
    });

    let total_constituencies = ConstituencyRepo::count(&state.pool).await?;

    Ok(Json(TotalsResponse {
        total_constituencies,
        total_votes,
        parties,
    }))
}
