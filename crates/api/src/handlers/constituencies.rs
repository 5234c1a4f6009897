//! Constituency read handlers: paginated list, map summary, and detail.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tally_core::error::CoreError;
use tally_core::party::party_name;
use tally_core::search::{clamp_limit, clamp_offset, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
use tally_core::types::DbId;
use tally_db::models::ConstituencyCurrentRow;
use tally_db::repositories::ConstituencyRepo;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Query parameter structs
// ---------------------------------------------------------------------------

/// Query parameters for listing constituencies.
#[derive(Debug, Deserialize)]
pub struct ListConstituenciesParams {
    pub search: Option<String>,
    /// `name` (default), `total_votes`, or `winning_party`.
    pub sort_by: Option<String>,
    /// `asc` (default) or `desc`.
    pub sort_dir: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// One constituency with its current headline result.
#[derive(Debug, Serialize)]
pub struct ConstituencySummary {
    pub id: DbId,
    pub name: String,
    pub gss_code: Option<String>,
    pub region: Option<String>,
    pub total_votes: i64,
    pub winning_party_code: Option<String>,
    pub winning_party_name: Option<String>,
}

/// Paginated constituency list.
#[derive(Debug, Serialize)]
pub struct ConstituencyListResponse {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub constituencies: Vec<ConstituencySummary>,
}

/// Full summary payload (map shading): every constituency, by name.
#[derive(Debug, Serialize)]
pub struct ConstituencySummaryResponse {
    pub total: i64,
    pub constituencies: Vec<ConstituencySummary>,
}

/// One party's share of a constituency's current result.
#[derive(Debug, Serialize)]
pub struct PartyResult {
    pub party_code: String,
    pub party_name: String,
    pub votes: i64,
    /// Share of the constituency total, rounded to two decimals.
    pub percentage: f64,
}

/// Full current detail for one constituency.
#[derive(Debug, Serialize)]
pub struct ConstituencyDetail {
    pub id: DbId,
    pub name: String,
    pub gss_code: Option<String>,
    pub region: Option<String>,
    pub total_votes: i64,
    pub winning_party_code: Option<String>,
    pub winning_party_name: Option<String>,
    pub parties: Vec<PartyResult>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/constituencies
///
/// Paginated list with current winner and total, searchable by name and
/// sortable by name, total votes, or winning party.
pub async fn list_constituencies(
    State(state): State<AppState>,
    Query(params): Query<ListConstituenciesParams>,
) -> AppResult<Json<ConstituencyListResponse>> {
    let limit = clamp_limit(params.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT);
    let offset = clamp_offset(params.offset);
    let search = params.search.as_deref();

    let rows = ConstituencyRepo::list_with_current(
        &state.pool,
        search,
        params.sort_by.as_deref(),
        params.sort_dir.as_deref(),
        Some(limit),
        Some(offset),
    )
    .await?;
    let total = ConstituencyRepo::count_filtered(&state.pool, search).await?;

    Ok(Json(ConstituencyListResponse {
        total,
        limit,
        offset,
        constituencies: rows.into_iter().map(summarize).collect(),
    }))
}

/// GET /api/constituencies/summary
///
/// Every constituency with its current winner, ordered by name.
pub async fn constituencies_summary(
    State(state): State<AppState>,
) -> AppResult<Json<ConstituencySummaryResponse>> {
    let rows = ConstituencyRepo::summary(&state.pool).await?;
    let constituencies: Vec<ConstituencySummary> = rows.into_iter().map(summarize).collect();

    Ok(Json(ConstituencySummaryResponse {
        total: constituencies.len() as i64,
        constituencies,
    }))
}

/// GET /api/constituencies/{id}
///
/// Current detail for one constituency: per-party votes with percentages
/// and the winner, or an explicit empty result if no upload survives.
pub async fn get_constituency(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<ConstituencyDetail>> {
    let row = ConstituencyRepo::find_with_current(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Constituency",
            id,
        }))?;

    Ok(Json(detail(row)))
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

fn summarize(row: ConstituencyCurrentRow) -> ConstituencySummary {
    let winning_party_name = row
        .winning_party_code
        .as_deref()
        .map(|code| party_name(code).to_string());
    ConstituencySummary {
        id: row.id,
        name: row.name,
        gss_code: row.gss_code,
        region: row.region,
        total_votes: row.total_votes.unwrap_or(0),
        winning_party_code: row.winning_party_code,
        winning_party_name,
    }
}

fn detail(row: ConstituencyCurrentRow) -> ConstituencyDetail {
    let total_votes = row.total_votes.unwrap_or(0);

    let mut parties: Vec<PartyResult> = row
        .party_votes
        .as_ref()
        .map(|votes| {
            votes
                .0
                .iter()
                .map(|(code, count)| PartyResult {
                    party_code: code.clone(),
                    party_name: party_name(code).to_string(),
                    votes: *count,
                    percentage: share(*count, total_votes),
                })
                .collect()
        })
        .unwrap_or_default();
    // Largest share first; ties broken by code for a stable order.
    parties.sort_by(|a, b| b.votes.cmp(&a.votes).then(a.party_code.cmp(&b.party_code)));

    let winning_party_name = row
        .winning_party_code
        .as_deref()
        .map(|code| party_name(code).to_string());

    ConstituencyDetail {
        id: row.id,
        name: row.name,
        gss_code: row.gss_code,
        region: row.region,
        total_votes,
        winning_party_code: row.winning_party_code,
        winning_party_name,
        parties,
    }
}

/// Percentage of `votes` in `total`, rounded to two decimals.
fn share(votes: i64, total: i64) -> f64 {
    if total <= 0 {
        0.0
    } else {
        (votes as f64 / total as f64 * 10_000.0).round() / 100.0
    }
}
