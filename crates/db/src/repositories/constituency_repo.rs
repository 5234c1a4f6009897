//! Repository for the `constituencies` reference table.

use chrono::Utc;
use tally_core::normalize::normalize_name;
use tally_core::search::{clamp_limit, clamp_offset, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
use tally_core::types::DbId;

use crate::models::constituency::{Constituency, ConstituencyCurrentRow, CreateConstituency};
use crate::DbPool;

/// Column list for constituencies queries.
const COLUMNS: &str =
    "id, name, normalized_name, gss_code, region, current_version_id, created_at, updated_at";

/// Columns of a constituency joined with its current result version.
const CURRENT_COLUMNS: &str = "c.id, c.name, c.gss_code, c.region, \
    rv.party_votes, rv.total_votes, rv.winning_party_code";

/// Provides reads over reference data plus creation for the seeder.
pub struct ConstituencyRepo;

impl ConstituencyRepo {
    /// Insert a constituency, deriving its normalized lookup key.
    pub async fn create(
        pool: &DbPool,
        input: &CreateConstituency,
    ) -> Result<Constituency, sqlx::Error> {
        let now = Utc::now();
        let query = format!(
            "INSERT INTO constituencies
                (name, normalized_name, gss_code, region, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Constituency>(&query)
            .bind(&input.name)
            .bind(normalize_name(&input.name))
            .bind(&input.gss_code)
            .bind(&input.region)
            .bind(now)
            .bind(now)
            .fetch_one(pool)
            .await
    }

    /// Find a constituency by ID.
    pub async fn find_by_id(pool: &DbPool, id: DbId) -> Result<Option<Constituency>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM constituencies WHERE id = ?");
        sqlx::query_as::<_, Constituency>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All constituencies, ordered by name. Used to build the matcher table.
    pub async fn list_all(pool: &DbPool) -> Result<Vec<Constituency>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM constituencies ORDER BY name ASC");
        sqlx::query_as::<_, Constituency>(&query).fetch_all(pool).await
    }

    /// Total number of constituencies.
    pub async fn count(pool: &DbPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM constituencies")
            .fetch_one(pool)
            .await
    }

    /// Number of constituencies matching an optional name search.
    pub async fn count_filtered(pool: &DbPool, search: Option<&str>) -> Result<i64, sqlx::Error> {
        match search {
            Some(term) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM constituencies WHERE name LIKE ?")
                    .bind(format!("%{term}%"))
                    .fetch_one(pool)
                    .await
            }
            None => Self::count(pool).await,
        }
    }

    /// Paginated list joined with each constituency's current version.
    ///
    /// `sort_by`: `name` (default), `total_votes`, or `winning_party`;
    /// `sort_dir`: `asc` (default) or `desc`. Limit/offset are clamped.
    pub async fn list_with_current(
        pool: &DbPool,
        search: Option<&str>,
        sort_by: Option<&str>,
        sort_dir: Option<&str>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ConstituencyCurrentRow>, sqlx::Error> {
        let limit = clamp_limit(limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT);
        let offset = clamp_offset(offset);
        let order = sort_clause(sort_by, sort_dir);

        let filter = if search.is_some() {
            "WHERE c.name LIKE ?"
        } else {
            ""
        };
        let query = format!(
            "SELECT {CURRENT_COLUMNS}
             FROM constituencies c
             LEFT JOIN result_versions rv ON rv.id = c.current_version_id
             {filter}
             ORDER BY {order}
             LIMIT ? OFFSET ?"
        );

        let mut q = sqlx::query_as::<_, ConstituencyCurrentRow>(&query);
        if let Some(term) = search {
            q = q.bind(format!("%{term}%"));
        }
        q.bind(limit).bind(offset).fetch_all(pool).await
    }

    /// Every constituency with its current winner, ordered by name.
    pub async fn summary(pool: &DbPool) -> Result<Vec<ConstituencyCurrentRow>, sqlx::Error> {
        let query = format!(
            "SELECT {CURRENT_COLUMNS}
             FROM constituencies c
             LEFT JOIN result_versions rv ON rv.id = c.current_version_id
             ORDER BY c.name ASC"
        );
        sqlx::query_as::<_, ConstituencyCurrentRow>(&query)
            .fetch_all(pool)
            .await
    }

    /// One constituency joined with its current version.
    pub async fn find_with_current(
        pool: &DbPool,
        id: DbId,
    ) -> Result<Option<ConstituencyCurrentRow>, sqlx::Error> {
        let query = format!(
            "SELECT {CURRENT_COLUMNS}
             FROM constituencies c
             LEFT JOIN result_versions rv ON rv.id = c.current_version_id
             WHERE c.id = ?"
        );
        sqlx::query_as::<_, ConstituencyCurrentRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}

/// Build an ORDER BY clause for the given sort field and direction.
fn sort_clause(sort_by: Option<&str>, sort_dir: Option<&str>) -> String {
    let dir = match sort_dir {
        Some("desc") => "DESC",
        _ => "ASC",
    };
    match sort_by {
        Some("total_votes") => format!("COALESCE(rv.total_votes, 0) {dir}, c.name ASC"),
        Some("winning_party") => format!("rv.winning_party_code {dir}, c.name ASC"),
        _ => format!("c.name {dir}"),
    }
}
