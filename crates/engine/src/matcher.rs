//! Free-text constituency name resolution.
//!
//! Reference data is immutable for the life of a job, so the matcher is a
//! table loaded once per job rather than a per-line query. Lookup is exact
//! match on the normalized key — no fuzzy matching; a miss is the
//! operator's signal that the input file names an unknown constituency.

use std::collections::HashMap;

use tally_core::normalize::normalize_name;
use tally_core::types::DbId;
use tally_db::models::Constituency;
use tally_db::repositories::ConstituencyRepo;
use tally_db::DbPool;

pub struct Matcher {
    by_normalized: HashMap<String, DbId>,
}

impl Matcher {
    /// Load the full constituency table.
    pub async fn load(pool: &DbPool) -> Result<Self, sqlx::Error> {
        let rows = ConstituencyRepo::list_all(pool).await?;
        Ok(Self::from_constituencies(&rows))
    }

    pub fn from_constituencies(rows: &[Constituency]) -> Self {
        let by_normalized = rows
            .iter()
            .map(|c| (c.normalized_name.clone(), c.id))
            .collect();
        Self { by_normalized }
    }

    /// Resolve a free-text name to a constituency id, normalizing the
    /// input the same way the reference data was normalized.
    pub fn resolve(&self, name: &str) -> Option<DbId> {
        self.by_normalized.get(&normalize_name(name)).copied()
    }

    pub fn len(&self) -> usize {
        self.by_normalized.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_normalized.is_empty()
    }
}
