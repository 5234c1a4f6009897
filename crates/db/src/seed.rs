//! Constituency reference-data loader.
//!
//! Reference data is owned outside the ledger core: this loader ingests a
//! simple CSV (`name,gss_code,region`, one constituency per line, `#`
//! comments allowed) and inserts any constituency not already present.
//! Presence is judged on the normalized name key, so re-running the
//! seeder is harmless.

use chrono::Utc;
use tally_core::normalize::normalize_name;

use crate::DbPool;

/// Load constituencies from CSV text. Returns the number inserted.
pub async fn seed_constituencies(pool: &DbPool, csv: &str) -> Result<usize, sqlx::Error> {
    let mut inserted = 0;

    for line in csv.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split(',').map(str::trim);
        let Some(name) = fields.next().filter(|n| !n.is_empty()) else {
            continue;
        };
        let gss_code = fields.next().filter(|f| !f.is_empty());
        let region = fields.next().filter(|f| !f.is_empty());

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT OR IGNORE INTO constituencies
                (name, normalized_name, gss_code, region, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(normalize_name(name))
        .bind(gss_code)
        .bind(region)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        inserted += result.rows_affected() as usize;
    }

    tracing::info!(inserted, "Seeded constituency reference data");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::ConstituencyRepo;

    async fn pool() -> DbPool {
        let pool = crate::create_memory_pool().await.expect("memory pool");
        crate::run_migrations(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn seeds_and_skips_comments_and_blanks() {
        let pool = pool().await;
        let csv = "# header comment\nBedford,E14001073,East of England\n\nOxford East,,South East\n";
        let inserted = seed_constituencies(&pool, csv).await.unwrap();
        assert_eq!(inserted, 2);

        let all = ConstituencyRepo::list_all(&pool).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "Bedford");
        assert_eq!(all[0].gss_code.as_deref(), Some("E14001073"));
        assert_eq!(all[1].region.as_deref(), Some("South East"));
    }

    #[tokio::test]
    async fn reseeding_is_idempotent() {
        let pool = pool().await;
        let csv = "Bedford\nYnys Môn";
        assert_eq!(seed_constituencies(&pool, csv).await.unwrap(), 2);
        // Same names (one differing only by case/diacritics) insert nothing.
        let again = "BEDFORD\nYnys Mon";
        assert_eq!(seed_constituencies(&pool, again).await.unwrap(), 0);
        assert_eq!(ConstituencyRepo::count(&pool).await.unwrap(), 2);
    }
}
