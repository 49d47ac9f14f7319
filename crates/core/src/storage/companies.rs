use crate::domain::company::Company;
use anyhow::Context;
use chrono::{DateTime, Utc};

type CompanyRow = (
    i64,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<DateTime<Utc>>,
);

fn company_from_row(row: CompanyRow) -> Company {
    let (id, ticker, name, sector, industry, last_checked_at) = row;
    Company {
        id,
        ticker,
        name,
        sector,
        industry,
        last_checked_at,
    }
}

pub async fn next_batch(pool: &sqlx::PgPool, limit: usize) -> anyhow::Result<Vec<Company>> {
    anyhow::ensure!(limit >= 1, "batch limit must be >= 1");

    let rows = sqlx::query_as::<_, CompanyRow>(
        "SELECT id, ticker, name, sector, industry, last_checked_at \
         FROM companies \
         WHERE is_tracked \
         ORDER BY last_checked_at ASC NULLS FIRST, id ASC \
         LIMIT $1",
    )
    .persistent(false)
    .bind(limit as i64)
    .fetch_all(pool)
    .await
    .context("select next company batch failed")?;

    Ok(rows.into_iter().map(company_from_row).collect())
}

pub async fn find_by_ticker(pool: &sqlx::PgPool, ticker: &str) -> anyhow::Result<Option<Company>> {
    let row = sqlx::query_as::<_, CompanyRow>(
        "SELECT id, ticker, name, sector, industry, last_checked_at \
         FROM companies \
         WHERE upper(ticker) = upper($1) \
         LIMIT 1",
    )
    .bind(ticker.trim())
    .fetch_optional(pool)
    .await
    .with_context(|| format!("select company by ticker failed (ticker={ticker})"))?;

    Ok(row.map(company_from_row))
}

// GREATEST keeps the cursor monotonic even if the database clock steps backwards.
pub async fn touch_last_checked(pool: &sqlx::PgPool, company_id: i64) -> anyhow::Result<()> {
    let res = sqlx::query(
        "UPDATE companies \
         SET last_checked_at = GREATEST(COALESCE(last_checked_at, now()), now()) \
         WHERE id = $1",
    )
    .persistent(false)
    .bind(company_id)
    .execute(pool)
    .await
    .with_context(|| format!("update companies.last_checked_at failed (company_id={company_id})"))?;

    anyhow::ensure!(
        res.rows_affected() == 1,
        "company not found when advancing cursor (company_id={company_id})"
    );
    Ok(())
}
