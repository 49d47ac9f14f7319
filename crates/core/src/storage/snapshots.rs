use crate::domain::snapshot::{json_to_breakdown, NewSnapshot, Snapshot};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

type SnapshotRow = (
    Uuid,
    i64,
    String,
    String,
    Option<String>,
    Option<f64>,
    f64,
    Value,
    Value,
    Option<Value>,
    Option<f64>,
    DateTime<Utc>,
);

fn snapshot_from_row(row: SnapshotRow) -> Snapshot {
    let (
        id,
        company_id,
        ticker,
        name,
        sector,
        current_price,
        overall_score,
        breakdown,
        strategies,
        latest_statement,
        sentiment_score,
        captured_at,
    ) = row;

    Snapshot {
        id,
        company_id,
        ticker,
        name,
        sector,
        current_price,
        overall_score,
        breakdown: json_to_breakdown(breakdown),
        strategies,
        latest_statement,
        sentiment_score,
        captured_at,
    }
}

// "Latest" is insertion order via seq. captured_at is wall-clock and may step backwards.
const LATEST_SNAPSHOT_SQL: &str = "SELECT id, company_id, ticker, name, sector, current_price, \
            overall_score, breakdown, strategies, latest_statement, sentiment_score, captured_at \
     FROM company_snapshots \
     WHERE company_id = $1 \
     ORDER BY seq DESC \
     LIMIT 1";

pub async fn latest_for_company(
    pool: &sqlx::PgPool,
    company_id: i64,
) -> anyhow::Result<Option<Snapshot>> {
    let row = sqlx::query_as::<_, SnapshotRow>(LATEST_SNAPSHOT_SQL)
    .persistent(false)
    .bind(company_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("select latest company_snapshots failed (company_id={company_id})"))?;

    Ok(row.map(snapshot_from_row))
}

pub async fn insert_snapshot(
    pool: &sqlx::PgPool,
    company_id: i64,
    snapshot: &NewSnapshot,
) -> anyhow::Result<Snapshot> {
    anyhow::ensure!(
        snapshot.overall_score.is_finite(),
        "overall_score must be finite (ticker={})",
        snapshot.ticker
    );

    let id = Uuid::new_v4();
    let breakdown =
        serde_json::to_value(&snapshot.breakdown).context("serialize snapshot breakdown failed")?;

    let captured_at: DateTime<Utc> = sqlx::query_scalar(
        "INSERT INTO company_snapshots \
           (id, company_id, ticker, name, sector, current_price, overall_score, \
            breakdown, strategies, latest_statement, sentiment_score, captured_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, now()) \
         RETURNING captured_at",
    )
    .persistent(false)
    .bind(id)
    .bind(company_id)
    .bind(&snapshot.ticker)
    .bind(&snapshot.name)
    .bind(&snapshot.sector)
    .bind(snapshot.current_price)
    .bind(snapshot.overall_score)
    .bind(breakdown)
    .bind(&snapshot.strategies)
    .bind(&snapshot.latest_statement)
    .bind(snapshot.sentiment_score)
    .fetch_one(pool)
    .await
    .with_context(|| format!("insert company_snapshots failed (ticker={})", snapshot.ticker))?;

    Ok(snapshot.clone().into_snapshot(id, company_id, captured_at))
}
