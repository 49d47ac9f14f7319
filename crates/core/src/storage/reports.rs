use crate::domain::change::Direction;
use crate::domain::report::{ChangeReport, NewChangeReport};
use anyhow::Context;
use chrono::{DateTime, Utc};
use uuid::Uuid;

type ReportRow = (
    Uuid,
    i64,
    Uuid,
    String,
    f64,
    f64,
    String,
    String,
    String,
    String,
    DateTime<Utc>,
);

pub async fn insert_report(
    pool: &sqlx::PgPool,
    report: &NewChangeReport,
) -> anyhow::Result<ChangeReport> {
    let id = Uuid::new_v4();

    // The FK on snapshot_id enforces that the triggering snapshot was committed first.
    let created_at: DateTime<Utc> = sqlx::query_scalar(
        "INSERT INTO change_reports \
           (id, company_id, snapshot_id, ticker, previous_score, current_score, direction, \
            narrative, summary, provider, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now()) \
         RETURNING created_at",
    )
    .persistent(false)
    .bind(id)
    .bind(report.company_id)
    .bind(report.snapshot_id)
    .bind(&report.ticker)
    .bind(report.previous_score)
    .bind(report.current_score)
    .bind(report.direction.as_str())
    .bind(&report.narrative)
    .bind(&report.summary)
    .bind(&report.provider)
    .fetch_one(pool)
    .await
    .with_context(|| format!("insert change_reports failed (ticker={})", report.ticker))?;

    Ok(report.clone().into_report(id, created_at))
}

pub async fn recent_for_company(
    pool: &sqlx::PgPool,
    company_id: i64,
    limit: i64,
) -> anyhow::Result<Vec<ChangeReport>> {
    let rows = sqlx::query_as::<_, ReportRow>(
        "SELECT id, company_id, snapshot_id, ticker, previous_score, current_score, direction, \
                narrative, summary, provider, created_at \
         FROM change_reports \
         WHERE company_id = $1 \
         ORDER BY created_at DESC \
         LIMIT $2",
    )
    .bind(company_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .with_context(|| format!("select change_reports failed (company_id={company_id})"))?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(report_from_row(row)?);
    }
    Ok(out)
}

fn report_from_row(row: ReportRow) -> anyhow::Result<ChangeReport> {
    let (
        id,
        company_id,
        snapshot_id,
        ticker,
        previous_score,
        current_score,
        direction,
        narrative,
        summary,
        provider,
        created_at,
    ) = row;

    let direction = Direction::parse(&direction)
        .with_context(|| format!("invalid direction in DB for report_id={id}: {direction}"))?;

    Ok(ChangeReport {
        id,
        company_id,
        snapshot_id,
        ticker,
        previous_score,
        current_score,
        direction,
        narrative,
        summary,
        provider,
        created_at,
    })
}
