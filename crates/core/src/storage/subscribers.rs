use crate::domain::subscriber::Subscriber;
use anyhow::Context;
use uuid::Uuid;

pub async fn subscribers_for_company(
    pool: &sqlx::PgPool,
    company_id: i64,
) -> anyhow::Result<Vec<Subscriber>> {
    let rows = sqlx::query_as::<_, (Uuid, String, Option<String>, bool)>(
        "SELECT u.id, u.email, u.name, u.is_premium \
         FROM watchlist_items w \
         JOIN users u ON u.id = w.user_id \
         WHERE w.company_id = $1 \
         ORDER BY w.created_at ASC, u.id ASC",
    )
    .persistent(false)
    .bind(company_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("select subscribers failed (company_id={company_id})"))?;

    Ok(rows
        .into_iter()
        .map(|(user_id, email, name, is_premium_tier)| Subscriber {
            user_id,
            email,
            name,
            is_premium_tier,
        })
        .collect())
}

pub async fn has_subscribers(pool: &sqlx::PgPool, company_id: i64) -> anyhow::Result<bool> {
    let exists: (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM watchlist_items WHERE company_id = $1)",
    )
    .persistent(false)
    .bind(company_id)
    .fetch_one(pool)
    .await
    .with_context(|| format!("subscriber existence check failed (company_id={company_id})"))?;

    Ok(exists.0)
}
