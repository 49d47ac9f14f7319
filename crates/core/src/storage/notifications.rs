use crate::notify::{Notification, NotificationSink};
use anyhow::Context;
use uuid::Uuid;

/// In-app delivery: one inbox row per recipient.
#[derive(Debug, Clone)]
pub struct PgNotificationSink {
    pool: sqlx::PgPool,
}

impl PgNotificationSink {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl NotificationSink for PgNotificationSink {
    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
        insert_notification(&self.pool, notification).await?;
        Ok(())
    }
}

pub async fn insert_notification(
    pool: &sqlx::PgPool,
    notification: &Notification,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO notifications (id, user_id, company_id, report_id, tier, title, body, link, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())",
    )
    .persistent(false)
    .bind(id)
    .bind(notification.user_id)
    .bind(notification.company_id)
    .bind(notification.report_id)
    .bind(notification.tier.as_str())
    .bind(&notification.content.title)
    .bind(&notification.content.body)
    .bind(&notification.content.link)
    .execute(pool)
    .await
    .with_context(|| {
        format!(
            "insert notifications failed (user_id={}, company_id={})",
            notification.user_id, notification.company_id
        )
    })?;

    Ok(id)
}
