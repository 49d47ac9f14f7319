pub mod companies;
pub mod lock;
pub mod notifications;
pub mod reports;
pub mod snapshots;
pub mod subscribers;

use crate::domain::company::Company;
use crate::domain::report::{ChangeReport, NewChangeReport};
use crate::domain::snapshot::{NewSnapshot, Snapshot};
use crate::domain::subscriber::Subscriber;
use anyhow::Context;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Append-only snapshot history plus the per-company selection cursor.
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get_latest_snapshot(&self, company_id: i64) -> anyhow::Result<Option<Snapshot>>;

    async fn create_snapshot(
        &self,
        company_id: i64,
        snapshot: &NewSnapshot,
    ) -> anyhow::Result<Snapshot>;

    async fn create_report(&self, report: &NewChangeReport) -> anyhow::Result<ChangeReport>;

    async fn update_last_checked(&self, company_id: i64) -> anyhow::Result<()>;

    /// Oldest-checked first; never-checked companies sort before everything else.
    async fn get_next_batch_to_process(&self, limit: usize) -> anyhow::Result<Vec<Company>>;
}

#[async_trait::async_trait]
pub trait SubscriberDirectory: Send + Sync {
    async fn get_subscribers_for_company(&self, company_id: i64)
        -> anyhow::Result<Vec<Subscriber>>;

    async fn has_subscribers(&self, company_id: i64) -> anyhow::Result<bool>;
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: sqlx::PgPool,
}

impl PgStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SnapshotStore for PgStore {
    async fn get_latest_snapshot(&self, company_id: i64) -> anyhow::Result<Option<Snapshot>> {
        snapshots::latest_for_company(&self.pool, company_id).await
    }

    async fn create_snapshot(
        &self,
        company_id: i64,
        snapshot: &NewSnapshot,
    ) -> anyhow::Result<Snapshot> {
        snapshots::insert_snapshot(&self.pool, company_id, snapshot).await
    }

    async fn create_report(&self, report: &NewChangeReport) -> anyhow::Result<ChangeReport> {
        reports::insert_report(&self.pool, report).await
    }

    async fn update_last_checked(&self, company_id: i64) -> anyhow::Result<()> {
        companies::touch_last_checked(&self.pool, company_id).await
    }

    async fn get_next_batch_to_process(&self, limit: usize) -> anyhow::Result<Vec<Company>> {
        companies::next_batch(&self.pool, limit).await
    }
}

#[async_trait::async_trait]
impl SubscriberDirectory for PgStore {
    async fn get_subscribers_for_company(
        &self,
        company_id: i64,
    ) -> anyhow::Result<Vec<Subscriber>> {
        subscribers::subscribers_for_company(&self.pool, company_id).await
    }

    async fn has_subscribers(&self, company_id: i64) -> anyhow::Result<bool> {
        subscribers::has_subscribers(&self.pool, company_id).await
    }
}
