pub mod classifier;
pub mod scheduler;
pub mod unit;

#[cfg(test)]
pub(crate) mod testing;

use crate::config::Settings;
use crate::llm::anthropic::AnthropicClient;
use crate::llm::ReportGenerator;
use crate::notify::NotificationSink;
use crate::score::http::HttpScoreProvider;
use crate::score::ScoreProvider;
use crate::storage::lock::PassLock;
use crate::storage::notifications::PgNotificationSink;
use crate::storage::{PgStore, SnapshotStore, SubscriberDirectory};
use std::sync::Arc;
use std::time::Duration;

pub use scheduler::{BatchScheduler, PassError, PassResult};
pub use unit::{Completion, CompanyProcessor, UnitResult, UnitStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorOptions {
    /// Upper bound on companies selected per pass.
    pub batch_size: usize,

    /// Units launched together in one group.
    pub concurrency: usize,

    /// Soft wall-clock budget, checked before each group starts.
    pub budget: Duration,

    /// Minimum absolute score delta (in points) that counts as a change.
    pub change_threshold: f64,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            batch_size: 20,
            concurrency: 5,
            budget: Duration::from_secs(45),
            change_threshold: 5.0,
        }
    }
}

impl MonitorOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Ok(s) = std::env::var("MONITOR_BATCH_SIZE") {
            if let Ok(n) = s.parse::<usize>() {
                out.batch_size = n;
            }
        }

        if let Ok(s) = std::env::var("MONITOR_CONCURRENCY") {
            if let Ok(n) = s.parse::<usize>() {
                out.concurrency = n;
            }
        }

        if let Ok(s) = std::env::var("MONITOR_BUDGET_SECS") {
            if let Ok(n) = s.parse::<u64>() {
                out.budget = Duration::from_secs(n);
            }
        }

        if let Ok(s) = std::env::var("MONITOR_CHANGE_THRESHOLD") {
            if let Ok(n) = s.parse::<f64>() {
                out.change_threshold = n;
            }
        }

        out
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.pass_params().validate()?;
        anyhow::ensure!(
            self.change_threshold.is_finite() && self.change_threshold >= 0.0,
            "change threshold must be a non-negative number (got {})",
            self.change_threshold
        );
        Ok(())
    }

    pub fn pass_params(&self) -> PassParams {
        PassParams {
            budget: self.budget,
            batch_size: self.batch_size,
            concurrency: self.concurrency,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassParams {
    pub budget: Duration,
    pub batch_size: usize,
    pub concurrency: usize,
}

impl PassParams {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.batch_size >= 1, "batch size must be >= 1");
        anyhow::ensure!(self.concurrency >= 1, "concurrency must be >= 1");
        Ok(())
    }
}

/// Collaborators injected into a scheduler. Every field is a trait object so tests can swap in
/// in-memory fakes.
#[derive(Clone)]
pub struct MonitorDeps {
    pub scores: Arc<dyn ScoreProvider>,
    pub reports: Arc<dyn ReportGenerator>,
    pub subscribers: Arc<dyn SubscriberDirectory>,
    pub store: Arc<dyn SnapshotStore>,
    pub notifications: Arc<dyn NotificationSink>,
}

impl MonitorDeps {
    pub fn postgres(pool: sqlx::PgPool, settings: &Settings) -> anyhow::Result<Self> {
        let store = Arc::new(PgStore::new(pool.clone()));
        Ok(Self {
            scores: Arc::new(HttpScoreProvider::from_settings(settings)?),
            reports: Arc::new(AnthropicClient::from_settings(settings)?),
            subscribers: store.clone(),
            store,
            notifications: Arc::new(PgNotificationSink::new(pool)),
        })
    }
}

/// Runs one pass while holding the cross-process pass lock. A pass that cannot take the lock
/// returns a skipped result and touches nothing.
pub async fn run_exclusive_pass(
    pool: &sqlx::PgPool,
    scheduler: &BatchScheduler,
    params: PassParams,
) -> anyhow::Result<PassResult> {
    let Some(lock) = PassLock::try_acquire(pool).await? else {
        tracing::warn!("pass lock not acquired; another pass in progress");
        return Ok(PassResult::skipped());
    };

    let result = scheduler.run_pass(params).await;

    if let Err(err) = lock.release().await {
        tracing::warn!(error = %err, "failed to release pass lock");
    }
    result
}
