use crate::domain::company::Company;
use crate::monitor::unit::{CompanyProcessor, UnitResult, UnitStatus};
use crate::monitor::{MonitorDeps, MonitorOptions, PassParams};
use crate::storage::SnapshotStore;
use anyhow::Context;
use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassError {
    pub ticker: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassResult {
    pub processed: usize,
    pub snapshots_created: usize,
    pub changes_detected: usize,
    pub reports_generated: usize,
    pub notifications_sent: usize,
    pub errors: Vec<PassError>,
    /// The budget ran out before every selected company was examined.
    pub budget_exhausted: bool,
    /// Another pass held the lock; nothing was selected or touched.
    pub skipped: bool,
    pub elapsed: Duration,
}

impl PassResult {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    fn absorb(&mut self, unit: &UnitResult) {
        self.processed += 1;
        self.snapshots_created += usize::from(unit.snapshot_created());
        self.changes_detected += usize::from(unit.change_detected());
        self.reports_generated += usize::from(unit.report_generated());
        self.notifications_sent += unit.notifications_sent;

        if let Some(error) = unit.error() {
            self.errors.push(PassError {
                ticker: unit.ticker.clone(),
                message: error.to_string(),
            });
        }
    }
}

/// Caller-owned pass driver. Holds no state between passes; fairness lives entirely in the
/// store's `last_checked_at` cursor.
#[derive(Clone)]
pub struct BatchScheduler {
    store: Arc<dyn SnapshotStore>,
    processor: CompanyProcessor,
    options: MonitorOptions,
}

impl BatchScheduler {
    pub fn new(deps: MonitorDeps, options: MonitorOptions) -> anyhow::Result<Self> {
        options.validate()?;
        Ok(Self {
            store: deps.store.clone(),
            processor: CompanyProcessor::new(&deps, options.change_threshold),
            options,
        })
    }

    pub fn options(&self) -> &MonitorOptions {
        &self.options
    }

    /// Errors only when the pass cannot start at all (invalid params, batch query failed).
    /// Per-company failures are data in the returned result.
    pub async fn run_pass(&self, params: PassParams) -> anyhow::Result<PassResult> {
        params.validate()?;
        let started = Instant::now();

        let batch = self
            .store
            .get_next_batch_to_process(params.batch_size)
            .await
            .context("failed to fetch next batch")?;

        tracing::info!(
            selected = batch.len(),
            batch_size = params.batch_size,
            concurrency = params.concurrency,
            budget_secs = params.budget.as_secs_f64(),
            "monitor pass started"
        );

        let mut result = PassResult::default();
        let groups = batch.chunks(params.concurrency);
        let group_count = groups.len();

        for (group_idx, group) in groups.enumerate() {
            let elapsed = started.elapsed();
            if elapsed >= params.budget {
                result.budget_exhausted = true;
                tracing::warn!(
                    elapsed_ms = elapsed.as_millis(),
                    groups_run = group_idx,
                    groups_total = group_count,
                    remaining = batch.len() - result.processed,
                    "time budget exhausted; not starting further groups"
                );
                break;
            }

            let units = join_all(group.iter().map(|company| self.run_unit(company))).await;
            for unit in &units {
                result.absorb(unit);
            }
        }

        result.elapsed = started.elapsed();
        tracing::info!(
            processed = result.processed,
            snapshots_created = result.snapshots_created,
            changes_detected = result.changes_detected,
            reports_generated = result.reports_generated,
            notifications_sent = result.notifications_sent,
            errors = result.errors.len(),
            budget_exhausted = result.budget_exhausted,
            elapsed_ms = result.elapsed.as_millis(),
            "monitor pass finished"
        );

        Ok(result)
    }

    /// One company, isolated: a panic or error stays here, and the cursor advances whatever
    /// the outcome.
    async fn run_unit(&self, company: &Company) -> UnitResult {
        let mut unit = match AssertUnwindSafe(self.processor.process_company(company))
            .catch_unwind()
            .await
        {
            Ok(unit) => unit,
            Err(panic) => {
                let message = format!("unit panicked: {}", panic_message(panic.as_ref()));
                tracing::error!(ticker = %company.ticker, company_id = company.id, %message, "company unit panicked");
                UnitResult::failed(&company.ticker, message)
            }
        };

        if let Err(err) = self.store.update_last_checked(company.id).await {
            tracing::error!(
                ticker = %company.ticker,
                company_id = company.id,
                error = %format!("{err:#}"),
                "failed to advance company cursor"
            );
            let message = match unit.error() {
                Some(prev) => format!("{prev}; cursor advance failed: {err:#}"),
                None => format!("cursor advance failed: {err:#}"),
            };
            unit.status = UnitStatus::Failed { error: message };
        }

        unit
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = panic.downcast_ref::<String>() {
        return s.clone();
    }
    "unknown panic payload".to_string()
}
