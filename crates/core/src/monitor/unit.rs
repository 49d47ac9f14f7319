use crate::domain::change::ChangeEvent;
use crate::domain::company::Company;
use crate::domain::report::NewChangeReport;
use crate::domain::snapshot::NewSnapshot;
use crate::llm::{ChangeReportContext, ReportGenerator};
use crate::monitor::classifier::classify;
use crate::monitor::MonitorDeps;
use crate::notify::{ChangeNotice, DeliveryFailure, NotificationDispatcher, Recipient};
use crate::score::{ScoreOptions, ScoreProvider};
use crate::storage::{SnapshotStore, SubscriberDirectory};
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// How far a successful unit got before it reached its natural end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// The score provider had nothing to score. Expected, not an error.
    InsufficientData,
    /// First observation; the snapshot becomes the baseline.
    Baseline,
    Unchanged,
    /// Change detected, snapshot persisted, nobody to tell.
    NoSubscribers,
    Notified,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitStatus {
    Completed { completion: Completion },
    Failed { error: String },
}

/// Outcome of examining one company. Progress fields stay populated on failure so a pass can
/// report what was persisted before the failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitResult {
    pub ticker: String,
    pub snapshot_id: Option<Uuid>,
    pub change: Option<ChangeEvent>,
    pub report_id: Option<Uuid>,
    pub notifications_sent: usize,
    pub delivery_failures: Vec<DeliveryFailure>,
    pub status: UnitStatus,
}

impl UnitResult {
    fn new(ticker: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            snapshot_id: None,
            change: None,
            report_id: None,
            notifications_sent: 0,
            delivery_failures: Vec::new(),
            status: UnitStatus::Completed {
                completion: Completion::InsufficientData,
            },
        }
    }

    pub fn failed(ticker: &str, error: impl Into<String>) -> Self {
        let mut out = Self::new(ticker);
        out.status = UnitStatus::Failed {
            error: error.into(),
        };
        out
    }

    pub fn snapshot_created(&self) -> bool {
        self.snapshot_id.is_some()
    }

    pub fn change_detected(&self) -> bool {
        self.change.is_some()
    }

    pub fn report_generated(&self) -> bool {
        self.report_id.is_some()
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            UnitStatus::Failed { error } => Some(error),
            UnitStatus::Completed { .. } => None,
        }
    }

    pub fn completion(&self) -> Option<Completion> {
        match self.status {
            UnitStatus::Completed { completion } => Some(completion),
            UnitStatus::Failed { .. } => None,
        }
    }
}

/// Examines a single company: score, diff, persist, report, notify. Never returns an error;
/// failures end up in [`UnitStatus::Failed`].
#[derive(Clone)]
pub struct CompanyProcessor {
    scores: Arc<dyn ScoreProvider>,
    reports: Arc<dyn ReportGenerator>,
    subscribers: Arc<dyn SubscriberDirectory>,
    store: Arc<dyn SnapshotStore>,
    dispatcher: NotificationDispatcher,
    threshold: f64,
}

impl CompanyProcessor {
    pub fn new(deps: &MonitorDeps, threshold: f64) -> Self {
        Self {
            scores: deps.scores.clone(),
            reports: deps.reports.clone(),
            subscribers: deps.subscribers.clone(),
            store: deps.store.clone(),
            dispatcher: NotificationDispatcher::new(deps.notifications.clone()),
            threshold,
        }
    }

    pub async fn process_company(&self, company: &Company) -> UnitResult {
        let t0 = std::time::Instant::now();
        let mut result = UnitResult::new(&company.ticker);

        match self.run(company, &mut result).await {
            Ok(completion) => {
                result.status = UnitStatus::Completed { completion };
                tracing::debug!(
                    ticker = %company.ticker,
                    company_id = company.id,
                    ?completion,
                    notifications_sent = result.notifications_sent,
                    elapsed_ms = t0.elapsed().as_millis(),
                    "company processed"
                );
            }
            Err(err) => {
                tracing::warn!(
                    ticker = %company.ticker,
                    company_id = company.id,
                    snapshot_created = result.snapshot_created(),
                    error = %format!("{err:#}"),
                    "company processing failed"
                );
                result.status = UnitStatus::Failed {
                    error: format!("{err:#}"),
                };
            }
        }

        result
    }

    async fn run(&self, company: &Company, result: &mut UnitResult) -> anyhow::Result<Completion> {
        let Some(score) = self
            .scores
            .compute_overall_score(&company.ticker, ScoreOptions::full())
            .await
            .context("score provider failed")?
        else {
            tracing::debug!(ticker = %company.ticker, "insufficient data for score");
            return Ok(Completion::InsufficientData);
        };

        let previous = self
            .store
            .get_latest_snapshot(company.id)
            .await
            .context("load latest snapshot failed")?;

        // Persist before anything else can fail: the new score is the baseline for the next
        // pass whatever happens to the report or the notifications.
        let current = self
            .store
            .create_snapshot(company.id, &NewSnapshot::from_score(company, &score))
            .await
            .context("persist snapshot failed")?;
        result.snapshot_id = Some(current.id);

        let Some(previous) = previous else {
            return Ok(Completion::Baseline);
        };

        let Some(change) = classify(current.overall_score, previous.overall_score, self.threshold)
            .into_event(&company.ticker, previous.overall_score, current.overall_score)
        else {
            return Ok(Completion::Unchanged);
        };
        result.change = Some(change.clone());

        tracing::info!(
            ticker = %company.ticker,
            previous_score = change.previous_score,
            current_score = change.current_score,
            delta = change.delta,
            direction = %change.direction,
            "score change detected"
        );

        if !self
            .subscribers
            .has_subscribers(company.id)
            .await
            .context("subscriber existence check failed")?
        {
            return Ok(Completion::NoSubscribers);
        }

        let subscribers = self
            .subscribers
            .get_subscribers_for_company(company.id)
            .await
            .context("load subscribers failed")?;
        if subscribers.is_empty() {
            return Ok(Completion::NoSubscribers);
        }

        let ctx = ChangeReportContext {
            previous_score: change.previous_score,
            current_score: change.current_score,
            direction: change.direction,
            previous,
            current,
        };
        let narrative = self
            .reports
            .generate_change_report(&ctx)
            .await
            .context("report generation failed")?;

        let report = self
            .store
            .create_report(&NewChangeReport::new(
                company.id,
                ctx.current.id,
                &change,
                narrative,
                self.reports.provider().as_str(),
            ))
            .await
            .context("persist report failed")?;
        result.report_id = Some(report.id);

        let notice = ChangeNotice {
            company_id: company.id,
            ticker: company.ticker.clone(),
            company_name: company.name.clone(),
            previous_score: change.previous_score,
            current_score: change.current_score,
            delta: change.delta,
            direction: change.direction,
            report_id: Some(report.id),
            summary: Some(report.summary),
        };
        let outcome = self
            .dispatcher
            .dispatch(&Recipient::partition_by_tier(subscribers), &notice)
            .await;
        result.notifications_sent = outcome.sent;
        result.delivery_failures = outcome.failures;

        Ok(Completion::Notified)
    }
}
