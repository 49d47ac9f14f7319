//! In-memory collaborators for unit tests of the monitor pipeline.

use crate::domain::company::Company;
use crate::domain::report::{ChangeReport, NewChangeReport};
use crate::domain::snapshot::{NewSnapshot, Snapshot};
use crate::domain::subscriber::Subscriber;
use crate::llm::{ChangeReportContext, Provider, ReportGenerator};
use crate::monitor::{BatchScheduler, CompanyProcessor, MonitorDeps, MonitorOptions};
use crate::notify::{Notification, NotificationSink};
use crate::score::{ScoreOptions, ScoreProvider, ScoreResult};
use crate::storage::{SnapshotStore, SubscriberDirectory};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub fn company(id: i64, ticker: &str) -> Company {
    Company {
        id,
        ticker: ticker.to_string(),
        name: format!("{ticker} Inc"),
        sector: Some("Technology".to_string()),
        industry: None,
        last_checked_at: None,
    }
}

pub fn subscriber(premium: bool) -> Subscriber {
    let user_id = Uuid::new_v4();
    Subscriber {
        user_id,
        email: format!("{user_id}@example.com"),
        name: None,
        is_premium_tier: premium,
    }
}

fn epoch_plus(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

#[derive(Default)]
struct ScoresState {
    scores: HashMap<String, f64>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    delay: Option<Duration>,
}

#[derive(Default)]
pub struct FakeScores {
    state: Mutex<ScoresState>,
}

impl FakeScores {
    pub fn set(&self, ticker: &str, score: f64) {
        self.state.lock().unwrap().scores.insert(ticker.to_string(), score);
    }

    pub fn fail(&self, ticker: &str) {
        self.state.lock().unwrap().failing.insert(ticker.to_string());
    }

    pub fn panic_on(&self, ticker: &str) {
        self.state.lock().unwrap().panicking.insert(ticker.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }
}

#[async_trait::async_trait]
impl ScoreProvider for FakeScores {
    async fn compute_overall_score(
        &self,
        ticker: &str,
        _options: ScoreOptions,
    ) -> anyhow::Result<Option<ScoreResult>> {
        let delay = self.state.lock().unwrap().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let (score, failing, panicking) = {
            let state = self.state.lock().unwrap();
            (
                state.scores.get(ticker).copied(),
                state.failing.contains(ticker),
                state.panicking.contains(ticker),
            )
        };

        if panicking {
            panic!("scoring blew up for {ticker}");
        }
        if failing {
            anyhow::bail!("upstream timeout for {ticker}");
        }

        Ok(score.map(|overall_score| ScoreResult {
            overall_score,
            breakdown: BTreeMap::from([("graham".to_string(), overall_score)]),
            strategies: json!({"graham": {"fair_value": 10.0}}),
            current_price: Some(12.5),
            latest_statement: None,
            sentiment_score: None,
        }))
    }
}

#[derive(Default)]
struct StoreState {
    companies: Vec<Company>,
    snapshots: Vec<Snapshot>,
    reports: Vec<ChangeReport>,
    cursor_advances: HashMap<i64, usize>,
    failing_cursors: HashSet<i64>,
    fail_batch_fetch: bool,
    batch_fetches: usize,
    clock: i64,
}

impl StoreState {
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += 1;
        epoch_plus(1_000_000 + self.clock)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn add_company(&self, company: Company) {
        self.state.lock().unwrap().companies.push(company);
    }

    pub fn add_company_checked(&self, mut company: Company, checked_secs: i64) {
        company.last_checked_at = Some(epoch_plus(checked_secs));
        self.add_company(company);
    }

    pub fn seed_snapshot(&self, company_id: i64, ticker: &str, score: f64) {
        let mut state = self.state.lock().unwrap();
        let captured_at = state.tick();
        state.snapshots.push(Snapshot {
            id: Uuid::new_v4(),
            company_id,
            ticker: ticker.to_string(),
            name: format!("{ticker} Inc"),
            sector: None,
            current_price: Some(10.0),
            overall_score: score,
            breakdown: BTreeMap::new(),
            strategies: json!({}),
            latest_statement: None,
            sentiment_score: None,
            captured_at,
        });
    }

    pub fn snapshot_count(&self, company_id: i64) -> usize {
        let state = self.state.lock().unwrap();
        state
            .snapshots
            .iter()
            .filter(|s| s.company_id == company_id)
            .count()
    }

    pub fn latest_score(&self, company_id: i64) -> Option<f64> {
        let state = self.state.lock().unwrap();
        state
            .snapshots
            .iter()
            .rev()
            .find(|s| s.company_id == company_id)
            .map(|s| s.overall_score)
    }

    pub fn report_count(&self) -> usize {
        self.state.lock().unwrap().reports.len()
    }

    pub fn reports(&self) -> Vec<ChangeReport> {
        self.state.lock().unwrap().reports.clone()
    }

    pub fn cursor_advances(&self, company_id: i64) -> usize {
        let state = self.state.lock().unwrap();
        state.cursor_advances.get(&company_id).copied().unwrap_or(0)
    }

    pub fn fail_cursor_for(&self, company_id: i64) {
        self.state.lock().unwrap().failing_cursors.insert(company_id);
    }

    pub fn fail_batch_fetch(&self) {
        self.state.lock().unwrap().fail_batch_fetch = true;
    }

    pub fn batch_fetches(&self) -> usize {
        self.state.lock().unwrap().batch_fetches
    }
}

#[async_trait::async_trait]
impl SnapshotStore for MemoryStore {
    async fn get_latest_snapshot(&self, company_id: i64) -> anyhow::Result<Option<Snapshot>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .snapshots
            .iter()
            .rev()
            .find(|s| s.company_id == company_id)
            .cloned())
    }

    async fn create_snapshot(
        &self,
        company_id: i64,
        snapshot: &NewSnapshot,
    ) -> anyhow::Result<Snapshot> {
        let mut state = self.state.lock().unwrap();
        let captured_at = state.tick();
        let stored = snapshot
            .clone()
            .into_snapshot(Uuid::new_v4(), company_id, captured_at);
        state.snapshots.push(stored.clone());
        Ok(stored)
    }

    async fn create_report(&self, report: &NewChangeReport) -> anyhow::Result<ChangeReport> {
        let mut state = self.state.lock().unwrap();
        anyhow::ensure!(
            state.snapshots.iter().any(|s| s.id == report.snapshot_id),
            "report references unknown snapshot {}",
            report.snapshot_id
        );
        let created_at = state.tick();
        let stored = report.clone().into_report(Uuid::new_v4(), created_at);
        state.reports.push(stored.clone());
        Ok(stored)
    }

    async fn update_last_checked(&self, company_id: i64) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing_cursors.contains(&company_id) {
            anyhow::bail!("connection reset");
        }
        let now = state.tick();
        if let Some(c) = state.companies.iter_mut().find(|c| c.id == company_id) {
            c.last_checked_at = Some(now);
        }
        *state.cursor_advances.entry(company_id).or_default() += 1;
        Ok(())
    }

    async fn get_next_batch_to_process(&self, limit: usize) -> anyhow::Result<Vec<Company>> {
        let mut state = self.state.lock().unwrap();
        state.batch_fetches += 1;
        if state.fail_batch_fetch {
            anyhow::bail!("database unavailable");
        }

        let mut companies = state.companies.clone();
        // None < Some(_), which is exactly "never checked first".
        companies.sort_by(|a, b| {
            a.last_checked_at
                .cmp(&b.last_checked_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        companies.truncate(limit);
        Ok(companies)
    }
}

#[derive(Default)]
pub struct FakeDirectory {
    watchers: Mutex<Vec<(i64, Subscriber)>>,
}

impl FakeDirectory {
    pub fn watch(&self, company_id: i64, premium: bool) -> Subscriber {
        let s = subscriber(premium);
        self.watchers.lock().unwrap().push((company_id, s.clone()));
        s
    }
}

#[async_trait::async_trait]
impl SubscriberDirectory for FakeDirectory {
    async fn get_subscribers_for_company(
        &self,
        company_id: i64,
    ) -> anyhow::Result<Vec<Subscriber>> {
        let watchers = self.watchers.lock().unwrap();
        Ok(watchers
            .iter()
            .filter(|(id, _)| *id == company_id)
            .map(|(_, s)| s.clone())
            .collect())
    }

    async fn has_subscribers(&self, company_id: i64) -> anyhow::Result<bool> {
        let watchers = self.watchers.lock().unwrap();
        Ok(watchers.iter().any(|(id, _)| *id == company_id))
    }
}

#[derive(Default)]
pub struct FakeReports {
    calls: Mutex<usize>,
    failure: Mutex<Option<String>>,
}

impl FakeReports {
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }
}

#[async_trait::async_trait]
impl ReportGenerator for FakeReports {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn generate_change_report(&self, ctx: &ChangeReportContext) -> anyhow::Result<String> {
        *self.calls.lock().unwrap() += 1;
        if let Some(message) = self.failure.lock().unwrap().clone() {
            anyhow::bail!(message);
        }
        Ok(format!(
            "{} moved {} from {} to {}.",
            ctx.current.ticker, ctx.direction, ctx.previous_score, ctx.current_score
        ))
    }
}

#[derive(Default)]
pub struct RecordingSink {
    attempts: Mutex<usize>,
    delivered: Mutex<Vec<Notification>>,
    failing: Mutex<HashSet<Uuid>>,
}

impl RecordingSink {
    pub fn fail_for(&self, user_id: Uuid) {
        self.failing.lock().unwrap().insert(user_id);
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
        *self.attempts.lock().unwrap() += 1;
        if self.failing.lock().unwrap().contains(&notification.user_id) {
            anyhow::bail!("inbox write rejected for {}", notification.user_id);
        }
        self.delivered.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

pub struct Fakes {
    pub scores: Arc<FakeScores>,
    pub store: Arc<MemoryStore>,
    pub directory: Arc<FakeDirectory>,
    pub reports: Arc<FakeReports>,
    pub sink: Arc<RecordingSink>,
}

impl Fakes {
    pub fn new() -> Self {
        Self {
            scores: Arc::default(),
            store: Arc::default(),
            directory: Arc::default(),
            reports: Arc::default(),
            sink: Arc::default(),
        }
    }

    pub fn deps(&self) -> MonitorDeps {
        MonitorDeps {
            scores: self.scores.clone(),
            reports: self.reports.clone(),
            subscribers: self.directory.clone(),
            store: self.store.clone(),
            notifications: self.sink.clone(),
        }
    }

    pub fn processor(&self, threshold: f64) -> CompanyProcessor {
        CompanyProcessor::new(&self.deps(), threshold)
    }

    pub fn scheduler(&self, threshold: f64) -> BatchScheduler {
        let options = MonitorOptions {
            change_threshold: threshold,
            ..MonitorOptions::default()
        };
        BatchScheduler::new(self.deps(), options).unwrap()
    }
}
