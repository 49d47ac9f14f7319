use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    Json,
};
use anyhow::Context;
use serde::Serialize;
use std::future::Future;
use watchtower_core::monitor::{run_exclusive_pass, PassError, PassResult};

use crate::AppState;

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CronResponse {
    pub processed_count: usize,
    pub snapshots_created: usize,
    pub changes_detected: usize,
    pub reports_generated: usize,
    pub notifications_sent: usize,
    pub error_count: usize,
    /// Milliseconds.
    pub execution_time: u64,
    pub errors: Vec<PassError>,
    pub budget_exhausted: bool,
    pub skipped: bool,
}

impl From<PassResult> for CronResponse {
    fn from(r: PassResult) -> Self {
        Self {
            processed_count: r.processed,
            snapshots_created: r.snapshots_created,
            changes_detected: r.changes_detected,
            reports_generated: r.reports_generated,
            notifications_sent: r.notifications_sent,
            error_count: r.errors.len(),
            execution_time: u64::try_from(r.elapsed.as_millis()).unwrap_or(u64::MAX),
            errors: r.errors,
            budget_exhausted: r.budget_exhausted,
            skipped: r.skipped,
        }
    }
}

/// Runs one monitoring pass on behalf of an external cron invoker.
pub async fn trigger_monitor(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CronResponse>, StatusCode> {
    let Some(secret) = state.cron_secret.as_deref() else {
        tracing::error!("CRON_SECRET not configured; refusing to run monitor pass");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };
    if !is_authorized(&headers, secret) {
        tracing::warn!("monitor trigger rejected: bad or missing bearer token");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let (Some(pool), Some(scheduler)) = (&state.pool, &state.scheduler) else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let pool = pool.clone();
    let scheduler = scheduler.clone();
    let pass = async move {
        let params = scheduler.options().pass_params();
        run_exclusive_pass(&pool, &scheduler, params).await
    };

    match run_detached(pass).await {
        Ok(result) => Ok(Json(CronResponse::from(result))),
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %format!("{err:#}"), "monitor pass failed to run");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Runs the pass on its own task so a dropped request cannot cancel units mid-write.
async fn run_detached<F>(pass: F) -> anyhow::Result<PassResult>
where
    F: Future<Output = anyhow::Result<PassResult>> + Send + 'static,
{
    tokio::spawn(pass)
        .await
        .context("monitor pass task aborted")?
}

pub fn is_authorized(headers: &HeaderMap, secret: &str) -> bool {
    let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let Some(token) = value.strip_prefix("Bearer ") else {
        return false;
    };
    constant_time_eq(token.trim().as_bytes(), secret.as_bytes())
}

// Length leaks; contents do not.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
