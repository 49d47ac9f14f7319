use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use watchtower_core::config::Settings;
use watchtower_core::domain::company::Company;
use watchtower_core::domain::report::ChangeReport;
use watchtower_core::domain::snapshot::Snapshot;
use watchtower_core::monitor::{BatchScheduler, MonitorDeps, MonitorOptions};
use watchtower_core::storage::{companies, reports, snapshots};

mod cron;

const RECENT_REPORTS_LIMIT: i64 = 20;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(db_url)
            .await
        {
            Ok(pool) => match watchtower_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let scheduler = pool
        .as_ref()
        .and_then(|pool| match build_scheduler(pool.clone(), &settings) {
            Ok(s) => Some(s),
            Err(e) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %format!("{e:#}"), "monitor disabled; cron trigger will return 503");
                None
            }
        });

    let state = AppState {
        pool,
        scheduler,
        cron_secret: settings.cron_secret.clone(),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/cron/monitor",
            get(cron::trigger_monitor).post(cron::trigger_monitor),
        )
        .route(
            "/companies/:ticker/snapshots/latest",
            get(get_latest_snapshot),
        )
        .route("/companies/:ticker/reports", get(get_recent_reports))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn build_scheduler(pool: PgPool, settings: &Settings) -> anyhow::Result<BatchScheduler> {
    let options = MonitorOptions::from_env();
    let deps = MonitorDeps::postgres(pool, settings)?;
    BatchScheduler::new(deps, options)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
pub(crate) struct AppState {
    pool: Option<PgPool>,
    scheduler: Option<BatchScheduler>,
    cron_secret: Option<String>,
}

async fn get_latest_snapshot(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<Snapshot>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let company = lookup_company(pool, &ticker).await?;
    let snapshot = snapshots::latest_for_company(pool, company.id)
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(snapshot))
}

async fn get_recent_reports(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<Vec<ChangeReport>>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let company = lookup_company(pool, &ticker).await?;
    let reports = reports::recent_for_company(pool, company.id, RECENT_REPORTS_LIMIT)
        .await
        .map_err(internal)?;

    Ok(Json(reports))
}

async fn lookup_company(pool: &PgPool, ticker: &str) -> Result<Company, StatusCode> {
    companies::find_by_ticker(pool, ticker)
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)
}

fn internal(e: anyhow::Error) -> StatusCode {
    sentry_anyhow::capture_anyhow(&e);
    tracing::error!(error = %format!("{e:#}"), "request failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
