use anyhow::Context;
use clap::Parser;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use watchtower_core::config::Settings;
use watchtower_core::monitor::{run_exclusive_pass, BatchScheduler, MonitorDeps, MonitorOptions};
use watchtower_core::storage::{PgStore, SnapshotStore};

#[derive(Debug, Parser)]
#[command(name = "watchtower_worker")]
struct Args {
    /// Companies selected for this pass. Defaults to MONITOR_BATCH_SIZE.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Companies examined together per group. Defaults to MONITOR_CONCURRENCY.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Soft time budget in seconds. Defaults to MONITOR_BUDGET_SECS.
    #[arg(long)]
    budget_secs: Option<u64>,

    /// Minimum absolute score delta that counts as a change.
    #[arg(long)]
    threshold: Option<f64>,

    /// List the next batch without scoring, writing, or notifying.
    #[arg(long)]
    dry_run: bool,
}

impl Args {
    fn apply(&self, mut options: MonitorOptions) -> MonitorOptions {
        if let Some(n) = self.batch_size {
            options.batch_size = n;
        }
        if let Some(n) = self.concurrency {
            options.concurrency = n;
        }
        if let Some(secs) = self.budget_secs {
            options.budget = Duration::from_secs(secs);
        }
        if let Some(t) = self.threshold {
            options.change_threshold = t;
        }
        options
    }
}

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

    let args = Args::parse();
    let options = args.apply(MonitorOptions::from_env());
    options.validate()?;

    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(options.concurrency as u32 + 2)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    watchtower_core::storage::migrate(&pool).await?;

    if args.dry_run {
        let batch = PgStore::new(pool.clone())
            .get_next_batch_to_process(options.batch_size)
            .await?;
        let tickers: Vec<&str> = batch.iter().map(|c| c.ticker.as_str()).collect();
        tracing::info!(
            dry_run = true,
            selected = batch.len(),
            tickers = ?tickers,
            "next batch (dry-run)"
        );
        println!("{}", serde_json::to_string_pretty(&tickers)?);
        return Ok(());
    }

    let deps = MonitorDeps::postgres(pool.clone(), &settings)?;
    let scheduler = BatchScheduler::new(deps, options)?;

    let result = match run_exclusive_pass(&pool, &scheduler, scheduler.options().pass_params()).await
    {
        Ok(result) => result,
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %format!("{err:#}"), "monitor pass failed");
            return Err(err);
        }
    };

    if result.skipped {
        tracing::warn!("another pass holds the lock; nothing done");
    }
    for e in &result.errors {
        tracing::warn!(ticker = %e.ticker, error = %e.message, "company failed this pass");
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
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
