use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockify_core::config::Settings;
use stockify_core::ingest::client::HttpStockApiClient;
use stockify_core::ingest::pipeline::{self, PopulationReport, RetryPolicy};
use stockify_core::storage::memory::InMemoryStockStore;
use stockify_core::storage::pg::PgStockStore;
use stockify_core::storage::StockStore;

#[derive(Debug, Parser)]
#[command(name = "stockify_worker")]
struct Args {
    /// Fetch and normalize every page into memory instead of the database.
    #[arg(long)]
    dry_run: bool,

    /// Override STOCK_API_BASE_URL for this run.
    #[arg(long)]
    base_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    if let Err(err) = run(&settings, args).await {
        sentry_anyhow::capture_anyhow(&err);
        let detail = format!("{err:#}");
        tracing::error!(error = %detail, "ingestion run failed");
        return Err(err);
    }

    Ok(())
}

async fn run(settings: &Settings, args: Args) -> anyhow::Result<()> {
    let mut client = HttpStockApiClient::from_settings(settings)?;
    if let Some(base_url) = args.base_url {
        client = client.with_base_url(base_url);
    }
    let policy = RetryPolicy::from_env();

    if args.dry_run {
        let store = InMemoryStockStore::new();
        let report = pipeline::bootstrap(&client, &store, &policy).await?;
        log_report(&report, true);
        return Ok(());
    }

    let db_url = settings.require_database_url()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    stockify_core::storage::ping(&pool).await?;
    stockify_core::storage::migrate(&pool).await?;

    let store = PgStockStore::new(pool);
    let report = pipeline::bootstrap(&client, &store, &policy).await?;
    log_report(&report, false);

    let total = store.count().await.context("count stocks failed")?;
    let latest = store.recent(1).await.context("load latest stock failed")?;
    match latest.first() {
        Some(event) => tracing::info!(
            total,
            ticker = %event.ticker,
            time = %event.time,
            "stocks table ready"
        ),
        None => tracing::warn!(total, "stocks table is empty after ingestion"),
    }

    Ok(())
}

fn log_report(report: &PopulationReport, dry_run: bool) {
    tracing::info!(
        dry_run,
        skipped = report.skipped,
        pages = report.pages,
        items_seen = report.items_seen,
        persisted = report.persisted,
        failed = report.failed,
        "ingestion finished"
    );
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
