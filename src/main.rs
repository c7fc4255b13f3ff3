//! churn-indexer entry point.
//!
//! Default mode indexes the latest churn now and then on a fixed timer.
//! `--backfill` sweeps every historical churn once and exits.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

use churn_indexer::config::{IndexerConfig, LogFormat};
use churn_indexer::persistence::PostgresSnapshotStore;
use churn_indexer::queue::PostgresNotificationQueue;
use churn_indexer::service::{ChurnOutcome, IndexingEngine, NotificationDispatcher};
use churn_indexer::upstream::{ChainClient, MidgardChurnDiscovery, ThornodeNodeFetcher};

/// THORChain churn indexer.
#[derive(Debug, Parser)]
#[command(name = "churn-indexer", version, about)]
struct Cli {
    /// Index every historical churn once, then exit.
    #[arg(long)]
    backfill: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = IndexerConfig::from_env();
    init_tracing(config.as_ref().map(|c| c.log_format).unwrap_or_default());
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, code = e.error_code(), "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let options = config.postgres_options();
    let store = match PostgresSnapshotStore::connect(&config.database_url, &options).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, code = e.error_code(), "failed to connect to database");
            return ExitCode::FAILURE;
        }
    };

    let result = run(&cli, &config, &store).await;
    store.close().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "churn-indexer stopped with an error");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn run(
    cli: &Cli,
    config: &IndexerConfig,
    store: &PostgresSnapshotStore,
) -> anyhow::Result<()> {
    store.migrate().await.context("running database migrations")?;

    let engine = build_engine(config, store)?;

    if cli.backfill {
        tracing::info!("starting in backfill mode");
        let summary = engine
            .backfill_churns()
            .await
            .context("backfilling churns")?;
        tracing::info!(
            indexed = summary.indexed,
            skipped = summary.skipped,
            failed = summary.failed,
            "backfill finished"
        );
        return Ok(());
    }

    tracing::info!(
        interval_secs = config.check_interval().as_secs(),
        "starting in latest-churn mode"
    );
    run_timer(&engine, config.check_interval()).await
}

fn build_engine(
    config: &IndexerConfig,
    store: &PostgresSnapshotStore,
) -> anyhow::Result<IndexingEngine> {
    let client = ChainClient::new(config.http_timeout(), config.retry_policy())
        .context("building HTTP client")?;

    let churns = MidgardChurnDiscovery::new(client.clone(), config.midgard_url.clone());
    let nodes = ThornodeNodeFetcher::new(client, config.thornode_url.clone());
    let queue = PostgresNotificationQueue::new(store.pool().clone());
    let notifier = NotificationDispatcher::new(Arc::new(queue), config.dispatcher_settings());

    Ok(IndexingEngine::new(
        Arc::new(churns),
        Arc::new(nodes),
        Arc::new(store.clone()),
        notifier,
        config.engine_settings(),
    ))
}

/// Indexes the latest churn on every tick until Ctrl-C or the first error
/// that left the churn unindexed.
async fn run_timer(engine: &IndexingEngine, period: Duration) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match engine.index_latest_churn().await {
                    Ok(ChurnOutcome::AlreadyIndexed) => {
                        tracing::info!("latest churn already indexed");
                    }
                    Ok(ChurnOutcome::Indexed(report)) => tracing::info!(
                        block_number = report.block_number,
                        nodes = report.nodes_written,
                        bond_providers = report.bond_providers_written,
                        notifications = report.notifications,
                        "latest churn indexed"
                    ),
                    // Rows are committed and the jobs stay staged for the next tick.
                    Err(e) if e.rows_committed() => {
                        tracing::warn!(error = %e, "latest churn indexed, notifications pending");
                    }
                    Err(e) => return Err(e).context("indexing latest churn"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                return Ok(());
            }
        }
    }
}
