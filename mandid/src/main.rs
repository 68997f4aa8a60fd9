use mandi_engine::{Market, Scheduler, SystemClock, TracingNotifier};
use mandi_sqlite::Db;
use mandid::{AppConfig, Cli};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Every crate in the workspace reports through `tracing`; write the
    // events to stdio, filtered by RUST_LOG.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::import()?;
    let AppConfig {
        database,
        market,
        scheduler,
    } = AppConfig::load(&cli)?;

    let db = Db::open(&database).await?;
    let market = Market::new(db, market, TracingNotifier, SystemClock)
        .with_retry(scheduler.retry_policy());

    // Lots left open by a previous run are closed before anything else
    let forced = market.reconcile().await?;
    if forced > 0 {
        info!(forced, "reconciled lots left open");
    }

    if cli.once {
        let report = market.tick().await?;
        info!(?report, "single pass complete");
        return Ok(());
    }

    let handle = Scheduler::new(market, scheduler.every).start();
    info!(every = ?scheduler.every, "scheduler running");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    handle.stop().await;
    Ok(())
}
