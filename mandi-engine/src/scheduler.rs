//! The timer loop that drives lots through their bidding windows.
//!
//! Every tick opens the lots whose start has been reached, closes the lots
//! whose window has elapsed, force-closes lots stuck open past the grace
//! period, and evaluates forming pools. Store failures are retried with the
//! market's backoff and otherwise left for the next tick; a failure on one
//! lot never stops the others.

use crate::clock::Clock;
use crate::error::{MarketError, Store as _};
use crate::market::{Market, MarketResult};
use mandi_core::models::{LotId, PoolDecision};
use mandi_core::ports::{LotRepository, MarketRepository, Notifier, PoolRepository};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument as _, Level, debug, event, span, warn};

/// What one tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Lots whose bidding window opened
    pub opened: usize,
    /// Attempts closed (sold, unsold or relisted)
    pub closed: usize,
    /// Lots force-closed by reconciliation
    pub forced: usize,
    /// Pools promoted to a scheduled lot
    pub promoted: usize,
    /// Pools dissolved
    pub dissolved: usize,
    /// Operations that failed and were left for a later tick
    pub failed: usize,
}

fn transient<E: std::error::Error + 'static>(err: &MarketError<E>) -> bool {
    matches!(err, MarketError::Transient(_))
}

impl<R: MarketRepository, N: Notifier, C: Clock> Market<R, N, C> {
    /// Run one pass of the scheduler at the clock's current time.
    pub async fn tick(&self) -> MarketResult<TickReport, R> {
        let mut report = TickReport::default();
        let now = self.now();

        let due = self
            .retrying(|| async { self.repo.lots_due_to_open(now).await.store() })
            .await?;
        for (lot_id, attempt) in due {
            match self.retrying(|| self.open_lot(lot_id, attempt)).await {
                Ok(_) => report.opened += 1,
                Err(err) => failed(&mut report, lot_id, "open", &err),
            }
        }

        let expired = self
            .retrying(|| async { self.repo.lots_due_to_close(now).await.store() })
            .await?;
        for (lot_id, attempt) in expired {
            match self.retrying(|| self.close_lot(lot_id, attempt)).await {
                Ok(close) if !close.replayed => report.closed += 1,
                Ok(_) => {}
                Err(err) => failed(&mut report, lot_id, "close", &err),
            }
        }

        report.forced = self.reconcile().await?;

        let pools = self
            .retrying(|| async { self.repo.forming_pools().await.store() })
            .await?;
        for pool in pools {
            match self.retrying(|| self.evaluate_pool(pool.id)).await {
                Ok(PoolDecision::Promote) => report.promoted += 1,
                Ok(PoolDecision::Dissolve) => report.dissolved += 1,
                Ok(PoolDecision::Wait) => {}
                Err(err) => failed(&mut report, pool.lot_id(), "evaluate", &err),
            }
        }

        Ok(report)
    }

    /// Force-close every lot still open more than the grace period after its
    /// window ended. Returns how many were closed.
    pub async fn reconcile(&self) -> MarketResult<usize, R> {
        let cutoff = self.now() - self.config().auction.grace;
        let stuck = self
            .retrying(|| async { self.repo.lots_due_to_close(cutoff).await.store() })
            .await?;

        let mut forced = 0;
        for (lot_id, attempt) in stuck {
            warn!(%lot_id, attempt, "lot open past its grace period");
            match self.force_close(lot_id, attempt).await {
                Ok(_) => forced += 1,
                Err(err) => {
                    event!(Level::ERROR, %lot_id, attempt, error = %err, "could not force-close lot");
                }
            }
        }
        Ok(forced)
    }

    async fn retrying<T, F, Fut>(&self, op: F) -> MarketResult<T, R>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = MarketResult<T, R>>,
    {
        self.retry_policy().run(op, transient).await
    }
}

fn failed<E: std::error::Error + 'static>(
    report: &mut TickReport,
    lot_id: LotId,
    step: &'static str,
    err: &MarketError<E>,
) {
    report.failed += 1;
    if transient(err) {
        warn!(%lot_id, step, error = %err, "left for the next tick");
    } else {
        debug!(%lot_id, step, error = %err, "skipped");
    }
}

/// Runs [`Market::tick`] on a fixed interval until stopped.
pub struct Scheduler<R, N, C> {
    market: Market<R, N, C>,
    every: Duration,
}

impl<R: MarketRepository, N: Notifier, C: Clock> Scheduler<R, N, C> {
    /// A scheduler ticking `market` every `every`
    pub fn new(market: Market<R, N, C>, every: Duration) -> Self {
        Self { market, every }
    }

    /// Spawn the loop onto the current tokio runtime
    pub fn start(self) -> SchedulerHandle {
        let (stop, mut stopped) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = stopped.changed() => break,
                }

                let span = span!(Level::INFO, "market tick");
                async {
                    match self.market.tick().await {
                        Ok(report) if report != TickReport::default() => {
                            event!(
                                Level::INFO,
                                opened = report.opened,
                                closed = report.closed,
                                forced = report.forced,
                                promoted = report.promoted,
                                dissolved = report.dissolved,
                                failed = report.failed,
                            );
                        }
                        Ok(_) => {}
                        Err(err) => event!(Level::WARN, error = %err, "tick failed"),
                    }
                }
                .instrument(span)
                .await;
            }
        });
        SchedulerHandle { stop, task }
    }
}

/// The running scheduler.
pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the loop, letting an in-flight tick finish
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(err) = self.task.await {
            warn!(error = %err, "scheduler task ended abnormally");
        }
    }
}
