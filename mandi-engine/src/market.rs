use crate::clock::{Clock, SystemClock};
use crate::error::{MarketError, Store as _};
use crate::locks::KeyedLocks;
use crate::retry::RetryPolicy;
use mandi_core::models::{Lot, LotId, MarketConfig, MarketEvent, Role, User, UserId};
use mandi_core::ports::{IdentityRepository, LotRepository, MarketRepository, Notifier, NullNotifier};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::OwnedMutexGuard;

mod bids;
mod disputes;
mod lots;
mod pooling;
mod settlement;
mod wallet;

pub use lots::CloseReport;
pub use settlement::SettlementReport;

/// Shorthand for the result of an engine operation over repository `R`.
pub type MarketResult<T, R> = Result<T, MarketError<<R as mandi_core::ports::Repository>::Error>>;

/// The auction engine.
///
/// A `Market` is a cheap handle: clones share the same repository, notifier,
/// clock, configuration and locks. Every lot has a single writer at a time
/// (an in-process keyed lock, backed by guarded writes in the store), and
/// wallet mutations are serialised per wallet the same way.
pub struct Market<R, N = NullNotifier, C = SystemClock> {
    pub(crate) repo: R,
    retry: RetryPolicy,
    shared: Arc<Shared<N, C>>,
}

struct Shared<N, C> {
    notifier: N,
    clock: C,
    config: MarketConfig,
    lots: KeyedLocks<LotId>,
    wallets: KeyedLocks<UserId>,
}

impl<R: Clone, N, C> Clone for Market<R, N, C> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            retry: self.retry.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<R: MarketRepository, N: Notifier, C: Clock> Market<R, N, C> {
    /// Assemble an engine
    pub fn new(repo: R, config: MarketConfig, notifier: N, clock: C) -> Self {
        Self {
            repo,
            retry: RetryPolicy::default(),
            shared: Arc::new(Shared {
                notifier,
                clock,
                config,
                lots: KeyedLocks::default(),
                wallets: KeyedLocks::default(),
            }),
        }
    }

    /// Replace the backoff used for store failures by the scheduler
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The configuration the engine runs with
    pub fn config(&self) -> &MarketConfig {
        &self.shared.config
    }

    /// The repository handle
    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// The current time according to the engine's clock
    pub fn now(&self) -> OffsetDateTime {
        self.shared.clock.now()
    }

    pub(crate) fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub(crate) fn notify(&self, event: MarketEvent) {
        self.shared.notifier.notify(event);
    }

    pub(crate) async fn lock_lot(&self, lot_id: LotId) -> OwnedMutexGuard<()> {
        self.shared.lots.lock(lot_id).await
    }

    pub(crate) async fn lock_wallets(
        &self,
        users: impl IntoIterator<Item = UserId>,
    ) -> Vec<OwnedMutexGuard<()>> {
        self.shared.wallets.lock_all(users).await
    }

    pub(crate) async fn load_lot(&self, lot_id: LotId) -> MarketResult<Lot, R> {
        self.repo
            .get_lot(lot_id)
            .await
            .store()?
            .ok_or_else(|| MarketError::not_found("lot", lot_id))
    }

    pub(crate) async fn load_user(&self, user_id: UserId) -> MarketResult<User, R> {
        self.repo
            .get_user(user_id)
            .await
            .store()?
            .ok_or_else(|| MarketError::not_found("user", user_id))
    }

    pub(crate) async fn require_role(&self, user_id: UserId, role: Role) -> MarketResult<User, R> {
        let user = self.load_user(user_id).await?;
        if user.role != role {
            return Err(mandi_core::ValidationError::WrongRole {
                user: user_id,
                role,
            }
            .into());
        }
        Ok(user)
    }
}
