mod bid;
mod dispute;
mod identity;
mod lot;
mod notifier;
mod pool;
mod settlement;
mod wallet;

pub use bid::BidRepository;
pub use dispute::{DisputeRepository, HoldRelease};
pub use identity::IdentityRepository;
pub use lot::{CloseOutcome, ClosingRecord, LotRepository};
pub use notifier::{Notifier, NullNotifier};
pub use pool::PoolRepository;
pub use settlement::{FillPlan, FillSlice, SettlementRepository};
pub use wallet::WalletRepository;

/// The base trait every storage port extends.
///
/// An implementation is a cheap, cloneable handle (typically a connection
/// pool). Its error type represents infrastructure failure (the store is
/// unreachable, a query failed) and is treated as transient by the engine.
pub trait Repository: Clone + Send + Sync + 'static {
    /// Infrastructure failure
    type Error: std::error::Error + Send + Sync + 'static;
}

/// The "marker" trait that implies implementation of every storage port.
pub trait MarketRepository:
    IdentityRepository
    + LotRepository
    + PoolRepository
    + BidRepository
    + SettlementRepository
    + WalletRepository
    + DisputeRepository
{
}

impl<T> MarketRepository for T where
    T: IdentityRepository
        + LotRepository
        + PoolRepository
        + BidRepository
        + SettlementRepository
        + WalletRepository
        + DisputeRepository
{
}
