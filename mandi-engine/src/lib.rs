#![warn(missing_docs)]
//! The mandi auction engine.
//!
//! [`Market`] implements the marketplace operations on top of any backend
//! implementing the ports in `mandi-core`: listing and scheduling lots,
//! bidding, closing and settling, pooling small lots, wallets, and
//! disputes. [`Scheduler`] drives the timed parts of the lifecycle by
//! calling [`Market::tick`] on an interval.
//!
//! Time is always read from an injected [`Clock`], so the whole lifecycle can
//! be exercised deterministically with a [`ManualClock`].

mod clock;
mod error;
mod locks;
mod market;
mod notify;
pub mod ranking;
mod retry;
mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::MarketError;
pub use locks::KeyedLocks;
pub use market::{CloseReport, Market, MarketResult, SettlementReport};
pub use notify::TracingNotifier;
pub use retry::RetryPolicy;
pub use scheduler::{Scheduler, SchedulerHandle, TickReport};
