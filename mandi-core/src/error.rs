use crate::models::{
    Amount, BidId, BidRejection, DisputeRejection, LotEvent, LotStatus, OrderStatus, PoolRejection,
    Quantity, Resolution, Role, UserId,
};
use std::time::Duration;
use thiserror::Error;

/// A request that can never succeed as stated. These are rejected
/// synchronously and must not be retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// The lot state machine has no such transition
    #[error("a {from} lot does not accept {event:?}")]
    InvalidTransition {
        /// The current status
        from: LotStatus,
        /// The rejected event
        event: LotEvent,
    },
    /// Scheduling in the past
    #[error("start time is in the past")]
    StartInPast,
    /// The window is too short
    #[error("duration is below the minimum of {minimum:?}")]
    DurationTooShort {
        /// The configured minimum
        minimum: Duration,
    },
    /// The window is too long
    #[error("duration is above the maximum of {maximum:?}")]
    DurationTooLong {
        /// The configured maximum
        maximum: Duration,
    },
    /// A window must end after it starts
    #[error("bidding window ends before it starts")]
    EmptyWindow,
    /// The lot cannot open before its planned start
    #[error("lot is not due to open until {start}")]
    NotYetDue {
        /// The planned start
        start: time::OffsetDateTime,
    },
    /// The lot ran out of attempts without a valid bid
    #[error("lot used all {max_attempts} attempts")]
    AttemptsExhausted {
        /// The configured cap
        max_attempts: u32,
    },
    /// The lot cannot close before its window ends
    #[error("bidding window is still open")]
    WindowStillOpen,
    /// Available quantity left its bounds
    #[error("available quantity {available} outside 0..={total}")]
    QuantityOutOfBounds {
        /// Available quantity
        available: Quantity,
        /// Total quantity
        total: Quantity,
    },
    /// A listing needs a commodity
    #[error("commodity is required")]
    MissingCommodity,
    /// Quantities must be positive
    #[error("quantity {0} must be positive")]
    NonPositiveQuantity(Quantity),
    /// Prices must be positive
    #[error("price {0} must be positive")]
    NonPositivePrice(Amount),
    /// Deposits and withdrawals must be positive
    #[error("amount {0} must be positive")]
    NonPositiveAmount(Amount),
    /// `price * quantity` does not fit
    #[error("amount overflow")]
    Overflow,
    /// The bid was refused
    #[error("invalid bid: {0}")]
    InvalidBid(#[from] BidRejection),
    /// The pooling request was refused
    #[error("pooling refused: {0}")]
    Pooling(#[from] PoolRejection),
    /// The dispute request was refused
    #[error("dispute refused: {0}")]
    Dispute(#[from] DisputeRejection),
    /// The user does not hold the role the operation needs
    #[error("user {user} is not a {role}")]
    WrongRole {
        /// The user
        user: UserId,
        /// The role required
        role: Role,
    },
    /// A member of a locked pool is managed by its pool
    #[error("crop is locked in a pool")]
    LockedInPool,
    /// A withdrawal larger than the balance
    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds {
        /// Current balance
        balance: Amount,
        /// Requested withdrawal
        requested: Amount,
    },
    /// Orders move confirmed, dispatched, delivered; nothing else
    #[error("order cannot move from {from} to {to}")]
    InvalidOrderStep {
        /// The current order status
        from: OrderStatus,
        /// The requested order status
        to: OrderStatus,
    },
    /// A fill does not agree with the pending bid it claims to fill
    #[error("fill for bid {bid_id} does not match the pending bid")]
    FillMismatch {
        /// The bid named by the fill
        bid_id: BidId,
    },
    /// Payment can only be confirmed once
    #[error("transaction is not awaiting payment")]
    NotAwaitingPayment,
}

/// The request raced with another writer. Retrying with fresh state may
/// succeed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConflictError {
    /// A guarded decrement found less quantity than expected
    #[error("oversell: requested {requested}, available {available}")]
    Oversell {
        /// Requested quantity
        requested: Quantity,
        /// Quantity actually available
        available: Quantity,
    },
    /// The record changed since it was read
    #[error("record was modified concurrently")]
    Stale,
    /// The operation targeted an attempt that is no longer current
    #[error("attempt {requested} is not current (lot is on attempt {current})")]
    StaleAttempt {
        /// The attempt asked for
        requested: u32,
        /// The lot's attempt
        current: u32,
    },
    /// The dispute was already resolved differently
    #[error("dispute already resolved as {existing:?}")]
    AlreadyResolved {
        /// The recorded resolution
        existing: Resolution,
    },
}

/// Why a single fill could not be settled. The fill is rolled back as a
/// whole.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettlementFailure {
    /// The buyer's wallet cannot cover the debit
    #[error("buyer balance {balance} cannot cover {amount}")]
    InsufficientFunds {
        /// Buyer balance
        balance: Amount,
        /// Debit required
        amount: Amount,
    },
    /// A crop or pool no longer has the quantity
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    /// The value of the fill does not fit
    #[error("amount overflow")]
    Overflow,
}
