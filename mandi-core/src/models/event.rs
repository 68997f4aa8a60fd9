use super::{Amount, BidId, Closing, DisputeId, LotId, PoolId, Quantity, Resolution, TransactionId};
use time::OffsetDateTime;

/// Fire-and-forget notifications for the reporting, notification and audit
/// subsystems.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "event", rename_all = "snake_case"))]
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    /// A lot was placed on the calendar
    LotScheduled {
        /// The lot
        lot_id: LotId,
        /// The attempt being scheduled
        attempt_number: u32,
        /// Planned opening
        #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
        start: OffsetDateTime,
    },
    /// A lot started accepting bids
    LotOpened {
        /// The lot
        lot_id: LotId,
        /// The attempt that opened
        attempt_number: u32,
        /// Bidding ends at
        #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
        closes_at: OffsetDateTime,
    },
    /// A lot closed without bids and was scheduled again
    LotRelisted {
        /// The lot
        lot_id: LotId,
        /// The new attempt
        attempt_number: u32,
        /// Planned opening of the new attempt
        #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
        start: OffsetDateTime,
    },
    /// A lot's bidding ended
    LotClosed {
        /// The lot
        lot_id: LotId,
        /// The attempt that closed
        attempt_number: u32,
        /// Sold or unsold
        closing: Closing,
        /// Quantity sold in this attempt
        sold: Quantity,
    },
    /// A lot stuck open past its grace period was closed by the sweep
    LotForceClosed {
        /// The lot
        lot_id: LotId,
        /// The attempt that was stuck
        attempt_number: u32,
    },
    /// A fill became a transaction with ledger postings
    SettlementCompleted {
        /// The accepted bid
        bid_id: BidId,
        /// The transactions created (one per crop slice)
        transactions: Vec<TransactionId>,
        /// Gross value
        amount: Amount,
    },
    /// A fill was rolled back
    SettlementFailed {
        /// The bid whose fill failed
        bid_id: BidId,
        /// The lot
        lot_id: LotId,
        /// Why
        reason: String,
    },
    /// A pool reached its threshold and was scheduled
    PoolPromoted {
        /// The pool
        pool_id: PoolId,
        /// Combined quantity
        quantity: Quantity,
    },
    /// A pool went stale and released its members
    PoolDissolved {
        /// The pool
        pool_id: PoolId,
    },
    /// A transaction was challenged
    DisputeOpened {
        /// The dispute
        dispute_id: DisputeId,
        /// The challenged transaction
        transaction_id: TransactionId,
    },
    /// A dispute reached a terminal status
    DisputeResolved {
        /// The dispute
        dispute_id: DisputeId,
        /// The challenged transaction
        transaction_id: TransactionId,
        /// How it ended
        resolution: Resolution,
    },
}
