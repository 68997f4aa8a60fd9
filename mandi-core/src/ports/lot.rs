use crate::ConflictError;
use crate::models::{AuctionState, Crop, CropId, Lot, LotId, LotStatus, Quantity, UserId};
use std::future::Future;
use time::OffsetDateTime;

/// What happened when an attempt of a lot closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// At least one fill settled
    Sold {
        /// Total quantity settled in this attempt
        quantity: Quantity,
    },
    /// No valid bid; the lot was scheduled for another attempt
    Relisted,
    /// Every fill failed settlement; the lot may be rescheduled by hand
    Unsold,
    /// No valid bid and no attempt remains; the lot stays unsold for good
    Exhausted,
    /// Closed by the reconciliation sweep after the normal close kept failing
    ForcedUnsold,
}

impl CloseOutcome {
    /// The storage representation of the outcome kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sold { .. } => "sold",
            Self::Relisted => "relisted",
            Self::Unsold => "unsold",
            Self::Exhausted => "exhausted",
            Self::ForcedUnsold => "forced_unsold",
        }
    }

    /// Rebuild an outcome from its storage representation
    pub fn from_parts(kind: &str, quantity: Quantity) -> Option<Self> {
        match kind {
            "sold" => Some(Self::Sold { quantity }),
            "relisted" => Some(Self::Relisted),
            "unsold" => Some(Self::Unsold),
            "exhausted" => Some(Self::Exhausted),
            "forced_unsold" => Some(Self::ForcedUnsold),
            _ => None,
        }
    }

    /// Whether the lot may be put back on the calendar after this outcome
    pub fn allows_reschedule(&self) -> bool {
        !matches!(self, Self::Exhausted)
    }

    /// The quantity sold, zero unless sold
    pub fn sold(&self) -> Quantity {
        match self {
            Self::Sold { quantity } => *quantity,
            _ => Quantity::ZERO,
        }
    }
}

/// The idempotency record of a processed close, keyed by lot and attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosingRecord {
    /// The lot
    pub lot_id: LotId,
    /// The attempt that closed
    pub attempt_number: u32,
    /// What happened
    pub outcome: CloseOutcome,
    /// When it was processed
    pub closed_at: OffsetDateTime,
}

/// Repository interface for the lot registry and the auction calendar.
///
/// Auction state writes are guarded by the status and attempt the caller
/// last observed; a mismatch yields a [`ConflictError`] rather than
/// clobbering a concurrent change. Quantities are never written here: they
/// only move through settlement.
///
/// Whenever a pool's auction reaches a terminal status, the same write
/// releases its members: those with nothing left become `Closed(Sold)`, the
/// rest return to unpooled drafts.
pub trait LotRepository: super::Repository {
    /// Persist a newly listed crop
    fn create_crop(&self, crop: &Crop) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Retrieve a crop
    fn get_crop(
        &self,
        crop_id: CropId,
    ) -> impl Future<Output = Result<Option<Crop>, Self::Error>> + Send;

    /// Retrieve a crop or pool as a lot
    fn get_lot(
        &self,
        lot_id: LotId,
    ) -> impl Future<Output = Result<Option<Lot>, Self::Error>> + Send;

    /// All crops listed by a farmer, newest first
    fn crops_by_farmer(
        &self,
        farmer_id: UserId,
    ) -> impl Future<Output = Result<Vec<Crop>, Self::Error>> + Send;

    /// Overwrite the status, schedule, window and attempt of a lot, provided
    /// it is still in `expected` (status, attempt).
    fn update_auction(
        &self,
        lot_id: LotId,
        expected: (LotStatus, u32),
        state: &AuctionState,
    ) -> impl Future<Output = Result<Result<(), ConflictError>, Self::Error>> + Send;

    /// Atomically write the post-close auction state and the closing record.
    ///
    /// Fails with a conflict if the lot moved away from `expected` or a
    /// record for the same (lot, attempt) already exists.
    fn finish_close(
        &self,
        record: &ClosingRecord,
        expected: (LotStatus, u32),
        state: &AuctionState,
    ) -> impl Future<Output = Result<Result<(), ConflictError>, Self::Error>> + Send;

    /// The closing record of an attempt, if it has been processed
    fn get_closing(
        &self,
        lot_id: LotId,
        attempt_number: u32,
    ) -> impl Future<Output = Result<Option<ClosingRecord>, Self::Error>> + Send;

    /// Scheduled lots whose start is at or before `now`, with their current
    /// attempt
    fn lots_due_to_open(
        &self,
        now: OffsetDateTime,
    ) -> impl Future<Output = Result<Vec<(LotId, u32)>, Self::Error>> + Send;

    /// Open lots whose window ended at or before `now`, with their current
    /// attempt
    fn lots_due_to_close(
        &self,
        now: OffsetDateTime,
    ) -> impl Future<Output = Result<Vec<(LotId, u32)>, Self::Error>> + Send;
}
