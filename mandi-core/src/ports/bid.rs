use crate::models::{Bid, BidId, BidRejection, LotId};
use std::future::Future;

/// Repository interface for the bid ledger.
pub trait BidRepository: super::Repository {
    /// Insert a bid, superseding the retailer's previous pending bid if given.
    ///
    /// The capacity check is repeated atomically with the insert: the lot
    /// must still be open on the bid's attempt with at least the bid's
    /// quantity available, otherwise the matching [`BidRejection`] is
    /// returned and nothing is written.
    fn place_bid(
        &self,
        bid: &Bid,
        supersedes: Option<BidId>,
    ) -> impl Future<Output = Result<Result<(), BidRejection>, Self::Error>> + Send;

    /// Retrieve a bid
    fn get_bid(&self, bid_id: BidId)
    -> impl Future<Output = Result<Option<Bid>, Self::Error>> + Send;

    /// Every bid placed in an attempt of a lot, in placement order
    fn bids_for(
        &self,
        lot_id: LotId,
        attempt_number: u32,
    ) -> impl Future<Output = Result<Vec<Bid>, Self::Error>> + Send;

    /// Reject a pending bid with a reason code. Non-pending bids are left alone.
    fn reject_bid(
        &self,
        bid_id: BidId,
        reason: BidRejection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
