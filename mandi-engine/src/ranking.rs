//! Winner selection at the close of a bidding window.
//!
//! Pure functions: the engine loads the attempt's bids, asks for an
//! [`Allocation`], and then settles the fills one at a time.

use mandi_core::models::{Amount, Bid, BidId, BidRejection, BidStatus, Quantity, UserId};
use std::cmp::Reverse;

/// A winning bid and the quantity it is awarded.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    /// The winning bid
    pub bid_id: BidId,
    /// The buyer
    pub retailer_id: UserId,
    /// The quantity awarded (at most the bid's quantity)
    pub quantity: Quantity,
    /// The price per unit the buyer offered
    pub price: Amount,
}

/// The outcome of ranking an attempt's bids against a lot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Allocation {
    /// Fills in ranking order
    pub fills: Vec<Fill>,
    /// Pending bids that lost, with the reason
    pub rejected: Vec<(BidId, BidRejection)>,
}

impl Allocation {
    /// The total quantity awarded
    pub fn quantity(&self) -> Quantity {
        self.fills.iter().map(|fill| fill.quantity).sum()
    }
}

/// Order bids by price (highest first), then by placement time (earliest
/// first), then by id so that the order is total.
pub fn rank(bids: &mut [&Bid]) {
    bids.sort_by_key(|bid| (Reverse(bid.price), bid.placed_at, bid.id));
}

/// Award `available` to the pending bids in ranking order.
///
/// Bids below `floor` lose with `BelowFloor`. When a bid wants more than
/// what is left, it is cut down if `partial` allows it and otherwise
/// passed over in favour of lower-ranked bids that still fit.
pub fn allocate(bids: &[Bid], available: Quantity, floor: Amount, partial: bool) -> Allocation {
    let mut allocation = Allocation::default();
    let mut ranked: Vec<&Bid> = Vec::with_capacity(bids.len());

    for bid in bids.iter().filter(|bid| bid.status == BidStatus::Pending) {
        if bid.price < floor {
            allocation.rejected.push((bid.id, BidRejection::BelowFloor));
        } else {
            ranked.push(bid);
        }
    }
    rank(&mut ranked);

    let mut remaining = available;
    for bid in ranked {
        let quantity = if !remaining.is_positive() {
            allocation.rejected.push((bid.id, BidRejection::Outbid));
            continue;
        } else if bid.quantity <= remaining {
            bid.quantity
        } else if partial {
            remaining
        } else {
            allocation.rejected.push((bid.id, BidRejection::NoPartialFill));
            continue;
        };

        remaining -= quantity;
        allocation.fills.push(Fill {
            bid_id: bid.id,
            retailer_id: bid.retailer_id,
            quantity,
            price: bid.price,
        });
    }

    allocation
}

#[cfg(test)]
mod tests {
    use super::*;
    use mandi_core::models::{CropId, LotId};
    use rstest::rstest;
    use time::OffsetDateTime;

    fn bid(quantity: i64, price: i64, offset_secs: i64) -> Bid {
        Bid {
            id: BidId::random(),
            lot_id: LotId::Crop(CropId(uuid::Uuid::nil())),
            attempt_number: 1,
            retailer_id: UserId::random(),
            quantity: Quantity(quantity),
            price: Amount(price),
            placed_at: OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(offset_secs),
            status: BidStatus::Pending,
            filled_quantity: Quantity::ZERO,
            rejection: None,
        }
    }

    #[test]
    fn earlier_bid_wins_a_price_tie() {
        let bids = vec![bid(100, 12, 0), bid(100, 15, 10), bid(100, 15, 5)];
        let allocation = allocate(&bids, Quantity(100), Amount(10), true);

        assert_eq!(allocation.fills.len(), 1);
        assert_eq!(allocation.fills[0].bid_id, bids[2].id);
        assert_eq!(allocation.fills[0].price, Amount(15));
        assert!(
            allocation
                .rejected
                .iter()
                .all(|(_, reason)| *reason == BidRejection::Outbid)
        );
    }

    #[test]
    fn second_bid_is_cut_to_what_remains() {
        let bids = vec![bid(60, 20, 0), bid(50, 18, 1)];
        let allocation = allocate(&bids, Quantity(100), Amount(10), true);

        let quantities: Vec<_> = allocation.fills.iter().map(|f| f.quantity).collect();
        assert_eq!(quantities, vec![Quantity(60), Quantity(40)]);
        assert_eq!(allocation.quantity(), Quantity(100));
        assert!(allocation.rejected.is_empty());
    }

    #[rstest]
    #[case::partial_allowed(true, vec![60, 40])]
    #[case::whole_bids_only(false, vec![60, 30])]
    fn partial_policy(#[case] partial: bool, #[case] expected: Vec<i64>) {
        let bids = vec![bid(60, 20, 0), bid(50, 18, 1), bid(30, 16, 2)];
        let allocation = allocate(&bids, Quantity(100), Amount(10), partial);
        let quantities: Vec<_> = allocation.fills.iter().map(|f| f.quantity.0).collect();
        assert_eq!(quantities, expected);
    }

    #[test]
    fn below_floor_and_settled_bids_are_skipped() {
        let mut accepted = bid(10, 30, 0);
        accepted.status = BidStatus::Accepted;
        let low = bid(10, 9, 1);
        let bids = vec![accepted, low.clone()];

        let allocation = allocate(&bids, Quantity(100), Amount(10), true);
        assert!(allocation.fills.is_empty());
        assert_eq!(allocation.rejected, vec![(low.id, BidRejection::BelowFloor)]);
    }
}
