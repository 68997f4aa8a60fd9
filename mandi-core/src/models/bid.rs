use super::{Amount, BidId, BiddingType, LotId, LotStatus, Quantity, UserId, text_enum};
use time::OffsetDateTime;

/// The state of a bid.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BidStatus {
    /// Waiting for the lot to close
    Pending,
    /// Won (possibly partially) and settled
    Accepted,
    /// Lost, invalid at close, or failed to settle
    Rejected,
    /// Replaced by a later bid from the same retailer
    Superseded,
}

text_enum!(BidStatus {
    Pending => "pending",
    Accepted => "accepted",
    Rejected => "rejected",
    Superseded => "superseded",
});

/// Reason codes returned to a retailer whose bid is refused, or recorded on
/// a bid rejected at close.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum BidRejection {
    /// The lot is not accepting bids
    #[error("lot is {0}, not open")]
    LotNotOpen(LotStatus),
    /// The bidding window has elapsed
    #[error("bidding window has closed")]
    WindowClosed,
    /// The quantity must be positive
    #[error("quantity must be positive")]
    NonPositiveQuantity,
    /// The quantity exceeds what is still available
    #[error("quantity {requested} exceeds available {available}")]
    ExceedsAvailable {
        /// What was asked for
        requested: Quantity,
        /// What the lot still has
        available: Quantity,
    },
    /// The price must be positive
    #[error("price must be positive")]
    NonPositivePrice,
    /// The price is below the lot's floor
    #[error("price is below the floor price")]
    BelowFloor,
    /// An open-auction rebid may not lower the retailer's standing price
    #[error("price {offered} is below the standing bid of {standing}")]
    PriceDecrease {
        /// The new price
        offered: Amount,
        /// The retailer's current price
        standing: Amount,
    },
    /// Sellers may not bid on their own lot
    #[error("sellers may not bid on their own lot")]
    OwnLot,
    /// The bidder is not a registered retailer
    #[error("bidder is not a retailer")]
    NotRetailer,
    /// Lost the ranking; nothing left to fill
    #[error("outbid")]
    Outbid,
    /// A sealed bid could not be filled in full
    #[error("bid could not be filled in full")]
    NoPartialFill,
    /// The fill was rolled back during settlement
    #[error("settlement failed")]
    SettlementFailed,
}

impl BidRejection {
    /// A stable reason code for storage and client display
    pub fn code(&self) -> &'static str {
        match self {
            Self::LotNotOpen(_) => "lot_not_open",
            Self::WindowClosed => "window_closed",
            Self::NonPositiveQuantity => "non_positive_quantity",
            Self::ExceedsAvailable { .. } => "exceeds_available",
            Self::NonPositivePrice => "non_positive_price",
            Self::BelowFloor => "below_floor",
            Self::PriceDecrease { .. } => "price_decrease",
            Self::OwnLot => "own_lot",
            Self::NotRetailer => "not_retailer",
            Self::Outbid => "outbid",
            Self::NoPartialFill => "no_partial_fill",
            Self::SettlementFailed => "settlement_failed",
        }
    }
}

/// A retailer's offer against a lot.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Bid {
    /// The bid's id
    pub id: BidId,
    /// The lot bid upon
    pub lot_id: LotId,
    /// The lot attempt the bid belongs to
    pub attempt_number: u32,
    /// The bidding retailer
    pub retailer_id: UserId,
    /// Requested quantity
    pub quantity: Quantity,
    /// Offered price per unit
    pub price: Amount,
    /// When the bid was placed
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub placed_at: OffsetDateTime,
    /// Current status
    pub status: BidStatus,
    /// Quantity awarded at close
    pub filled_quantity: Quantity,
    /// The reason code of a rejected bid
    pub rejection: Option<String>,
}

/// A bid as another party is allowed to see it.
///
/// In a sealed auction the price of a competitor's bid is withheld until
/// the lot closes.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct BidView {
    /// The bid's id
    pub id: BidId,
    /// The bidding retailer
    pub retailer_id: UserId,
    /// Requested quantity
    pub quantity: Quantity,
    /// Offered price, if visible to the viewer
    pub price: Option<Amount>,
    /// When the bid was placed
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub placed_at: OffsetDateTime,
    /// Current status
    pub status: BidStatus,
}

impl Bid {
    /// The view of this bid for `viewer`
    pub fn view_for(&self, viewer: UserId, bidding_type: BiddingType, lot: LotStatus) -> BidView {
        let hidden = bidding_type == BiddingType::Sealed
            && viewer != self.retailer_id
            && !lot.is_terminal();
        BidView {
            id: self.id,
            retailer_id: self.retailer_id,
            quantity: self.quantity,
            price: (!hidden).then_some(self.price),
            placed_at: self.placed_at,
            status: self.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Closing, CropId};

    fn bid(retailer_id: UserId) -> Bid {
        Bid {
            id: BidId::random(),
            lot_id: LotId::Crop(CropId::random()),
            attempt_number: 1,
            retailer_id,
            quantity: Quantity(10),
            price: Amount(25),
            placed_at: OffsetDateTime::UNIX_EPOCH,
            status: BidStatus::Pending,
            filled_quantity: Quantity::ZERO,
            rejection: None,
        }
    }

    #[test]
    fn sealed_prices_are_hidden_from_competitors() {
        let owner = UserId::random();
        let other = UserId::random();
        let bid = bid(owner);

        let sealed = BiddingType::Sealed;
        assert_eq!(bid.view_for(other, sealed, LotStatus::Open).price, None);
        assert_eq!(
            bid.view_for(owner, sealed, LotStatus::Open).price,
            Some(Amount(25))
        );
        assert_eq!(
            bid.view_for(other, sealed, LotStatus::Closed(Closing::Sold))
                .price,
            Some(Amount(25))
        );
        assert_eq!(
            bid.view_for(other, BiddingType::Open, LotStatus::Open).price,
            Some(Amount(25))
        );
    }
}
