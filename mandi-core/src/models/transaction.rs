use super::{Amount, BidId, CropId, LotId, Quantity, TransactionId, UserId, text_enum};
use time::OffsetDateTime;

/// Where the money of a transaction stands.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentStatus {
    /// Created at auction close, awaiting the buyer's payment
    PendingPayment,
    /// Payment confirmed
    Paid,
    /// Reversed in the buyer's favour by a dispute
    Refunded,
}

text_enum!(PaymentStatus {
    PendingPayment => "pending_payment",
    Paid => "paid",
    Refunded => "refunded",
});

/// Where the goods of a transaction stand.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    /// Awaiting dispatch
    Confirmed,
    /// Handed to the carrier
    Dispatched,
    /// Received by the retailer
    Delivered,
}

text_enum!(OrderStatus {
    Confirmed => "confirmed",
    Dispatched => "dispatched",
    Delivered => "delivered",
});

impl OrderStatus {
    /// The next fulfilment step, if any
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Confirmed => Some(Self::Dispatched),
            Self::Dispatched => Some(Self::Delivered),
            Self::Delivered => None,
        }
    }
}

/// The settlement record of one accepted bid (or, for a pooled lot, of one
/// member's slice of it).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    /// The transaction's id
    pub id: TransactionId,
    /// The accepted bid
    pub bid_id: BidId,
    /// The lot that was auctioned
    pub lot_id: LotId,
    /// The lot attempt that produced this transaction
    pub attempt_number: u32,
    /// The crop the goods come from
    pub crop_id: CropId,
    /// The selling farmer
    pub farmer_id: UserId,
    /// The buying retailer
    pub retailer_id: UserId,
    /// Quantity purchased
    pub quantity: Quantity,
    /// Agreed price per unit
    pub unit_price: Amount,
    /// `unit_price * quantity`
    pub amount: Amount,
    /// Payment status
    pub payment_status: PaymentStatus,
    /// Fulfilment status
    pub order_status: OrderStatus,
    /// When the transaction was created
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub created_at: OffsetDateTime,
    /// When payment was confirmed
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339::option"))]
    pub paid_at: Option<OffsetDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fulfilment_is_linear() {
        assert_eq!(OrderStatus::Confirmed.next(), Some(OrderStatus::Dispatched));
        assert_eq!(OrderStatus::Dispatched.next(), Some(OrderStatus::Delivered));
        assert_eq!(OrderStatus::Delivered.next(), None);
    }
}
