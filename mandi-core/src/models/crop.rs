use super::{Amount, AuctionState, BiddingType, CropId, LotId, PoolId, QualityGrade, Quantity, UserId};
use crate::ValidationError;
use time::OffsetDateTime;

/// What a farmer submits to list a crop lot.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct CropListing {
    /// The commodity being sold, e.g. "wheat"
    pub commodity: String,
    /// The assessed grade
    pub grade: QualityGrade,
    /// The total quantity offered
    pub quantity: Quantity,
    /// The minimum acceptable price per unit
    pub floor_price: Amount,
    /// Open or sealed bidding
    #[cfg_attr(feature = "serde", serde(default))]
    pub bidding_type: BiddingType,
}

impl CropListing {
    /// Reject listings that could never be auctioned
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.commodity.trim().is_empty() {
            return Err(ValidationError::MissingCommodity);
        }
        if !self.quantity.is_positive() {
            return Err(ValidationError::NonPositiveQuantity(self.quantity));
        }
        if !self.floor_price.is_positive() {
            return Err(ValidationError::NonPositivePrice(self.floor_price));
        }
        Ok(())
    }
}

/// A single farmer's sellable lot.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Crop {
    /// The crop's id
    pub id: CropId,
    /// The farmer who owns the lot
    pub farmer_id: UserId,
    /// The commodity being sold
    pub commodity: String,
    /// The assessed grade
    pub grade: QualityGrade,
    /// The pool the crop belongs to, if any
    pub pool_id: Option<PoolId>,
    /// Auction bookkeeping
    pub auction: AuctionState,
    /// When the lot was listed
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub created_at: OffsetDateTime,
}

impl Crop {
    /// Build a draft crop from a validated listing
    pub fn new(
        id: CropId,
        farmer_id: UserId,
        listing: CropListing,
        created_at: OffsetDateTime,
    ) -> Result<Self, ValidationError> {
        listing.validate()?;
        Ok(Self {
            id,
            farmer_id,
            commodity: listing.commodity.trim().to_lowercase(),
            grade: listing.grade,
            pool_id: None,
            auction: AuctionState::draft(listing.bidding_type, listing.floor_price, listing.quantity),
            created_at,
        })
    }

    /// This crop as an auctionable lot id
    pub fn lot_id(&self) -> LotId {
        LotId::Crop(self.id)
    }

    /// Whether no quantity of this crop has been sold yet
    pub fn is_untouched(&self) -> bool {
        self.auction.available_quantity == self.auction.total_quantity
    }
}
