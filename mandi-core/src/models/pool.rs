use super::{
    Amount, AuctionState, BiddingType, Crop, CropId, LotId, LotStatus, PoolId, QualityGrade,
    Quantity, UserId, text_enum,
};
use time::OffsetDateTime;

/// The membership lifecycle of a pool.
///
/// The auction lifecycle of the pooled lot itself lives in its [`AuctionState`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolStatus {
    /// Accepting members until the threshold is reached
    Forming,
    /// Promoted to an auctionable unit; membership is frozen
    Locked,
    /// Gave up before reaching the threshold; members were released
    Dissolved,
}

text_enum!(PoolStatus {
    Forming => "forming",
    Locked => "locked",
    Dissolved => "dissolved",
});

/// One crop's contribution to a pool.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct PoolMember {
    /// The member crop
    pub crop_id: CropId,
    /// The farmer to credit for this member's share
    pub farmer_id: UserId,
    /// The quantity contributed
    pub quantity: Quantity,
    /// The member's own floor price
    pub floor_price: Amount,
}

/// Why a crop may not join (or leave) a pool.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PoolRejection {
    /// Only draft crops may be pooled
    #[error("crop is {0}, not draft")]
    NotDraft(LotStatus),
    /// The crop already belongs to a pool
    #[error("crop already belongs to pool {0}")]
    AlreadyPooled(PoolId),
    /// Some of the crop has already been sold
    #[error("crop has been partially sold")]
    PartiallySold,
    /// The crop is large enough to be auctioned on its own
    #[error("crop quantity {quantity} is not below the auctionable minimum {minimum}")]
    NotUndersized {
        /// The crop's quantity
        quantity: Quantity,
        /// The minimum auctionable quantity
        minimum: Quantity,
    },
    /// Pools only hold a single grade
    #[error("grade {crop} does not match pool grade {pool}")]
    GradeMismatch {
        /// The pool's grade
        pool: QualityGrade,
        /// The crop's grade
        crop: QualityGrade,
    },
    /// Pools only hold a single commodity
    #[error("commodity {crop} does not match pool commodity {pool}")]
    CommodityMismatch {
        /// The pool's commodity
        pool: String,
        /// The crop's commodity
        crop: String,
    },
    /// Pools only hold a single bidding type
    #[error("bidding type {crop} does not match pool bidding type {pool}")]
    BiddingTypeMismatch {
        /// The pool's bidding type
        pool: BiddingType,
        /// The crop's bidding type
        crop: BiddingType,
    },
    /// Membership is frozen
    #[error("pool is {0}")]
    NotForming(PoolStatus),
    /// The crop is not a member of the pool
    #[error("crop is not a member of this pool")]
    NotMember,
}

/// What `evaluate` decided for a pool at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolDecision {
    /// The threshold has been met
    Promote,
    /// The staleness deadline passed below threshold
    Dissolve,
    /// Keep collecting members
    Wait,
}

/// An aggregation of undersized crops auctioned as a single lot.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct PooledCrop {
    /// The pool's id
    pub id: PoolId,
    /// The commodity every member sells
    pub commodity: String,
    /// The grade every member has
    pub grade: QualityGrade,
    /// Membership status
    pub status: PoolStatus,
    /// The members' total must reach this before promotion
    pub threshold: Quantity,
    /// A forming pool is dissolved once this passes
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub stale_at: OffsetDateTime,
    /// Members in join order
    pub members: Vec<PoolMember>,
    /// Auction bookkeeping of the pooled lot
    pub auction: AuctionState,
    /// When the pool was created
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub created_at: OffsetDateTime,
}

impl PooledCrop {
    /// An empty forming pool for crops like `crop`
    pub fn new(
        id: PoolId,
        crop: &Crop,
        threshold: Quantity,
        stale_at: OffsetDateTime,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            commodity: crop.commodity.clone(),
            grade: crop.grade,
            status: PoolStatus::Forming,
            threshold,
            stale_at,
            members: Vec::new(),
            auction: AuctionState::draft(crop.auction.bidding_type, Amount::ZERO, Quantity::ZERO),
            created_at,
        }
    }

    /// This pool as an auctionable lot id
    pub fn lot_id(&self) -> LotId {
        LotId::Pool(self.id)
    }

    /// The combined quantity of all members
    pub fn pooled_quantity(&self) -> Quantity {
        self.members.iter().map(|m| m.quantity).sum()
    }

    /// Check that `crop` may join this pool. `minimum` is the smallest
    /// quantity that may be auctioned on its own.
    pub fn admits(&self, crop: &Crop, minimum: Quantity) -> Result<(), PoolRejection> {
        if self.status != PoolStatus::Forming {
            return Err(PoolRejection::NotForming(self.status));
        }
        if crop.auction.status != LotStatus::Draft {
            return Err(PoolRejection::NotDraft(crop.auction.status));
        }
        if let Some(pool_id) = crop.pool_id {
            return Err(PoolRejection::AlreadyPooled(pool_id));
        }
        if !crop.is_untouched() {
            return Err(PoolRejection::PartiallySold);
        }
        if crop.auction.total_quantity >= minimum {
            return Err(PoolRejection::NotUndersized {
                quantity: crop.auction.total_quantity,
                minimum,
            });
        }
        if crop.grade != self.grade {
            return Err(PoolRejection::GradeMismatch {
                pool: self.grade,
                crop: crop.grade,
            });
        }
        if crop.commodity != self.commodity {
            return Err(PoolRejection::CommodityMismatch {
                pool: self.commodity.clone(),
                crop: crop.commodity.clone(),
            });
        }
        if crop.auction.bidding_type != self.auction.bidding_type {
            return Err(PoolRejection::BiddingTypeMismatch {
                pool: self.auction.bidding_type,
                crop: crop.auction.bidding_type,
            });
        }
        Ok(())
    }

    /// Add an admitted crop to the pool
    pub fn push(&mut self, crop: &Crop) {
        self.members.push(PoolMember {
            crop_id: crop.id,
            farmer_id: crop.farmer_id,
            quantity: crop.auction.total_quantity,
            floor_price: crop.auction.floor_price,
        });
        self.refresh();
    }

    /// Remove a member from a forming pool
    pub fn remove(&mut self, crop_id: CropId) -> Result<PoolMember, PoolRejection> {
        if self.status != PoolStatus::Forming {
            return Err(PoolRejection::NotForming(self.status));
        }
        let index = self
            .members
            .iter()
            .position(|m| m.crop_id == crop_id)
            .ok_or(PoolRejection::NotMember)?;
        let member = self.members.remove(index);
        self.refresh();
        Ok(member)
    }

    /// Decide whether the pool should be promoted, dissolved, or left alone.
    ///
    /// Promotion is only ever possible at or above the threshold.
    pub fn evaluate(&self, now: OffsetDateTime) -> PoolDecision {
        if self.status != PoolStatus::Forming {
            PoolDecision::Wait
        } else if self.pooled_quantity() >= self.threshold && !self.members.is_empty() {
            PoolDecision::Promote
        } else if now >= self.stale_at {
            PoolDecision::Dissolve
        } else {
            PoolDecision::Wait
        }
    }

    /// Split `quantity` across members in join order, given each member's
    /// remaining availability.
    pub fn split(
        available: impl IntoIterator<Item = (CropId, Quantity)>,
        quantity: Quantity,
    ) -> Vec<(CropId, Quantity)> {
        let mut remaining = quantity;
        let mut slices = Vec::new();
        for (crop_id, available) in available {
            if !remaining.is_positive() {
                break;
            }
            let take = available.min(remaining);
            if take.is_positive() {
                slices.push((crop_id, take));
                remaining -= take;
            }
        }
        slices
    }

    // The pooled lot's quantity is the members' sum and its floor the strictest member floor
    fn refresh(&mut self) {
        let total = self.pooled_quantity();
        self.auction.total_quantity = total;
        self.auction.available_quantity = total;
        self.auction.floor_price = self
            .members
            .iter()
            .map(|m| m.floor_price)
            .max()
            .unwrap_or(Amount::ZERO);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CropListing;

    fn crop(quantity: i64, grade: QualityGrade, floor: i64) -> Crop {
        Crop::new(
            CropId::random(),
            UserId::random(),
            CropListing {
                commodity: "onion".into(),
                grade,
                quantity: Quantity(quantity),
                floor_price: Amount(floor),
                bidding_type: BiddingType::Open,
            },
            OffsetDateTime::UNIX_EPOCH,
        )
        .unwrap()
    }

    fn pool_for(first: &Crop) -> PooledCrop {
        let now = OffsetDateTime::UNIX_EPOCH;
        PooledCrop::new(
            PoolId::random(),
            first,
            Quantity(100),
            now + time::Duration::hours(1),
            now,
        )
    }

    #[test]
    fn grade_mismatch_is_rejected() {
        let a = crop(40, QualityGrade::A, 10);
        let b = crop(40, QualityGrade::B, 10);
        let pool = pool_for(&a);
        assert!(pool.admits(&a, Quantity(100)).is_ok());
        assert_eq!(
            pool.admits(&b, Quantity(100)),
            Err(PoolRejection::GradeMismatch {
                pool: QualityGrade::A,
                crop: QualityGrade::B
            })
        );
    }

    #[test]
    fn large_crops_are_not_pooled() {
        let big = crop(150, QualityGrade::A, 10);
        let pool = pool_for(&big);
        assert!(matches!(
            pool.admits(&big, Quantity(100)),
            Err(PoolRejection::NotUndersized { .. })
        ));
    }

    #[test]
    fn pool_floor_is_strictest_member() {
        let a = crop(40, QualityGrade::A, 10);
        let b = crop(30, QualityGrade::A, 14);
        let mut pool = pool_for(&a);
        pool.push(&a);
        pool.push(&b);
        assert_eq!(pool.auction.floor_price, Amount(14));
        assert_eq!(pool.auction.total_quantity, Quantity(70));
    }

    #[test]
    fn never_promotes_below_threshold() {
        let a = crop(60, QualityGrade::A, 10);
        let b = crop(39, QualityGrade::A, 10);
        let mut pool = pool_for(&a);
        pool.push(&a);
        pool.push(&b);
        assert_eq!(pool.evaluate(pool.created_at), PoolDecision::Wait);
        assert_eq!(pool.evaluate(pool.stale_at), PoolDecision::Dissolve);

        let c = crop(1, QualityGrade::A, 10);
        pool.push(&c);
        assert_eq!(pool.evaluate(pool.stale_at), PoolDecision::Promote);
    }

    #[test]
    fn split_follows_join_order() {
        let (a, b, c) = (CropId::random(), CropId::random(), CropId::random());
        let slices = PooledCrop::split(
            [(a, Quantity(30)), (b, Quantity(0)), (c, Quantity(50))],
            Quantity(45),
        );
        assert_eq!(slices, vec![(a, Quantity(30)), (c, Quantity(15))]);
    }
}
