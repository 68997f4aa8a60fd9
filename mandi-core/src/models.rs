mod amount;
mod bid;
mod config;
mod crop;
mod dispute;
mod event;
mod ids;
mod lot;
mod pool;
mod transaction;
mod user;
mod wallet;

pub use amount::{Amount, Quantity};
pub use bid::{Bid, BidRejection, BidStatus, BidView};
pub use config::{AuctionConfig, DisputeConfig, MarketConfig, PoolingConfig, SettlementConfig};
pub use crop::{Crop, CropListing};
pub use dispute::{Dispute, DisputeRejection, DisputeStatus, Resolution};
pub use event::MarketEvent;
pub use ids::{BidId, CropId, DisputeId, EntryId, LotId, PoolId, TransactionId, UserId};
pub use lot::{
    AuctionState, BiddingType, BiddingWindow, Closing, LotEvent, LotStatus, QualityGrade, Schedule,
    UnknownVariant,
};
pub use pool::{PoolDecision, PoolMember, PoolRejection, PoolStatus, PooledCrop};
pub use transaction::{OrderStatus, PaymentStatus, Transaction};
pub use user::{Role, User};
pub use wallet::{EntryKind, EntryState, Wallet, WalletEntry, ledger_balance};

pub(crate) use lot::text_enum;

/// A crop or a pool, viewed through what they have in common: an auction.
#[derive(Debug, Clone, PartialEq)]
pub enum Lot {
    /// A standalone crop
    Crop(Crop),
    /// A pool of crops
    Pool(PooledCrop),
}

impl Lot {
    /// The lot's id
    pub fn id(&self) -> LotId {
        match self {
            Self::Crop(crop) => crop.lot_id(),
            Self::Pool(pool) => pool.lot_id(),
        }
    }

    /// The lot's auction bookkeeping
    pub fn auction(&self) -> &AuctionState {
        match self {
            Self::Crop(crop) => &crop.auction,
            Self::Pool(pool) => &pool.auction,
        }
    }

    /// Mutable access to the lot's auction bookkeeping
    pub fn auction_mut(&mut self) -> &mut AuctionState {
        match self {
            Self::Crop(crop) => &mut crop.auction,
            Self::Pool(pool) => &mut pool.auction,
        }
    }

    /// Whether `user` is a seller of this lot
    pub fn is_seller(&self, user: UserId) -> bool {
        match self {
            Self::Crop(crop) => crop.farmer_id == user,
            Self::Pool(pool) => pool.members.iter().any(|m| m.farmer_id == user),
        }
    }
}
