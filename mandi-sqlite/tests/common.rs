#![allow(dead_code)]

use mandi_core::models::{
    Amount, Bid, BidId, BidStatus, BiddingType, BiddingWindow, Crop, CropId, CropListing, LotEvent,
    LotId, LotStatus, QualityGrade, Quantity, Role, Schedule, User, UserId,
};
use mandi_core::ports::LotRepository as _;
use mandi_sqlite::{Db, config::SqliteConfig};
use std::time::Duration;
use time::OffsetDateTime;

pub const HOUR: Duration = Duration::from_secs(3600);

pub async fn open() -> anyhow::Result<Db> {
    Ok(Db::open(&SqliteConfig::default()).await?)
}

pub async fn user(db: &Db, role: Role) -> anyhow::Result<UserId> {
    let id = UserId::random();
    db.register_user(&User {
        id,
        name: format!("{role} {id}"),
        role,
    })
    .await?;
    Ok(id)
}

pub fn listing(quantity: i64, floor: i64) -> CropListing {
    CropListing {
        commodity: "onion".into(),
        grade: QualityGrade::A,
        quantity: Quantity(quantity),
        floor_price: Amount(floor),
        bidding_type: BiddingType::Open,
    }
}

/// A draft crop, stored
pub async fn draft(
    db: &Db,
    farmer: UserId,
    quantity: i64,
    floor: i64,
    now: OffsetDateTime,
) -> anyhow::Result<Crop> {
    let crop = Crop::new(CropId::random(), farmer, listing(quantity, floor), now)?;
    db.create_crop(&crop).await?;
    Ok(crop)
}

/// A crop whose first bidding window opened at `now` and runs for an hour
pub async fn open_crop(
    db: &Db,
    farmer: UserId,
    quantity: i64,
    floor: i64,
    now: OffsetDateTime,
) -> anyhow::Result<Crop> {
    let mut crop = draft(db, farmer, quantity, floor, now).await?;
    open_lot(db, crop.lot_id(), &mut crop.auction, now).await?;
    Ok(crop)
}

pub async fn open_lot(
    db: &Db,
    lot_id: LotId,
    auction: &mut mandi_core::models::AuctionState,
    now: OffsetDateTime,
) -> anyhow::Result<()> {
    let expected = (auction.status, auction.attempt_number);
    auction.transition(LotEvent::Schedule)?;
    auction.schedule = Some(Schedule {
        start: now,
        duration: HOUR,
    });
    db.update_auction(lot_id, expected, auction).await??;

    auction.transition(LotEvent::Open)?;
    auction.window = Some(BiddingWindow {
        start: now,
        end: now + HOUR,
    });
    db.update_auction(lot_id, (LotStatus::Scheduled, auction.attempt_number), auction)
        .await??;
    Ok(())
}

pub fn bid(lot_id: LotId, retailer: UserId, quantity: i64, price: i64, at: OffsetDateTime) -> Bid {
    Bid {
        id: BidId::random(),
        lot_id,
        attempt_number: 1,
        retailer_id: retailer,
        quantity: Quantity(quantity),
        price: Amount(price),
        placed_at: at,
        status: BidStatus::Pending,
        filled_quantity: Quantity::ZERO,
        rejection: None,
    }
}
