//! Type definitions for the SQLite implementation.
//!
//! [`DateTime`] is the public storage representation of timestamps. The
//! remaining types map database rows onto the core models; enums are stored
//! as their text form and checked on the way out.

use mandi_core::models::{
    Amount, AuctionState, Bid, BiddingWindow, Crop, Dispute, LotId, PoolMember, PooledCrop,
    Quantity, Schedule, Transaction, User, Wallet, WalletEntry,
};
use mandi_core::ports::{CloseOutcome, ClosingRecord};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

mod datetime;
pub use datetime::DateTime;

/// Parse a stored text column into its enum
pub(crate) fn parse<T>(text: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    text.parse().map_err(|err| sqlx::Error::Decode(Box::new(err)))
}

pub(crate) fn lot_id(kind: &str, id: Uuid) -> Result<LotId, sqlx::Error> {
    LotId::from_parts(kind, id).ok_or_else(|| {
        sqlx::Error::Decode(format!("unknown lot kind: {kind}").into())
    })
}

pub(crate) fn attempt(value: i64) -> Result<u32, sqlx::Error> {
    u32::try_from(value).map_err(|err| sqlx::Error::Decode(Box::new(err)))
}

pub(crate) fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// The auction columns shared by `crop` and `pool`
#[derive(sqlx::FromRow)]
pub(crate) struct AuctionRow {
    pub lot_status: String,
    pub bidding_type: String,
    pub floor_price: i64,
    pub total_quantity: i64,
    pub available_quantity: i64,
    pub schedule_start: Option<DateTime>,
    pub schedule_ms: Option<i64>,
    pub window_start: Option<DateTime>,
    pub window_end: Option<DateTime>,
    pub attempt_number: i64,
}

impl TryFrom<AuctionRow> for AuctionState {
    type Error = sqlx::Error;

    fn try_from(row: AuctionRow) -> Result<Self, Self::Error> {
        let schedule = match (row.schedule_start, row.schedule_ms) {
            (Some(start), Some(ms)) => Some(Schedule {
                start: start.into(),
                duration: Duration::from_millis(ms.max(0) as u64),
            }),
            _ => None,
        };
        let window = match (row.window_start, row.window_end) {
            (Some(start), Some(end)) => Some(BiddingWindow {
                start: start.into(),
                end: end.into(),
            }),
            _ => None,
        };
        Ok(Self {
            status: parse(&row.lot_status)?,
            bidding_type: parse(&row.bidding_type)?,
            floor_price: Amount(row.floor_price),
            total_quantity: Quantity(row.total_quantity),
            available_quantity: Quantity(row.available_quantity),
            schedule,
            window,
            attempt_number: attempt(row.attempt_number)?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub role: String,
}

impl TryFrom<UserRow> for User {
    type Error = sqlx::Error;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            name: row.name,
            role: parse(&row.role)?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct CropRow {
    pub id: Uuid,
    pub farmer_id: Uuid,
    pub commodity: String,
    pub grade: String,
    pub pool_id: Option<Uuid>,
    pub created_at: DateTime,
    #[sqlx(flatten)]
    pub auction: AuctionRow,
}

impl TryFrom<CropRow> for Crop {
    type Error = sqlx::Error;

    fn try_from(row: CropRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            farmer_id: row.farmer_id.into(),
            commodity: row.commodity,
            grade: parse(&row.grade)?,
            pool_id: row.pool_id.map(Into::into),
            auction: row.auction.try_into()?,
            created_at: row.created_at.into(),
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct PoolRow {
    pub id: Uuid,
    pub commodity: String,
    pub grade: String,
    pub status: String,
    pub threshold: i64,
    pub stale_at: DateTime,
    pub created_at: DateTime,
    #[sqlx(flatten)]
    pub auction: AuctionRow,
}

impl PoolRow {
    pub fn into_pool(self, members: Vec<PoolMember>) -> Result<PooledCrop, sqlx::Error> {
        Ok(PooledCrop {
            id: self.id.into(),
            commodity: self.commodity,
            grade: parse(&self.grade)?,
            status: parse(&self.status)?,
            threshold: Quantity(self.threshold),
            stale_at: self.stale_at.into(),
            members,
            auction: self.auction.try_into()?,
            created_at: self.created_at.into(),
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct MemberRow {
    pub crop_id: Uuid,
    pub farmer_id: Uuid,
    pub quantity: i64,
    pub floor_price: i64,
}

impl From<MemberRow> for PoolMember {
    fn from(row: MemberRow) -> Self {
        Self {
            crop_id: row.crop_id.into(),
            farmer_id: row.farmer_id.into(),
            quantity: Quantity(row.quantity),
            floor_price: Amount(row.floor_price),
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct LotRef {
    pub lot_kind: String,
    pub lot_id: Uuid,
    pub attempt_number: i64,
}

impl LotRef {
    pub fn parts(self) -> Result<(LotId, u32), sqlx::Error> {
        Ok((lot_id(&self.lot_kind, self.lot_id)?, attempt(self.attempt_number)?))
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ClosingRow {
    pub lot_kind: String,
    pub lot_id: Uuid,
    pub attempt_number: i64,
    pub outcome: String,
    pub sold_quantity: i64,
    pub closed_at: DateTime,
}

impl TryFrom<ClosingRow> for ClosingRecord {
    type Error = sqlx::Error;

    fn try_from(row: ClosingRow) -> Result<Self, Self::Error> {
        let outcome = CloseOutcome::from_parts(&row.outcome, Quantity(row.sold_quantity))
            .ok_or_else(|| {
                sqlx::Error::Decode(format!("unknown close outcome: {}", row.outcome).into())
            })?;
        Ok(Self {
            lot_id: lot_id(&row.lot_kind, row.lot_id)?,
            attempt_number: attempt(row.attempt_number)?,
            outcome,
            closed_at: row.closed_at.into(),
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct BidRow {
    pub id: Uuid,
    pub lot_kind: String,
    pub lot_id: Uuid,
    pub attempt_number: i64,
    pub retailer_id: Uuid,
    pub quantity: i64,
    pub price: i64,
    pub placed_at: DateTime,
    pub status: String,
    pub filled_quantity: i64,
    pub rejection: Option<String>,
}

impl TryFrom<BidRow> for Bid {
    type Error = sqlx::Error;

    fn try_from(row: BidRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            lot_id: lot_id(&row.lot_kind, row.lot_id)?,
            attempt_number: attempt(row.attempt_number)?,
            retailer_id: row.retailer_id.into(),
            quantity: Quantity(row.quantity),
            price: Amount(row.price),
            placed_at: row.placed_at.into(),
            status: parse(&row.status)?,
            filled_quantity: Quantity(row.filled_quantity),
            rejection: row.rejection,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct SaleRow {
    pub id: Uuid,
    pub bid_id: Uuid,
    pub lot_kind: String,
    pub lot_id: Uuid,
    pub attempt_number: i64,
    pub crop_id: Uuid,
    pub farmer_id: Uuid,
    pub retailer_id: Uuid,
    pub quantity: i64,
    pub unit_price: i64,
    pub amount: i64,
    pub payment_status: String,
    pub order_status: String,
    pub created_at: DateTime,
    pub paid_at: Option<DateTime>,
}

impl TryFrom<SaleRow> for Transaction {
    type Error = sqlx::Error;

    fn try_from(row: SaleRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            bid_id: row.bid_id.into(),
            lot_id: lot_id(&row.lot_kind, row.lot_id)?,
            attempt_number: attempt(row.attempt_number)?,
            crop_id: row.crop_id.into(),
            farmer_id: row.farmer_id.into(),
            retailer_id: row.retailer_id.into(),
            quantity: Quantity(row.quantity),
            unit_price: Amount(row.unit_price),
            amount: Amount(row.amount),
            payment_status: parse(&row.payment_status)?,
            order_status: parse(&row.order_status)?,
            created_at: row.created_at.into(),
            paid_at: row.paid_at.map(Into::into),
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct WalletRow {
    pub user_id: Uuid,
    pub balance: i64,
    pub updated_at: DateTime,
}

impl From<WalletRow> for Wallet {
    fn from(row: WalletRow) -> Self {
        Self {
            user_id: row.user_id.into(),
            balance: Amount(row.balance),
            updated_at: row.updated_at.into(),
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct EntryRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub kind: String,
    pub state: String,
    pub transaction_id: Option<Uuid>,
    pub description: String,
    pub created_at: DateTime,
}

impl TryFrom<EntryRow> for WalletEntry {
    type Error = sqlx::Error;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            user_id: row.user_id.into(),
            amount: Amount(row.amount),
            kind: parse(&row.kind)?,
            state: parse(&row.state)?,
            transaction_id: row.transaction_id.map(Into::into),
            description: row.description,
            created_at: row.created_at.into(),
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct DisputeRow {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub raised_by: Uuid,
    pub reason: String,
    pub evidence: sqlx::types::Json<Vec<String>>,
    pub status: String,
    pub opened_at: DateTime,
    pub resolved_at: Option<DateTime>,
    pub resolution_note: Option<String>,
}

impl TryFrom<DisputeRow> for Dispute {
    type Error = sqlx::Error;

    fn try_from(row: DisputeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            transaction_id: row.transaction_id.into(),
            raised_by: row.raised_by.into(),
            reason: row.reason,
            evidence: row.evidence.0,
            status: parse(&row.status)?,
            opened_at: row.opened_at.into(),
            resolved_at: row.resolved_at.map(Into::into),
            resolution_note: row.resolution_note,
        })
    }
}

/// Convert a batch of rows into models
pub(crate) fn convert<R, T>(rows: Vec<R>) -> Result<Vec<T>, sqlx::Error>
where
    T: TryFrom<R, Error = sqlx::Error>,
{
    rows.into_iter().map(T::try_from).collect()
}
