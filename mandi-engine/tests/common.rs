#![allow(dead_code)]

use mandi_core::models::{
    Amount, BiddingType, CropListing, LotId, MarketConfig, MarketEvent, QualityGrade, Quantity,
    Role, User, UserId,
};
use mandi_core::ports::Notifier;
use mandi_engine::{ManualClock, Market, RetryPolicy};
use mandi_sqlite::{Db, config::SqliteConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;

pub const MINUTE: Duration = Duration::from_secs(60);
pub const HOUR: Duration = Duration::from_secs(3600);

/// Keeps every event the engine emits
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<MarketEvent>>>);

impl Recorder {
    pub fn events(&self) -> Vec<MarketEvent> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&MarketEvent) -> bool) -> usize {
        self.0.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

impl Notifier for Recorder {
    fn notify(&self, event: MarketEvent) {
        self.0.lock().unwrap().push(event);
    }
}

pub type TestMarket = Market<Db, Recorder, ManualClock>;

pub struct Harness {
    pub market: TestMarket,
    pub clock: ManualClock,
    pub events: Recorder,
}

impl Harness {
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_config(MarketConfig::default()).await
    }

    pub async fn with_config(config: MarketConfig) -> anyhow::Result<Self> {
        let db = Db::open(&SqliteConfig::default()).await?;
        let clock = ManualClock::new(OffsetDateTime::from_unix_timestamp(1_750_000_000)?);
        let events = Recorder::default();
        let market = Market::new(db, config, events.clone(), clock.clone())
            .with_retry(RetryPolicy::none());
        Ok(Self {
            market,
            clock,
            events,
        })
    }

    pub fn now(&self) -> OffsetDateTime {
        self.market.now()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub async fn user(&self, role: Role) -> anyhow::Result<UserId> {
        let id = UserId::random();
        self.market
            .repository()
            .register_user(&User {
                id,
                name: format!("{role} {id}"),
                role,
            })
            .await?;
        Ok(id)
    }

    /// A listed crop whose first window opens now and runs an hour
    pub async fn open_crop(
        &self,
        farmer: UserId,
        quantity: i64,
        floor: i64,
        bidding_type: BiddingType,
    ) -> anyhow::Result<LotId> {
        let crop = self
            .market
            .list_crop(farmer, listing(quantity, floor, bidding_type))
            .await?;
        let lot_id = crop.lot_id();
        self.market.schedule(lot_id, self.now(), HOUR).await?;
        self.market.open_lot(lot_id, 1).await?;
        Ok(lot_id)
    }
}

pub fn listing(quantity: i64, floor: i64, bidding_type: BiddingType) -> CropListing {
    CropListing {
        commodity: "Onion".into(),
        grade: QualityGrade::A,
        quantity: Quantity(quantity),
        floor_price: Amount(floor),
        bidding_type,
    }
}
