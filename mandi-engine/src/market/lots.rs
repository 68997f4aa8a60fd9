use super::{Market, MarketResult, SettlementReport};
use crate::clock::Clock;
use crate::error::{MarketError, Store as _};
use crate::ranking;
use mandi_core::models::{
    AuctionState, BidRejection, BidStatus, BiddingType, BiddingWindow, Crop, CropId, CropListing,
    Lot, LotEvent, LotId, LotStatus, MarketEvent, Closing, PoolStatus, Quantity, Role, Schedule,
    UserId,
};
use mandi_core::ports::{
    BidRepository, CloseOutcome, ClosingRecord, LotRepository, MarketRepository, Notifier,
    SettlementRepository,
};
use mandi_core::{ConflictError, ValidationError};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, error, info};

/// The result of closing one attempt of a lot.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseReport {
    /// The stored outcome of the attempt
    pub record: ClosingRecord,
    /// The attempt had already been closed; nothing was done this time
    pub replayed: bool,
    /// The fills settled (or refused) by this call
    pub settlement: SettlementReport,
}

impl<R: MarketRepository, N: Notifier, C: Clock> Market<R, N, C> {
    /// List a new crop as a draft lot.
    pub async fn list_crop(&self, farmer_id: UserId, listing: CropListing) -> MarketResult<Crop, R> {
        self.require_role(farmer_id, Role::Farmer).await?;
        let crop = Crop::new(CropId::random(), farmer_id, listing, self.now())?;
        self.repo.create_crop(&crop).await.store()?;
        info!(
            crop_id = %crop.id,
            %farmer_id,
            commodity = %crop.commodity,
            quantity = %crop.auction.total_quantity,
            "crop listed"
        );
        Ok(crop)
    }

    /// Retrieve a crop or pool
    pub async fn get_lot(&self, lot_id: LotId) -> MarketResult<Lot, R> {
        self.load_lot(lot_id).await
    }

    /// Every crop a farmer has listed
    pub async fn crops_by_farmer(&self, farmer_id: UserId) -> MarketResult<Vec<Crop>, R> {
        self.repo.crops_by_farmer(farmer_id).await.store()
    }

    /// Retire a lot before it is auctioned.
    ///
    /// A crop waiting in a forming pool leaves the pool first; a crop in a
    /// locked pool cannot be withdrawn. Withdrawing a forming pool dissolves
    /// it, and withdrawing a scheduled pool releases its members.
    pub async fn withdraw(&self, lot_id: LotId) -> MarketResult<Lot, R> {
        let _guard = self.lock_lot(lot_id).await;
        match self.load_lot(lot_id).await? {
            Lot::Crop(crop) if crop.auction.status == LotStatus::Pooled => {
                let pool_id = crop.pool_id.ok_or(ValidationError::LockedInPool)?;
                let _pool_guard = self.lock_lot(LotId::Pool(pool_id)).await;
                let crop = self.detach(crop, pool_id).await?;
                self.retire(Lot::Crop(crop)).await
            }
            Lot::Pool(pool) if pool.status == PoolStatus::Forming => {
                self.dissolve(&pool).await?;
                self.load_lot(lot_id).await
            }
            lot => self.retire(lot).await,
        }
    }

    async fn retire(&self, lot: Lot) -> MarketResult<Lot, R> {
        let lot_id = lot.id();
        let mut state = lot.auction().clone();
        let expected = (state.status, state.attempt_number);
        state.transition(LotEvent::Withdraw)?;
        self.repo
            .update_auction(lot_id, expected, &state)
            .await
            .store()??;
        info!(%lot_id, "lot withdrawn");
        self.load_lot(lot_id).await
    }

    /// Put a lot on the auction calendar, or move it.
    ///
    /// Rescheduling a lot whose fills all failed settlement starts a fresh
    /// attempt. A lot that ran out of attempts without a valid bid stays
    /// unsold. Pools are scheduled by promotion and may only be moved while
    /// still scheduled.
    pub async fn schedule(
        &self,
        lot_id: LotId,
        start: OffsetDateTime,
        duration: Duration,
    ) -> MarketResult<Lot, R> {
        let _guard = self.lock_lot(lot_id).await;
        let mut lot = self.load_lot(lot_id).await?;

        if let Lot::Pool(pool) = &lot {
            if pool.auction.status != LotStatus::Scheduled {
                return Err(ValidationError::InvalidTransition {
                    from: pool.auction.status,
                    event: LotEvent::Schedule,
                }
                .into());
            }
        }
        self.config()
            .auction
            .check_schedule(self.now(), start, duration)?;

        let current = lot.auction();
        if current.status == LotStatus::Closed(Closing::Unsold) {
            let closing = self
                .repo
                .get_closing(lot_id, current.attempt_number)
                .await
                .store()?;
            if closing.is_some_and(|record| !record.outcome.allows_reschedule()) {
                return Err(ValidationError::AttemptsExhausted {
                    max_attempts: self.config().auction.max_attempts,
                }
                .into());
            }
        }

        let state = lot.auction_mut();
        let expected = (state.status, state.attempt_number);
        if state.status == LotStatus::Closed(Closing::Unsold) {
            state.attempt_number += 1;
        }
        state.transition(LotEvent::Schedule)?;
        state.schedule = Some(Schedule { start, duration });
        state.window = None;
        let attempt_number = state.attempt_number;

        self.repo
            .update_auction(lot_id, expected, lot.auction())
            .await
            .store()??;

        info!(%lot_id, attempt_number, %start, ?duration, "lot scheduled");
        self.notify(MarketEvent::LotScheduled {
            lot_id,
            attempt_number,
            start,
        });
        Ok(lot)
    }

    /// Open the bidding window of a scheduled lot.
    ///
    /// Normally driven by the scheduler once the planned start is reached;
    /// refused before then. Opening an attempt that is already open is a
    /// no-op.
    pub async fn open_lot(&self, lot_id: LotId, attempt_number: u32) -> MarketResult<Lot, R> {
        let _guard = self.lock_lot(lot_id).await;
        let mut lot = self.load_lot(lot_id).await?;
        let now = self.now();

        let state = lot.auction_mut();
        check_attempt(state, attempt_number)?;
        if state.status == LotStatus::Open {
            return Ok(lot);
        }
        if let Some(schedule) = state.schedule {
            if schedule.start > now {
                return Err(ValidationError::NotYetDue {
                    start: schedule.start,
                }
                .into());
            }
        }

        let expected = (state.status, state.attempt_number);
        state.transition(LotEvent::Open)?;
        let duration = state
            .schedule
            .map(|schedule| schedule.duration)
            .unwrap_or(self.config().auction.default_duration);
        let window = BiddingWindow {
            start: now,
            end: now + duration,
        };
        state.window = Some(window);
        state.check()?;

        self.repo
            .update_auction(lot_id, expected, lot.auction())
            .await
            .store()??;

        info!(%lot_id, attempt_number, closes_at = %window.end, "lot opened");
        self.notify(MarketEvent::LotOpened {
            lot_id,
            attempt_number,
            closes_at: window.end,
        });
        Ok(lot)
    }

    /// Close an attempt whose window has elapsed.
    ///
    /// Pending bids are ranked and the winners settled one fill at a time.
    /// With nothing to settle the lot is re-listed while attempts remain.
    /// Closing is idempotent per (lot, attempt): a replay returns the stored
    /// outcome without touching anything.
    pub async fn close_lot(&self, lot_id: LotId, attempt_number: u32) -> MarketResult<CloseReport, R> {
        let _guard = self.lock_lot(lot_id).await;
        self.close_locked(lot_id, attempt_number).await
    }

    /// Close a lot left open past its grace period.
    ///
    /// A normal close is tried first, with the scheduler's backoff. If that
    /// still fails the attempt is closed without further settlement and an
    /// operator event is raised.
    pub async fn force_close(&self, lot_id: LotId, attempt_number: u32) -> MarketResult<CloseReport, R> {
        let _guard = self.lock_lot(lot_id).await;
        let attempt = self
            .retry_policy()
            .run(
                || self.close_locked(lot_id, attempt_number),
                |err| matches!(err, MarketError::Transient(_)),
            )
            .await;
        match attempt {
            Ok(report) => return Ok(report),
            Err(err) => error!(%lot_id, attempt_number, error = %err, "close failed, forcing"),
        }

        let lot = self.load_lot(lot_id).await?;
        let state = lot.auction();
        check_attempt(state, attempt_number)?;
        let now = self.now();
        if !state.is_expired(now) {
            return Err(ValidationError::WindowStillOpen.into());
        }

        for bid in self.repo.bids_for(lot_id, attempt_number).await.store()? {
            if bid.status == BidStatus::Pending {
                self.repo
                    .reject_bid(bid.id, BidRejection::WindowClosed)
                    .await
                    .store()?;
            }
        }

        let sold = self.sold_in(lot_id, attempt_number).await?;
        let mut next = state.clone();
        let expected = (next.status, next.attempt_number);
        let outcome = if sold.is_positive() {
            next.transition(LotEvent::CloseSold)?;
            CloseOutcome::Sold { quantity: sold }
        } else {
            next.transition(LotEvent::CloseUnsold)?;
            CloseOutcome::ForcedUnsold
        };

        let record = ClosingRecord {
            lot_id,
            attempt_number,
            outcome,
            closed_at: now,
        };
        self.repo
            .finish_close(&record, expected, &next)
            .await
            .store()??;

        self.notify(MarketEvent::LotForceClosed {
            lot_id,
            attempt_number,
        });
        Ok(CloseReport {
            record,
            replayed: false,
            settlement: SettlementReport::default(),
        })
    }

    pub(super) async fn close_locked(
        &self,
        lot_id: LotId,
        attempt_number: u32,
    ) -> MarketResult<CloseReport, R> {
        if let Some(record) = self
            .repo
            .get_closing(lot_id, attempt_number)
            .await
            .store()?
        {
            debug!(%lot_id, attempt_number, "close already processed");
            return Ok(CloseReport {
                record,
                replayed: true,
                settlement: SettlementReport::default(),
            });
        }

        let lot = self.load_lot(lot_id).await?;
        let state = lot.auction();
        check_attempt(state, attempt_number)?;
        if state.status != LotStatus::Open {
            return Err(ValidationError::InvalidTransition {
                from: state.status,
                event: LotEvent::CloseUnsold,
            }
            .into());
        }
        let now = self.now();
        if !state.is_expired(now) {
            return Err(ValidationError::WindowStillOpen.into());
        }

        let config = &self.config().auction;
        let partial = match state.bidding_type {
            BiddingType::Open => config.open_partial_fills,
            BiddingType::Sealed => config.sealed_partial_fills,
        };
        let bids = self.repo.bids_for(lot_id, attempt_number).await.store()?;
        let allocation = ranking::allocate(
            &bids,
            state.available_quantity,
            state.floor_price,
            partial,
        );
        for (bid_id, reason) in &allocation.rejected {
            self.repo.reject_bid(*bid_id, *reason).await.store()?;
        }

        let settlement = if allocation.fills.is_empty() {
            SettlementReport::default()
        } else {
            self.settle_fills(&lot, attempt_number, &allocation.fills)
                .await?
        };

        // Counted from the store so that a close retried after a partial
        // failure still sees the fills an earlier run settled.
        let sold = self.sold_in(lot_id, attempt_number).await?;
        let tried = !allocation.fills.is_empty() || sold.is_positive();

        let mut next = self.load_lot(lot_id).await?.auction().clone();
        let expected = (next.status, next.attempt_number);
        let outcome = if sold.is_positive() {
            next.transition(LotEvent::CloseSold)?;
            CloseOutcome::Sold { quantity: sold }
        } else if !tried && config.allows_attempt(attempt_number + 1) {
            let previous = next
                .schedule
                .map(|schedule| schedule.duration)
                .unwrap_or(config.default_duration);
            next.transition(LotEvent::Relist)?;
            next.attempt_number += 1;
            next.schedule = Some(Schedule {
                start: now + config.relist_delay,
                duration: config.relist_duration(previous),
            });
            next.window = None;
            CloseOutcome::Relisted
        } else {
            next.transition(LotEvent::CloseUnsold)?;
            if tried {
                CloseOutcome::Unsold
            } else {
                CloseOutcome::Exhausted
            }
        };

        let record = ClosingRecord {
            lot_id,
            attempt_number,
            outcome,
            closed_at: now,
        };
        self.repo
            .finish_close(&record, expected, &next)
            .await
            .store()??;

        match outcome {
            CloseOutcome::Relisted => {
                let start = next.schedule.map(|s| s.start).unwrap_or(now);
                info!(%lot_id, attempt_number = next.attempt_number, %start, "lot relisted");
                self.notify(MarketEvent::LotRelisted {
                    lot_id,
                    attempt_number: next.attempt_number,
                    start,
                });
            }
            _ => {
                let closing = match outcome {
                    CloseOutcome::Sold { .. } => Closing::Sold,
                    _ => Closing::Unsold,
                };
                info!(%lot_id, attempt_number, ?closing, %sold, "lot closed");
                self.notify(MarketEvent::LotClosed {
                    lot_id,
                    attempt_number,
                    closing,
                    sold,
                });
            }
        }

        Ok(CloseReport {
            record,
            replayed: false,
            settlement,
        })
    }

    async fn sold_in(&self, lot_id: LotId, attempt_number: u32) -> MarketResult<Quantity, R> {
        Ok(self
            .repo
            .transactions_for_lot(lot_id)
            .await
            .store()?
            .iter()
            .filter(|tx| tx.attempt_number == attempt_number)
            .map(|tx| tx.quantity)
            .sum())
    }
}

fn check_attempt(state: &AuctionState, attempt_number: u32) -> Result<(), ConflictError> {
    if state.attempt_number != attempt_number {
        return Err(ConflictError::StaleAttempt {
            requested: attempt_number,
            current: state.attempt_number,
        });
    }
    Ok(())
}
