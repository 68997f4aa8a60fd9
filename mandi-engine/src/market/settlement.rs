use super::{Market, MarketResult};
use crate::clock::Clock;
use crate::error::{MarketError, Store as _};
use crate::ranking::Fill;
use mandi_core::models::{
    Amount, BidId, BidRejection, BidStatus, CropId, Lot, LotEvent, LotId, LotStatus, MarketEvent,
    OrderStatus, PaymentStatus, PooledCrop, Quantity, Transaction, TransactionId, UserId,
};
use mandi_core::ports::{
    BidRepository, FillPlan, FillSlice, LotRepository, MarketRepository, Notifier,
    SettlementRepository,
};
use mandi_core::{ConflictError, SettlementFailure, ValidationError};
use tracing::{error, info};

/// What a round of settlement produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettlementReport {
    /// Transactions created, in fill order
    pub transactions: Vec<Transaction>,
    /// Fills that were rolled back, with the reason
    pub failures: Vec<(BidId, SettlementFailure)>,
}

// A crop that can supply part of a fill, with what it has left
struct Source {
    crop_id: CropId,
    farmer_id: UserId,
    available: Quantity,
}

impl<R: MarketRepository, N: Notifier, C: Clock> Market<R, N, C> {
    /// Settle fills against an attempt whose window has elapsed.
    ///
    /// Every fill must name a pending bid of this attempt, at that bid's
    /// price and no more than its quantity, and the price must meet the
    /// floor; otherwise nothing is settled. Each fill is then its own atomic
    /// unit: a failed fill is rolled back entirely, its bid is rejected with
    /// `SettlementFailed`, and the remaining fills still settle. Closing a
    /// lot settles the winners it ranks the same way.
    pub async fn settle(
        &self,
        lot_id: LotId,
        attempt_number: u32,
        fills: &[Fill],
    ) -> MarketResult<SettlementReport, R> {
        let _guard = self.lock_lot(lot_id).await;
        let lot = self.load_lot(lot_id).await?;
        let state = lot.auction();
        if state.attempt_number != attempt_number {
            return Err(ConflictError::StaleAttempt {
                requested: attempt_number,
                current: state.attempt_number,
            }
            .into());
        }
        if state.status != LotStatus::Open {
            return Err(ValidationError::InvalidTransition {
                from: state.status,
                event: LotEvent::CloseSold,
            }
            .into());
        }
        if !state.is_expired(self.now()) {
            return Err(ValidationError::WindowStillOpen.into());
        }

        for fill in fills {
            let bid = self.repo.get_bid(fill.bid_id).await.store()?;
            let matches = bid.is_some_and(|bid| {
                bid.lot_id == lot_id
                    && bid.attempt_number == attempt_number
                    && bid.status == BidStatus::Pending
                    && bid.retailer_id == fill.retailer_id
                    && bid.price == fill.price
                    && bid.price >= state.floor_price
                    && fill.quantity.is_positive()
                    && fill.quantity <= bid.quantity
            });
            if !matches {
                return Err(ValidationError::FillMismatch {
                    bid_id: fill.bid_id,
                }
                .into());
            }
        }
        self.settle_fills(&lot, attempt_number, fills).await
    }

    pub(super) async fn settle_fills(
        &self,
        lot: &Lot,
        attempt_number: u32,
        fills: &[Fill],
    ) -> MarketResult<SettlementReport, R> {
        let mut sources = self.sources(lot).await?;
        let mut report = SettlementReport::default();
        let require_buyer_funds = self.config().settlement.require_buyer_funds;

        for fill in fills {
            let split = PooledCrop::split(
                sources.iter().map(|s| (s.crop_id, s.available)),
                fill.quantity,
            );
            let slices: Vec<FillSlice> = split
                .into_iter()
                .filter_map(|(crop_id, quantity)| {
                    let source = sources.iter().find(|s| s.crop_id == crop_id)?;
                    Some(FillSlice {
                        transaction_id: TransactionId::random(),
                        crop_id,
                        farmer_id: source.farmer_id,
                        quantity,
                    })
                })
                .collect();
            let plan = FillPlan {
                bid_id: fill.bid_id,
                lot_id: lot.id(),
                attempt_number,
                retailer_id: fill.retailer_id,
                unit_price: fill.price,
                slices,
                require_buyer_funds,
                at: self.now(),
            };

            let outcome = match precheck(&plan, fill.quantity) {
                Err(failure) => Err(failure),
                Ok(_) => {
                    let parties = plan
                        .slices
                        .iter()
                        .map(|slice| slice.farmer_id)
                        .chain([plan.retailer_id]);
                    let _wallets = self.lock_wallets(parties.collect::<Vec<_>>()).await;
                    self.repo.settle_fill(&plan).await.store()?
                }
            };

            match outcome {
                Ok(transactions) => {
                    for slice in &plan.slices {
                        if let Some(source) = sources.iter_mut().find(|s| s.crop_id == slice.crop_id) {
                            source.available -= slice.quantity;
                        }
                    }
                    let amount: Amount = transactions.iter().map(|tx| tx.amount).sum();
                    info!(
                        bid_id = %fill.bid_id,
                        lot_id = %plan.lot_id,
                        quantity = %fill.quantity,
                        %amount,
                        "fill settled"
                    );
                    self.notify(MarketEvent::SettlementCompleted {
                        bid_id: fill.bid_id,
                        transactions: transactions.iter().map(|tx| tx.id).collect(),
                        amount,
                    });
                    report.transactions.extend(transactions);
                }
                Err(failure) => {
                    self.repo
                        .reject_bid(fill.bid_id, BidRejection::SettlementFailed)
                        .await
                        .store()?;
                    error!(
                        bid_id = %fill.bid_id,
                        lot_id = %plan.lot_id,
                        reason = %failure,
                        "fill rolled back"
                    );
                    self.notify(MarketEvent::SettlementFailed {
                        bid_id: fill.bid_id,
                        lot_id: plan.lot_id,
                        reason: failure.to_string(),
                    });
                    report.failures.push((fill.bid_id, failure));
                }
            }
        }

        Ok(report)
    }

    // The crops backing a lot, in the order fills draw from them
    async fn sources(&self, lot: &Lot) -> MarketResult<Vec<Source>, R> {
        match lot {
            Lot::Crop(crop) => Ok(vec![Source {
                crop_id: crop.id,
                farmer_id: crop.farmer_id,
                available: crop.auction.available_quantity,
            }]),
            Lot::Pool(pool) => {
                let mut sources = Vec::with_capacity(pool.members.len());
                for member in &pool.members {
                    let crop = self
                        .repo
                        .get_crop(member.crop_id)
                        .await
                        .store()?
                        .ok_or_else(|| MarketError::not_found("crop", member.crop_id))?;
                    sources.push(Source {
                        crop_id: crop.id,
                        farmer_id: crop.farmer_id,
                        available: crop.auction.available_quantity,
                    });
                }
                Ok(sources)
            }
        }
    }

    /// Record that the buyer paid for a transaction.
    ///
    /// Pending wallet entries become final; entries held by an open dispute
    /// stay held.
    pub async fn confirm_payment(&self, transaction_id: TransactionId) -> MarketResult<Transaction, R> {
        let tx = self.transaction(transaction_id).await?;
        if tx.payment_status != PaymentStatus::PendingPayment {
            return Err(ValidationError::NotAwaitingPayment.into());
        }

        let _wallets = self.lock_wallets([tx.farmer_id, tx.retailer_id]).await;
        let now = self.now();
        if !self
            .repo
            .confirm_payment(transaction_id, now)
            .await
            .store()?
        {
            return Err(ValidationError::NotAwaitingPayment.into());
        }
        info!(%transaction_id, amount = %tx.amount, "payment confirmed");
        self.transaction(transaction_id).await
    }

    /// Mark a confirmed order as dispatched
    pub async fn dispatch(&self, transaction_id: TransactionId) -> MarketResult<Transaction, R> {
        self.advance_order(transaction_id, OrderStatus::Dispatched)
            .await
    }

    /// Mark a dispatched order as delivered
    pub async fn deliver(&self, transaction_id: TransactionId) -> MarketResult<Transaction, R> {
        self.advance_order(transaction_id, OrderStatus::Delivered)
            .await
    }

    async fn advance_order(
        &self,
        transaction_id: TransactionId,
        to: OrderStatus,
    ) -> MarketResult<Transaction, R> {
        let tx = self.transaction(transaction_id).await?;
        let from = tx.order_status;
        if from.next() != Some(to) {
            return Err(ValidationError::InvalidOrderStep { from, to }.into());
        }
        if !self
            .repo
            .advance_order(transaction_id, from, to)
            .await
            .store()?
        {
            return Err(ConflictError::Stale.into());
        }
        info!(%transaction_id, %from, %to, "order advanced");
        self.transaction(transaction_id).await
    }

    /// Retrieve a transaction
    pub async fn transaction(&self, transaction_id: TransactionId) -> MarketResult<Transaction, R> {
        self.repo
            .get_transaction(transaction_id)
            .await
            .store()?
            .ok_or_else(|| MarketError::not_found("transaction", transaction_id))
    }

    /// Every transaction a lot produced
    pub async fn transactions_for_lot(&self, lot_id: LotId) -> MarketResult<Vec<Transaction>, R> {
        self.repo.transactions_for_lot(lot_id).await.store()
    }
}

// Refuse fills that cannot be sourced in full or whose value does not fit
fn precheck(plan: &FillPlan, wanted: Quantity) -> Result<Amount, SettlementFailure> {
    let planned = plan.quantity();
    if planned != wanted {
        return Err(ConflictError::Oversell {
            requested: wanted,
            available: planned,
        }
        .into());
    }
    plan.slices.iter().try_fold(Amount::ZERO, |total, slice| {
        plan.unit_price
            .checked_total(slice.quantity)
            .and_then(|amount| total.checked_add(amount))
            .ok_or(SettlementFailure::Overflow)
    })
}
