use super::{Market, MarketResult};
use crate::clock::Clock;
use crate::error::{MarketError, Store as _};
use mandi_core::ValidationError;
use mandi_core::models::{
    Amount, Bid, BidId, BidRejection, BidStatus, BidView, BiddingType, LotId, LotStatus, Quantity,
    Role, UserId,
};
use mandi_core::ports::{BidRepository, MarketRepository, Notifier};
use tracing::info;

impl<R: MarketRepository, N: Notifier, C: Clock> Market<R, N, C> {
    /// Place a bid on an open lot.
    ///
    /// A retailer holds at most one pending bid per attempt: a new bid
    /// supersedes the previous one, and in open bidding it may not offer a
    /// lower price. Sealed bids below the floor are accepted here (the floor
    /// is not disclosed) and lose at close.
    pub async fn place_bid(
        &self,
        lot_id: LotId,
        retailer_id: UserId,
        quantity: Quantity,
        price: Amount,
    ) -> MarketResult<Bid, R> {
        let retailer = self.load_user(retailer_id).await?;
        if retailer.role != Role::Retailer {
            return Err(BidRejection::NotRetailer.into());
        }

        let _guard = self.lock_lot(lot_id).await;
        let lot = self.load_lot(lot_id).await?;
        let state = lot.auction();
        let now = self.now();

        if state.status != LotStatus::Open {
            return Err(BidRejection::LotNotOpen(state.status).into());
        }
        if !state.window.is_some_and(|window| window.contains(now)) {
            return Err(BidRejection::WindowClosed.into());
        }
        if lot.is_seller(retailer_id) {
            return Err(BidRejection::OwnLot.into());
        }
        if !quantity.is_positive() {
            return Err(BidRejection::NonPositiveQuantity.into());
        }
        if quantity > state.available_quantity {
            return Err(BidRejection::ExceedsAvailable {
                requested: quantity,
                available: state.available_quantity,
            }
            .into());
        }
        if !price.is_positive() {
            return Err(BidRejection::NonPositivePrice.into());
        }
        if price.checked_total(quantity).is_none() {
            return Err(ValidationError::Overflow.into());
        }
        if state.bidding_type == BiddingType::Open && price < state.floor_price {
            return Err(BidRejection::BelowFloor.into());
        }

        let standing = self
            .repo
            .bids_for(lot_id, state.attempt_number)
            .await
            .store()?
            .into_iter()
            .find(|bid| bid.retailer_id == retailer_id && bid.status == BidStatus::Pending);
        if let Some(standing) = &standing {
            if state.bidding_type == BiddingType::Open && price < standing.price {
                return Err(BidRejection::PriceDecrease {
                    offered: price,
                    standing: standing.price,
                }
                .into());
            }
        }

        let bid = Bid {
            id: BidId::random(),
            lot_id,
            attempt_number: state.attempt_number,
            retailer_id,
            quantity,
            price,
            placed_at: now,
            status: BidStatus::Pending,
            filled_quantity: Quantity::ZERO,
            rejection: None,
        };
        let supersedes = standing.map(|bid| bid.id);
        self.repo.place_bid(&bid, supersedes).await.store()??;

        info!(
            bid_id = %bid.id,
            %lot_id,
            attempt_number = bid.attempt_number,
            %retailer_id,
            %quantity,
            superseded = ?supersedes,
            "bid placed"
        );
        Ok(bid)
    }

    /// The current attempt's bids as `viewer` may see them.
    ///
    /// In sealed bidding other retailers' prices stay hidden until the lot
    /// reaches a terminal status.
    pub async fn visible_bids(&self, lot_id: LotId, viewer: UserId) -> MarketResult<Vec<BidView>, R> {
        let lot = self.load_lot(lot_id).await?;
        let state = lot.auction();
        Ok(self
            .repo
            .bids_for(lot_id, state.attempt_number)
            .await
            .store()?
            .iter()
            .map(|bid| bid.view_for(viewer, state.bidding_type, state.status))
            .collect())
    }

    /// Retrieve a bid
    pub async fn get_bid(&self, bid_id: BidId) -> MarketResult<Bid, R> {
        self.repo
            .get_bid(bid_id)
            .await
            .store()?
            .ok_or_else(|| MarketError::not_found("bid", bid_id))
    }
}
