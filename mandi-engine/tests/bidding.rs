mod common;

use common::{HOUR, Harness};
use mandi_core::ValidationError;
use mandi_core::models::{
    Amount, BidRejection, BidStatus, BiddingType, LotStatus, Quantity, Role,
};
use mandi_engine::MarketError;
use std::time::Duration;

fn rejection<E: std::error::Error + 'static, T>(result: Result<T, MarketError<E>>) -> Option<BidRejection> {
    match result {
        Err(MarketError::Validation(ValidationError::InvalidBid(reason))) => Some(reason),
        _ => None,
    }
}

#[tokio::test]
async fn the_earlier_of_two_equal_bids_wins() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let farmer = h.user(Role::Farmer).await?;
    let early = h.user(Role::Retailer).await?;
    let late = h.user(Role::Retailer).await?;
    let low = h.user(Role::Retailer).await?;
    let lot_id = h.open_crop(farmer, 100, 10, BiddingType::Open).await?;

    h.market
        .place_bid(lot_id, low, Quantity(100), Amount(12))
        .await?;
    h.advance(Duration::from_secs(5));
    let winner = h
        .market
        .place_bid(lot_id, early, Quantity(100), Amount(15))
        .await?;
    h.advance(Duration::from_secs(5));
    let loser = h
        .market
        .place_bid(lot_id, late, Quantity(100), Amount(15))
        .await?;

    h.advance(HOUR);
    let report = h.market.close_lot(lot_id, 1).await?;
    assert_eq!(report.settlement.transactions.len(), 1);
    assert_eq!(report.settlement.transactions[0].retailer_id, early);

    let winner = h.market.get_bid(winner.id).await?;
    assert_eq!(winner.status, BidStatus::Accepted);
    assert_eq!(winner.filled_quantity, Quantity(100));

    let loser = h.market.get_bid(loser.id).await?;
    assert_eq!(loser.status, BidStatus::Rejected);
    assert_eq!(loser.rejection.as_deref(), Some("outbid"));
    Ok(())
}

#[tokio::test]
async fn a_rebid_supersedes_and_may_not_go_lower() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let farmer = h.user(Role::Farmer).await?;
    let retailer = h.user(Role::Retailer).await?;
    let lot_id = h.open_crop(farmer, 100, 10, BiddingType::Open).await?;

    let first = h
        .market
        .place_bid(lot_id, retailer, Quantity(50), Amount(20))
        .await?;
    let second = h
        .market
        .place_bid(lot_id, retailer, Quantity(60), Amount(25))
        .await?;
    assert_eq!(
        h.market.get_bid(first.id).await?.status,
        BidStatus::Superseded
    );

    let lower = h
        .market
        .place_bid(lot_id, retailer, Quantity(60), Amount(22))
        .await;
    assert_eq!(
        rejection(lower),
        Some(BidRejection::PriceDecrease {
            offered: Amount(22),
            standing: Amount(25),
        })
    );

    let pending: Vec<_> = h
        .market
        .visible_bids(lot_id, retailer)
        .await?
        .into_iter()
        .filter(|bid| bid.status == BidStatus::Pending)
        .collect();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, second.id);
    Ok(())
}

#[tokio::test]
async fn bids_are_validated_at_placement() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let farmer = h.user(Role::Farmer).await?;
    let retailer = h.user(Role::Retailer).await?;
    let lot_id = h.open_crop(farmer, 100, 10, BiddingType::Open).await?;

    let by_farmer = h
        .market
        .place_bid(lot_id, farmer, Quantity(10), Amount(20))
        .await;
    assert_eq!(rejection(by_farmer), Some(BidRejection::NotRetailer));

    let too_much = h
        .market
        .place_bid(lot_id, retailer, Quantity(101), Amount(20))
        .await;
    assert_eq!(
        rejection(too_much),
        Some(BidRejection::ExceedsAvailable {
            requested: Quantity(101),
            available: Quantity(100),
        })
    );

    let nothing = h
        .market
        .place_bid(lot_id, retailer, Quantity(0), Amount(20))
        .await;
    assert_eq!(rejection(nothing), Some(BidRejection::NonPositiveQuantity));

    let free = h
        .market
        .place_bid(lot_id, retailer, Quantity(10), Amount(0))
        .await;
    assert_eq!(rejection(free), Some(BidRejection::NonPositivePrice));

    let cheap = h
        .market
        .place_bid(lot_id, retailer, Quantity(10), Amount(9))
        .await;
    assert_eq!(rejection(cheap), Some(BidRejection::BelowFloor));

    h.advance(HOUR);
    let late = h
        .market
        .place_bid(lot_id, retailer, Quantity(10), Amount(20))
        .await;
    assert_eq!(rejection(late), Some(BidRejection::WindowClosed));
    Ok(())
}

#[tokio::test]
async fn draft_lots_take_no_bids() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let farmer = h.user(Role::Farmer).await?;
    let retailer = h.user(Role::Retailer).await?;
    let crop = h
        .market
        .list_crop(farmer, common::listing(100, 10, BiddingType::Open))
        .await?;

    let refused = h
        .market
        .place_bid(crop.lot_id(), retailer, Quantity(10), Amount(20))
        .await;
    assert_eq!(
        rejection(refused),
        Some(BidRejection::LotNotOpen(LotStatus::Draft))
    );
    Ok(())
}

#[tokio::test]
async fn sealed_prices_stay_hidden_until_close() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let farmer = h.user(Role::Farmer).await?;
    let alice = h.user(Role::Retailer).await?;
    let bob = h.user(Role::Retailer).await?;
    let lot_id = h.open_crop(farmer, 100, 10, BiddingType::Sealed).await?;

    // Below the floor, but the floor is not disclosed
    let under = h
        .market
        .place_bid(lot_id, alice, Quantity(100), Amount(8))
        .await?;
    h.market
        .place_bid(lot_id, bob, Quantity(100), Amount(12))
        .await?;

    let seen_by_alice = h.market.visible_bids(lot_id, alice).await?;
    for view in &seen_by_alice {
        if view.retailer_id == alice {
            assert_eq!(view.price, Some(Amount(8)));
        } else {
            assert_eq!(view.price, None);
        }
    }

    h.advance(HOUR);
    let report = h.market.close_lot(lot_id, 1).await?;
    assert_eq!(report.settlement.transactions[0].retailer_id, bob);

    let under = h.market.get_bid(under.id).await?;
    assert_eq!(under.rejection.as_deref(), Some("below_floor"));

    let seen_after = h.market.visible_bids(lot_id, alice).await?;
    assert!(seen_after.iter().all(|view| view.price.is_some()));
    Ok(())
}

#[tokio::test]
async fn sealed_bids_are_filled_whole_or_not_at_all() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let farmer = h.user(Role::Farmer).await?;
    let big = h.user(Role::Retailer).await?;
    let small = h.user(Role::Retailer).await?;
    let lot_id = h.open_crop(farmer, 100, 10, BiddingType::Sealed).await?;

    h.market
        .place_bid(lot_id, big, Quantity(70), Amount(30))
        .await?;
    let passed = h
        .market
        .place_bid(lot_id, small, Quantity(40), Amount(25))
        .await?;

    h.advance(HOUR);
    let report = h.market.close_lot(lot_id, 1).await?;
    assert_eq!(report.settlement.transactions.len(), 1);

    let passed = h.market.get_bid(passed.id).await?;
    assert_eq!(passed.rejection.as_deref(), Some("no_partial_fill"));

    let lot = h.market.get_lot(lot_id).await?;
    assert_eq!(lot.auction().available_quantity, Quantity(30));
    Ok(())
}
