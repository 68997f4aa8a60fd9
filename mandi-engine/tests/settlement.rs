mod common;

use common::{HOUR, Harness};
use mandi_core::models::{
    Amount, BidStatus, BiddingType, Closing, EntryKind, EntryState, LotStatus, MarketConfig,
    MarketEvent, OrderStatus, PaymentStatus, Quantity, Role, ledger_balance,
};
use mandi_core::ports::CloseOutcome;
use mandi_core::{SettlementFailure, ValidationError};
use mandi_engine::MarketError;
use mandi_engine::ranking::Fill;
use rstest::rstest;

#[tokio::test]
async fn two_winners_split_the_lot() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let farmer = h.user(Role::Farmer).await?;
    let first = h.user(Role::Retailer).await?;
    let second = h.user(Role::Retailer).await?;
    let lot_id = h.open_crop(farmer, 100, 10, BiddingType::Open).await?;

    h.market
        .place_bid(lot_id, first, Quantity(60), Amount(20))
        .await?;
    let cut = h
        .market
        .place_bid(lot_id, second, Quantity(50), Amount(18))
        .await?;

    h.advance(HOUR);
    let report = h.market.close_lot(lot_id, 1).await?;
    assert_eq!(
        report.record.outcome,
        CloseOutcome::Sold {
            quantity: Quantity(100)
        }
    );
    let amounts: Vec<_> = report
        .settlement
        .transactions
        .iter()
        .map(|tx| (tx.quantity, tx.amount))
        .collect();
    assert_eq!(
        amounts,
        vec![(Quantity(60), Amount(1200)), (Quantity(40), Amount(720))]
    );

    let lot = h.market.get_lot(lot_id).await?;
    assert_eq!(lot.auction().status, LotStatus::Closed(Closing::Sold));
    assert_eq!(lot.auction().available_quantity, Quantity::ZERO);

    let cut = h.market.get_bid(cut.id).await?;
    assert_eq!(cut.status, BidStatus::Accepted);
    assert_eq!(cut.filled_quantity, Quantity(40));

    assert_eq!(h.market.wallet(farmer).await?.balance, Amount(1920));
    assert_eq!(h.market.wallet(first).await?.balance, Amount(-1200));
    assert_eq!(h.market.wallet(second).await?.balance, Amount(-720));

    let entries = h.market.entries(farmer).await?;
    assert_eq!(entries.len(), 2);
    assert!(
        entries
            .iter()
            .all(|e| e.kind == EntryKind::Sale && e.state == EntryState::Pending)
    );
    assert_eq!(
        h.events
            .count(|e| matches!(e, MarketEvent::SettlementCompleted { .. })),
        2
    );

    // A second close event settles nothing new
    let replay = h.market.close_lot(lot_id, 1).await?;
    assert!(replay.replayed);
    assert!(replay.settlement.transactions.is_empty());
    assert_eq!(h.market.transactions_for_lot(lot_id).await?.len(), 2);
    assert_eq!(h.market.entries(farmer).await?.len(), 2);

    for user in [farmer, first, second] {
        let entries = h.market.entries(user).await?;
        assert_eq!(h.market.wallet(user).await?.balance, ledger_balance(&entries));
    }
    h.market.get_lot(lot_id).await?.auction().check()?;
    Ok(())
}

#[tokio::test]
async fn fills_must_agree_with_the_stored_bid() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let farmer = h.user(Role::Farmer).await?;
    let retailer = h.user(Role::Retailer).await?;
    let other = h.user(Role::Retailer).await?;
    let lot_id = h.open_crop(farmer, 100, 10, BiddingType::Open).await?;
    let bid = h
        .market
        .place_bid(lot_id, retailer, Quantity(10), Amount(15))
        .await?;
    let fill = |retailer_id, quantity, price| Fill {
        bid_id: bid.id,
        retailer_id,
        quantity: Quantity(quantity),
        price: Amount(price),
    };

    let early = h.market.settle(lot_id, 1, &[fill(retailer, 10, 15)]).await;
    assert!(matches!(
        early,
        Err(MarketError::Validation(ValidationError::WindowStillOpen))
    ));

    h.advance(HOUR);
    for forged in [
        fill(retailer, 90, 15),
        fill(retailer, 10, 1),
        fill(other, 10, 15),
        fill(retailer, 0, 15),
    ] {
        let refused = h.market.settle(lot_id, 1, &[forged]).await;
        assert!(matches!(
            refused,
            Err(MarketError::Validation(ValidationError::FillMismatch { bid_id })) if bid_id == bid.id
        ));
    }
    assert!(h.market.transactions_for_lot(lot_id).await?.is_empty());
    assert_eq!(
        h.market.get_lot(lot_id).await?.auction().available_quantity,
        Quantity(100)
    );

    let report = h.market.settle(lot_id, 1, &[fill(retailer, 10, 15)]).await?;
    let settled: Vec<_> = report
        .transactions
        .iter()
        .map(|tx| (tx.quantity, tx.amount))
        .collect();
    assert_eq!(settled, vec![(Quantity(10), Amount(150))]);

    // The bid is no longer pending, so it cannot be filled twice
    let twice = h.market.settle(lot_id, 1, &[fill(retailer, 10, 15)]).await;
    assert!(matches!(
        twice,
        Err(MarketError::Validation(ValidationError::FillMismatch { .. }))
    ));

    let closed = h.market.close_lot(lot_id, 1).await?;
    assert_eq!(
        closed.record.outcome,
        CloseOutcome::Sold {
            quantity: Quantity(10)
        }
    );
    Ok(())
}

#[rstest]
#[case::open(BiddingType::Open, Quantity(40), BidStatus::Accepted)]
#[case::sealed(BiddingType::Sealed, Quantity::ZERO, BidStatus::Rejected)]
#[tokio::test]
async fn the_runner_up_is_cut_down_only_where_partial_fills_are_allowed(
    #[case] bidding_type: BiddingType,
    #[case] filled: Quantity,
    #[case] status: BidStatus,
) -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let farmer = h.user(Role::Farmer).await?;
    let first = h.user(Role::Retailer).await?;
    let second = h.user(Role::Retailer).await?;
    let lot_id = h.open_crop(farmer, 100, 10, bidding_type).await?;

    h.market
        .place_bid(lot_id, first, Quantity(60), Amount(20))
        .await?;
    let runner_up = h
        .market
        .place_bid(lot_id, second, Quantity(50), Amount(18))
        .await?;

    h.advance(HOUR);
    h.market.close_lot(lot_id, 1).await?;

    let runner_up = h.market.get_bid(runner_up.id).await?;
    assert_eq!(runner_up.status, status);
    assert_eq!(runner_up.filled_quantity, filled);
    Ok(())
}

#[tokio::test]
async fn a_buyer_without_funds_leaves_the_lot_unsold() -> anyhow::Result<()> {
    let mut config = MarketConfig::default();
    config.settlement.require_buyer_funds = true;
    let h = Harness::with_config(config).await?;
    let farmer = h.user(Role::Farmer).await?;
    let broke = h.user(Role::Retailer).await?;
    let lot_id = h.open_crop(farmer, 100, 10, BiddingType::Open).await?;

    h.market.deposit(broke, Amount(500)).await?;
    let bid = h
        .market
        .place_bid(lot_id, broke, Quantity(50), Amount(20))
        .await?;

    h.advance(HOUR);
    let report = h.market.close_lot(lot_id, 1).await?;
    assert!(report.settlement.transactions.is_empty());
    assert_eq!(
        report.settlement.failures,
        vec![(
            bid.id,
            SettlementFailure::InsufficientFunds {
                balance: Amount(500),
                amount: Amount(1000),
            }
        )]
    );
    // A failed fill still counts as a try, so there is no relist
    assert_eq!(report.record.outcome, CloseOutcome::Unsold);

    let lot = h.market.get_lot(lot_id).await?;
    assert_eq!(lot.auction().status, LotStatus::Closed(Closing::Unsold));
    assert_eq!(lot.auction().available_quantity, Quantity(100));

    let bid = h.market.get_bid(bid.id).await?;
    assert_eq!(bid.status, BidStatus::Rejected);
    assert_eq!(bid.rejection.as_deref(), Some("settlement_failed"));
    assert_eq!(h.market.wallet(broke).await?.balance, Amount(500));
    assert_eq!(
        h.events
            .count(|e| matches!(e, MarketEvent::SettlementFailed { .. })),
        1
    );

    // The farmer may put it back on the calendar by hand
    let lot = h.market.schedule(lot_id, h.now(), HOUR).await?;
    assert_eq!(lot.auction().status, LotStatus::Scheduled);
    assert_eq!(lot.auction().attempt_number, 2);
    Ok(())
}

#[tokio::test]
async fn an_order_is_paid_dispatched_and_delivered() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let farmer = h.user(Role::Farmer).await?;
    let retailer = h.user(Role::Retailer).await?;
    let lot_id = h.open_crop(farmer, 100, 10, BiddingType::Open).await?;
    h.market.deposit(retailer, Amount(5000)).await?;
    h.market
        .place_bid(lot_id, retailer, Quantity(100), Amount(20))
        .await?;
    h.advance(HOUR);
    let report = h.market.close_lot(lot_id, 1).await?;
    let tx = report.settlement.transactions[0].clone();
    assert_eq!(tx.payment_status, PaymentStatus::PendingPayment);
    assert_eq!(tx.order_status, OrderStatus::Confirmed);

    let early = h.market.deliver(tx.id).await;
    assert!(matches!(
        early,
        Err(MarketError::Validation(ValidationError::InvalidOrderStep {
            from: OrderStatus::Confirmed,
            to: OrderStatus::Delivered,
        }))
    ));

    let paid = h.market.confirm_payment(tx.id).await?;
    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert_eq!(paid.paid_at, Some(h.now()));
    assert!(
        h.market
            .entries(farmer)
            .await?
            .iter()
            .all(|e| e.state == EntryState::Final)
    );

    let twice = h.market.confirm_payment(tx.id).await;
    assert!(matches!(
        twice,
        Err(MarketError::Validation(ValidationError::NotAwaitingPayment))
    ));

    h.market.dispatch(tx.id).await?;
    let delivered = h.market.deliver(tx.id).await?;
    assert_eq!(delivered.order_status, OrderStatus::Delivered);

    assert_eq!(h.market.wallet(retailer).await?.balance, Amount(3000));
    assert_eq!(h.market.wallet(farmer).await?.balance, Amount(2000));
    assert_eq!(h.market.transactions_for_lot(lot_id).await?, vec![delivered]);
    Ok(())
}

#[tokio::test]
async fn wallets_refuse_overdrafts() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let retailer = h.user(Role::Retailer).await?;

    assert_eq!(h.market.wallet(retailer).await?.balance, Amount::ZERO);
    h.market.deposit(retailer, Amount(300)).await?;
    let wallet = h.market.withdraw_funds(retailer, Amount(100)).await?;
    assert_eq!(wallet.balance, Amount(200));

    let overdraft = h.market.withdraw_funds(retailer, Amount(201)).await;
    assert!(matches!(
        overdraft,
        Err(MarketError::Validation(ValidationError::InsufficientFunds { .. }))
    ));

    let negative = h.market.deposit(retailer, Amount(-5)).await;
    assert!(matches!(
        negative,
        Err(MarketError::Validation(ValidationError::NonPositiveAmount(
            Amount(-5)
        )))
    ));
    let nothing = h.market.withdraw_funds(retailer, Amount::ZERO).await;
    assert!(matches!(
        nothing,
        Err(MarketError::Validation(ValidationError::NonPositiveAmount(
            Amount::ZERO
        )))
    ));

    let kinds: Vec<_> = h
        .market
        .entries(retailer)
        .await?
        .into_iter()
        .map(|e| (e.kind, e.amount))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (EntryKind::Deposit, Amount(300)),
            (EntryKind::Withdrawal, Amount(-100))
        ]
    );
    Ok(())
}
