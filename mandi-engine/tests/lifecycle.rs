mod common;

use common::{HOUR, Harness, MINUTE, listing};
use mandi_core::models::{
    Amount, BiddingType, Closing, LotStatus, MarketEvent, Quantity, Role, Schedule,
};
use mandi_core::ports::CloseOutcome;
use mandi_core::{ConflictError, ValidationError};
use mandi_engine::{MarketError, Scheduler, TickReport};
use std::time::Duration;

#[tokio::test]
async fn tick_opens_and_closes_on_time() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let farmer = h.user(Role::Farmer).await?;
    let crop = h
        .market
        .list_crop(farmer, listing(100, 10, BiddingType::Open))
        .await?;
    let lot_id = crop.lot_id();
    h.market
        .schedule(lot_id, h.now() + 10 * MINUTE, HOUR)
        .await?;

    assert_eq!(h.market.tick().await?, TickReport::default());

    h.advance(10 * MINUTE);
    let report = h.market.tick().await?;
    assert_eq!(report.opened, 1);
    let lot = h.market.get_lot(lot_id).await?;
    assert_eq!(lot.auction().status, LotStatus::Open);
    let window = lot.auction().window.unwrap();
    assert_eq!(window.end - window.start, HOUR);

    h.advance(HOUR);
    let report = h.market.tick().await?;
    assert_eq!(report.closed, 1);
    assert_eq!(report.failed, 0);
    Ok(())
}

#[tokio::test]
async fn a_quiet_window_relists_exactly_once() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let farmer = h.user(Role::Farmer).await?;
    let lot_id = h.open_crop(farmer, 100, 10, BiddingType::Open).await?;

    h.advance(HOUR);
    let first = h.market.close_lot(lot_id, 1).await?;
    assert!(!first.replayed);
    assert_eq!(first.record.outcome, CloseOutcome::Relisted);

    let lot = h.market.get_lot(lot_id).await?;
    let state = lot.auction();
    assert_eq!(state.status, LotStatus::Scheduled);
    assert_eq!(state.attempt_number, 2);
    assert_eq!(
        state.schedule,
        Some(Schedule {
            start: h.now(),
            duration: 2 * HOUR,
        })
    );
    assert!(state.window.is_none());

    // The scheduler may fire the same close again
    let again = h.market.close_lot(lot_id, 1).await?;
    assert!(again.replayed);
    assert_eq!(again.record, first.record);
    assert_eq!(h.market.get_lot(lot_id).await?.auction().attempt_number, 2);
    assert_eq!(
        h.events
            .count(|e| matches!(e, MarketEvent::LotRelisted { .. })),
        1
    );
    Ok(())
}

#[tokio::test]
async fn attempts_run_out_and_the_lot_closes_unsold() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let farmer = h.user(Role::Farmer).await?;
    let lot_id = h.open_crop(farmer, 100, 10, BiddingType::Open).await?;

    // one hour, then two, then four
    let mut last = None;
    for (attempt, window) in [(1, HOUR), (2, 2 * HOUR), (3, 4 * HOUR)] {
        h.market.open_lot(lot_id, attempt).await?;
        h.advance(window);
        last = Some(h.market.close_lot(lot_id, attempt).await?);
    }
    assert_eq!(
        last.map(|report| report.record.outcome),
        Some(CloseOutcome::Exhausted)
    );

    let lot = h.market.get_lot(lot_id).await?;
    assert_eq!(lot.auction().status, LotStatus::Closed(Closing::Unsold));
    assert_eq!(lot.auction().attempt_number, 3);

    // Out of attempts is final
    let again = h.market.schedule(lot_id, h.now(), HOUR).await;
    assert!(matches!(
        again,
        Err(MarketError::Validation(ValidationError::AttemptsExhausted {
            max_attempts: 3
        }))
    ));
    let lot = h.market.get_lot(lot_id).await?;
    assert_eq!(lot.auction().status, LotStatus::Closed(Closing::Unsold));
    assert_eq!(lot.auction().attempt_number, 3);
    Ok(())
}

#[tokio::test]
async fn a_lot_cannot_open_before_its_start() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let farmer = h.user(Role::Farmer).await?;
    let crop = h
        .market
        .list_crop(farmer, listing(100, 10, BiddingType::Open))
        .await?;
    let lot_id = crop.lot_id();
    let start = h.now() + 5 * HOUR;
    h.market.schedule(lot_id, start, HOUR).await?;

    let early = h.market.open_lot(lot_id, 1).await;
    assert!(matches!(
        early,
        Err(MarketError::Validation(ValidationError::NotYetDue { start: at })) if at == start
    ));
    assert_eq!(
        h.market.get_lot(lot_id).await?.auction().status,
        LotStatus::Scheduled
    );

    h.advance(5 * HOUR);
    let lot = h.market.open_lot(lot_id, 1).await?;
    assert_eq!(lot.auction().status, LotStatus::Open);
    // Opening twice is harmless
    h.market.open_lot(lot_id, 1).await?;
    Ok(())
}

#[tokio::test]
async fn closing_early_or_with_an_old_attempt_is_refused() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let farmer = h.user(Role::Farmer).await?;
    let lot_id = h.open_crop(farmer, 100, 10, BiddingType::Open).await?;

    let early = h.market.close_lot(lot_id, 1).await;
    assert!(matches!(
        early,
        Err(MarketError::Validation(ValidationError::WindowStillOpen))
    ));

    let stale = h.market.close_lot(lot_id, 2).await;
    assert!(matches!(
        stale,
        Err(MarketError::Conflict(ConflictError::StaleAttempt {
            requested: 2,
            current: 1
        }))
    ));
    Ok(())
}

#[tokio::test]
async fn schedules_must_be_in_bounds() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let farmer = h.user(Role::Farmer).await?;
    let crop = h
        .market
        .list_crop(farmer, listing(100, 10, BiddingType::Open))
        .await?;
    let lot_id = crop.lot_id();

    let past = h.market.schedule(lot_id, h.now() - MINUTE, HOUR).await;
    assert!(matches!(
        past,
        Err(MarketError::Validation(ValidationError::StartInPast))
    ));

    let short = h
        .market
        .schedule(lot_id, h.now(), Duration::from_secs(10))
        .await;
    assert!(matches!(
        short,
        Err(MarketError::Validation(ValidationError::DurationTooShort { .. }))
    ));

    let long = h.market.schedule(lot_id, h.now(), 25 * HOUR).await;
    assert!(matches!(
        long,
        Err(MarketError::Validation(ValidationError::DurationTooLong { .. }))
    ));

    let lot = h.market.get_lot(lot_id).await?;
    assert_eq!(lot.auction().status, LotStatus::Draft);
    Ok(())
}

#[tokio::test]
async fn withdrawal_is_only_possible_before_bidding() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let farmer = h.user(Role::Farmer).await?;

    let crop = h
        .market
        .list_crop(farmer, listing(100, 10, BiddingType::Open))
        .await?;
    h.market.schedule(crop.lot_id(), h.now(), HOUR).await?;
    let lot = h.market.withdraw(crop.lot_id()).await?;
    assert_eq!(lot.auction().status, LotStatus::Withdrawn);

    let open = h.open_crop(farmer, 100, 10, BiddingType::Open).await?;
    let refused = h.market.withdraw(open).await;
    assert!(matches!(
        refused,
        Err(MarketError::Validation(ValidationError::InvalidTransition {
            from: LotStatus::Open,
            ..
        }))
    ));
    Ok(())
}

#[tokio::test]
async fn only_farmers_list_and_listings_are_validated() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let farmer = h.user(Role::Farmer).await?;
    let retailer = h.user(Role::Retailer).await?;

    let wrong = h
        .market
        .list_crop(retailer, listing(100, 10, BiddingType::Open))
        .await;
    assert!(matches!(
        wrong,
        Err(MarketError::Validation(ValidationError::WrongRole {
            role: Role::Farmer,
            ..
        }))
    ));

    let empty = h
        .market
        .list_crop(farmer, listing(0, 10, BiddingType::Open))
        .await;
    assert!(matches!(
        empty,
        Err(MarketError::Validation(ValidationError::NonPositiveQuantity(
            Quantity(0)
        )))
    ));

    let free = h
        .market
        .list_crop(farmer, listing(10, 0, BiddingType::Open))
        .await;
    assert!(matches!(
        free,
        Err(MarketError::Validation(ValidationError::NonPositivePrice(
            Amount(0)
        )))
    ));

    let crop = h
        .market
        .list_crop(farmer, listing(10, 5, BiddingType::Sealed))
        .await?;
    assert_eq!(crop.commodity, "onion");
    assert_eq!(h.market.crops_by_farmer(farmer).await?, vec![crop]);
    Ok(())
}

#[tokio::test]
async fn reconcile_closes_lots_left_open_past_grace() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let farmer = h.user(Role::Farmer).await?;
    let lot_id = h.open_crop(farmer, 100, 10, BiddingType::Open).await?;

    // Still inside the grace period
    h.advance(HOUR + MINUTE);
    assert_eq!(h.market.reconcile().await?, 0);

    h.advance(5 * MINUTE);
    assert_eq!(h.market.reconcile().await?, 1);

    let lot = h.market.get_lot(lot_id).await?;
    assert_ne!(lot.auction().status, LotStatus::Open);
    assert_eq!(lot.auction().attempt_number, 2);
    Ok(())
}

#[tokio::test]
async fn the_scheduler_loop_drives_ticks_until_stopped() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let farmer = h.user(Role::Farmer).await?;
    let crop = h
        .market
        .list_crop(farmer, listing(100, 10, BiddingType::Open))
        .await?;
    h.market.schedule(crop.lot_id(), h.now(), HOUR).await?;

    let handle = Scheduler::new(h.market.clone(), Duration::from_millis(10)).start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.stop().await;

    let lot = h.market.get_lot(crop.lot_id()).await?;
    assert_eq!(lot.auction().status, LotStatus::Open);
    assert_eq!(
        h.events
            .count(|e| matches!(e, MarketEvent::LotOpened { .. })),
        1
    );
    Ok(())
}
