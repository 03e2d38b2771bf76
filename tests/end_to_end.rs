//! Feed events through sequencing, book building and publication

use std::sync::Arc;

use market_data::feed::{BookDiff, BookSnapshot, FeedEvent, LevelUpdate, ResyncHandle};
use market_data::{BookStatus, Metrics, Pipeline, PriceLevel, SnapshotPublisher, SyncState};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;

fn pipeline() -> (
    Pipeline,
    Arc<SnapshotPublisher>,
    mpsc::UnboundedReceiver<market_data::feed::ResyncRequest>,
) {
    let publisher = Arc::new(SnapshotPublisher::new(2));
    let (resync, requests) = ResyncHandle::channel();
    let pipeline = Pipeline::new(2, publisher.clone(), resync, Metrics::new().unwrap());
    (pipeline, publisher, requests)
}

fn snapshot(sequence: u64, bids: &[(Decimal, Decimal)], asks: &[(Decimal, Decimal)]) -> FeedEvent {
    let levels = |side: &[(Decimal, Decimal)]| -> Vec<PriceLevel> {
        side.iter()
            .map(|&(price, quantity)| PriceLevel::new(price, quantity))
            .collect()
    };
    FeedEvent::Snapshot(BookSnapshot {
        sequence,
        timestamp: sequence,
        bids: levels(bids),
        asks: levels(asks),
    })
}

fn diff(sequence: u64, updates: Vec<LevelUpdate>) -> FeedEvent {
    FeedEvent::Diff(BookDiff {
        sequence,
        timestamp: sequence,
        updates,
    })
}

#[test]
fn test_snapshot_and_contiguous_diffs() {
    let (mut pipeline, publisher, mut requests) = pipeline();

    pipeline.handle(snapshot(10, &[(dec!(100), dec!(1))], &[(dec!(101), dec!(1))]));
    pipeline.handle(diff(11, vec![LevelUpdate::bid(dec!(100), dec!(2))]));
    pipeline.handle(diff(12, vec![LevelUpdate::ask(dec!(101), dec!(0))]));

    // Emptying the ask side leaves a flagged one-sided book, not a fault
    let view = publisher.current();
    assert!(view.is_one_sided());
    assert!(view.is_live());
    assert_eq!(view.best_ask(), None);
    assert!(!view.metrics.is_healthy());

    pipeline.handle(diff(13, vec![LevelUpdate::ask(dec!(102), dec!(5))]));

    let view = publisher.current();
    assert_eq!(view.status, BookStatus::Live);
    assert_eq!(view.sequence, 13);
    assert_eq!(view.bids, vec![PriceLevel::new(dec!(100), dec!(2))]);
    assert_eq!(view.asks, vec![PriceLevel::new(dec!(102), dec!(5))]);
    assert!(!view.is_one_sided());
    assert!(requests.try_recv().is_err());
}

#[test]
fn test_gap_recovers_only_after_new_snapshot() {
    let (mut pipeline, publisher, mut requests) = pipeline();

    pipeline.handle(snapshot(1, &[(dec!(100), dec!(1))], &[(dec!(101), dec!(1))]));
    pipeline.handle(diff(2, vec![LevelUpdate::bid(dec!(99), dec!(1))]));
    pipeline.handle(diff(4, vec![LevelUpdate::bid(dec!(98), dec!(1))]));

    assert_eq!(pipeline.sync_state(), SyncState::AwaitingSnapshot);
    assert_eq!(requests.try_recv().unwrap().last_snapshot, Some(1));

    let view = publisher.current();
    assert_eq!(view.status, BookStatus::Resyncing);
    assert_eq!(view.bids.len(), 2);

    // Late diffs from the broken stream change nothing
    pipeline.handle(diff(3, vec![LevelUpdate::bid(dec!(97), dec!(1))]));
    pipeline.handle(diff(5, vec![LevelUpdate::bid(dec!(96), dec!(1))]));
    assert_eq!(publisher.current().version, view.version);

    pipeline.handle(snapshot(6, &[(dec!(95), dec!(1))], &[(dec!(96), dec!(1))]));
    let view = publisher.current();
    assert_eq!(view.status, BookStatus::Live);
    assert_eq!(view.bids, vec![PriceLevel::new(dec!(95), dec!(1))]);
    assert_eq!(view.asks, vec![PriceLevel::new(dec!(96), dec!(1))]);
}

#[test]
fn test_redelivered_diff_is_idempotent() {
    let (mut pipeline, publisher, _requests) = pipeline();

    pipeline.handle(snapshot(1, &[(dec!(100), dec!(1))], &[(dec!(101), dec!(1))]));
    pipeline.handle(diff(2, vec![LevelUpdate::bid(dec!(100), dec!(3))]));
    let before = publisher.current();

    pipeline.handle(diff(2, vec![LevelUpdate::bid(dec!(100), dec!(3))]));
    let after = publisher.current();

    assert_eq!(after.version, before.version);
    assert_eq!(after.bids, before.bids);
    assert_eq!(pipeline.sync_state(), SyncState::Synced);
}

#[test]
fn test_removing_absent_level_is_noop() {
    let (mut pipeline, publisher, _requests) = pipeline();

    pipeline.handle(snapshot(1, &[(dec!(100), dec!(1))], &[(dec!(101), dec!(1))]));
    pipeline.handle(diff(2, vec![LevelUpdate::ask(dec!(150), dec!(0))]));

    let view = publisher.current();
    assert_eq!(view.status, BookStatus::Live);
    assert_eq!(view.asks, vec![PriceLevel::new(dec!(101), dec!(1))]);
}

#[test]
fn test_snapshot_replaces_both_sides() {
    let (mut pipeline, publisher, _requests) = pipeline();

    pipeline.handle(snapshot(
        1,
        &[(dec!(100), dec!(1)), (dec!(99), dec!(1))],
        &[(dec!(101), dec!(1))],
    ));
    pipeline.handle(snapshot(9, &[(dec!(50), dec!(4))], &[]));

    let view = publisher.current();
    assert_eq!(view.sequence, 9);
    assert_eq!(view.bids, vec![PriceLevel::new(dec!(50), dec!(4))]);
    assert!(view.asks.is_empty());
    assert!(view.is_one_sided());
}

#[test]
fn test_empty_snapshot_is_valid() {
    let (mut pipeline, publisher, mut requests) = pipeline();

    pipeline.handle(snapshot(1, &[], &[]));
    pipeline.handle(diff(2, vec![LevelUpdate::ask(dec!(10), dec!(1))]));

    let view = publisher.current();
    assert_eq!(view.status, BookStatus::Live);
    assert_eq!(view.best_ask(), Some(dec!(10)));
    assert_eq!(view.best_bid(), None);
    assert!(requests.try_recv().is_err());
}

fn arb_update() -> impl Strategy<Value = LevelUpdate> {
    (any::<bool>(), 90u32..110, 0u32..4).prop_map(|(bid, price, quantity)| {
        let price = Decimal::from(price);
        let quantity = Decimal::from(quantity);
        if bid {
            LevelUpdate::bid(price, quantity)
        } else {
            LevelUpdate::ask(price, quantity)
        }
    })
}

proptest! {
    #[test]
    fn published_views_never_violate_invariants(
        batches in proptest::collection::vec(proptest::collection::vec(arb_update(), 1..5), 1..60),
    ) {
        let (mut pipeline, publisher, mut requests) = pipeline();
        let mut sequence = 1;
        pipeline.handle(snapshot(sequence, &[(dec!(99), dec!(1))], &[(dec!(101), dec!(1))]));

        for updates in batches {
            sequence += 1;
            pipeline.handle(diff(sequence, updates));

            // Recover like the feed session would
            if requests.try_recv().is_ok() {
                sequence += 1;
                pipeline.handle(snapshot(sequence, &[(dec!(99), dec!(1))], &[(dec!(101), dec!(1))]));
            }

            let view = publisher.current();
            prop_assert!(view.bids.iter().all(|l| l.quantity > Decimal::ZERO));
            prop_assert!(view.asks.iter().all(|l| l.quantity > Decimal::ZERO));
            prop_assert!(view.bids.windows(2).all(|w| w[0].price > w[1].price));
            prop_assert!(view.asks.windows(2).all(|w| w[0].price < w[1].price));
            if let (Some(bid), Some(ask)) = (view.best_bid(), view.best_ask()) {
                prop_assert!(bid < ask);
            }
        }
    }
}
