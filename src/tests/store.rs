use crate::{
    auction::{AuctionItem, BidUpdate},
    store::{ApplyOutcome, AuctionItemStore, ItemPhase},
    tests::{item, START},
};

fn assert_consistent(store: &AuctionItemStore) {
    for item in store.all() {
        assert!(item.current_bid >= item.starting_price, "{item:?}");
        assert_eq!(
            item.highest_bidder.is_some(),
            item.current_bid > item.starting_price,
            "{item:?}"
        );
    }
}

fn catalog() -> Vec<AuctionItem> {
    vec![
        item("A", 50, START + 60_000),
        item("B", 100, START + 120_000),
    ]
}

#[test]
fn replace_all_is_idempotent() {
    let once = AuctionItemStore::new();
    assert!(once.is_empty());
    once.replace_all(catalog());
    assert!(!once.is_empty());

    let twice = AuctionItemStore::new();
    twice.replace_all(catalog());
    twice.replace_all(catalog());

    assert_eq!(once.all(), twice.all());
    assert_eq!(twice.len(), 2);
}

#[test]
fn replace_all_overwrites_wholesale_and_keeps_order() {
    let store = AuctionItemStore::new();
    store.replace_all(catalog());
    store.apply_bid_update(&BidUpdate::new("A", 70, Some("x")), START);

    store.replace_all(vec![item("C", 5, START + 1_000), item("A", 50, START + 60_000)]);

    let ids: Vec<_> = store.all().into_iter().map(|i| i.id).collect();
    assert_eq!(ids, vec!["C", "A"]);
    assert_eq!(store.get("A").map(|i| i.current_bid), Some(50));
    assert!(store.get("B").is_none());
}

#[test]
fn unknown_item_update_is_a_no_op() {
    let store = AuctionItemStore::new();
    store.replace_all(catalog());
    let before = store.all();

    let outcome = store.apply_bid_update(&BidUpdate::new("nonexistent", 100, Some("x")), START);

    assert_eq!(outcome, ApplyOutcome::UnknownItem);
    assert_eq!(store.len(), 2);
    assert_eq!(store.all(), before);
}

#[test]
fn applies_price_and_leader_together() {
    let store = AuctionItemStore::new();
    store.replace_all(catalog());

    let outcome = store.apply_bid_update(&BidUpdate::new("A", 60, Some("conn-1")), START);

    assert!(matches!(outcome, ApplyOutcome::Applied { .. }));
    let a = store.get("A").expect("known item");
    assert_eq!(a.current_bid, 60);
    assert_eq!(a.highest_bidder.as_deref(), Some("conn-1"));
    assert_eq!(store.phase("A"), Some(ItemPhase::Active));
    assert_eq!(store.phase("B"), Some(ItemPhase::NoBids));
}

#[test]
fn trusts_a_lower_authoritative_price() {
    let store = AuctionItemStore::new();
    store.replace_all(catalog());

    store.apply_bid_update(&BidUpdate::new("A", 90, Some("x")), START);
    let outcome = store.apply_bid_update(&BidUpdate::new("A", 60, Some("y")), START);

    assert!(matches!(outcome, ApplyOutcome::Applied { .. }));
    assert_eq!(store.get("A").map(|i| i.current_bid), Some(60));
}

#[test]
fn drops_updates_at_or_after_end_time() {
    let store = AuctionItemStore::new();
    store.replace_all(catalog());

    let outcome = store.apply_bid_update(&BidUpdate::new("A", 60, Some("x")), START + 60_000);

    assert_eq!(outcome, ApplyOutcome::Terminal);
    assert_eq!(store.get("A").map(|i| i.current_bid), Some(50));
}

#[test]
fn closed_item_stays_frozen_even_if_clock_goes_back() {
    let store = AuctionItemStore::new();
    store.replace_all(catalog());

    assert!(store.close("A"));
    assert!(!store.close("A"));

    let outcome = store.apply_bid_update(&BidUpdate::new("A", 60, Some("x")), START);
    assert_eq!(outcome, ApplyOutcome::Terminal);
    assert_eq!(store.phase("A"), Some(ItemPhase::Ended));

    // a later snapshot doesn't reopen it
    store.replace_all(catalog());
    assert_eq!(store.phase("A"), Some(ItemPhase::Ended));
}

#[test]
fn extended_end_time_reopens_closed_item() {
    let store = AuctionItemStore::new();
    store.replace_all(catalog());
    assert!(store.close("A"));

    store.replace_all(vec![item("A", 50, START + 600_000), item("B", 100, START + 120_000)]);

    assert_eq!(store.phase("A"), Some(ItemPhase::NoBids));
    let outcome = store.apply_bid_update(&BidUpdate::new("A", 70, Some("conn-7")), START);
    assert!(matches!(outcome, ApplyOutcome::Applied { .. }));
    assert_eq!(store.get("A").map(|i| i.current_bid), Some(70));
    assert!(store.close("A"));
}

#[test]
fn rejects_updates_breaking_price_invariants() {
    let store = AuctionItemStore::new();
    store.replace_all(catalog());

    for update in [
        BidUpdate::new("A", 40, Some("x")),
        BidUpdate::new("A", 50, Some("x")),
        BidUpdate::new("A", 60, None),
    ] {
        assert_eq!(
            store.apply_bid_update(&update, START),
            ApplyOutcome::Malformed
        );
    }

    assert_eq!(store.get("A"), Some(item("A", 50, START + 60_000)));
    assert_consistent(&store);
}

#[test]
fn skips_inconsistent_and_duplicate_items_on_install() {
    let store = AuctionItemStore::new();
    let mut broken = item("B", 100, START);
    broken.current_bid = 90;

    let installed = store.replace_all(vec![
        item("A", 50, START),
        broken,
        item("A", 10, START),
    ]);

    assert_eq!(installed, 1);
    assert_eq!(store.get("A").map(|i| i.starting_price), Some(50));
    assert_consistent(&store);
}

#[test]
fn invariants_hold_across_a_bidding_war() {
    let store = AuctionItemStore::new();
    store.replace_all(catalog());

    let updates = [
        BidUpdate::new("A", 60, Some("x")),
        BidUpdate::new("B", 100, Some("y")),
        BidUpdate::new("A", 70, Some("y")),
        BidUpdate::new("ghost", 1, None),
        BidUpdate::new("B", 110, Some("x")),
        BidUpdate::new("A", 55, None),
    ];
    for update in &updates {
        store.apply_bid_update(update, START);
        assert_consistent(&store);
    }

    assert_eq!(store.get("A").map(|i| i.current_bid), Some(70));
    assert_eq!(store.get("B").map(|i| i.current_bid), Some(110));
}
