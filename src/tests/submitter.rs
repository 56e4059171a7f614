use std::sync::Arc;

use anyhow::{bail, Result};
use parking_lot::Mutex;

use crate::{
    auction::{BidUpdate, BidderId, ItemBid},
    service::{AuctionHouseClient, InboundSink},
    store::AuctionItemStore,
    submitter::{BidSubmitter, SubmitError, DEFAULT_BID_INCREMENT},
    tests::{item, START},
};

#[derive(Default)]
struct RecordingClient {
    sent: Mutex<Vec<ItemBid>>,
    offline: bool,
}

impl AuctionHouseClient for RecordingClient {
    fn session_id(&self) -> Option<BidderId> {
        Some("conn-1".to_owned())
    }

    fn subscribe(&self, _sink: InboundSink) -> Result<()> {
        Ok(())
    }

    fn place_bid(&self, bid: &ItemBid) -> Result<()> {
        if self.offline {
            bail!("socket closed");
        }
        self.sent.lock().push(bid.clone());
        Ok(())
    }

    fn disconnect(&self) {}
}

fn setup(offline: bool) -> (Arc<RecordingClient>, BidSubmitter, AuctionItemStore) {
    let client = Arc::new(RecordingClient {
        offline,
        ..Default::default()
    });
    let submitter = BidSubmitter::new(client.clone(), DEFAULT_BID_INCREMENT);
    let store = AuctionItemStore::new();
    store.replace_all(vec![item("A", 50, START + 60_000)]);
    (client, submitter, store)
}

#[test]
fn bids_increment_over_displayed_price_without_touching_store() -> Result<()> {
    let (client, submitter, store) = setup(false);
    store.apply_bid_update(&BidUpdate::new("A", 75, Some("conn-9")), START);
    let before = store.all();

    let bid = submitter.submit_next(&store, "A", START)?;

    assert_eq!(
        bid,
        ItemBid {
            item_id: "A".into(),
            amount: 85
        }
    );
    assert_eq!(*client.sent.lock(), vec![bid]);
    assert_eq!(store.all(), before);
    Ok(())
}

#[test]
fn refuses_ended_auctions_without_sending() {
    let (client, submitter, store) = setup(false);

    assert!(matches!(
        submitter.submit_next(&store, "A", START + 60_000),
        Err(SubmitError::AuctionEnded(id)) if id == "A"
    ));

    store.close("A");
    assert!(matches!(
        submitter.submit_next(&store, "A", START),
        Err(SubmitError::AuctionEnded(_))
    ));
    assert!(client.sent.lock().is_empty());
}

#[test]
fn refuses_unknown_items() {
    let (client, submitter, store) = setup(false);

    assert!(matches!(
        submitter.submit_next(&store, "Z", START),
        Err(SubmitError::UnknownItem(id)) if id == "Z"
    ));
    assert!(client.sent.lock().is_empty());
}

#[test]
fn reports_transport_failures() {
    let (_client, submitter, store) = setup(true);

    let err = submitter
        .submit_next(&store, "A", START)
        .expect_err("offline client fails");

    assert!(matches!(err, SubmitError::Transport(_)));
    assert_eq!(
        std::error::Error::source(&err).map(|e| e.to_string()),
        Some("socket closed".to_owned())
    );
}
