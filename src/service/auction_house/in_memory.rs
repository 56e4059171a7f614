use std::collections::BTreeMap;

use anyhow::{bail, Result};
use parking_lot::Mutex;
use tracing::debug;

use super::*;
use crate::{
    auction::{BidUpdate, BidderIdRef},
    clock::{SharedClock, Timestamp},
    event::{BidError, SnapshotPayload},
};

/// Fake in-process auction house.
///
/// Validates bids against its own clock and broadcasts the results to all
/// connections, like the real one would. Useful for unit-tests and for
/// running the binary without a server.
pub struct InMemoryAuctionHouse {
    clock: SharedClock,
    inner: Mutex<HouseInner>,
}

struct HouseInner {
    items: Vec<AuctionItem>,
    connections: BTreeMap<BidderId, InboundSink>,
    next_connection: u64,
    skew: i64,
    timed_snapshot: bool,
    reachable: bool,
}

impl HouseInner {
    fn broadcast(&mut self, event: &InboundEvent) {
        self.connections
            .retain(|_id, sink| sink.deliver(event.clone()));
    }

    fn send_to(&mut self, id: BidderIdRef, event: InboundEvent) {
        if let Some(sink) = self.connections.get(id) {
            if !sink.deliver(event) {
                self.connections.remove(id);
            }
        }
    }
}

impl InMemoryAuctionHouse {
    pub fn new(clock: SharedClock, items: Vec<AuctionItem>) -> Self {
        Self {
            clock,
            inner: Mutex::new(HouseInner {
                items,
                connections: BTreeMap::new(),
                next_connection: 1,
                skew: 0,
                timed_snapshot: true,
                reachable: true,
            }),
        }
    }

    pub fn new_shared(clock: SharedClock, items: Vec<AuctionItem>) -> Arc<Self> {
        Arc::new(Self::new(clock, items))
    }

    /// Run the house clock `millis` ahead of the local one
    pub fn set_skew(&self, millis: i64) {
        self.inner.lock().skew = millis;
    }

    /// Send snapshots as a bare item list, without the server time
    pub fn set_timed_snapshot(&self, timed: bool) {
        self.inner.lock().timed_snapshot = timed;
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.inner.lock().reachable = reachable;
    }

    pub fn server_now(&self) -> Timestamp {
        let skew = self.inner.lock().skew;
        self.clock.now().saturating_add(skew)
    }

    pub fn items(&self) -> Vec<AuctionItem> {
        self.inner.lock().items.clone()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.lock().connections.len()
    }

    /// A client with a freshly assigned connection id
    pub fn connect(self: &Arc<Self>) -> InMemoryClient {
        let id = {
            let mut inner = self.inner.lock();
            let id = format!("conn-{}", inner.next_connection);
            inner.next_connection += 1;
            id
        };
        self.connect_as(id)
    }

    pub fn connect_as(self: &Arc<Self>, id: impl Into<BidderId>) -> InMemoryClient {
        InMemoryClient {
            house: self.clone(),
            id: id.into(),
        }
    }

    fn subscribe(&self, id: BidderIdRef, sink: InboundSink) {
        let server_now = self.server_now();
        let mut inner = self.inner.lock();

        if !inner.reachable {
            sink.deliver(InboundEvent::ConnectError("connection refused".to_owned()));
            return;
        }

        let items = inner.items.clone();
        let snapshot = if inner.timed_snapshot {
            SnapshotPayload::Timed {
                items,
                server_time: server_now,
            }
        } else {
            SnapshotPayload::Items(items)
        };

        if sink.deliver(InboundEvent::Connected)
            && sink.deliver(InboundEvent::InitialSnapshot(snapshot))
        {
            debug!(%id, "connection subscribed");
            inner.connections.insert(id.to_owned(), sink);
        }
    }

    fn unsubscribe(&self, id: BidderIdRef) {
        if self.inner.lock().connections.remove(id).is_some() {
            debug!(%id, "connection dropped");
        }
    }

    fn is_subscribed(&self, id: BidderIdRef) -> bool {
        self.inner.lock().connections.contains_key(id)
    }

    /// Handle a raw frame sent by `bidder`
    pub fn receive_frame(&self, bidder: BidderIdRef, name: &str, payload: &str) -> Result<()> {
        let bid = ItemBid::decode(name, payload)?;
        self.place_bid_as(bidder, &bid);
        Ok(())
    }

    /// Judge a bid from `bidder` and tell everyone about the result
    ///
    /// Accepted bids go out to every connection, rejections only to the
    /// bidder.
    pub fn place_bid_as(&self, bidder: BidderIdRef, bid: &ItemBid) {
        let server_now = self.server_now();
        let mut inner = self.inner.lock();

        let verdict = match inner.items.iter_mut().find(|i| i.id == bid.item_id) {
            None => Err("Item not found"),
            Some(item) if item.end_time <= server_now => Err("Auction has ended"),
            Some(item) if bid.amount <= item.current_bid => Err("Bid too low"),
            Some(item) => {
                item.current_bid = bid.amount;
                item.highest_bidder = Some(bidder.to_owned());
                Ok(BidUpdate::new(item.id.clone(), item.current_bid, Some(bidder)))
            }
        };

        match verdict {
            Ok(update) => {
                debug!(?update, "bid accepted");
                inner.broadcast(&InboundEvent::BidUpdate(update));
            }
            Err(message) => {
                debug!(%bidder, ?bid, reason = message, "bid rejected");
                inner.send_to(
                    bidder,
                    InboundEvent::BidError(BidError {
                        message: message.to_owned(),
                    }),
                );
            }
        }
    }

    /// Push an arbitrary event to every connection
    pub fn broadcast(&self, event: InboundEvent) {
        self.inner.lock().broadcast(&event);
    }

    /// Drop every connection, telling them why
    pub fn disconnect_all(&self, reason: &str) {
        let mut inner = self.inner.lock();
        inner.broadcast(&InboundEvent::Disconnected(reason.to_owned()));
        inner.connections.clear();
    }
}

#[async_trait]
impl ItemCatalog for InMemoryAuctionHouse {
    async fn fetch_items(&self) -> Result<Vec<AuctionItem>> {
        if !self.inner.lock().reachable {
            bail!("auction house unreachable");
        }
        Ok(self.items())
    }
}

/// One connection to an [`InMemoryAuctionHouse`]
#[derive(Clone)]
pub struct InMemoryClient {
    house: Arc<InMemoryAuctionHouse>,
    id: BidderId,
}

impl InMemoryClient {
    pub fn into_shared(self) -> SharedAuctionHouseClient {
        Arc::new(self)
    }
}

impl AuctionHouseClient for InMemoryClient {
    fn session_id(&self) -> Option<BidderId> {
        if self.house.is_subscribed(&self.id) {
            Some(self.id.clone())
        } else {
            None
        }
    }

    fn subscribe(&self, sink: InboundSink) -> Result<()> {
        self.house.subscribe(&self.id, sink);
        Ok(())
    }

    fn place_bid(&self, bid: &ItemBid) -> Result<()> {
        if !self.house.is_subscribed(&self.id) {
            bail!("not connected");
        }
        let (name, payload) = bid.encode()?;
        self.house.receive_frame(&self.id, name, &payload)
    }

    fn disconnect(&self) {
        self.house.unsubscribe(&self.id);
    }
}
