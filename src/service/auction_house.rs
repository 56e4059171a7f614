use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::{
    auction::{AuctionItem, BidderId, ItemBid},
    event::InboundEvent,
};

mod in_memory;
pub use self::in_memory::*;

/// Where the auction house connection delivers inbound events
///
/// Returns `false` once nobody is listening anymore, after which the
/// connection should stop delivering.
#[derive(Clone)]
pub struct InboundSink(Arc<dyn Fn(InboundEvent) -> bool + Send + Sync + 'static>);

impl InboundSink {
    pub fn new(f: impl Fn(InboundEvent) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn deliver(&self, event: InboundEvent) -> bool {
        (self.0)(event)
    }
}

impl std::fmt::Debug for InboundSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("InboundSink")
    }
}

/// Our connection to the auction house
///
/// Handshake, reconnects and encoding are the implementation's business;
/// the session only sees events arriving at its sink.
pub trait AuctionHouseClient {
    /// Identifier the auction house knows this connection by
    fn session_id(&self) -> Option<BidderId>;

    /// Start delivering events to `sink`
    fn subscribe(&self, sink: InboundSink) -> Result<()>;

    /// Send a bid; the outcome arrives later as an inbound event
    fn place_bid(&self, bid: &ItemBid) -> Result<()>;

    /// Stop delivering events and drop the connection
    fn disconnect(&self);
}

pub type SharedAuctionHouseClient = Arc<dyn AuctionHouseClient + Send + Sync + 'static>;

/// Plain request/response access to the full item list
#[async_trait]
pub trait ItemCatalog {
    async fn fetch_items(&self) -> Result<Vec<AuctionItem>>;
}

pub type SharedItemCatalog = Arc<dyn ItemCatalog + Send + Sync + 'static>;
