//! Bid submission
//!
//! Bids are sent and forgotten. Whether one went through is only learned
//! later from the event stream: an accepted bid comes back as an ordinary
//! bid update, a rejected one as a bid error. Nothing here touches the
//! store.
use thiserror::Error;
use tracing::debug;

use crate::auction::{Amount, ItemBid, ItemId, ItemIdRef};
use crate::clock::Timestamp;
use crate::service::auction_house::SharedAuctionHouseClient;
use crate::store::AuctionItemStore;

pub const DEFAULT_BID_INCREMENT: Amount = 10;

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("unknown item: {0}")]
    UnknownItem(ItemId),
    #[error("auction already closed: {0}")]
    AuctionEnded(ItemId),
    #[error("session closed")]
    SessionClosed,
    #[error("failed to send bid")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

pub struct BidSubmitter {
    client: SharedAuctionHouseClient,
    increment: Amount,
}

impl BidSubmitter {
    pub fn new(client: SharedAuctionHouseClient, increment: Amount) -> Self {
        Self { client, increment }
    }

    /// Our next bid for `item_id`: the price we currently show plus the
    /// fixed increment
    ///
    /// The price may already be stale; the auction house sorts that out.
    pub fn propose(
        &self,
        store: &AuctionItemStore,
        item_id: ItemIdRef,
        now: Timestamp,
    ) -> Result<ItemBid, SubmitError> {
        let item = store
            .get(item_id)
            .ok_or_else(|| SubmitError::UnknownItem(item_id.to_owned()))?;

        let ended = store.phase(item_id).map(|p| p.is_ended()).unwrap_or(false);
        if ended || item.end_time <= now {
            return Err(SubmitError::AuctionEnded(item_id.to_owned()));
        }

        Ok(ItemBid {
            item_id: item.id,
            amount: item.current_bid.saturating_add(self.increment),
        })
    }

    pub fn submit(&self, bid: &ItemBid) -> Result<(), SubmitError> {
        debug!(?bid, "sending bid");
        self.client
            .place_bid(bid)
            .map_err(|e| SubmitError::Transport(e.into()))
    }

    pub fn submit_next(
        &self,
        store: &AuctionItemStore,
        item_id: ItemIdRef,
        now: Timestamp,
    ) -> Result<ItemBid, SubmitError> {
        let bid = self.propose(store, item_id, now)?;
        self.submit(&bid)?;
        Ok(bid)
    }
}
