//! In-memory auction item store
//!
//! The only owner of [`AuctionItem`] values for a session. Items are
//! installed wholesale from snapshots and afterwards only their
//! price/leader pair changes, one authoritative update at a time.
use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use crate::auction::{AuctionItem, BidDetails, BidUpdate, ItemId, ItemIdRef};
use crate::clock::Timestamp;

/// Where an item is in its lifetime
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum ItemPhase {
    NoBids,
    Active,
    Ended,
}

impl ItemPhase {
    pub fn is_ended(self) -> bool {
        self == ItemPhase::Ended
    }
}

/// What happened to an incoming bid update
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied {
        previous: BidDetails,
        current: BidDetails,
    },
    UnknownItem,
    Terminal,
    Malformed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Entry {
    item: AuctionItem,
    closed: bool,
}

impl Entry {
    fn phase(&self) -> ItemPhase {
        if self.closed {
            ItemPhase::Ended
        } else if self.item.highest_bidder.is_some() {
            ItemPhase::Active
        } else {
            ItemPhase::NoBids
        }
    }

    fn is_terminal(&self, now: Timestamp) -> bool {
        self.closed || self.item.end_time <= now
    }
}

#[derive(Default, Debug, PartialEq, Eq)]
struct Inner {
    // display order, as delivered by the auction house
    order: Vec<ItemId>,
    entries: BTreeMap<ItemId, Entry>,
}

#[derive(Default, Debug)]
pub struct AuctionItemStore {
    inner: RwLock<Inner>,
}

pub type SharedAuctionItemStore = Arc<AuctionItemStore>;

impl AuctionItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> SharedAuctionItemStore {
        Arc::new(Self::new())
    }

    /// Install a full item list, dropping whatever was there before
    ///
    /// Items that already ended stay ended unless their end time moved.
    pub fn replace_all(&self, items: Vec<AuctionItem>) -> usize {
        let mut inner = self.inner.write();
        let mut next = Inner::default();

        for item in items {
            if !item.is_consistent() {
                warn!(item_id = %item.id, "dropping inconsistent item");
                continue;
            }
            if next.entries.contains_key(&item.id) {
                warn!(item_id = %item.id, "dropping duplicate item");
                continue;
            }
            let closed = inner
                .entries
                .get(&item.id)
                .map(|e| e.closed && e.item.end_time == item.end_time)
                .unwrap_or(false);
            next.order.push(item.id.clone());
            next.entries.insert(item.id.clone(), Entry { item, closed });
        }

        *inner = next;
        inner.order.len()
    }

    /// Apply an authoritative bid update
    ///
    /// The values are taken as they come; a lower price than the one we
    /// hold is not second-guessed.
    pub fn apply_bid_update(&self, update: &BidUpdate, now: Timestamp) -> ApplyOutcome {
        let mut inner = self.inner.write();

        let entry = match inner.entries.get_mut(&update.item_id) {
            Some(entry) => entry,
            None => {
                debug!(item_id = %update.item_id, "update for unknown item");
                return ApplyOutcome::UnknownItem;
            }
        };

        if entry.is_terminal(now) {
            debug!(item_id = %update.item_id, "update after auction end");
            return ApplyOutcome::Terminal;
        }

        let current = update.details();
        if !entry.item.accepts(&current) {
            warn!(?update, "dropping inconsistent bid update");
            return ApplyOutcome::Malformed;
        }

        let previous = entry.item.bid_details();
        entry.item.current_bid = current.current_bid;
        entry.item.highest_bidder = current.highest_bidder.clone();

        ApplyOutcome::Applied { previous, current }
    }

    /// Freeze an item; returns `true` if it wasn't already
    pub fn close(&self, item_id: ItemIdRef) -> bool {
        match self.inner.write().entries.get_mut(item_id) {
            Some(entry) if !entry.closed => {
                entry.closed = true;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, item_id: ItemIdRef) -> Option<AuctionItem> {
        self.inner
            .read()
            .entries
            .get(item_id)
            .map(|e| e.item.clone())
    }

    pub fn phase(&self, item_id: ItemIdRef) -> Option<ItemPhase> {
        self.inner.read().entries.get(item_id).map(Entry::phase)
    }

    /// All items with their phases, in display order
    pub fn all_with_phase(&self) -> Vec<(AuctionItem, ItemPhase)> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id))
            .map(|e| (e.item.clone(), e.phase()))
            .collect()
    }

    pub fn all(&self) -> Vec<AuctionItem> {
        self.all_with_phase()
            .into_iter()
            .map(|(item, _)| item)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
