//! Bid reconciler
//!
//! Applies what the auction house tells us to the item store and works
//! out what it means for us: are we winning, did we just get outbid, did
//! the auction close with us on top.
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::auction::{AuctionItem, BidUpdate, BidderIdRef, ItemId, ItemIdRef};
use crate::clock::Timestamp;
use crate::countdown::Tick;
use crate::event::Notification;
use crate::store::{ApplyOutcome, AuctionItemStore, ItemPhase};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Badge {
    YouWon,
    YouAreWinning,
}

impl Badge {
    pub fn for_item(phase: ItemPhase, winning: bool) -> Option<Self> {
        match (phase, winning) {
            (_, false) => None,
            (ItemPhase::Ended, true) => Some(Badge::YouWon),
            (ItemPhase::NoBids | ItemPhase::Active, true) => Some(Badge::YouAreWinning),
        }
    }
}

impl fmt::Display for Badge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Badge::YouWon => "YOU WON!",
            Badge::YouAreWinning => "YOU ARE WINNING",
        })
    }
}

pub fn is_winning(item: &AuctionItem, self_id: Option<BidderIdRef>) -> bool {
    item.is_led_by(self_id)
}

/// A flash started by an accepted bid; expires unless a newer one replaced it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlashPulse {
    pub item_id: ItemId,
    pub generation: u64,
}

#[derive(Debug, Default)]
pub struct Reconciliation {
    pub notifications: Vec<Notification>,
    pub flash: Option<FlashPulse>,
}

#[derive(Debug, Default)]
pub struct BidReconciler {
    flashes: BTreeMap<ItemId, u64>,
    next_generation: u64,
}

impl BidReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_bid_update(
        &mut self,
        store: &AuctionItemStore,
        update: &BidUpdate,
        now: Timestamp,
        self_id: Option<BidderIdRef>,
    ) -> Reconciliation {
        let (previous, current) = match store.apply_bid_update(update, now) {
            ApplyOutcome::Applied { previous, current } => (previous, current),
            outcome => {
                debug!(?update, ?outcome, "bid update not applied");
                return Reconciliation::default();
            }
        };

        let leads = |bidder: &Option<String>| {
            matches!((bidder.as_deref(), self_id), (Some(a), Some(b)) if a == b)
        };

        let mut notifications = vec![Notification::BidAccepted {
            item_id: update.item_id.clone(),
            current_bid: current.current_bid,
            highest_bidder: current.highest_bidder.clone(),
        }];

        if leads(&previous.highest_bidder) && !leads(&current.highest_bidder) {
            notifications.push(Notification::Outbid {
                item_id: update.item_id.clone(),
            });
        }

        // only a price change flashes
        let flash = (previous.current_bid != current.current_bid).then(|| {
            notifications.push(Notification::Flash {
                item_id: update.item_id.clone(),
                active: true,
            });
            self.start_flash(&update.item_id)
        });

        Reconciliation {
            notifications,
            flash,
        }
    }

    /// Handle a countdown reading; the first `Ended` closes the item
    pub fn apply_tick(
        &mut self,
        store: &AuctionItemStore,
        tick: &Tick,
        self_id: Option<BidderIdRef>,
    ) -> Vec<Notification> {
        let mut notifications = vec![Notification::Countdown {
            item_id: tick.item_id.clone(),
            display: tick.display,
        }];

        if tick.display.is_ended() && store.close(&tick.item_id) {
            let won = store
                .get(&tick.item_id)
                .map(|item| is_winning(&item, self_id))
                .unwrap_or(false);
            debug!(item_id = %tick.item_id, won, "auction ended");
            notifications.push(Notification::AuctionEnded {
                item_id: tick.item_id.clone(),
                won,
            });
        }

        notifications
    }

    fn start_flash(&mut self, item_id: ItemIdRef) -> FlashPulse {
        self.next_generation += 1;
        self.flashes
            .insert(item_id.to_owned(), self.next_generation);
        FlashPulse {
            item_id: item_id.to_owned(),
            generation: self.next_generation,
        }
    }

    /// Clear the flash started by `pulse`, if nothing newer replaced it
    pub fn expire_flash(&mut self, pulse: &FlashPulse) -> Option<Notification> {
        if self.flashes.get(&pulse.item_id) == Some(&pulse.generation) {
            self.flashes.remove(&pulse.item_id);
            Some(Notification::Flash {
                item_id: pulse.item_id.clone(),
                active: false,
            })
        } else {
            None
        }
    }

    pub fn is_flashing(&self, item_id: ItemIdRef) -> bool {
        self.flashes.contains_key(item_id)
    }

    /// Forget flashes of items that are gone
    pub fn retain(&mut self, items: &[AuctionItem]) {
        self.flashes
            .retain(|id, _| items.iter().any(|item| &item.id == id));
    }
}
