//! Auction session
//!
//! One session per connection to the auction house. Everything that can
//! change session state (inbound events, countdown ticks, flash expiries,
//! the fallback item fetch, our own bid requests) is a [`SessionMessage`]
//! on a single channel, handled one at a time by the session task. That
//! gives us strict arrival ordering without any locking beyond the item
//! store's reader/writer lock.
use std::collections::BTreeMap;

use anyhow::{format_err, Context, Result};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use super::{
    auction_house::{InboundSink, SharedAuctionHouseClient, SharedItemCatalog},
    TaskHandle,
};
use crate::{
    auction::{AuctionItem, ItemBid, ItemId, ItemIdRef},
    clock::{ClockOffsetEstimator, SharedClock, SharedClockOffset, Timestamp},
    config::SessionConfig,
    countdown::{CountdownDisplay, CountdownEngine, Tick},
    event::{ConnectionStatus, InboundEvent, Notification},
    reconciler::{is_winning, Badge, BidReconciler, FlashPulse},
    store::{AuctionItemStore, ItemPhase, SharedAuctionItemStore},
    submitter::{BidSubmitter, SubmitError},
};

#[derive(Debug)]
pub enum SessionMessage {
    Inbound(InboundEvent),
    /// Result of the plain item fetch done at session start
    Catalog(Vec<AuctionItem>),
    Tick(Tick),
    FlashExpired(FlashPulse),
    Submit {
        item_id: ItemId,
        reply: oneshot::Sender<Result<ItemBid, SubmitError>>,
    },
    View(oneshot::Sender<DashboardView>),
    Shutdown,
}

impl From<Tick> for SessionMessage {
    fn from(tick: Tick) -> Self {
        SessionMessage::Tick(tick)
    }
}

/// An item as it should be shown right now
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    #[serde(flatten)]
    pub item: AuctionItem,
    pub phase: ItemPhase,
    pub countdown: String,
    pub badge: Option<String>,
    pub flashing: bool,
    pub winning: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub status: String,
    pub connected: bool,
    pub items: Vec<ItemView>,
}

impl DashboardView {
    pub fn item(&self, item_id: ItemIdRef) -> Option<&ItemView> {
        self.items.iter().find(|view| view.item.id == item_id)
    }
}

/// Cheap, cloneable access to a running session
#[derive(Clone)]
pub struct SessionClient {
    messages: mpsc::UnboundedSender<SessionMessage>,
    notifications: broadcast::Sender<Notification>,
    store: SharedAuctionItemStore,
    offset: SharedClockOffset,
}

impl SessionClient {
    /// Bid the fixed increment over the price we currently show
    ///
    /// Returns the bid that was sent. Its fate arrives later as a
    /// notification.
    pub async fn submit(&self, item_id: ItemIdRef<'_>) -> Result<ItemBid, SubmitError> {
        let (reply, rx) = oneshot::channel();
        self.messages
            .send(SessionMessage::Submit {
                item_id: item_id.to_owned(),
                reply,
            })
            .map_err(|_| SubmitError::SessionClosed)?;
        rx.await.map_err(|_| SubmitError::SessionClosed)?
    }

    pub async fn view(&self) -> Result<DashboardView> {
        let (reply, rx) = oneshot::channel();
        self.messages
            .send(SessionMessage::View(reply))
            .map_err(|_| format_err!("session closed"))?;
        rx.await.context("session closed")
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub fn store(&self) -> &AuctionItemStore {
        &self.store
    }

    pub fn clock_offset(&self) -> i64 {
        self.offset.offset()
    }

    pub fn adjusted_now(&self) -> Timestamp {
        self.offset.adjusted_now()
    }
}

/// A running session; dropping it cancels the session task
pub struct SessionHandle {
    client: SessionClient,
    task: TaskHandle,
}

impl SessionHandle {
    /// Connect to the auction house and start the session task
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: SessionConfig,
        clock: SharedClock,
        auction_house: SharedAuctionHouseClient,
        catalog: Option<SharedItemCatalog>,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (notifications, _) = broadcast::channel(config.notification_capacity);
        let offset = ClockOffsetEstimator::new_shared(clock);
        let store = AuctionItemStore::new_shared();

        auction_house
            .subscribe(InboundSink::new({
                let tx = tx.clone();
                move |event| tx.send(SessionMessage::Inbound(event)).is_ok()
            }))
            .context("failed to subscribe to the auction house")?;

        let fetch = catalog.map(|catalog| {
            let tx = tx.clone();
            TaskHandle::spawn(async move {
                match catalog.fetch_items().await {
                    Ok(items) => {
                        let _ = tx.send(SessionMessage::Catalog(items));
                    }
                    Err(e) => warn!(error = %e, "failed to fetch items"),
                }
            })
        });

        let state = SessionState {
            countdowns: CountdownEngine::new(config.tick, offset.clone(), tx.clone()),
            submitter: BidSubmitter::new(auction_house.clone(), config.bid_increment),
            reconciler: BidReconciler::new(),
            displays: BTreeMap::new(),
            flash_timers: BTreeMap::new(),
            status: ConnectionStatus::Connecting,
            _fetch: fetch,
            config,
            auction_house,
            offset: offset.clone(),
            store: store.clone(),
            messages: tx.clone(),
            notifications: notifications.clone(),
        };

        Ok(Self {
            client: SessionClient {
                messages: tx,
                notifications,
                store,
                offset,
            },
            task: TaskHandle::spawn(state.run(rx)),
        })
    }

    pub fn client(&self) -> &SessionClient {
        &self.client
    }

    /// Stop the session and wait for it to tear down
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.client.messages.send(SessionMessage::Shutdown);
        self.task.join().await
    }
}

struct SessionState {
    config: SessionConfig,
    auction_house: SharedAuctionHouseClient,
    offset: SharedClockOffset,
    store: SharedAuctionItemStore,
    reconciler: BidReconciler,
    submitter: BidSubmitter,
    countdowns: CountdownEngine<SessionMessage>,
    displays: BTreeMap<ItemId, CountdownDisplay>,
    flash_timers: BTreeMap<ItemId, TaskHandle>,
    status: ConnectionStatus,
    messages: mpsc::UnboundedSender<SessionMessage>,
    notifications: broadcast::Sender<Notification>,
    _fetch: Option<TaskHandle>,
}

impl SessionState {
    async fn run(mut self, mut messages: mpsc::UnboundedReceiver<SessionMessage>) {
        info!("session started");
        while let Some(message) = messages.recv().await {
            if let SessionMessage::Shutdown = message {
                break;
            }
            self.handle(message);
        }
    }

    fn handle(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Inbound(event) => self.handle_inbound(event),
            SessionMessage::Catalog(items) => {
                debug!(count = items.len(), "item list fetched");
                self.install(items);
            }
            SessionMessage::Tick(tick) => self.handle_tick(tick),
            SessionMessage::FlashExpired(pulse) => {
                if let Some(notification) = self.reconciler.expire_flash(&pulse) {
                    self.flash_timers.remove(&pulse.item_id);
                    self.publish(notification);
                }
            }
            SessionMessage::Submit { item_id, reply } => {
                let res = self
                    .submitter
                    .submit_next(&self.store, &item_id, self.offset.adjusted_now());
                if let Err(e) = &res {
                    debug!(%item_id, error = %e, "bid not sent");
                }
                let _ = reply.send(res);
            }
            SessionMessage::View(reply) => {
                let _ = reply.send(self.view());
            }
            SessionMessage::Shutdown => {}
        }
    }

    fn handle_inbound(&mut self, event: InboundEvent) {
        debug!(?event, "event");
        match event {
            InboundEvent::Connected => self.set_status(ConnectionStatus::Connected),
            InboundEvent::ConnectError(reason) => {
                warn!(%reason, "connection error");
                self.set_status(ConnectionStatus::ConnectionError(reason));
            }
            InboundEvent::Disconnected(reason) => {
                warn!(%reason, "disconnected");
                self.set_status(ConnectionStatus::Disconnected(reason));
            }
            InboundEvent::InitialSnapshot(snapshot) => {
                if let Some(server_time) = snapshot.server_time() {
                    self.offset.sample(server_time);
                }
                self.install(snapshot.into_items());
            }
            InboundEvent::BidUpdate(update) => {
                let self_id = self.auction_house.session_id();
                let reconciliation = self.reconciler.apply_bid_update(
                    &self.store,
                    &update,
                    self.offset.adjusted_now(),
                    self_id.as_deref(),
                );
                if let Some(pulse) = reconciliation.flash {
                    self.start_flash_timer(pulse);
                }
                reconciliation
                    .notifications
                    .into_iter()
                    .for_each(|n| self.publish(n));
            }
            InboundEvent::BidError(error) => {
                warn!(reason = %error.message, "bid rejected");
                self.publish(Notification::BidFailed {
                    message: error.message,
                });
            }
        }
    }

    fn handle_tick(&mut self, tick: Tick) {
        // a timer cancelled or replaced after it already sent
        let Some(item) = self.store.get(&tick.item_id) else {
            return;
        };
        if tick.display.is_ended()
            && !CountdownDisplay::derive(item.end_time, self.offset.adjusted_now()).is_ended()
        {
            debug!(item_id = %tick.item_id, "stale end of a rescheduled auction");
            return;
        }

        self.displays.insert(tick.item_id.clone(), tick.display);
        let self_id = self.auction_house.session_id();
        for notification in self
            .reconciler
            .apply_tick(&self.store, &tick, self_id.as_deref())
        {
            self.publish(notification);
        }
    }

    /// Replace the whole item list, from a snapshot or a fetch
    fn install(&mut self, items: Vec<AuctionItem>) {
        let previous = self.store.all();
        let count = self.store.replace_all(items);
        let items = self.store.all();

        self.countdowns.retain(&items);
        self.reconciler.retain(&items);
        // a moved end time invalidates what we last showed
        self.displays.retain(|id, _| {
            items.iter().any(|item| {
                &item.id == id
                    && previous
                        .iter()
                        .any(|old| old.id == item.id && old.end_time == item.end_time)
            })
        });
        self.flash_timers
            .retain(|id, _| items.iter().any(|item| &item.id == id));

        info!(count, "items installed");
        self.publish(Notification::ItemsReplaced { count });
    }

    fn start_flash_timer(&mut self, pulse: FlashPulse) {
        let messages = self.messages.clone();
        let duration = self.config.flash;
        let item_id = pulse.item_id.clone();
        // replacing the previous timer cancels it
        self.flash_timers.insert(
            item_id,
            TaskHandle::spawn(async move {
                tokio::time::sleep(duration).await;
                let _ = messages.send(SessionMessage::FlashExpired(pulse));
            }),
        );
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            self.status = status.clone();
            self.publish(Notification::Status(status));
        }
    }

    fn publish(&self, notification: Notification) {
        // no subscribers is fine
        let _ = self.notifications.send(notification);
    }

    fn view(&self) -> DashboardView {
        let self_id = self.auction_house.session_id();
        let now = self.offset.adjusted_now();

        let items = self
            .store
            .all_with_phase()
            .into_iter()
            .map(|(item, phase)| {
                let winning = is_winning(&item, self_id.as_deref());
                let countdown = self
                    .displays
                    .get(&item.id)
                    .copied()
                    .unwrap_or_else(|| CountdownDisplay::derive(item.end_time, now));
                ItemView {
                    phase,
                    countdown: countdown.to_string(),
                    badge: Badge::for_item(phase, winning).map(|b| b.to_string()),
                    flashing: self.reconciler.is_flashing(&item.id),
                    winning,
                    item,
                }
            })
            .collect();

        DashboardView {
            status: self.status.to_string(),
            connected: self.status.is_connected(),
            items,
        }
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        self.countdowns.shutdown();
        self.flash_timers.clear();
        self.auction_house.disconnect();
        self.offset.reset();
        info!("session stopped");
    }
}
