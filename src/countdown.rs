//! Countdown to the end of each auction
//!
//! The remaining time is always derived from scratch from the item's end
//! time and the current server time estimate, so a restarted timer picks
//! up exactly where a fresh one would be. There is no cursor to resume.
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::auction::{AuctionItem, ItemId, ItemIdRef};
use crate::clock::{SharedClockOffset, Timestamp};
use crate::service::TaskHandle;

const MILLIS_PER_MINUTE: i64 = 60_000;
const MILLIS_PER_SECOND: i64 = 1_000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CountdownDisplay {
    /// Whole minutes and seconds left; minutes are not folded into hours
    Running { minutes: u64, seconds: u64 },
    Ended,
}

impl CountdownDisplay {
    pub fn from_remaining(remaining: i64) -> Self {
        if remaining <= 0 {
            return CountdownDisplay::Ended;
        }
        CountdownDisplay::Running {
            minutes: (remaining / MILLIS_PER_MINUTE) as u64,
            seconds: ((remaining % MILLIS_PER_MINUTE) / MILLIS_PER_SECOND) as u64,
        }
    }

    pub fn derive(end_time: Timestamp, now: Timestamp) -> Self {
        Self::from_remaining(end_time.saturating_sub(now))
    }

    pub fn is_ended(self) -> bool {
        self == CountdownDisplay::Ended
    }
}

impl fmt::Display for CountdownDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountdownDisplay::Running { minutes, seconds } => write!(f, "{minutes}m {seconds}s"),
            CountdownDisplay::Ended => f.write_str("Auction Ended"),
        }
    }
}

/// Countdown state of a single item
///
/// Once it reports `Ended` it keeps doing so without looking at the clock.
#[derive(Copy, Clone, Debug)]
pub struct Countdown {
    end_time: Timestamp,
    ended: bool,
}

impl Countdown {
    pub fn new(end_time: Timestamp) -> Self {
        Self {
            end_time,
            ended: false,
        }
    }

    pub fn tick(&mut self, now: Timestamp) -> CountdownDisplay {
        if self.ended {
            return CountdownDisplay::Ended;
        }
        let display = CountdownDisplay::derive(self.end_time, now);
        self.ended = display.is_ended();
        display
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }
}

/// A countdown reading for one item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tick {
    pub item_id: ItemId,
    pub display: CountdownDisplay,
}

struct Timer {
    end_time: Timestamp,
    task: TaskHandle,
}

/// Runs one repeating timer per displayed item
///
/// Ticks are sent to `sink`, converted into whatever message type the
/// owner of the channel reads. Dropping the engine cancels every timer.
pub struct CountdownEngine<M> {
    cadence: Duration,
    offset: SharedClockOffset,
    sink: mpsc::UnboundedSender<M>,
    timers: BTreeMap<ItemId, Timer>,
}

impl<M> CountdownEngine<M>
where
    M: From<Tick> + Send + 'static,
{
    pub fn new(
        cadence: Duration,
        offset: SharedClockOffset,
        sink: mpsc::UnboundedSender<M>,
    ) -> Self {
        Self {
            cadence,
            offset,
            sink,
            timers: BTreeMap::new(),
        }
    }

    /// Start ticking for `item`, unless it already is
    ///
    /// Must be called from within a tokio runtime.
    pub fn show(&mut self, item: &AuctionItem) {
        if let Some(timer) = self.timers.get(&item.id) {
            if timer.end_time == item.end_time {
                return;
            }
        }

        debug!(item_id = %item.id, end_time = item.end_time, "starting countdown");
        let task = TaskHandle::spawn(run_timer(
            item.id.clone(),
            item.end_time,
            self.cadence,
            self.offset.clone(),
            self.sink.clone(),
        ));
        self.timers.insert(
            item.id.clone(),
            Timer {
                end_time: item.end_time,
                task,
            },
        );
    }

    pub fn hide(&mut self, item_id: ItemIdRef) -> bool {
        if self.timers.remove(item_id).is_some() {
            debug!(%item_id, "countdown cancelled");
            true
        } else {
            false
        }
    }

    /// Keep timers for exactly `items`
    pub fn retain(&mut self, items: &[AuctionItem]) {
        self.timers
            .retain(|id, _| items.iter().any(|item| &item.id == id));
        for item in items {
            self.show(item);
        }
    }

    pub fn shutdown(&mut self) {
        self.timers.clear();
    }

    pub fn is_running(&self, item_id: ItemIdRef) -> bool {
        self.timers
            .get(item_id)
            .map(|t| !t.task.is_finished())
            .unwrap_or(false)
    }

    pub fn running_count(&self) -> usize {
        self.timers
            .values()
            .filter(|t| !t.task.is_finished())
            .count()
    }
}

async fn run_timer<M>(
    item_id: ItemId,
    end_time: Timestamp,
    cadence: Duration,
    offset: SharedClockOffset,
    sink: mpsc::UnboundedSender<M>,
) where
    M: From<Tick>,
{
    let mut countdown = Countdown::new(end_time);
    let mut interval = tokio::time::interval(cadence);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let display = countdown.tick(offset.adjusted_now());
        let tick = Tick {
            item_id: item_id.clone(),
            display,
        };
        if sink.send(tick.into()).is_err() || countdown.is_ended() {
            break;
        }
    }
}
