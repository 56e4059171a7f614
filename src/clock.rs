//! Local clocks and the server clock offset
//!
//! The auction house decides when an auction closes, using its own clock.
//! We can't trust ours to agree, so on every snapshot that carries the
//! server time we record how far apart the two are, and compute
//! "server now" from the local clock plus that offset.
use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

/// Milliseconds since the Unix epoch
pub type Timestamp = i64;

pub trait Clock {
    fn now(&self) -> Timestamp;
}

pub type SharedClock = Arc<dyn Clock + Send + Sync + 'static>;

/// Wall clock that advances with the tokio timer
///
/// Anchored to the system time once, then moved forward by the runtime's
/// monotonic clock, so jumps of the system clock don't make countdowns
/// skip. Under a paused tokio runtime it follows `tokio::time::advance`.
#[derive(Debug, Clone)]
pub struct RuntimeClock {
    anchor: Timestamp,
    started: tokio::time::Instant,
}

impl RuntimeClock {
    pub fn new() -> Self {
        let anchor = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or_default();
        Self::starting_at(anchor)
    }

    pub fn starting_at(anchor: Timestamp) -> Self {
        Self {
            anchor,
            started: tokio::time::Instant::now(),
        }
    }

    pub fn new_shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for RuntimeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for RuntimeClock {
    fn now(&self) -> Timestamp {
        let elapsed = i64::try_from(self.started.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.anchor.saturating_add(elapsed)
    }
}

/// Fake clock that only moves when told to.
///
/// Useful for unit-tests.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self(AtomicI64::new(now))
    }

    pub fn set(&self, now: Timestamp) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.0.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.0.load(Ordering::SeqCst)
    }
}

/// Estimated `server time - local time`
///
/// Taken from a single sample; a new sample replaces the old one
/// outright. Until the first sample the clocks are assumed to agree.
pub struct ClockOffsetEstimator {
    clock: SharedClock,
    offset: AtomicI64,
}

pub type SharedClockOffset = Arc<ClockOffsetEstimator>;

impl ClockOffsetEstimator {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            offset: AtomicI64::new(0),
        }
    }

    pub fn new_shared(clock: SharedClock) -> SharedClockOffset {
        Arc::new(Self::new(clock))
    }

    /// Record `server_time` as observed right now
    pub fn sample(&self, server_time: Timestamp) -> i64 {
        self.sample_at(server_time, self.clock.now())
    }

    pub fn sample_at(&self, server_time: Timestamp, local_time: Timestamp) -> i64 {
        let offset = server_time.saturating_sub(local_time);
        self.offset.store(offset, Ordering::SeqCst);
        debug!(server_time, local_time, offset, "clock offset sampled");
        offset
    }

    pub fn offset(&self) -> i64 {
        self.offset.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.offset.store(0, Ordering::SeqCst);
    }

    pub fn local_now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Our best guess of the auction house's current time
    pub fn adjusted_now(&self) -> Timestamp {
        self.local_now().saturating_add(self.offset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsampled_offset_is_zero() {
        let clock = Arc::new(ManualClock::new(42_000));
        let offset = ClockOffsetEstimator::new(clock);

        assert_eq!(offset.offset(), 0);
        assert_eq!(offset.adjusted_now(), 42_000);
    }

    #[test]
    fn resample_overwrites() {
        let clock = Arc::new(ManualClock::new(1_000));
        let offset = ClockOffsetEstimator::new(clock);

        offset.sample_at(4_000, 1_000);
        offset.sample_at(500, 1_000);

        assert_eq!(offset.offset(), -500);
        offset.reset();
        assert_eq!(offset.offset(), 0);
    }
}
