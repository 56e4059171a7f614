use std::sync::Arc;
use std::time::Duration;

use anyhow::{format_err, Result};
use tokio::sync::mpsc;

use crate::{
    clock::{ClockOffsetEstimator, RuntimeClock, SharedClock},
    countdown::{Countdown, CountdownDisplay, CountdownEngine, Tick},
    tests::{item, settle, START},
};

fn running(minutes: u64, seconds: u64) -> CountdownDisplay {
    CountdownDisplay::Running { minutes, seconds }
}

async fn next_tick(rx: &mut mpsc::UnboundedReceiver<Tick>) -> Result<Tick> {
    tokio::time::timeout(Duration::from_secs(600), rx.recv())
        .await?
        .ok_or_else(|| format_err!("tick channel closed"))
}

fn engine(cadence: Duration) -> (CountdownEngine<Tick>, mpsc::UnboundedReceiver<Tick>) {
    let clock: SharedClock = Arc::new(RuntimeClock::starting_at(START));
    let (tx, rx) = mpsc::unbounded_channel();
    (
        CountdownEngine::new(cadence, ClockOffsetEstimator::new_shared(clock), tx),
        rx,
    )
}

#[test]
fn splits_remaining_time_into_minutes_and_seconds() {
    assert_eq!(CountdownDisplay::from_remaining(65_000), running(1, 5));
    assert_eq!(CountdownDisplay::from_remaining(65_999), running(1, 5));
    assert_eq!(CountdownDisplay::from_remaining(999), running(0, 0));
    assert_eq!(CountdownDisplay::from_remaining(0), CountdownDisplay::Ended);
    assert_eq!(CountdownDisplay::from_remaining(-5), CountdownDisplay::Ended);
}

#[test]
fn does_not_fold_minutes_into_hours() {
    let display = CountdownDisplay::from_remaining(2 * 3_600_000 + 61_000);
    assert_eq!(display, running(121, 1));
    assert_eq!(display.to_string(), "121m 1s");
    assert_eq!(CountdownDisplay::Ended.to_string(), "Auction Ended");
}

#[test]
fn ended_countdown_stays_ended() {
    let mut countdown = Countdown::new(START + 1_000);

    assert_eq!(countdown.tick(START), running(0, 1));
    assert_eq!(countdown.tick(START + 1_000), CountdownDisplay::Ended);
    // even if the clock estimate jumps back
    assert_eq!(countdown.tick(START), CountdownDisplay::Ended);
    assert!(countdown.is_ended());
}

#[test]
fn derivation_depends_only_on_end_time_and_now() {
    let end = START + 200_000;
    let mut first = Countdown::new(end);
    let mut restarted = Countdown::new(end);

    for now in [START, START + 30_500, START + 199_999] {
        assert_eq!(first.tick(now), restarted.tick(now));
    }
}

#[tokio::test(start_paused = true)]
async fn counts_down_then_ends_and_stops_ticking() -> Result<()> {
    let (mut engine, mut rx) = engine(Duration::from_secs(1));
    engine.show(&item("A", 50, START + 65_000));

    let first = next_tick(&mut rx).await?;
    assert_eq!(first.item_id, "A");
    assert_eq!(first.display, running(1, 5));
    assert_eq!(first.display.to_string(), "1m 5s");

    tokio::time::advance(Duration::from_millis(66_000)).await;
    loop {
        if next_tick(&mut rx).await?.display.is_ended() {
            break;
        }
    }
    settle().await;

    assert!(!engine.is_running("A"));
    assert_eq!(engine.running_count(), 0);

    tokio::time::advance(Duration::from_secs(10)).await;
    settle().await;
    assert!(rx.try_recv().is_err());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn follows_the_clock_offset() -> Result<()> {
    let clock: SharedClock = Arc::new(RuntimeClock::starting_at(START));
    let offset = ClockOffsetEstimator::new_shared(clock);
    // server is 5s ahead of us
    offset.sample_at(START + 5_000, START);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut engine = CountdownEngine::new(Duration::from_secs(1), offset, tx);
    engine.show(&item("A", 50, START + 65_000));

    assert_eq!(next_tick(&mut rx).await?.display, running(1, 0));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn hidden_item_stops_ticking() -> Result<()> {
    let (mut engine, mut rx) = engine(Duration::from_secs(1));
    engine.show(&item("A", 50, START + 600_000));
    engine.show(&item("B", 50, START + 600_000));

    next_tick(&mut rx).await?;
    next_tick(&mut rx).await?;

    assert!(engine.hide("A"));
    assert!(!engine.hide("A"));
    settle().await;
    while rx.try_recv().is_ok() {}

    for _ in 0..3 {
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
    }

    let mut ticked = Vec::new();
    while let Ok(tick) = rx.try_recv() {
        ticked.push(tick.item_id);
    }
    assert!(ticked.iter().all(|id| id == "B"), "{ticked:?}");
    assert!(!ticked.is_empty());
    assert!(!engine.is_running("A"));
    assert_eq!(engine.running_count(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn retain_syncs_timers_with_item_list() -> Result<()> {
    let (mut engine, _rx) = engine(Duration::from_secs(1));
    engine.show(&item("A", 50, START + 600_000));
    engine.show(&item("B", 50, START + 600_000));

    engine.retain(&[
        item("B", 50, START + 600_000),
        item("C", 50, START + 600_000),
    ]);
    settle().await;

    assert!(!engine.is_running("A"));
    assert!(engine.is_running("B"));
    assert!(engine.is_running("C"));

    engine.shutdown();
    assert_eq!(engine.running_count(), 0);
    Ok(())
}
