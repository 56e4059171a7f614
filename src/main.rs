mod auction;
mod clock;
mod config;
mod countdown;
mod event;
mod reconciler;
mod service;
mod store;
mod submitter;

use anyhow::{Context, Result};
use tokio::{runtime::Runtime, sync::watch};

use crate::{
    auction::AuctionItem,
    clock::{Clock, RuntimeClock, Timestamp},
    config::Config,
    service::{InMemoryAuctionHouse, SessionHandle, SharedItemCatalog},
};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env().context("invalid configuration")?;
    let runtime = Runtime::new()?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let clock = RuntimeClock::new_shared();

    // No real auction house to talk to yet, so run a local one
    let auction_house = InMemoryAuctionHouse::new_shared(clock.clone(), demo_items(clock.now()));

    let session = SessionHandle::start(
        config.session.clone(),
        clock,
        auction_house.connect().into_shared(),
        Some(auction_house.clone() as SharedItemCatalog),
    )?;

    let (stop_tx, mut stop_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        eprintln!("Stopping all services...");
        let _ = stop_tx.send(true);
    })?;

    service::run_http_server(config.ui_addr, session.client().clone(), async move {
        let _ = stop_rx.changed().await;
    })
    .await?;

    session.shutdown().await
}

fn demo_items(now: Timestamp) -> Vec<AuctionItem> {
    const MINUTE: i64 = 60_000;

    vec![
        AuctionItem::new("1", "Vintage Camera", 50, now + 2 * MINUTE)
            .with_image_url("https://picsum.photos/seed/camera/400/300"),
        AuctionItem::new("2", "Mechanical Watch", 120, now + 5 * MINUTE)
            .with_image_url("https://picsum.photos/seed/watch/400/300"),
        AuctionItem::new("3", "Signed Vinyl Record", 80, now + 10 * MINUTE)
            .with_image_url("https://picsum.photos/seed/vinyl/400/300"),
    ]
}
