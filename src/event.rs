//! Events crossing the auction house connection, and the notifications
//! we publish to whoever presents the session
//!
//! Frames are a name plus a JSON payload. [`InboundEvent::decode`] is the
//! entry point for a network transport; the in-memory auction house hands
//! typed events to the session directly and only parses our outbound
//! `BID_PLACED` frames.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auction::{Amount, AuctionItem, BidUpdate, BidderId, ItemBid, ItemId};
use crate::clock::Timestamp;
use crate::countdown::CountdownDisplay;

pub const INITIAL_DATA: &str = "INITIAL_DATA";
pub const UPDATE_BID: &str = "UPDATE_BID";
pub const BID_ERROR: &str = "BID_ERROR";
pub const BID_PLACED: &str = "BID_PLACED";

/// Initial item list, with or without the server time it was taken at
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SnapshotPayload {
    Items(Vec<AuctionItem>),
    Timed {
        items: Vec<AuctionItem>,
        #[serde(rename = "serverTime")]
        server_time: Timestamp,
    },
}

impl SnapshotPayload {
    pub fn server_time(&self) -> Option<Timestamp> {
        match self {
            SnapshotPayload::Items(_) => None,
            SnapshotPayload::Timed { server_time, .. } => Some(*server_time),
        }
    }

    pub fn into_items(self) -> Vec<AuctionItem> {
        match self {
            SnapshotPayload::Items(items) | SnapshotPayload::Timed { items, .. } => items,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidError {
    pub message: String,
}

/// Everything the auction house connection can tell us
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundEvent {
    Connected,
    ConnectError(String),
    Disconnected(String),
    InitialSnapshot(SnapshotPayload),
    BidUpdate(BidUpdate),
    BidError(BidError),
}

#[derive(Error, Debug)]
pub enum WireError {
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    #[error("malformed {event} payload")]
    Malformed {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

fn decode_payload<T: for<'de> Deserialize<'de>>(
    event: &'static str,
    payload: &str,
) -> Result<T, WireError> {
    serde_json::from_str(payload).map_err(|source| WireError::Malformed { event, source })
}

impl InboundEvent {
    /// Decode a named event frame with a JSON payload
    pub fn decode(name: &str, payload: &str) -> Result<Self, WireError> {
        Ok(match name {
            INITIAL_DATA => Self::InitialSnapshot(decode_payload(INITIAL_DATA, payload)?),
            UPDATE_BID => Self::BidUpdate(decode_payload(UPDATE_BID, payload)?),
            BID_ERROR => Self::BidError(decode_payload(BID_ERROR, payload)?),
            other => return Err(WireError::UnknownEvent(other.to_owned())),
        })
    }
}

impl ItemBid {
    /// The outbound frame for this bid
    pub fn encode(&self) -> serde_json::Result<(&'static str, String)> {
        Ok((BID_PLACED, serde_json::to_string(self)?))
    }

    /// Parse an outbound frame, the way the auction house receives it
    pub fn decode(name: &str, payload: &str) -> Result<Self, WireError> {
        match name {
            BID_PLACED => decode_payload(BID_PLACED, payload),
            other => Err(WireError::UnknownEvent(other.to_owned())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    ConnectionError(String),
    Disconnected(String),
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::ConnectionError(_) => "Connection Error",
            ConnectionStatus::Disconnected(_) => "Disconnected",
        })
    }
}

/// Changes a presentation layer may want to react to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    Status(ConnectionStatus),
    ItemsReplaced { count: usize },
    BidAccepted {
        item_id: ItemId,
        current_bid: Amount,
        highest_bidder: Option<BidderId>,
    },
    Outbid { item_id: ItemId },
    Flash { item_id: ItemId, active: bool },
    Countdown {
        item_id: ItemId,
        display: CountdownDisplay,
    },
    AuctionEnded { item_id: ItemId, won: bool },
    BidFailed { message: String },
}

impl Notification {
    /// Text to show the user, for the notifications that carry any
    pub fn notice(&self) -> Option<String> {
        match self {
            Notification::BidFailed { message } => Some(format!("Bid failed: {message}")),
            _ => None,
        }
    }
}
