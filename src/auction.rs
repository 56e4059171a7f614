use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;

pub type ItemId = String;
pub type ItemIdRef<'s> = &'s str;
pub type BidderId = String;
pub type BidderIdRef<'s> = &'s str;
pub type Amount = u64;

/// One auction lot, as mirrored from the auction house
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionItem {
    pub id: ItemId,
    pub title: String,
    #[serde(default)]
    pub image_url: String,
    pub starting_price: Amount,
    pub current_bid: Amount,
    #[serde(
        default,
        rename = "highestBidder",
        alias = "highestBidderId",
        skip_serializing_if = "Option::is_none"
    )]
    pub highest_bidder: Option<BidderId>,
    pub end_time: Timestamp,
}

impl AuctionItem {
    /// An item nobody has bid on yet
    pub fn new(
        id: impl Into<ItemId>,
        title: impl Into<String>,
        starting_price: Amount,
        end_time: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            image_url: String::new(),
            starting_price,
            current_bid: starting_price,
            highest_bidder: None,
            end_time,
        }
    }

    pub fn with_image_url(self, image_url: impl Into<String>) -> Self {
        Self {
            image_url: image_url.into(),
            ..self
        }
    }

    /// Would this item still be consistent with `bid` applied?
    ///
    /// The price never drops under the starting price, and there is a
    /// leading bidder exactly when somebody bid above it.
    pub fn accepts(&self, bid: &BidDetails) -> bool {
        bid.current_bid >= self.starting_price
            && bid.highest_bidder.is_some() == (bid.current_bid > self.starting_price)
    }

    pub fn is_consistent(&self) -> bool {
        self.accepts(&self.bid_details())
    }

    pub fn bid_details(&self) -> BidDetails {
        BidDetails {
            current_bid: self.current_bid,
            highest_bidder: self.highest_bidder.clone(),
        }
    }

    pub fn is_led_by(&self, bidder: Option<BidderIdRef>) -> bool {
        matches!(
            (self.highest_bidder.as_deref(), bidder),
            (Some(leader), Some(bidder)) if leader == bidder
        )
    }
}

/// The price/leader pair that always changes together
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BidDetails {
    pub current_bid: Amount,
    pub highest_bidder: Option<BidderId>,
}

/// An authoritative bid update for one item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidUpdate {
    pub item_id: ItemId,
    pub current_bid: Amount,
    #[serde(default, rename = "highestBidder", alias = "highestBidderId")]
    pub highest_bidder: Option<BidderId>,
}

impl BidUpdate {
    pub fn new(
        item_id: impl Into<ItemId>,
        current_bid: Amount,
        highest_bidder: Option<&str>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            current_bid,
            highest_bidder: highest_bidder.map(ToOwned::to_owned),
        }
    }

    pub fn details(&self) -> BidDetails {
        BidDetails {
            current_bid: self.current_bid,
            highest_bidder: self.highest_bidder.clone(),
        }
    }
}

/// A bid we are proposing for an item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemBid {
    pub item_id: ItemId,
    pub amount: Amount,
}
