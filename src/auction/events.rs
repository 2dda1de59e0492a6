use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auction::model::Auction;
use crate::bidding::model::Bid;

/// Events pushed to viewers, serialized as `{"event": .., "data": {..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum AuctionEvent {
    /// Full leaderboard after an admitted bid.
    BidUpdate { auction: Auction, bids: Vec<Bid> },
    /// The admitted bid alone.
    NewBid { bid: Bid },
    AuctionEnded(AuctionEndedNotice),
    AuctionEndedSeller(AuctionEndedNotice),
    AuctionEndedWinner(AuctionEndedNotice),
    #[serde(rename_all = "camelCase")]
    CoinUpdate {
        user_id: String,
        new_balance: i64,
        transaction: CoinTransaction,
    },
    #[serde(rename_all = "camelCase")]
    ViewerCount { auction_id: Uuid, viewers: usize },
    #[serde(rename_all = "camelCase")]
    BidRejected {
        auction_id: Option<Uuid>,
        code: String,
        message: String,
    },
}

impl AuctionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BidUpdate { .. } => "bidUpdate",
            Self::NewBid { .. } => "newBid",
            Self::AuctionEnded(_) => "auctionEnded",
            Self::AuctionEndedSeller(_) => "auctionEndedSeller",
            Self::AuctionEndedWinner(_) => "auctionEndedWinner",
            Self::CoinUpdate { .. } => "coinUpdate",
            Self::ViewerCount { .. } => "viewerCount",
            Self::BidRejected { .. } => "bidRejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionEndedNotice {
    pub auction_id: Uuid,
    pub item_id: String,
    pub winner_id: Option<String>,
    pub winner_name: Option<String>,
    pub amount: Option<i64>,
    pub message: String,
}

/// Ledger movement reported to the winner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinTransaction {
    pub id: Uuid,
    pub auction_id: Uuid,
    pub amount: i64,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_use_socket_event_names() {
        let event = AuctionEvent::ViewerCount {
            auction_id: Uuid::nil(),
            viewers: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name());
        assert_eq!(json["data"]["viewers"], 3);
        assert!(json["data"].get("auctionId").is_some());
    }
}
