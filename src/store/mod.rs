//! Persistence seams of the auction engine.
//! `AuctionStore` owns auctions, bids and purchase records; `ItemStore` is the
//! listed-item collaborator whose status and price settlement rewrites.
// region:    --- Imports
use crate::auction::model::{Auction, AuctionSummary};
use crate::bidding::model::Bid;
use crate::error::AuctionError;
use crate::settlement::{Purchase, SettlementStage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
// endregion: --- Imports

// region:    --- Modules
pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;
// endregion: --- Modules

/// Result of the atomic check-and-raise performed for a bid.
#[derive(Debug, Clone)]
pub enum BidAdmission {
    Admitted { auction: Auction, bid: Bid },
    /// The predicate failed; carries a fresh snapshot for diagnosis.
    Rejected(Auction),
    NotFound,
}

// region:    --- Auction Store
#[async_trait]
pub trait AuctionStore: Send + Sync {
    async fn insert_auction(&self, auction: &Auction) -> Result<(), AuctionError>;

    async fn get_auction(&self, id: Uuid) -> Result<Option<Auction>, AuctionError>;

    async fn list_auctions(&self) -> Result<Vec<AuctionSummary>, AuctionError>;

    /// Rewrites the editable terms of an auction that has not started by `now`.
    /// Returns false when no such auction exists.
    async fn update_terms(&self, auction: &Auction, now: DateTime<Utc>)
        -> Result<bool, AuctionError>;

    /// Deletes the auction and all of its bids.
    async fn delete_auction(&self, id: Uuid) -> Result<bool, AuctionError>;

    /// Raises `current_price` to `bid.amount` and appends the bid as one
    /// atomic unit, iff the auction is open at `now` and the amount clears
    /// the admission rule.
    async fn admit_bid(
        &self,
        bid: &Bid,
        now: DateTime<Utc>,
        enforce_increment: bool,
    ) -> Result<BidAdmission, AuctionError>;

    /// Bids ordered by amount descending, earliest first on ties.
    async fn bids_for_auction(&self, auction_id: Uuid) -> Result<Vec<Bid>, AuctionError>;

    async fn highest_bid(&self, auction_id: Uuid) -> Result<Option<Bid>, AuctionError>;

    /// Compare-and-set `settled: false -> true` for an auction ended by `now`.
    async fn claim_settlement(
        &self,
        auction_id: Uuid,
        settlement_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Auction>, AuctionError>;

    /// Compare-and-set on the settlement stage.
    async fn advance_settlement(
        &self,
        auction_id: Uuid,
        from: SettlementStage,
        to: SettlementStage,
        now: DateTime<Utc>,
    ) -> Result<bool, AuctionError>;

    /// Inserts the purchase unless one already exists for the auction.
    async fn record_purchase(&self, purchase: &Purchase) -> Result<bool, AuctionError>;

    async fn purchase_for_auction(
        &self,
        auction_id: Uuid,
    ) -> Result<Option<Purchase>, AuctionError>;

    async fn unsettled_auctions(&self) -> Result<Vec<Auction>, AuctionError>;

    /// Claimed settlements whose stage has not moved since `touched_before`.
    async fn stalled_settlements(
        &self,
        touched_before: DateTime<Utc>,
    ) -> Result<Vec<Auction>, AuctionError>;
}
// endregion: --- Auction Store

// region:    --- Item Store
/// Listed item as seen by the auction engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub owner: String,
    pub status_id: String,
    pub price: i64,
}

#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn item(&self, id: &str) -> Result<Option<Item>, AuctionError>;

    async fn status_exists(&self, status_id: &str) -> Result<bool, AuctionError>;

    async fn mark_sold(&self, item_id: &str, status_id: &str, price: i64)
        -> Result<bool, AuctionError>;
}
// endregion: --- Item Store
