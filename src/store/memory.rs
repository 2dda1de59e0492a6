// region:    --- Imports
use super::{AuctionStore, BidAdmission, Item, ItemStore};
use crate::auction::model::{Auction, AuctionSummary};
use crate::bidding::model::{leaderboard_order, Bid};
use crate::error::AuctionError;
use crate::settlement::{Purchase, SettlementStage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;
// endregion: --- Imports

/// Process-local store. One lock covers auctions and bids, which makes every
/// conditional write trivially atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    auctions: HashMap<Uuid, Auction>,
    bids: HashMap<Uuid, Vec<Bid>>,
    purchases: HashMap<Uuid, Purchase>,
    items: HashMap<String, Item>,
    statuses: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_item(&self, item: Item) {
        self.inner.lock().await.items.insert(item.id.clone(), item);
    }

    pub async fn remove_item(&self, item_id: &str) {
        self.inner.lock().await.items.remove(item_id);
    }

    pub async fn insert_status(&self, status_id: &str) {
        self.inner
            .lock()
            .await
            .statuses
            .insert(status_id.to_string());
    }

    pub async fn purchases(&self) -> Vec<Purchase> {
        self.inner.lock().await.purchases.values().cloned().collect()
    }
}

#[async_trait]
impl AuctionStore for MemoryStore {
    async fn insert_auction(&self, auction: &Auction) -> Result<(), AuctionError> {
        self.inner
            .lock()
            .await
            .auctions
            .insert(auction.id, auction.clone());
        Ok(())
    }

    async fn get_auction(&self, id: Uuid) -> Result<Option<Auction>, AuctionError> {
        Ok(self.inner.lock().await.auctions.get(&id).cloned())
    }

    async fn list_auctions(&self) -> Result<Vec<AuctionSummary>, AuctionError> {
        let inner = self.inner.lock().await;
        let mut summaries: Vec<AuctionSummary> = inner
            .auctions
            .values()
            .map(|auction| AuctionSummary {
                auction: auction.clone(),
                bid_count: inner.bids.get(&auction.id).map_or(0, |b| b.len() as i64),
            })
            .collect();
        summaries.sort_by(|a, b| b.auction.created_at.cmp(&a.auction.created_at));
        Ok(summaries)
    }

    async fn update_terms(
        &self,
        auction: &Auction,
        now: DateTime<Utc>,
    ) -> Result<bool, AuctionError> {
        let mut inner = self.inner.lock().await;
        match inner.auctions.get_mut(&auction.id) {
            Some(stored) if !stored.settled && stored.start_time > now => {
                stored.start_time = auction.start_time;
                stored.end_time = auction.end_time;
                stored.status_id = auction.status_id.clone();
                stored.min_bid_increment = auction.min_bid_increment;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_auction(&self, id: Uuid) -> Result<bool, AuctionError> {
        let mut inner = self.inner.lock().await;
        inner.bids.remove(&id);
        Ok(inner.auctions.remove(&id).is_some())
    }

    async fn admit_bid(
        &self,
        bid: &Bid,
        now: DateTime<Utc>,
        enforce_increment: bool,
    ) -> Result<BidAdmission, AuctionError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let Some(auction) = inner.auctions.get_mut(&bid.auction_id) else {
            return Ok(BidAdmission::NotFound);
        };
        if !auction.accepts(bid.amount, now, enforce_increment) {
            return Ok(BidAdmission::Rejected(auction.clone()));
        }
        auction.current_price = bid.amount;
        let auction = auction.clone();
        inner
            .bids
            .entry(bid.auction_id)
            .or_default()
            .push(bid.clone());
        Ok(BidAdmission::Admitted {
            auction,
            bid: bid.clone(),
        })
    }

    async fn bids_for_auction(&self, auction_id: Uuid) -> Result<Vec<Bid>, AuctionError> {
        let inner = self.inner.lock().await;
        let mut bids = inner.bids.get(&auction_id).cloned().unwrap_or_default();
        bids.sort_by(leaderboard_order);
        Ok(bids)
    }

    async fn highest_bid(&self, auction_id: Uuid) -> Result<Option<Bid>, AuctionError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .bids
            .get(&auction_id)
            .and_then(|bids| bids.iter().min_by(|a, b| leaderboard_order(a, b)))
            .cloned())
    }

    async fn claim_settlement(
        &self,
        auction_id: Uuid,
        settlement_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Auction>, AuctionError> {
        let mut inner = self.inner.lock().await;
        match inner.auctions.get_mut(&auction_id) {
            Some(auction) if !auction.settled && auction.has_ended(now) => {
                auction.settled = true;
                auction.settlement = SettlementStage::Claimed;
                auction.settlement_id = Some(settlement_id);
                auction.settlement_updated_at = Some(now);
                Ok(Some(auction.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn advance_settlement(
        &self,
        auction_id: Uuid,
        from: SettlementStage,
        to: SettlementStage,
        now: DateTime<Utc>,
    ) -> Result<bool, AuctionError> {
        let mut inner = self.inner.lock().await;
        match inner.auctions.get_mut(&auction_id) {
            Some(auction) if auction.settlement == from => {
                auction.settlement = to;
                auction.settlement_updated_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_purchase(&self, purchase: &Purchase) -> Result<bool, AuctionError> {
        let mut inner = self.inner.lock().await;
        if inner.purchases.contains_key(&purchase.auction_id) {
            return Ok(false);
        }
        inner
            .purchases
            .insert(purchase.auction_id, purchase.clone());
        Ok(true)
    }

    async fn purchase_for_auction(
        &self,
        auction_id: Uuid,
    ) -> Result<Option<Purchase>, AuctionError> {
        Ok(self.inner.lock().await.purchases.get(&auction_id).cloned())
    }

    async fn unsettled_auctions(&self) -> Result<Vec<Auction>, AuctionError> {
        let inner = self.inner.lock().await;
        let mut auctions: Vec<Auction> = inner
            .auctions
            .values()
            .filter(|a| !a.settled)
            .cloned()
            .collect();
        auctions.sort_by_key(|a| a.end_time);
        Ok(auctions)
    }

    async fn stalled_settlements(
        &self,
        touched_before: DateTime<Utc>,
    ) -> Result<Vec<Auction>, AuctionError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .auctions
            .values()
            .filter(|a| {
                a.settled
                    && a.settlement.is_in_progress()
                    && a.settlement_updated_at.map_or(true, |t| t <= touched_before)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn item(&self, id: &str) -> Result<Option<Item>, AuctionError> {
        Ok(self.inner.lock().await.items.get(id).cloned())
    }

    async fn status_exists(&self, status_id: &str) -> Result<bool, AuctionError> {
        Ok(self.inner.lock().await.statuses.contains(status_id))
    }

    async fn mark_sold(
        &self,
        item_id: &str,
        status_id: &str,
        price: i64,
    ) -> Result<bool, AuctionError> {
        let mut inner = self.inner.lock().await;
        match inner.items.get_mut(item_id) {
            Some(item) => {
                item.status_id = status_id.to_string();
                item.price = price;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
