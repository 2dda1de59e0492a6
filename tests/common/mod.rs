#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use market_auction_service::auction::engine::AuctionEngine;
use market_auction_service::auction::model::{Auction, CreateAuctionRequest};
use market_auction_service::bidding::commands::{BidReceipt, PlaceBidRequest};
use market_auction_service::clock::ManualClock;
use market_auction_service::config::AuctionRules;
use market_auction_service::error::AuctionError;
use market_auction_service::ledger::{CoinLedger, MemoryLedger};
use market_auction_service::realtime::RealtimeHub;
use market_auction_service::scheduler::SettlementScheduler;
use market_auction_service::state::AppState;
use market_auction_service::store::{Item, MemoryStore};
use std::sync::Arc;
use uuid::Uuid;

pub const SELLER: &str = "seller_1";
pub const LISTED: &str = "listed";
pub const PENDING_DELIVERY: &str = "pending-delivery";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .with_test_writer()
        .try_init();
}

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub struct Harness {
    pub engine: Arc<AuctionEngine>,
    pub store: Arc<MemoryStore>,
    pub ledger: Arc<MemoryLedger>,
    pub hub: Arc<RealtimeHub>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub async fn new() -> Self {
        let ledger = Arc::new(MemoryLedger::new());
        Self::with_ledger(ledger.clone(), ledger).await
    }

    /// `engine_ledger` is what the engine talks to; `ledger` is the backing
    /// balance book the test inspects.
    pub async fn with_ledger(
        engine_ledger: Arc<dyn CoinLedger>,
        ledger: Arc<MemoryLedger>,
    ) -> Self {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        store.insert_status(LISTED).await;
        store.insert_status(PENDING_DELIVERY).await;

        let hub = Arc::new(RealtimeHub::new());
        let clock = Arc::new(ManualClock::new(epoch()));
        let engine = Arc::new(AuctionEngine::new(
            store.clone(),
            store.clone(),
            engine_ledger,
            hub.clone(),
            clock.clone(),
            AuctionRules::default(),
        ));
        Self {
            engine,
            store,
            ledger,
            hub,
            clock,
        }
    }

    pub fn scheduler(&self) -> Arc<SettlementScheduler> {
        Arc::new(SettlementScheduler::new(
            self.engine.clone(),
            std::time::Duration::ZERO,
            Duration::seconds(60),
        ))
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            engine: self.engine.clone(),
            scheduler: self.scheduler(),
            hub: self.hub.clone(),
        }
    }

    pub async fn list_item(&self) -> String {
        let id = format!("item_{}", Uuid::new_v4());
        self.store
            .insert_item(Item {
                id: id.clone(),
                owner: SELLER.to_string(),
                status_id: LISTED.to_string(),
                price: 0,
            })
            .await;
        id
    }

    /// Auction over a fresh item, starting `start_in` from now and lasting `length`.
    pub async fn create_auction(
        &self,
        start_in: Duration,
        length: Duration,
        start_price: i64,
    ) -> Auction {
        let item_id = self.list_item().await;
        let start_time = self.engine.now() + start_in;
        self.engine
            .create_auction(CreateAuctionRequest {
                start_time: Some(start_time),
                end_time: Some(start_time + length),
                start_price: Some(start_price),
                item_id: Some(item_id),
                status_id: Some(LISTED.to_string()),
                min_bid_increment: None,
            })
            .await
            .unwrap()
    }

    /// Auction that is open right now.
    pub async fn open_auction(&self, start_price: i64) -> Auction {
        let auction = self
            .create_auction(Duration::minutes(6), Duration::minutes(10), start_price)
            .await;
        self.clock.advance(Duration::minutes(7));
        auction
    }

    pub async fn bid(
        &self,
        auction_id: Uuid,
        user_id: &str,
        amount: i64,
    ) -> Result<BidReceipt, AuctionError> {
        self.engine
            .place_bid(PlaceBidRequest {
                auction_id: Some(auction_id),
                amount: Some(amount),
                user_id: Some(user_id.to_string()),
            })
            .await
    }

    /// Moves the clock past every auction created by `open_auction`.
    pub fn end_auctions(&self) {
        self.clock.advance(Duration::minutes(10));
    }
}
