// region:    --- Imports
use crate::auction::model::{
    validate_window, Auction, AuctionDetails, AuctionPhase, AuctionSummary, CreateAuctionRequest,
    UpdateAuctionRequest,
};
use crate::bidding::model::Bid;
use crate::clock::Clock;
use crate::config::AuctionRules;
use crate::error::AuctionError;
use crate::ledger::CoinLedger;
use crate::realtime::FanOut;
use crate::store::{AuctionStore, ItemStore};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
// endregion: --- Imports

/// Auction lifecycle, bid admission and settlement over injected collaborators.
/// Bid admission lives in `bidding::commands`, settlement in `settlement::saga`.
pub struct AuctionEngine {
    pub(crate) store: Arc<dyn AuctionStore>,
    pub(crate) items: Arc<dyn ItemStore>,
    pub(crate) ledger: Arc<dyn CoinLedger>,
    pub(crate) fanout: Arc<dyn FanOut>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) rules: AuctionRules,
}

impl AuctionEngine {
    pub fn new(
        store: Arc<dyn AuctionStore>,
        items: Arc<dyn ItemStore>,
        ledger: Arc<dyn CoinLedger>,
        fanout: Arc<dyn FanOut>,
        clock: Arc<dyn Clock>,
        rules: AuctionRules,
    ) -> Self {
        Self {
            store,
            items,
            ledger,
            fanout,
            clock,
            rules,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn lead_time(&self) -> Duration {
        Duration::seconds(self.rules.lead_time_secs)
    }

    // region:    --- Commands

    /// Creates an auction over an existing item and status.
    pub async fn create_auction(
        &self,
        request: CreateAuctionRequest,
    ) -> Result<Auction, AuctionError> {
        let new = request.validate()?;
        let now = self.clock.now();
        validate_window(new.start_time, new.end_time, now, self.lead_time())?;
        if self.items.item(&new.item_id).await?.is_none() {
            return Err(AuctionError::NotFound(format!("Item {}", new.item_id)));
        }
        self.ensure_status(&new.status_id).await?;

        let auction = Auction::new(new, now);
        self.store.insert_auction(&auction).await?;
        info!(
            "{:<12} --> Auction created: id={}, item={}, start={}, end={}",
            "Engine", auction.id, auction.item_id, auction.start_time, auction.end_time
        );
        Ok(auction)
    }

    /// Edits an auction that has not started yet.
    pub async fn update_auction(
        &self,
        id: Uuid,
        request: UpdateAuctionRequest,
    ) -> Result<Auction, AuctionError> {
        let auction = self.require_auction(id).await?;
        let now = self.clock.now();
        match auction.phase(now) {
            AuctionPhase::Scheduled => {}
            AuctionPhase::Settled => return Err(AuctionError::AlreadySettled),
            _ => {
                return Err(AuctionError::NotEditable(format!(
                    "Auction {id} has already started"
                )))
            }
        }

        let edited = request.apply(&auction)?;
        validate_window(edited.start_time, edited.end_time, now, self.lead_time())?;
        if edited.status_id != auction.status_id {
            self.ensure_status(&edited.status_id).await?;
        }
        if !self.store.update_terms(&edited, now).await? {
            return Err(AuctionError::NotEditable(format!(
                "Auction {id} has already started"
            )));
        }
        info!(
            "{:<12} --> Auction updated: id={}, start={}, end={}",
            "Engine", id, edited.start_time, edited.end_time
        );
        self.require_auction(id).await
    }

    /// Admin removal. Bids go with the auction.
    pub async fn delete_auction(&self, id: Uuid) -> Result<(), AuctionError> {
        if !self.store.delete_auction(id).await? {
            return Err(AuctionError::NotFound(format!("Auction {id}")));
        }
        info!("{:<12} --> Auction deleted: id={}", "Engine", id);
        Ok(())
    }

    // endregion: --- Commands

    // region:    --- Queries

    pub async fn list_auctions(&self) -> Result<Vec<AuctionSummary>, AuctionError> {
        self.store.list_auctions().await
    }

    /// Reports current state only. Settlement is left to the scheduler.
    pub async fn get_auction_details(&self, id: Uuid) -> Result<AuctionDetails, AuctionError> {
        let auction = self.require_auction(id).await?;
        let bids = self.store.bids_for_auction(id).await?;
        Ok(AuctionDetails {
            phase: auction.phase(self.clock.now()),
            auction,
            bids,
        })
    }

    pub async fn auction_bids(&self, id: Uuid) -> Result<Vec<Bid>, AuctionError> {
        self.require_auction(id).await?;
        self.store.bids_for_auction(id).await
    }

    pub async fn unsettled_auctions(&self) -> Result<Vec<Auction>, AuctionError> {
        self.store.unsettled_auctions().await
    }

    /// Claimed settlements whose stage has not moved for `idle`.
    pub async fn stalled_settlements(&self, idle: Duration) -> Result<Vec<Auction>, AuctionError> {
        self.store
            .stalled_settlements(self.clock.now() - idle)
            .await
    }

    // endregion: --- Queries

    pub(crate) async fn require_auction(&self, id: Uuid) -> Result<Auction, AuctionError> {
        self.store
            .get_auction(id)
            .await?
            .ok_or_else(|| AuctionError::NotFound(format!("Auction {id}")))
    }

    async fn ensure_status(&self, status_id: &str) -> Result<(), AuctionError> {
        if self.items.status_exists(status_id).await? {
            Ok(())
        } else {
            Err(AuctionError::NotFound(format!("Status {status_id}")))
        }
    }
}
