// region:    --- Imports
use super::{AuctionStore, BidAdmission, Item, ItemStore};
use crate::auction::model::{Auction, AuctionSummary};
use crate::bidding::model::Bid;
use crate::database::DatabaseManager;
use crate::error::AuctionError;
use crate::query::queries;
use crate::settlement::{Purchase, SettlementStage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
// endregion: --- Imports

// region:    --- Rows
#[derive(FromRow)]
struct AuctionRow {
    id: Uuid,
    item_id: String,
    status_id: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    start_price: i64,
    current_price: i64,
    min_bid_increment: i64,
    settled: bool,
    settlement_stage: String,
    settlement_id: Option<Uuid>,
    settlement_updated_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuctionRow> for Auction {
    type Error = AuctionError;

    fn try_from(row: AuctionRow) -> Result<Self, Self::Error> {
        let settlement = row
            .settlement_stage
            .parse::<SettlementStage>()
            .map_err(AuctionError::Internal)?;
        Ok(Auction {
            id: row.id,
            item_id: row.item_id,
            status_id: row.status_id,
            start_time: row.start_time,
            end_time: row.end_time,
            start_price: row.start_price,
            current_price: row.current_price,
            min_bid_increment: row.min_bid_increment,
            settled: row.settled,
            settlement,
            settlement_id: row.settlement_id,
            settlement_updated_at: row.settlement_updated_at,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct AuctionSummaryRow {
    #[sqlx(flatten)]
    auction: AuctionRow,
    bid_count: i64,
}

fn into_auctions(rows: Vec<AuctionRow>) -> Result<Vec<Auction>, AuctionError> {
    rows.into_iter().map(Auction::try_from).collect()
}
// endregion: --- Rows

// region:    --- Postgres Store
/// PostgreSQL backed store. Items and statuses live in the same database.
pub struct PgStore {
    db: Arc<DatabaseManager>,
}

impl PgStore {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    fn pool(&self) -> &PgPool {
        self.db.pool()
    }
}

#[async_trait]
impl AuctionStore for PgStore {
    async fn insert_auction(&self, auction: &Auction) -> Result<(), AuctionError> {
        sqlx::query(queries::INSERT_AUCTION)
            .bind(auction.id)
            .bind(&auction.item_id)
            .bind(&auction.status_id)
            .bind(auction.start_time)
            .bind(auction.end_time)
            .bind(auction.start_price)
            .bind(auction.current_price)
            .bind(auction.min_bid_increment)
            .bind(auction.created_at)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn get_auction(&self, id: Uuid) -> Result<Option<Auction>, AuctionError> {
        sqlx::query_as::<_, AuctionRow>(&queries::get_auction())
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .map(Auction::try_from)
            .transpose()
    }

    async fn list_auctions(&self) -> Result<Vec<AuctionSummary>, AuctionError> {
        let rows = sqlx::query_as::<_, AuctionSummaryRow>(queries::LIST_AUCTIONS)
            .fetch_all(self.pool())
            .await?;
        rows.into_iter()
            .map(|row| {
                Ok(AuctionSummary {
                    auction: Auction::try_from(row.auction)?,
                    bid_count: row.bid_count,
                })
            })
            .collect()
    }

    async fn update_terms(
        &self,
        auction: &Auction,
        now: DateTime<Utc>,
    ) -> Result<bool, AuctionError> {
        let result = sqlx::query(queries::UPDATE_TERMS)
            .bind(auction.id)
            .bind(auction.start_time)
            .bind(auction.end_time)
            .bind(&auction.status_id)
            .bind(auction.min_bid_increment)
            .bind(now)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_auction(&self, id: Uuid) -> Result<bool, AuctionError> {
        let result = sqlx::query(queries::DELETE_AUCTION)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn admit_bid(
        &self,
        bid: &Bid,
        now: DateTime<Utc>,
        enforce_increment: bool,
    ) -> Result<BidAdmission, AuctionError> {
        let mut tx = self.pool().begin().await?;

        // conditional raise, holds the row lock until commit
        let raised = sqlx::query_as::<_, AuctionRow>(&queries::raise_price())
            .bind(bid.auction_id)
            .bind(bid.amount)
            .bind(now)
            .bind(enforce_increment)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = raised else {
            tx.rollback().await?;
            debug!(
                "{:<12} --> Conditional raise matched nothing: auction={}",
                "Store", bid.auction_id
            );
            return Ok(match self.get_auction(bid.auction_id).await? {
                Some(auction) => BidAdmission::Rejected(auction),
                None => BidAdmission::NotFound,
            });
        };

        sqlx::query(queries::INSERT_BID)
            .bind(bid.id)
            .bind(bid.auction_id)
            .bind(&bid.user_id)
            .bind(bid.amount)
            .bind(bid.created_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(
            "{:<12} --> Price raised: auction={}, price={}",
            "Store", row.id, row.current_price
        );
        Ok(BidAdmission::Admitted {
            auction: Auction::try_from(row)?,
            bid: bid.clone(),
        })
    }

    async fn bids_for_auction(&self, auction_id: Uuid) -> Result<Vec<Bid>, AuctionError> {
        Ok(sqlx::query_as::<_, Bid>(queries::GET_BIDS)
            .bind(auction_id)
            .fetch_all(self.pool())
            .await?)
    }

    async fn highest_bid(&self, auction_id: Uuid) -> Result<Option<Bid>, AuctionError> {
        Ok(sqlx::query_as::<_, Bid>(queries::GET_HIGHEST_BID)
            .bind(auction_id)
            .fetch_optional(self.pool())
            .await?)
    }

    async fn claim_settlement(
        &self,
        auction_id: Uuid,
        settlement_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Auction>, AuctionError> {
        sqlx::query_as::<_, AuctionRow>(&queries::claim_settlement())
            .bind(auction_id)
            .bind(settlement_id)
            .bind(now)
            .fetch_optional(self.pool())
            .await?
            .map(Auction::try_from)
            .transpose()
    }

    async fn advance_settlement(
        &self,
        auction_id: Uuid,
        from: SettlementStage,
        to: SettlementStage,
        now: DateTime<Utc>,
    ) -> Result<bool, AuctionError> {
        let result = sqlx::query(queries::ADVANCE_SETTLEMENT)
            .bind(auction_id)
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(now)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn record_purchase(&self, purchase: &Purchase) -> Result<bool, AuctionError> {
        let result = sqlx::query(queries::INSERT_PURCHASE)
            .bind(purchase.id)
            .bind(purchase.auction_id)
            .bind(&purchase.item_id)
            .bind(&purchase.buyer_id)
            .bind(purchase.amount)
            .bind(purchase.created_at)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn purchase_for_auction(
        &self,
        auction_id: Uuid,
    ) -> Result<Option<Purchase>, AuctionError> {
        Ok(sqlx::query_as::<_, Purchase>(queries::GET_PURCHASE)
            .bind(auction_id)
            .fetch_optional(self.pool())
            .await?)
    }

    async fn unsettled_auctions(&self) -> Result<Vec<Auction>, AuctionError> {
        let rows = sqlx::query_as::<_, AuctionRow>(&queries::unsettled_auctions())
            .fetch_all(self.pool())
            .await?;
        into_auctions(rows)
    }

    async fn stalled_settlements(
        &self,
        touched_before: DateTime<Utc>,
    ) -> Result<Vec<Auction>, AuctionError> {
        let stages: Vec<String> = SettlementStage::IN_PROGRESS
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        let rows = sqlx::query_as::<_, AuctionRow>(&queries::stalled_settlements())
            .bind(stages)
            .bind(touched_before)
            .fetch_all(self.pool())
            .await?;
        into_auctions(rows)
    }
}

#[async_trait]
impl ItemStore for PgStore {
    async fn item(&self, id: &str) -> Result<Option<Item>, AuctionError> {
        Ok(sqlx::query_as::<_, Item>(queries::GET_ITEM)
            .bind(id)
            .fetch_optional(self.pool())
            .await?)
    }

    async fn status_exists(&self, status_id: &str) -> Result<bool, AuctionError> {
        Ok(sqlx::query_scalar::<_, bool>(queries::STATUS_EXISTS)
            .bind(status_id)
            .fetch_one(self.pool())
            .await?)
    }

    async fn mark_sold(
        &self,
        item_id: &str,
        status_id: &str,
        price: i64,
    ) -> Result<bool, AuctionError> {
        let result = sqlx::query(queries::MARK_ITEM_SOLD)
            .bind(item_id)
            .bind(status_id)
            .bind(price)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() == 1)
    }
}
// endregion: --- Postgres Store
