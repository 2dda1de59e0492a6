// region:    --- Imports
use super::{Purchase, SettlementOutcome, SettlementStage};
use crate::auction::engine::AuctionEngine;
use crate::auction::events::{AuctionEndedNotice, AuctionEvent, CoinTransaction};
use crate::auction::model::Auction;
use crate::bidding::model::Bid;
use crate::error::AuctionError;
use crate::ledger::DebitOutcome;
use crate::realtime::Room;
use crate::store::Item;
use tracing::{error, info, warn};
use uuid::Uuid;
// endregion: --- Imports

impl AuctionEngine {
    /// Settles an ended auction at most once. Safe to call concurrently and
    /// repeatedly; only the caller that wins the claim drives the settlement.
    pub async fn settle_auction(&self, id: Uuid) -> SettlementOutcome {
        match self.claim_and_settle(id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("{:<12} --> Settlement of {} failed: {}", "Settle", id, e);
                SettlementOutcome::Failed {
                    auction_id: id,
                    stage: SettlementStage::Pending,
                    message: e.to_string(),
                }
            }
        }
    }

    /// Continues a claimed settlement from its persisted stage.
    pub async fn resume_settlement(&self, id: Uuid) -> SettlementOutcome {
        let auction = match self.store.get_auction(id).await {
            Ok(Some(auction)) => auction,
            Ok(None) => return SettlementOutcome::NotFound { auction_id: id },
            Err(e) => {
                return SettlementOutcome::Failed {
                    auction_id: id,
                    stage: SettlementStage::Pending,
                    message: e.to_string(),
                }
            }
        };
        if !auction.settled {
            return self.settle_auction(id).await;
        }
        if auction.settlement.is_terminal() {
            return SettlementOutcome::AlreadySettled { auction_id: id };
        }
        info!(
            "{:<12} --> Resuming settlement of {} from {}",
            "Settle", id, auction.settlement
        );
        self.drive(auction).await
    }

    async fn claim_and_settle(&self, id: Uuid) -> Result<SettlementOutcome, AuctionError> {
        let now = self.clock.now();
        let settlement_id = Uuid::new_v4();

        let Some(auction) = self.store.claim_settlement(id, settlement_id, now).await? else {
            return Ok(match self.store.get_auction(id).await? {
                None => SettlementOutcome::NotFound { auction_id: id },
                Some(auction) if auction.settled => {
                    SettlementOutcome::AlreadySettled { auction_id: id }
                }
                Some(auction) => SettlementOutcome::NotEnded {
                    auction_id: id,
                    end_time: auction.end_time,
                },
            });
        };

        info!(
            "{:<12} --> Claimed auction {} (settlement {})",
            "Settle", id, settlement_id
        );
        Ok(self.drive(auction).await)
    }

    async fn drive(&self, auction: Auction) -> SettlementOutcome {
        let mut stage = auction.settlement;
        match self.run_stages(&auction, &mut stage).await {
            Ok(outcome) => {
                info!(
                    "{:<12} --> Auction {}: {}",
                    "Settle",
                    auction.id,
                    outcome.message()
                );
                outcome
            }
            Err(e) => {
                error!(
                    "{:<12} --> Settlement of {} stopped at {}: {}",
                    "Settle", auction.id, stage, e
                );
                SettlementOutcome::Failed {
                    auction_id: auction.id,
                    stage,
                    message: e.to_string(),
                }
            }
        }
    }

    async fn run_stages(
        &self,
        auction: &Auction,
        stage: &mut SettlementStage,
    ) -> Result<SettlementOutcome, AuctionError> {
        let settlement_id = auction.settlement_id.unwrap_or(auction.id);
        let winner = self.store.highest_bid(auction.id).await?;
        let item = self.items.item(&auction.item_id).await?;

        let Some(winner) = winner else {
            if self.advance(auction, stage, SettlementStage::NoBids).await? {
                self.notify_no_sale(auction, item.as_ref(), "Auction ended with no bids")
                    .await;
            }
            return Ok(SettlementOutcome::NoBids {
                auction_id: auction.id,
            });
        };

        if item.is_none() {
            error!(
                "{:<12} --> Item {} of auction {} is gone at stage {}",
                "Settle", auction.item_id, auction.id, stage
            );
            // nothing charged yet: close without a sale
            if *stage == SettlementStage::Claimed {
                if self
                    .advance(auction, stage, SettlementStage::ItemMissing)
                    .await?
                {
                    let message = "Auction ended without a sale: item removed";
                    self.notify_no_sale(auction, None, message).await;
                }
                return Ok(SettlementOutcome::ItemMissing {
                    auction_id: auction.id,
                    item_id: auction.item_id.clone(),
                });
            }
        }

        // 1. coins
        let mut new_balance = None;
        if *stage == SettlementStage::Claimed {
            let key = format!("auction-settlement:{settlement_id}");
            match self
                .ledger
                .debit(&winner.user_id, winner.amount, &key)
                .await?
            {
                DebitOutcome::Applied { new_balance: b } => new_balance = Some(b),
                DebitOutcome::AlreadyApplied { balance } => new_balance = Some(balance),
                DebitOutcome::Insufficient { balance } => {
                    warn!(
                        "{:<12} --> Winner {} lacks funds for {}: balance {}",
                        "Settle", winner.user_id, auction.id, balance
                    );
                    if self
                        .advance(auction, stage, SettlementStage::InsufficientFunds)
                        .await?
                    {
                        let message = format!(
                            "Auction ended without a sale: winning bidder could not pay {}",
                            winner.amount
                        );
                        self.notify_no_sale(auction, item.as_ref(), &message).await;
                    }
                    return Ok(SettlementOutcome::InsufficientFunds {
                        auction_id: auction.id,
                        winner_id: winner.user_id,
                        amount: winner.amount,
                        balance,
                    });
                }
            }
            self.advance(auction, stage, SettlementStage::LedgerAdjusted)
                .await?;
        }

        // 2. item
        if *stage == SettlementStage::LedgerAdjusted {
            let marked = self
                .items
                .mark_sold(
                    &auction.item_id,
                    &self.rules.pending_delivery_status,
                    winner.amount,
                )
                .await?;
            if !marked {
                warn!(
                    "{:<12} --> Item {} not updated for auction {}",
                    "Settle", auction.item_id, auction.id
                );
            }
            self.advance(auction, stage, SettlementStage::ItemUpdated)
                .await?;
        }

        // 3. purchase record
        if *stage == SettlementStage::ItemUpdated {
            let purchase = Purchase {
                id: settlement_id,
                auction_id: auction.id,
                item_id: auction.item_id.clone(),
                buyer_id: winner.user_id.clone(),
                amount: winner.amount,
                created_at: self.clock.now(),
            };
            self.store.record_purchase(&purchase).await?;
            self.advance(auction, stage, SettlementStage::Recorded)
                .await?;
        }

        let purchase = self
            .store
            .purchase_for_auction(auction.id)
            .await?
            .ok_or_else(|| {
                AuctionError::Internal(format!("Purchase missing for auction {}", auction.id))
            })?;

        // 4. notifications, sent by whoever completes the stage
        if *stage == SettlementStage::Recorded
            && self
                .advance(auction, stage, SettlementStage::Completed)
                .await?
        {
            self.notify_sale(auction, item.as_ref(), &winner, new_balance, settlement_id)
                .await;
        }

        Ok(SettlementOutcome::Sold {
            auction_id: auction.id,
            winner_id: winner.user_id,
            amount: winner.amount,
            purchase_id: purchase.id,
        })
    }

    /// Moves the persisted stage from `*stage` to `to`. When another worker
    /// got there first, `*stage` is reloaded and false is returned.
    async fn advance(
        &self,
        auction: &Auction,
        stage: &mut SettlementStage,
        to: SettlementStage,
    ) -> Result<bool, AuctionError> {
        let now = self.clock.now();
        if self
            .store
            .advance_settlement(auction.id, *stage, to, now)
            .await?
        {
            *stage = to;
            return Ok(true);
        }
        let current = self.require_auction(auction.id).await?.settlement;
        warn!(
            "{:<12} --> Stage of {} moved concurrently: expected {}, found {}",
            "Settle", auction.id, stage, current
        );
        *stage = current;
        Ok(false)
    }

    async fn notify_no_sale(&self, auction: &Auction, item: Option<&Item>, message: &str) {
        let notice = AuctionEndedNotice {
            auction_id: auction.id,
            item_id: auction.item_id.clone(),
            winner_id: None,
            winner_name: None,
            amount: None,
            message: message.to_string(),
        };
        self.fanout
            .publish(
                &Room::Auction(auction.id),
                &AuctionEvent::AuctionEnded(notice.clone()),
            )
            .await;
        if let Some(item) = item {
            self.fanout
                .publish(
                    &Room::User(item.owner.clone()),
                    &AuctionEvent::AuctionEndedSeller(notice),
                )
                .await;
        }
    }

    async fn notify_sale(
        &self,
        auction: &Auction,
        item: Option<&Item>,
        winner: &Bid,
        new_balance: Option<i64>,
        settlement_id: Uuid,
    ) {
        let profile = match self.ledger.user(&winner.user_id).await {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(
                    "{:<12} --> Could not load winner {} profile: {}",
                    "Settle", winner.user_id, e
                );
                None
            }
        };
        let winner_name = profile
            .as_ref()
            .map(|p| p.display_name())
            .unwrap_or_else(|| winner.user_id.clone());
        let new_balance = new_balance.or_else(|| profile.as_ref().map(|p| p.coin));

        let notice = |message: String| AuctionEndedNotice {
            auction_id: auction.id,
            item_id: auction.item_id.clone(),
            winner_id: Some(winner.user_id.clone()),
            winner_name: Some(winner_name.clone()),
            amount: Some(winner.amount),
            message,
        };

        self.fanout
            .publish(
                &Room::Auction(auction.id),
                &AuctionEvent::AuctionEnded(notice(format!(
                    "Auction won by {} for {}",
                    winner_name, winner.amount
                ))),
            )
            .await;

        let winner_room = Room::User(winner.user_id.clone());
        self.fanout
            .publish(
                &winner_room,
                &AuctionEvent::AuctionEndedWinner(notice(format!(
                    "You won the auction for {}",
                    winner.amount
                ))),
            )
            .await;
        if let Some(new_balance) = new_balance {
            self.fanout
                .publish(
                    &winner_room,
                    &AuctionEvent::CoinUpdate {
                        user_id: winner.user_id.clone(),
                        new_balance,
                        transaction: CoinTransaction {
                            id: settlement_id,
                            auction_id: auction.id,
                            amount: -winner.amount,
                            description: format!("Auction {} won", auction.id),
                        },
                    },
                )
                .await;
        }

        let Some(item) = item else {
            return;
        };
        self.fanout
            .publish(
                &Room::User(item.owner.clone()),
                &AuctionEvent::AuctionEndedSeller(notice(format!(
                    "Your item sold to {} for {}",
                    winner_name, winner.amount
                ))),
            )
            .await;
    }
}
