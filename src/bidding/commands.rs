//! Bid admission.
//! The price check and the price raise are one conditional write at the store;
//! a rejected write is re-read to explain the rejection.
// region:    --- Imports
use crate::auction::engine::AuctionEngine;
use crate::auction::events::AuctionEvent;
use crate::auction::model::Auction;
use crate::bidding::model::Bid;
use crate::error::AuctionError;
use crate::realtime::Room;
use crate::store::BidAdmission;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;
// endregion: --- Imports

// region:    --- Commands
/// Bid request as received; every field may be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBidRequest {
    pub auction_id: Option<Uuid>,
    pub amount: Option<i64>,
    pub user_id: Option<String>,
}

/// Validated bid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceBidCommand {
    pub auction_id: Uuid,
    pub user_id: String,
    pub amount: i64,
}

impl PlaceBidRequest {
    pub fn validate(self) -> Result<PlaceBidCommand, AuctionError> {
        let (Some(auction_id), Some(amount), Some(user_id)) =
            (self.auction_id, self.amount, self.user_id)
        else {
            return Err(AuctionError::InvalidInput(
                "auctionId, amount and userId are required".to_string(),
            ));
        };
        let user_id = user_id.trim().to_string();
        if user_id.is_empty() {
            return Err(AuctionError::InvalidInput("userId is required".to_string()));
        }
        if amount <= 0 {
            return Err(AuctionError::InvalidInput(
                "amount must be a positive number".to_string(),
            ));
        }
        Ok(PlaceBidCommand {
            auction_id,
            user_id,
            amount,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidReceipt {
    pub bid: Bid,
    pub auction: Auction,
}
// endregion: --- Commands

// region:    --- Admission
impl AuctionEngine {
    /// Admits a bid iff the auction is open and the amount clears the current price.
    pub async fn place_bid(&self, request: PlaceBidRequest) -> Result<BidReceipt, AuctionError> {
        let cmd = request.validate()?;
        info!("{:<12} --> Place bid: {:?}", "Bid", cmd);
        let enforce = self.rules.enforce_min_bid_increment;

        let mut retries = 0;
        while retries < self.rules.max_bid_retries {
            let now = self.clock.now();
            let bid = Bid::new(cmd.auction_id, cmd.user_id.clone(), cmd.amount, now);

            match self.store.admit_bid(&bid, now, enforce).await? {
                BidAdmission::Admitted { auction, bid } => {
                    info!(
                        "{:<12} --> Bid accepted: auction={}, user={}, price={}",
                        "Bid", auction.id, bid.user_id, auction.current_price
                    );
                    self.publish_bid(&auction, &bid).await;
                    return Ok(BidReceipt { bid, auction });
                }
                BidAdmission::NotFound => {
                    return Err(AuctionError::NotFound(format!(
                        "Auction {}",
                        cmd.auction_id
                    )))
                }
                BidAdmission::Rejected(snapshot) => {
                    if let Err(reason) = snapshot.check_admission(cmd.amount, now, enforce) {
                        info!(
                            "{:<12} --> Bid rejected: auction={}, amount={}, reason={}",
                            "Bid", cmd.auction_id, cmd.amount, reason
                        );
                        return Err(reason);
                    }
                    // the snapshot moved after the conditional write lost
                    warn!(
                        "{:<12} --> Conditional raise lost a race, retrying",
                        "Bid"
                    );
                    retries += 1;
                }
            }
        }

        Err(AuctionError::Contention)
    }

    async fn publish_bid(&self, auction: &Auction, bid: &Bid) {
        let room = Room::Auction(auction.id);
        self.fanout
            .publish(&room, &AuctionEvent::NewBid { bid: bid.clone() })
            .await;
        match self.store.bids_for_auction(auction.id).await {
            Ok(bids) => {
                self.fanout
                    .publish(
                        &room,
                        &AuctionEvent::BidUpdate {
                            auction: auction.clone(),
                            bids,
                        },
                    )
                    .await
            }
            Err(e) => error!(
                "{:<12} --> Could not load bids for update event: {}",
                "Bid", e
            ),
        }
    }
}
// endregion: --- Admission

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_are_invalid_input() {
        let err = PlaceBidRequest {
            auction_id: Some(Uuid::new_v4()),
            amount: None,
            user_id: Some("u".to_string()),
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, AuctionError::InvalidInput(_)));
    }

    #[test]
    fn amount_must_be_positive() {
        let err = PlaceBidRequest {
            auction_id: Some(Uuid::new_v4()),
            amount: Some(0),
            user_id: Some("u".to_string()),
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }
}
