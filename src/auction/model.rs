use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bidding::model::Bid;
use crate::error::AuctionError;
use crate::settlement::SettlementStage;

/// Persisted auction record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Auction {
    pub id: Uuid,
    pub item_id: String,
    pub status_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub start_price: i64,
    pub current_price: i64,
    pub min_bid_increment: i64,
    /// Flipped exactly once, by the settlement claim. Never reverted.
    pub settled: bool,
    pub settlement: SettlementStage,
    pub settlement_id: Option<Uuid>,
    pub settlement_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Time-derived lifecycle state. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuctionPhase {
    Scheduled,
    Open,
    EndedUnsettled,
    Settled,
}

impl Auction {
    pub fn new(new: NewAuction, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_id: new.item_id,
            status_id: new.status_id,
            start_time: new.start_time,
            end_time: new.end_time,
            start_price: new.start_price,
            current_price: new.start_price,
            min_bid_increment: new.min_bid_increment,
            settled: false,
            settlement: SettlementStage::Pending,
            settlement_id: None,
            settlement_updated_at: None,
            created_at: now,
        }
    }

    pub fn phase(&self, now: DateTime<Utc>) -> AuctionPhase {
        if self.settled {
            AuctionPhase::Settled
        } else if now < self.start_time {
            AuctionPhase::Scheduled
        } else if now < self.end_time {
            AuctionPhase::Open
        } else {
            AuctionPhase::EndedUnsettled
        }
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.phase(now) == AuctionPhase::Open
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }

    /// Smallest amount a new bid must reach to be admitted. `None` once the
    /// price sits at the top of the range and no bid can clear it.
    pub fn minimum_next_bid(&self, enforce_increment: bool) -> Option<i64> {
        let step = if enforce_increment {
            self.min_bid_increment.max(1)
        } else {
            1
        };
        self.current_price.checked_add(step)
    }

    /// Admission predicate. Stores evaluate the same rule atomically.
    pub fn accepts(&self, amount: i64, now: DateTime<Utc>, enforce_increment: bool) -> bool {
        self.is_open(now)
            && self
                .minimum_next_bid(enforce_increment)
                .is_some_and(|minimum| amount >= minimum)
    }

    /// Explains why `accepts` would reject `amount`, first failure wins.
    pub fn check_admission(
        &self,
        amount: i64,
        now: DateTime<Utc>,
        enforce_increment: bool,
    ) -> Result<(), AuctionError> {
        if !self.is_open(now) {
            return Err(AuctionError::AuctionNotActive);
        }
        match self.minimum_next_bid(enforce_increment) {
            Some(minimum) if amount >= minimum => Ok(()),
            minimum => Err(AuctionError::BidTooLow {
                current_price: self.current_price,
                minimum: minimum.unwrap_or(i64::MAX),
            }),
        }
    }
}

/// Validated input for a new auction.
#[derive(Debug, Clone)]
pub struct NewAuction {
    pub item_id: String,
    pub status_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub start_price: i64,
    pub min_bid_increment: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAuctionRequest {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub start_price: Option<i64>,
    pub item_id: Option<String>,
    pub status_id: Option<String>,
    pub min_bid_increment: Option<i64>,
}

impl CreateAuctionRequest {
    pub fn validate(self) -> Result<NewAuction, AuctionError> {
        let item_id = required_text(self.item_id, "itemId")?;
        let status_id = required_text(self.status_id, "statusId")?;
        let start_time = required(self.start_time, "startTime")?;
        let end_time = required(self.end_time, "endTime")?;
        let start_price = required(self.start_price, "startPrice")?;
        if start_price < 0 {
            return Err(AuctionError::InvalidInput(
                "startPrice must not be negative".to_string(),
            ));
        }
        let min_bid_increment = self.min_bid_increment.unwrap_or(0);
        if min_bid_increment < 0 {
            return Err(AuctionError::InvalidInput(
                "minBidIncrement must not be negative".to_string(),
            ));
        }
        Ok(NewAuction {
            item_id,
            status_id,
            start_time,
            end_time,
            start_price,
            min_bid_increment,
        })
    }
}

/// Changes allowed on a scheduled auction. `startPrice` is immutable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAuctionRequest {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status_id: Option<String>,
    pub min_bid_increment: Option<i64>,
}

impl UpdateAuctionRequest {
    /// Applies the request over `auction`, returning the edited copy.
    pub fn apply(self, auction: &Auction) -> Result<Auction, AuctionError> {
        if let Some(increment) = self.min_bid_increment {
            if increment < 0 {
                return Err(AuctionError::InvalidInput(
                    "minBidIncrement must not be negative".to_string(),
                ));
            }
        }
        let mut edited = auction.clone();
        if let Some(start_time) = self.start_time {
            edited.start_time = start_time;
        }
        if let Some(end_time) = self.end_time {
            edited.end_time = end_time;
        }
        if let Some(status_id) = self.status_id {
            edited.status_id = required_text(Some(status_id), "statusId")?;
        }
        if let Some(increment) = self.min_bid_increment {
            edited.min_bid_increment = increment;
        }
        Ok(edited)
    }
}

/// `start_time < end_time` and `start_time >= now + lead_time`.
pub fn validate_window(
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    now: DateTime<Utc>,
    lead_time: Duration,
) -> Result<(), AuctionError> {
    if start_time >= end_time {
        return Err(AuctionError::InvalidInput(
            "startTime must be before endTime".to_string(),
        ));
    }
    if start_time < now + lead_time {
        return Err(AuctionError::InvalidInput(format!(
            "startTime must be at least {} minutes in the future",
            lead_time.num_minutes()
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionSummary {
    #[serde(flatten)]
    pub auction: Auction,
    pub bid_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionDetails {
    #[serde(flatten)]
    pub auction: Auction,
    pub phase: AuctionPhase,
    pub bids: Vec<Bid>,
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, AuctionError> {
    value.ok_or_else(|| AuctionError::InvalidInput(format!("{field} is required")))
}

fn required_text(value: Option<String>, field: &str) -> Result<String, AuctionError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AuctionError::InvalidInput(format!("{field} is required"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auction_at(now: DateTime<Utc>) -> Auction {
        Auction::new(
            NewAuction {
                item_id: "item-1".to_string(),
                status_id: "available".to_string(),
                start_time: now + Duration::minutes(6),
                end_time: now + Duration::minutes(16),
                start_price: 100,
                min_bid_increment: 0,
            },
            now,
        )
    }

    #[test]
    fn phase_follows_the_clock() {
        let now = Utc::now();
        let mut auction = auction_at(now);
        assert_eq!(auction.phase(now), AuctionPhase::Scheduled);
        assert_eq!(auction.phase(now + Duration::minutes(6)), AuctionPhase::Open);
        assert_eq!(
            auction.phase(now + Duration::minutes(16)),
            AuctionPhase::EndedUnsettled
        );
        auction.settled = true;
        assert_eq!(auction.phase(now + Duration::minutes(16)), AuctionPhase::Settled);
    }

    #[test]
    fn admission_checks_window_before_price() {
        let now = Utc::now();
        let auction = auction_at(now);
        assert!(matches!(
            auction.check_admission(50, now, true),
            Err(AuctionError::AuctionNotActive)
        ));
        let open = now + Duration::minutes(7);
        assert!(matches!(
            auction.check_admission(100, open, true),
            Err(AuctionError::BidTooLow { minimum: 101, .. })
        ));
        assert!(auction.check_admission(101, open, true).is_ok());
    }

    #[test]
    fn increment_is_enforced_only_when_enabled() {
        let now = Utc::now();
        let mut auction = auction_at(now);
        auction.min_bid_increment = 25;
        let open = now + Duration::minutes(7);
        assert!(!auction.accepts(110, open, true));
        assert!(auction.accepts(125, open, true));
        assert!(auction.accepts(110, open, false));
    }

    #[test]
    fn price_at_the_top_of_the_range_admits_nothing() {
        let now = Utc::now();
        let mut auction = auction_at(now);
        auction.current_price = i64::MAX;
        let open = now + Duration::minutes(7);
        assert_eq!(auction.minimum_next_bid(false), None);
        assert!(!auction.accepts(i64::MAX, open, false));
        assert!(!auction.accepts(i64::MAX, open, true));
        assert!(matches!(
            auction.check_admission(i64::MAX, open, true),
            Err(AuctionError::BidTooLow { current_price: i64::MAX, .. })
        ));
    }

    #[test]
    fn window_requires_lead_time() {
        let now = Utc::now();
        let lead = Duration::minutes(5);
        let window = |start: i64, end: i64| {
            validate_window(
                now + Duration::minutes(start),
                now + Duration::minutes(end),
                now,
                lead,
            )
        };
        assert!(window(6, 7).is_ok());
        assert!(window(4, 7).is_err());
        assert!(window(8, 7).is_err());
    }

    #[test]
    fn create_request_reports_missing_fields() {
        let err = CreateAuctionRequest::default().validate().unwrap_err();
        assert!(err.to_string().contains("itemId"));
    }
}
