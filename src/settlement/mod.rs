//! Settlement of ended auctions.
//! 1. Atomic claim (`settled` flips once)
//! 2. Keyed coin debit, item update, purchase record, notifications
//! Every step persists its stage so an interrupted settlement can be resumed.
// region:    --- Imports
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
// endregion: --- Imports

// region:    --- Modules
pub mod saga;
// endregion: --- Modules

// region:    --- Settlement Stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStage {
    Pending,
    Claimed,
    LedgerAdjusted,
    ItemUpdated,
    Recorded,
    Completed,
    NoBids,
    InsufficientFunds,
    ItemMissing,
}

impl SettlementStage {
    pub const IN_PROGRESS: [SettlementStage; 4] = [
        SettlementStage::Claimed,
        SettlementStage::LedgerAdjusted,
        SettlementStage::ItemUpdated,
        SettlementStage::Recorded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::LedgerAdjusted => "ledger_adjusted",
            Self::ItemUpdated => "item_updated",
            Self::Recorded => "recorded",
            Self::Completed => "completed",
            Self::NoBids => "no_bids",
            Self::InsufficientFunds => "insufficient_funds",
            Self::ItemMissing => "item_missing",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::NoBids | Self::InsufficientFunds | Self::ItemMissing
        )
    }

    pub fn is_in_progress(&self) -> bool {
        Self::IN_PROGRESS.contains(self)
    }
}

impl fmt::Display for SettlementStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettlementStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "claimed" => Ok(Self::Claimed),
            "ledger_adjusted" => Ok(Self::LedgerAdjusted),
            "item_updated" => Ok(Self::ItemUpdated),
            "recorded" => Ok(Self::Recorded),
            "completed" => Ok(Self::Completed),
            "no_bids" => Ok(Self::NoBids),
            "insufficient_funds" => Ok(Self::InsufficientFunds),
            "item_missing" => Ok(Self::ItemMissing),
            other => Err(format!("Unknown settlement stage: {other}")),
        }
    }
}
// endregion: --- Settlement Stage

// region:    --- Purchase
/// Transaction record linking winner, item, auction and final price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub id: Uuid,
    pub auction_id: Uuid,
    pub item_id: String,
    pub buyer_id: String,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}
// endregion: --- Purchase

// region:    --- Outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SettlementOutcome {
    #[serde(rename_all = "camelCase")]
    Sold {
        auction_id: Uuid,
        winner_id: String,
        amount: i64,
        purchase_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    NoBids { auction_id: Uuid },
    #[serde(rename_all = "camelCase")]
    InsufficientFunds {
        auction_id: Uuid,
        winner_id: String,
        amount: i64,
        balance: i64,
    },
    /// The listed item vanished before any coins moved.
    #[serde(rename_all = "camelCase")]
    ItemMissing { auction_id: Uuid, item_id: String },
    #[serde(rename_all = "camelCase")]
    AlreadySettled { auction_id: Uuid },
    #[serde(rename_all = "camelCase")]
    NotFound { auction_id: Uuid },
    #[serde(rename_all = "camelCase")]
    NotEnded {
        auction_id: Uuid,
        end_time: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        auction_id: Uuid,
        stage: SettlementStage,
        message: String,
    },
}

impl SettlementOutcome {
    pub fn success(&self) -> bool {
        matches!(self, Self::Sold { .. })
    }

    pub fn message(&self) -> String {
        match self {
            Self::Sold { amount, .. } => format!("Auction settled, sold for {amount}"),
            Self::NoBids { .. } => "Auction ended with no bids".to_string(),
            Self::InsufficientFunds {
                amount, balance, ..
            } => format!("Winner lacks funds: balance {balance}, required {amount}"),
            Self::ItemMissing { item_id, .. } => format!("Item {item_id} no longer exists"),
            Self::AlreadySettled { .. } => "Auction already settled".to_string(),
            Self::NotFound { .. } => "Auction not found".to_string(),
            Self::NotEnded { .. } => "Auction has not ended yet".to_string(),
            Self::Failed { message, .. } => format!("Settlement failed: {message}"),
        }
    }
}
// endregion: --- Outcome

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_round_trip_through_storage_text() {
        for stage in [
            SettlementStage::Pending,
            SettlementStage::LedgerAdjusted,
            SettlementStage::InsufficientFunds,
            SettlementStage::ItemMissing,
        ] {
            assert_eq!(stage.as_str().parse::<SettlementStage>(), Ok(stage));
        }
        assert!("bogus".parse::<SettlementStage>().is_err());
    }

    #[test]
    fn only_sold_counts_as_success() {
        let id = Uuid::new_v4();
        assert!(!SettlementOutcome::NoBids { auction_id: id }.success());
        let json =
            serde_json::to_value(SettlementOutcome::AlreadySettled { auction_id: id }).unwrap();
        assert_eq!(json["status"], "alreadySettled");
        assert_eq!(json["auctionId"], id.to_string());
    }
}
