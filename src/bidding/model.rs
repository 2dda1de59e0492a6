use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

/// Append-only bid record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: Uuid,
    pub auction_id: Uuid,
    pub user_id: String,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl Bid {
    pub fn new(auction_id: Uuid, user_id: String, amount: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            auction_id,
            user_id,
            amount,
            created_at: now,
        }
    }
}

/// Leaderboard order: amount descending, then earliest first.
pub fn leaderboard_order(a: &Bid, b: &Bid) -> Ordering {
    b.amount
        .cmp(&a.amount)
        .then(a.created_at.cmp(&b.created_at))
        .then(a.id.cmp(&b.id))
}
