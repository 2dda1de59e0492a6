//! Coin balances held by the external identity provider.
// region:    --- Imports
use crate::error::AuctionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::info;
// endregion: --- Imports

// region:    --- Modules
pub mod clerk;

pub use clerk::ClerkLedger;
// endregion: --- Modules

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email_addresses: Vec<String>,
    pub coin: i64,
}

impl UserProfile {
    pub fn display_name(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if name.trim().is_empty() {
            self.id.clone()
        } else {
            name
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    Applied { new_balance: i64 },
    /// The key was seen before; nothing moved.
    AlreadyApplied { balance: i64 },
    Insufficient { balance: i64 },
}

#[async_trait]
pub trait CoinLedger: Send + Sync {
    async fn user(&self, user_id: &str) -> Result<UserProfile, AuctionError>;

    /// Deducts `amount` unless `key` was already applied or the balance is short.
    async fn debit(&self, user_id: &str, amount: i64, key: &str)
        -> Result<DebitOutcome, AuctionError>;
}

// region:    --- Memory Ledger
/// Ledger for local runs and tests.
#[derive(Default)]
pub struct MemoryLedger {
    inner: Mutex<LedgerState>,
}

#[derive(Default)]
struct LedgerState {
    users: HashMap<String, UserProfile>,
    applied: HashSet<String>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_balance(&self, user_id: &str, coin: i64) {
        let mut state = self.inner.lock().await;
        state
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| UserProfile {
                id: user_id.to_string(),
                first_name: None,
                last_name: None,
                email_addresses: Vec::new(),
                coin: 0,
            })
            .coin = coin;
    }

    pub async fn insert_user(&self, profile: UserProfile) {
        self.inner
            .lock()
            .await
            .users
            .insert(profile.id.clone(), profile);
    }

    pub async fn balance(&self, user_id: &str) -> Option<i64> {
        self.inner.lock().await.users.get(user_id).map(|u| u.coin)
    }
}

#[async_trait]
impl CoinLedger for MemoryLedger {
    async fn user(&self, user_id: &str) -> Result<UserProfile, AuctionError> {
        self.inner
            .lock()
            .await
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| AuctionError::External(format!("Unknown user {user_id}")))
    }

    async fn debit(
        &self,
        user_id: &str,
        amount: i64,
        key: &str,
    ) -> Result<DebitOutcome, AuctionError> {
        let mut guard = self.inner.lock().await;
        let state = &mut *guard;
        let user = state
            .users
            .get_mut(user_id)
            .ok_or_else(|| AuctionError::External(format!("Unknown user {user_id}")))?;
        if state.applied.contains(key) {
            return Ok(DebitOutcome::AlreadyApplied { balance: user.coin });
        }
        if user.coin < amount {
            return Ok(DebitOutcome::Insufficient { balance: user.coin });
        }
        user.coin -= amount;
        state.applied.insert(key.to_string());
        info!(
            "{:<12} --> Debited {} from {}, balance {}",
            "Ledger", amount, user_id, user.coin
        );
        Ok(DebitOutcome::Applied {
            new_balance: user.coin,
        })
    }
}
// endregion: --- Memory Ledger

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn debit_is_keyed() {
        let ledger = MemoryLedger::new();
        ledger.set_balance("u1", 300).await;
        assert_eq!(
            ledger.debit("u1", 200, "k1").await.unwrap(),
            DebitOutcome::Applied { new_balance: 100 }
        );
        assert_eq!(
            ledger.debit("u1", 200, "k1").await.unwrap(),
            DebitOutcome::AlreadyApplied { balance: 100 }
        );
        assert_eq!(
            ledger.debit("u1", 200, "k2").await.unwrap(),
            DebitOutcome::Insufficient { balance: 100 }
        );
    }

    #[test]
    fn display_name_falls_back_to_id() {
        let mut profile = UserProfile {
            id: "user_1".to_string(),
            first_name: None,
            last_name: None,
            email_addresses: vec![],
            coin: 0,
        };
        assert_eq!(profile.display_name(), "user_1");
        profile.first_name = Some("Ada".to_string());
        profile.last_name = Some("Lovelace".to_string());
        assert_eq!(profile.display_name(), "Ada Lovelace");
    }
}
