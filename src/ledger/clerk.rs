// region:    --- Imports
use super::{CoinLedger, DebitOutcome, UserProfile};
use crate::error::AuctionError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
// endregion: --- Imports

/// Applied debit keys kept on the user record.
const MAX_LEDGER_KEYS: usize = 100;
const LEDGER_KEYS_FIELD: &str = "coinLedgerKeys";

#[derive(Debug, Deserialize)]
struct ClerkUser {
    id: String,
    first_name: Option<String>,
    last_name: Option<String>,
    #[serde(default)]
    email_addresses: Vec<ClerkEmail>,
    #[serde(default)]
    public_metadata: Value,
    #[serde(default)]
    private_metadata: Value,
}

#[derive(Debug, Deserialize)]
struct ClerkEmail {
    email_address: String,
}

impl ClerkUser {
    fn coin(&self) -> i64 {
        match &self.public_metadata["coin"] {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .unwrap_or(0)
    }

    fn ledger_keys(&self) -> Vec<String> {
        self.private_metadata[LEDGER_KEYS_FIELD]
            .as_array()
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| k.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn into_profile(self) -> UserProfile {
        let coin = self.coin();
        UserProfile {
            id: self.id,
            first_name: self.first_name,
            last_name: self.last_name,
            email_addresses: self
                .email_addresses
                .into_iter()
                .map(|e| e.email_address)
                .collect(),
            coin,
        }
    }
}

/// Coin balance stored as `public_metadata.coin` on Clerk users.
/// Writes are read-modify-write against an eventually consistent API; the
/// applied-key list makes a retried debit a no-op.
pub struct ClerkLedger {
    client: Client,
    base_url: String,
    secret_key: String,
}

impl ClerkLedger {
    pub fn new(base_url: &str, secret_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        }
    }

    async fn fetch_user(&self, user_id: &str) -> Result<ClerkUser, AuctionError> {
        let response = self
            .client
            .get(format!("{}/users/{}", self.base_url, user_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(AuctionError::External(format!("Unknown user {user_id}")));
        }
        Ok(response.error_for_status()?.json::<ClerkUser>().await?)
    }
}

#[async_trait]
impl CoinLedger for ClerkLedger {
    async fn user(&self, user_id: &str) -> Result<UserProfile, AuctionError> {
        Ok(self.fetch_user(user_id).await?.into_profile())
    }

    async fn debit(
        &self,
        user_id: &str,
        amount: i64,
        key: &str,
    ) -> Result<DebitOutcome, AuctionError> {
        let user = self.fetch_user(user_id).await?;
        let balance = user.coin();
        let mut keys = user.ledger_keys();
        if keys.iter().any(|k| k == key) {
            warn!(
                "{:<12} --> Debit {} already applied for {}",
                "Ledger", key, user_id
            );
            return Ok(DebitOutcome::AlreadyApplied { balance });
        }
        if balance < amount {
            return Ok(DebitOutcome::Insufficient { balance });
        }

        let new_balance = balance - amount;
        keys.push(key.to_string());
        let excess = keys.len().saturating_sub(MAX_LEDGER_KEYS);
        keys.drain(..excess);
        self.client
            .patch(format!("{}/users/{}/metadata", self.base_url, user_id))
            .bearer_auth(&self.secret_key)
            .json(&json!({
                "public_metadata": { "coin": new_balance },
                "private_metadata": { LEDGER_KEYS_FIELD: keys },
            }))
            .send()
            .await?
            .error_for_status()?;

        info!(
            "{:<12} --> Debited {} from {}, balance {}",
            "Ledger", amount, user_id, new_balance
        );
        Ok(DebitOutcome::Applied { new_balance })
    }
}
