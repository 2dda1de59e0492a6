//! Settlement scheduler.
//! One timer per open auction fires shortly after its end; a periodic sweep
//! catches auctions whose timer was lost and settlements that stalled midway.
// region:    --- Imports
use crate::auction::engine::AuctionEngine;
use crate::auction::model::Auction;
use crate::error::AuctionError;
use crate::settlement::SettlementOutcome;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
// endregion: --- Imports

struct Timer {
    generation: u64,
    handle: AbortHandle,
}

// region:    --- Settlement Scheduler
pub struct SettlementScheduler {
    engine: Arc<AuctionEngine>,
    timers: Mutex<HashMap<Uuid, Timer>>,
    generation: AtomicU64,
    grace: Duration,
    stale_after: chrono::Duration,
}

impl SettlementScheduler {
    pub fn new(engine: Arc<AuctionEngine>, grace: Duration, stale_after: chrono::Duration) -> Self {
        Self {
            engine,
            timers: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            grace,
            stale_after,
        }
    }

    /// Arms (or re-arms) the settlement timer for `auction`.
    pub fn schedule(self: &Arc<Self>, auction: &Auction) {
        if auction.settled {
            return;
        }
        let auction_id = auction.id;
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let delay = (auction.end_time - self.engine.now())
            .to_std()
            .unwrap_or(Duration::ZERO)
            + self.grace;

        // held across the spawn so a zero-delay timer finds its own entry
        let mut timers = self.lock_timers();
        let scheduler = Arc::clone(self);
        let task = tokio::spawn(async move {
            sleep(delay).await;
            // a timer that was replaced must not settle
            if !scheduler.release(auction_id, generation) {
                return;
            }
            let outcome = scheduler.engine.settle_auction(auction_id).await;
            debug!(
                "{:<12} --> Timer fired for {}: {}",
                "Scheduler",
                auction_id,
                outcome.message()
            );
        });

        let previous = timers.insert(
            auction_id,
            Timer {
                generation,
                handle: task.abort_handle(),
            },
        );
        drop(timers);
        if let Some(previous) = previous {
            previous.handle.abort();
        }
        debug!(
            "{:<12} --> Settlement of {} scheduled in {:?}",
            "Scheduler", auction_id, delay
        );
    }

    /// Disarms the timer for a deleted auction.
    pub fn cancel(&self, auction_id: Uuid) {
        if let Some(timer) = self.lock_timers().remove(&auction_id) {
            timer.handle.abort();
            debug!("{:<12} --> Timer cancelled for {}", "Scheduler", auction_id);
        }
    }

    pub fn pending_timers(&self) -> usize {
        self.lock_timers().len()
    }

    /// Re-arms timers for every unsettled auction, e.g. after a restart.
    pub async fn restore(self: &Arc<Self>) -> Result<usize, AuctionError> {
        let auctions = self.engine.unsettled_auctions().await?;
        for auction in &auctions {
            self.schedule(auction);
        }
        info!(
            "{:<12} --> Restored {} settlement timers",
            "Scheduler",
            auctions.len()
        );
        Ok(auctions.len())
    }

    /// Settles ended auctions and resumes stalled settlements.
    pub async fn sweep(&self) -> Vec<SettlementOutcome> {
        let mut outcomes = Vec::new();
        let now = self.engine.now();

        match self.engine.unsettled_auctions().await {
            Ok(auctions) => {
                for auction in auctions.into_iter().filter(|a| a.has_ended(now)) {
                    outcomes.push(self.engine.settle_auction(auction.id).await);
                }
            }
            Err(e) => error!(
                "{:<12} --> Could not list unsettled auctions: {}",
                "Scheduler", e
            ),
        }

        match self.engine.stalled_settlements(self.stale_after).await {
            Ok(stalled) => {
                for auction in stalled {
                    warn!(
                        "{:<12} --> Resuming stalled settlement {} at {}",
                        "Scheduler", auction.id, auction.settlement
                    );
                    outcomes.push(self.engine.resume_settlement(auction.id).await);
                }
            }
            Err(e) => error!(
                "{:<12} --> Could not list stalled settlements: {}",
                "Scheduler", e
            ),
        }
        outcomes
    }

    pub fn start_sweep(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let outcomes = scheduler.sweep().await;
                if !outcomes.is_empty() {
                    debug!(
                        "{:<12} --> Sweep handled {} auctions",
                        "Scheduler",
                        outcomes.len()
                    );
                }
            }
        })
    }

    /// Drops the timer entry if it still belongs to `generation`.
    fn release(&self, auction_id: Uuid, generation: u64) -> bool {
        let mut timers = self.lock_timers();
        match timers.get(&auction_id) {
            Some(timer) if timer.generation == generation => {
                timers.remove(&auction_id);
                true
            }
            _ => false,
        }
    }

    fn lock_timers(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Timer>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
// endregion: --- Settlement Scheduler
