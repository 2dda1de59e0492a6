//! Real-time fan-out of auction events.
//! Rooms are keyed by auction id (viewers) or user id (personal notices).
// region:    --- Imports
use crate::auction::events::AuctionEvent;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;
// endregion: --- Imports

// region:    --- Modules
pub mod hub;
pub mod view;
pub mod ws;

pub use hub::RealtimeHub;
pub use view::BidBoard;
// endregion: --- Modules

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Room {
    Auction(Uuid),
    User(String),
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::Auction(id) => write!(f, "auction:{id}"),
            Room::User(id) => write!(f, "user:{id}"),
        }
    }
}

/// Best-effort publisher. Delivery failures are logged by implementations,
/// never surfaced to the engine.
#[async_trait]
pub trait FanOut: Send + Sync {
    async fn publish(&self, room: &Room, event: &AuctionEvent);
}

/// Publishes every event to each of its targets in order.
#[derive(Default)]
pub struct FanOutGroup {
    targets: Vec<Arc<dyn FanOut>>,
}

impl FanOutGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, target: Arc<dyn FanOut>) -> Self {
        self.targets.push(target);
        self
    }
}

#[async_trait]
impl FanOut for FanOutGroup {
    async fn publish(&self, room: &Room, event: &AuctionEvent) {
        for target in &self.targets {
            target.publish(room, event).await;
        }
    }
}

/// Moves a slow target off the publishing path. Events queue in a bounded
/// channel drained in order by one task; a full queue drops the event.
pub struct BackgroundFanOut {
    queue: mpsc::Sender<(Room, AuctionEvent)>,
    drain: JoinHandle<()>,
}

impl BackgroundFanOut {
    pub fn spawn(target: Arc<dyn FanOut>, capacity: usize) -> Self {
        let (queue, mut pending) = mpsc::channel::<(Room, AuctionEvent)>(capacity);
        let drain = tokio::spawn(async move {
            while let Some((room, event)) = pending.recv().await {
                target.publish(&room, &event).await;
            }
        });
        Self { queue, drain }
    }
}

impl Drop for BackgroundFanOut {
    fn drop(&mut self) {
        self.drain.abort();
    }
}

#[async_trait]
impl FanOut for BackgroundFanOut {
    async fn publish(&self, room: &Room, event: &AuctionEvent) {
        match self.queue.try_send((room.clone(), event.clone())) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!(
                "{:<12} --> Mirror queue full, dropping {} for {}",
                "Realtime",
                event.name(),
                room
            ),
            Err(TrySendError::Closed(_)) => warn!(
                "{:<12} --> Mirror stopped, dropping {} for {}",
                "Realtime",
                event.name(),
                room
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::{Mutex, Notify};

    /// Blocks every publish until released, then records it.
    #[derive(Default)]
    struct Gate {
        open: Notify,
        seen: Mutex<Vec<Room>>,
    }

    #[async_trait]
    impl FanOut for Gate {
        async fn publish(&self, room: &Room, _event: &AuctionEvent) {
            self.open.notified().await;
            self.seen.lock().await.push(room.clone());
        }
    }

    fn event() -> AuctionEvent {
        AuctionEvent::ViewerCount {
            auction_id: Uuid::nil(),
            viewers: 1,
        }
    }

    #[tokio::test]
    async fn background_target_does_not_block_publishers() {
        let gate = Arc::new(Gate::default());
        let group = FanOutGroup::new().with(Arc::new(BackgroundFanOut::spawn(gate.clone(), 8)));

        let rooms = [Room::User("a".to_string()), Room::User("b".to_string())];
        for room in &rooms {
            tokio::time::timeout(Duration::from_secs(1), group.publish(room, &event()))
                .await
                .unwrap();
        }
        assert!(gate.seen.lock().await.is_empty());

        for _ in &rooms {
            gate.open.notify_one();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(*gate.seen.lock().await, rooms.to_vec());
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_waiting() {
        let gate = Arc::new(Gate::default());
        let background = BackgroundFanOut::spawn(gate.clone(), 1);
        let room = Room::User("a".to_string());
        for _ in 0..5 {
            tokio::time::timeout(Duration::from_secs(1), background.publish(&room, &event()))
                .await
                .unwrap();
        }
    }
}
