// region:    --- Imports
use super::{FanOut, Room};
use crate::auction::events::AuctionEvent;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};
use uuid::Uuid;
// endregion: --- Imports

const ROOM_CAPACITY: usize = 256;

/// In-process rooms backed by broadcast channels. One hub per service
/// instance, handed to whoever needs it.
#[derive(Default)]
pub struct RealtimeHub {
    state: Mutex<HubState>,
}

#[derive(Default)]
struct HubState {
    rooms: HashMap<Room, broadcast::Sender<AuctionEvent>>,
    viewers: HashMap<Uuid, usize>,
}

impl HubState {
    /// Returns the room's sender, creating it. Rooms whose receivers are all
    /// gone are dropped first.
    fn sender(&mut self, room: Room) -> &broadcast::Sender<AuctionEvent> {
        self.rooms.retain(|_, sender| sender.receiver_count() > 0);
        self.rooms
            .entry(room)
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
    }

    fn send(&mut self, room: &Room, event: AuctionEvent) {
        if let Some(sender) = self.rooms.get(room) {
            if sender.send(event).is_err() {
                debug!("{:<12} --> Room {} has no listeners, dropping", "Realtime", room);
                self.rooms.remove(room);
            }
        }
    }
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, room: Room) -> broadcast::Receiver<AuctionEvent> {
        self.state.lock().await.sender(room).subscribe()
    }

    /// Subscribes a viewer to an auction room and announces the new count.
    pub async fn join_auction(&self, auction_id: Uuid) -> broadcast::Receiver<AuctionEvent> {
        let mut state = self.state.lock().await;
        let receiver = state.sender(Room::Auction(auction_id)).subscribe();
        let viewers = {
            let count = state.viewers.entry(auction_id).or_insert(0);
            *count += 1;
            *count
        };
        info!(
            "{:<12} --> Viewer joined auction {} ({} watching)",
            "Realtime", auction_id, viewers
        );
        state.send(
            &Room::Auction(auction_id),
            AuctionEvent::ViewerCount {
                auction_id,
                viewers,
            },
        );
        receiver
    }

    pub async fn leave_auction(&self, auction_id: Uuid) {
        let mut state = self.state.lock().await;
        let viewers = match state.viewers.get_mut(&auction_id) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => return,
        };
        if viewers == 0 {
            state.viewers.remove(&auction_id);
        }
        state.send(
            &Room::Auction(auction_id),
            AuctionEvent::ViewerCount {
                auction_id,
                viewers,
            },
        );
    }

    pub async fn open_rooms(&self) -> usize {
        self.state.lock().await.rooms.len()
    }

    pub async fn viewers(&self, auction_id: Uuid) -> usize {
        self.state
            .lock()
            .await
            .viewers
            .get(&auction_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl FanOut for RealtimeHub {
    async fn publish(&self, room: &Room, event: &AuctionEvent) {
        debug!("{:<12} --> {} -> {}", "Realtime", event.name(), room);
        self.state.lock().await.send(room, event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rooms_are_isolated() {
        let hub = RealtimeHub::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut in_a = hub.subscribe(Room::Auction(a)).await;
        let mut in_b = hub.subscribe(Room::Auction(b)).await;

        let event = AuctionEvent::ViewerCount {
            auction_id: a,
            viewers: 9,
        };
        hub.publish(&Room::Auction(a), &event).await;

        assert_eq!(in_a.recv().await.unwrap(), event);
        assert!(in_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn viewer_count_tracks_joins_and_leaves() {
        let hub = RealtimeHub::new();
        let id = Uuid::new_v4();
        let mut first = hub.join_auction(id).await;
        let _second = hub.join_auction(id).await;
        assert_eq!(hub.viewers(id).await, 2);

        hub.leave_auction(id).await;
        assert_eq!(hub.viewers(id).await, 1);

        let counts: Vec<usize> = std::iter::from_fn(|| first.try_recv().ok())
            .filter_map(|e| match e {
                AuctionEvent::ViewerCount { viewers, .. } => Some(viewers),
                _ => None,
            })
            .collect();
        assert_eq!(counts, vec![1, 2, 1]);
    }

    #[tokio::test]
    async fn abandoned_rooms_are_dropped() {
        let hub = RealtimeHub::new();
        for user in 0..10 {
            let receiver = hub.subscribe(Room::User(format!("user_{user}"))).await;
            drop(receiver);
        }
        let _live = hub.subscribe(Room::User("live".to_string())).await;
        assert_eq!(hub.open_rooms().await, 1);

        let id = Uuid::new_v4();
        let viewer = hub.join_auction(id).await;
        drop(viewer);
        hub.leave_auction(id).await;
        assert_eq!(hub.open_rooms().await, 1);
        assert_eq!(hub.viewers(id).await, 0);
    }

    #[tokio::test]
    async fn publishing_to_an_empty_room_is_harmless() {
        let hub = RealtimeHub::new();
        hub.publish(
            &Room::User("nobody".to_string()),
            &AuctionEvent::ViewerCount {
                auction_id: Uuid::nil(),
                viewers: 0,
            },
        )
        .await;
    }
}
