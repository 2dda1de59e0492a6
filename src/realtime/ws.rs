// region:    --- Imports
use super::{RealtimeHub, Room};
use crate::auction::engine::AuctionEngine;
use crate::auction::events::AuctionEvent;
use crate::auction::model::AuctionDetails;
use crate::bidding::commands::PlaceBidRequest;
use crate::error::AuctionError;
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;
// endregion: --- Imports

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsParams {
    pub user_id: Option<String>,
}

/// Messages a client may send, as `{"event": .., "data": ..}`.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    JoinAuction(Uuid),
    LeaveAuction(Uuid),
    PlaceBid(PlaceBidRequest),
}

pub async fn handle_ws(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| session(socket, state, params.user_id))
}

/// Events waiting for one socket's writer.
const OUTBOX_CAPACITY: usize = 64;

type Outbox = mpsc::Sender<AuctionEvent>;

struct Session {
    state: AppState,
    user_id: Option<String>,
    outbox: Outbox,
    rooms: HashMap<Uuid, JoinHandle<()>>,
}

async fn session(socket: WebSocket, state: AppState, user_id: Option<String>) {
    let (mut sink, mut stream) = socket.split();
    let (outbox, mut inbox) = mpsc::channel::<AuctionEvent>(OUTBOX_CAPACITY);

    let writer = tokio::spawn(async move {
        while let Some(event) = inbox.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!("{:<12} --> Could not encode {}: {}", "WebSocket", event.name(), e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let personal = match &user_id {
        Some(user_id) => {
            let receiver = state.hub.subscribe(Room::User(user_id.clone())).await;
            Some(tokio::spawn(forward(receiver, outbox.clone())))
        }
        None => None,
    };
    info!("{:<12} --> Connected: user={:?}", "WebSocket", user_id);

    let mut session = Session {
        state,
        user_id,
        outbox,
        rooms: HashMap::new(),
    };

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => session.handle(&text).await,
            Message::Close(_) => break,
            _ => {}
        }
    }

    session.close().await;
    if let Some(personal) = personal {
        personal.abort();
    }
    writer.abort();
}

impl Session {
    async fn handle(&mut self, text: &str) {
        let message = match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                self.reject(None, "INVALID_INPUT", format!("Unreadable message: {e}"));
                return;
            }
        };
        debug!("{:<12} --> Received {:?}", "WebSocket", message);

        match message {
            ClientMessage::JoinAuction(auction_id) => self.join(auction_id).await,
            ClientMessage::LeaveAuction(auction_id) => self.leave(auction_id).await,
            ClientMessage::PlaceBid(mut request) => {
                if request.user_id.is_none() {
                    request.user_id = self.user_id.clone();
                }
                let auction_id = request.auction_id;
                // accepted bids reach this socket through the auction room
                if let Err(e) = self.state.engine.place_bid(request).await {
                    self.reject(auction_id, e.code(), e.to_string());
                }
            }
        }
    }

    async fn join(&mut self, auction_id: Uuid) {
        if self.rooms.contains_key(&auction_id) {
            return;
        }
        let (receiver, details) =
            match watch_auction(&self.state.engine, &self.state.hub, auction_id).await {
                Ok(watch) => watch,
                Err(e) => {
                    self.reject(Some(auction_id), e.code(), e.to_string());
                    return;
                }
            };
        deliver(
            &self.outbox,
            AuctionEvent::BidUpdate {
                auction: details.auction,
                bids: details.bids,
            },
        );
        self.rooms
            .insert(auction_id, tokio::spawn(forward(receiver, self.outbox.clone())));
    }

    async fn leave(&mut self, auction_id: Uuid) {
        if let Some(task) = self.rooms.remove(&auction_id) {
            task.abort();
            self.state.hub.leave_auction(auction_id).await;
        }
    }

    async fn close(mut self) {
        let joined: Vec<Uuid> = self.rooms.keys().copied().collect();
        for auction_id in joined {
            self.leave(auction_id).await;
        }
        info!("{:<12} --> Disconnected: user={:?}", "WebSocket", self.user_id);
    }

    fn reject(&self, auction_id: Option<Uuid>, code: &str, message: String) {
        deliver(
            &self.outbox,
            AuctionEvent::BidRejected {
                auction_id,
                code: code.to_string(),
                message,
            },
        );
    }
}

async fn forward(mut receiver: broadcast::Receiver<AuctionEvent>, outbox: Outbox) {
    loop {
        match receiver.recv().await {
            Ok(event) => {
                if !deliver(&outbox, event) {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("{:<12} --> Slow viewer skipped {} events", "WebSocket", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Joins the auction room, then loads the snapshot. Every bid is either in
/// the snapshot or still queued on the returned receiver.
pub async fn watch_auction(
    engine: &AuctionEngine,
    hub: &RealtimeHub,
    auction_id: Uuid,
) -> Result<(broadcast::Receiver<AuctionEvent>, AuctionDetails), AuctionError> {
    let receiver = hub.join_auction(auction_id).await;
    match engine.get_auction_details(auction_id).await {
        Ok(details) => Ok((receiver, details)),
        Err(e) => {
            drop(receiver);
            hub.leave_auction(auction_id).await;
            Err(e)
        }
    }
}

/// Queues `event` for the socket without waiting. A full outbox drops the
/// event; returns false once the socket is gone.
fn deliver(outbox: &Outbox, event: AuctionEvent) -> bool {
    match outbox.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(event)) => {
            warn!(
                "{:<12} --> Slow viewer, dropping {}",
                "WebSocket",
                event.name()
            );
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}
