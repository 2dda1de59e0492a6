// region:    --- Imports
use crate::auction::model::{CreateAuctionRequest, UpdateAuctionRequest};
use crate::bidding::commands::PlaceBidRequest;
use crate::error::AuctionError;
use crate::realtime::ws::handle_ws;
use crate::settlement::SettlementOutcome;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use uuid::Uuid;
// endregion: --- Imports

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/auction", get(handle_list_auctions))
        .route("/auction/create", post(handle_create_auction))
        .route("/auction/auction/:id", get(handle_get_auction))
        .route("/auction/update/:id", put(handle_update_auction))
        .route("/auction/delete/:id", delete(handle_delete_auction))
        .route("/auction/settle/:id", post(handle_settle_auction))
        .route("/bid", post(handle_bid))
        .route("/bid/:auction_id", get(handle_get_bids))
        .route("/ws", get(handle_ws))
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .with_state(state)
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AuctionError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AuctionError::InvalidInput(rejection.body_text()))
}

// region:    --- Auction Handlers

pub async fn handle_list_auctions(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AuctionError> {
    Ok(Json(state.engine.list_auctions().await?))
}

pub async fn handle_create_auction(
    State(state): State<AppState>,
    payload: Result<Json<CreateAuctionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AuctionError> {
    let auction = state.engine.create_auction(body(payload)?).await?;
    state.scheduler.schedule(&auction);
    Ok((StatusCode::CREATED, Json(auction)))
}

pub async fn handle_get_auction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AuctionError> {
    Ok(Json(state.engine.get_auction_details(id).await?))
}

pub async fn handle_update_auction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateAuctionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AuctionError> {
    let auction = state.engine.update_auction(id, body(payload)?).await?;
    state.scheduler.schedule(&auction);
    Ok(Json(auction))
}

pub async fn handle_delete_auction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AuctionError> {
    state.engine.delete_auction(id).await?;
    state.scheduler.cancel(id);
    Ok(Json(json!({ "message": "Auction deleted", "id": id })))
}

/// Admin trigger; the outcome is reported in the body, not as an error.
pub async fn handle_settle_auction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    info!("{:<12} --> Manual settlement of {}", "Handler", id);
    let outcome = state.engine.settle_auction(id).await;
    let status = match outcome {
        SettlementOutcome::NotFound { .. } => StatusCode::NOT_FOUND,
        SettlementOutcome::Failed { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::OK,
    };
    (
        status,
        Json(json!({
            "success": outcome.success(),
            "message": outcome.message(),
            "outcome": outcome,
        })),
    )
}

// endregion: --- Auction Handlers

// region:    --- Bid Handlers

pub async fn handle_bid(
    State(state): State<AppState>,
    payload: Result<Json<PlaceBidRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AuctionError> {
    let receipt = state.engine.place_bid(body(payload)?).await?;
    Ok(Json(json!({
        "message": "Bid placed",
        "current_price": receipt.auction.current_price,
        "bid": receipt.bid,
        "auction": receipt.auction,
    })))
}

pub async fn handle_get_bids(
    State(state): State<AppState>,
    Path(auction_id): Path<Uuid>,
) -> Result<impl IntoResponse, AuctionError> {
    Ok(Json(state.engine.auction_bids(auction_id).await?))
}

// endregion: --- Bid Handlers
