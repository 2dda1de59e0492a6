mod common;

use chrono::Duration;
use common::{Harness, LISTED};
use market_auction_service::handlers;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;

async fn serve(h: &Harness) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = handlers::router(h.app_state());
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .await
            .unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_auction_flow_over_http() {
    let h = Harness::new().await;
    h.ledger.set_balance("bidder_1", 1_000).await;
    let base = serve(&h).await;
    let client = Client::new();
    let item_id = h.list_item().await;
    let start = h.engine.now() + Duration::minutes(6);

    // create
    let response = client
        .post(format!("{base}/auction/create"))
        .json(&json!({
            "itemId": item_id,
            "statusId": LISTED,
            "startPrice": 100,
            "startTime": start.to_rfc3339(),
            "endTime": (start + Duration::minutes(10)).to_rfc3339(),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Value = response.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["currentPrice"], 100);

    let list: Value = client
        .get(format!("{base}/auction"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["bidCount"], 0);

    // bid before start
    let bid = |amount: i64| json!({ "auctionId": id, "userId": "bidder_1", "amount": amount });
    let response = client
        .post(format!("{base}/bid"))
        .json(&bid(150))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "AUCTION_NOT_ACTIVE");
    assert_eq!(body["error"], "Auction is not active");

    h.clock.advance(Duration::minutes(7));
    let response = client
        .post(format!("{base}/bid"))
        .json(&bid(150))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["current_price"], 150);

    let response = client
        .post(format!("{base}/bid"))
        .json(&bid(120))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "BID_TOO_LOW");
    assert_eq!(body["current_price"], 150);

    let bids: Value = client
        .get(format!("{base}/bid/{id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(bids.as_array().unwrap().len(), 1);
    assert_eq!(bids[0]["userId"], "bidder_1");

    // settle too early, then for real
    let body: Value = client
        .post(format!("{base}/auction/settle/{id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["outcome"]["status"], "notEnded");

    h.clock.advance(Duration::minutes(10));
    let details: Value = client
        .get(format!("{base}/auction/auction/{id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(details["phase"], "ENDED_UNSETTLED");
    assert_eq!(details["settled"], false);

    let body: Value = client
        .post(format!("{base}/auction/settle/{id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["outcome"]["status"], "sold");
    assert_eq!(body["outcome"]["winnerId"], "bidder_1");
    assert_eq!(h.ledger.balance("bidder_1").await, Some(850));

    // delete
    let response = client
        .delete(format!("{base}/auction/delete/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = client
        .get(format!("{base}/auction/auction/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_malformed_requests_are_rejected() {
    let h = Harness::new().await;
    let base = serve(&h).await;
    let client = Client::new();

    let response = client
        .post(format!("{base}/bid"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_INPUT");

    let response = client
        .post(format!("{base}/bid"))
        .json(&json!({ "auctionId": uuid::Uuid::new_v4(), "userId": "u" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(format!("{base}/auction/create"))
        .json(&json!({ "itemId": "missing" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(format!("{base}/bid"))
        .json(&json!({ "auctionId": uuid::Uuid::new_v4(), "userId": "u", "amount": 10 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_over_http() {
    let h = Harness::new().await;
    let base = serve(&h).await;
    let client = Client::new();
    let auction = h
        .create_auction(Duration::minutes(6), Duration::minutes(10), 10)
        .await;

    let new_end = auction.end_time + Duration::hours(1);
    let response = client
        .put(format!("{base}/auction/update/{}", auction.id))
        .json(&json!({ "endTime": new_end.to_rfc3339() }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], auction.id.to_string());

    let stored = h.engine.get_auction_details(auction.id).await.unwrap();
    assert_eq!(stored.auction.end_time, new_end);

    h.clock.advance(Duration::minutes(7));
    let response = client
        .put(format!("{base}/auction/update/{}", auction.id))
        .json(&json!({ "minBidIncrement": 3 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
