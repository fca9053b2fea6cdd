//! A full game played over the HTTP API.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::ServiceExt;

use scorekeeper::api::build_router;
use scorekeeper::engine::session::{GameDefaults, Session};

use crate::flaky_store::FlakyStore;

fn router_with(store: FlakyStore) -> Router {
    let session = Session::open(Box::new(store), GameDefaults::default()).unwrap();
    build_router(Arc::new(Mutex::new(session)))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            req = req.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn join(app: &Router, name: &str) -> String {
    let body = json!({ "name": name });
    let (status, json) = call(app, Method::POST, "/api/players", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    json["event"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_game_over_http() {
    let app = router_with(FlakyStore::new());
    let alice = join(&app, "Alice").await;
    let bob = join(&app, "Bob").await;

    // Bets and a dealer sweep.
    let (status, _) = call(
        &app,
        Method::PUT,
        &format!("/api/players/{alice}/bet"),
        Some(json!({ "amount": 30 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(
        &app,
        Method::PUT,
        &format!("/api/players/{bob}/bet"),
        Some(json!({ "amount": 20 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, json) = call(&app, Method::POST, "/api/settle/dealer", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Dealer won 50 points from Alice, Bob");
    assert_eq!(json["state"]["dealer"]["points"], 1050);

    // Bob borrows from the dealer at the default terms.
    let (status, json) = call(
        &app,
        Method::POST,
        "/api/loans",
        Some(json!({ "lender": "dealer", "borrower": bob })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["event"]["loan"]["id"], 1);
    assert_eq!(json["event"]["loan"]["due_round"], 5);

    let (_, loans) = call(&app, Method::GET, "/api/loans/active", None).await;
    assert_eq!(loans[0]["borrower_name"], "Bob");
    assert_eq!(loans[0]["repayment_total"], 55);
    assert_eq!(loans[0]["status"], "active");

    // Bob cannot leave while the loan is open.
    let (status, json) = call(&app, Method::DELETE, &format!("/api/players/{bob}"), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"].as_str().unwrap().contains("Bob still has active loans"));

    let (status, json) = call(&app, Method::POST, "/api/loans/1/repay", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Loan has been repaid (55 points)");

    let (status, _) = call(&app, Method::DELETE, &format!("/api/players/{bob}"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, paid) = call(&app, Method::GET, "/api/loans/paid", None).await;
    assert_eq!(paid[0]["borrower_name"], "Unknown");
    assert_eq!(paid[0]["status"], "paid");

    let (_, state) = call(&app, Method::GET, "/api/state", None).await;
    assert_eq!(state["players"].as_array().unwrap().len(), 1);
    assert_eq!(state["history"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_rounds_over_http() {
    let app = router_with(FlakyStore::new());
    let alice = join(&app, "Alice").await;
    call(
        &app,
        Method::POST,
        "/api/loans",
        Some(json!({ "lender": "dealer", "borrower": alice, "amount": 20, "duration_rounds": 1 })),
    )
    .await;

    let (status, json) = call(&app, Method::POST, "/api/rounds/advance", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Round 1 started; 1 loan(s) automatically repaid");
    assert_eq!(json["event"]["report"]["auto_repaid"], json!([1]));
    assert_eq!(json["state"]["round"], 1);

    let (status, json) = call(&app, Method::POST, "/api/game/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"]["round"], 0);
    assert_eq!(json["state"]["players"], json!([]));
}

#[tokio::test]
async fn test_bad_requests() {
    let app = router_with(FlakyStore::new());
    let alice = join(&app, "Alice").await;

    let (status, json) = call(
        &app,
        Method::PUT,
        &format!("/api/players/{alice}/bet"),
        Some(json!({ "amount": 500 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"], "Cannot bet more than available points");

    let body = json!({ "winner": "ghost" });
    let (status, _) = call(&app, Method::POST, "/api/settle/winner", Some(body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/loans",
        Some(json!({ "lender": "dealer", "borrower": alice, "interest_rate": -5 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, json) = call(&app, Method::GET, "/api/loans/quote?amount=0", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"], "Loan amount must be positive");

    let uri = "/api/loans/quote?amount=100&interest_rate=1001";
    let (status, _) = call(&app, Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_storage_failure_is_500() {
    let store = FlakyStore::new();
    let app = router_with(store.clone());

    store.set_error("disk full");
    let body = json!({ "name": "Alice" });
    let (status, json) = call(&app, Method::POST, "/api/players", Some(body)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Storage error: disk full");

    store.clear_error();
    let (_, state) = call(&app, Method::GET, "/api/state", None).await;
    assert_eq!(state["players"], json!([]));
}
