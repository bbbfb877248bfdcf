use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
    response::Response,
};

use order_book_engine::{api::router, state::AppState};
use serde_json::{Value, json};
use tempfile::tempdir;
use tower::ServiceExt;

async fn test_app() -> (Router, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let state = AppState::new(dir.path()).unwrap();
    (router(state), dir)
}

async fn body_json(res: Response) -> Value {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn new_order(side: &str, order_type: &str, price: Option<i64>, qty: i64) -> Value {
    json!({
        "user_id": 1,
        "symbol": "BTC-USD",
        "side": side,
        "type": order_type,
        "price": price.map(|p| p.to_string()),
        "qty": qty.to_string(),
    })
}

#[tokio::test]
async fn create_book_then_place_order_rejects_unknown_symbol() {
    let (app, _tmp) = test_app().await;

    let res = app
        .oneshot(post("/orders", new_order("buy", "limit", Some(50), 1)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_symbol_in_path_is_bad_request() {
    let (app, _tmp) = test_app().await;

    let res = app
        .oneshot(post("/books/BTC!USD", json!({})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn creating_the_same_book_twice_is_conflict() {
    let (app, _tmp) = test_app().await;

    let res = app.clone().oneshot(post("/books/BTC-USD", json!({}))).await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = app.oneshot(post("/books/BTC-USD", json!({}))).await.unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn invalid_qty_string_is_bad_request() {
    let (app, _tmp) = test_app().await;
    app.clone().oneshot(post("/books/BTC-USD", json!({}))).await.unwrap();

    let mut body = new_order("buy", "limit", Some(50), 1);
    body["qty"] = json!("not-a-number");

    let res = app.oneshot(post("/orders", body)).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let v = body_json(res).await;
    assert!(v["error"].as_str().unwrap().contains("not a valid decimal"));
}

#[tokio::test]
async fn limit_order_rests_then_shows_up_in_the_book() {
    let (app, _tmp) = test_app().await;
    app.clone().oneshot(post("/books/BTC-USD", json!({}))).await.unwrap();

    let res = app
        .clone()
        .oneshot(post("/orders", new_order("buy", "limit", Some(48), 10)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let updated: Value = body_json(res).await;
    let order_id = updated[0]["id"].as_u64().unwrap();

    let res = app.clone().oneshot(get("/book/BTC-USD")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let snap = body_json(res).await;
    assert_eq!(snap["bids"][0][0], "48");

    let res = app
        .clone()
        .oneshot(delete(&format!("/orders/BTC-USD/{order_id}")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app.oneshot(get("/book/BTC-USD")).await.unwrap();
    let snap = body_json(res).await;
    assert!(snap["bids"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn crossing_orders_update_both_sides_and_match_event_is_consistent() {
    let (app, _tmp) = test_app().await;
    app.clone().oneshot(post("/books/BTC-USD", json!({}))).await.unwrap();

    app.clone()
        .oneshot(post("/orders", new_order("sell", "limit", Some(100), 10)))
        .await
        .unwrap();

    let res = app
        .clone()
        .oneshot(post("/orders", new_order("buy", "limit", Some(100), 10)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let updated: Value = body_json(res).await;
    assert_eq!(updated.as_array().unwrap().len(), 2);
    assert_eq!(updated[0]["status"], "filled");
    assert_eq!(updated[1]["status"], "filled");

    let res = app.oneshot(get("/book/BTC-USD")).await.unwrap();
    let snap = body_json(res).await;
    assert!(snap["bids"].as_array().unwrap().is_empty());
    assert!(snap["asks"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn market_order_with_no_liquidity_is_unprocessable() {
    let (app, _tmp) = test_app().await;
    app.clone().oneshot(post("/books/BTC-USD", json!({}))).await.unwrap();

    let res = app
        .oneshot(post("/orders", new_order("buy", "market", None, 5)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn get_orders_and_current_orders_reflect_fills() {
    let (app, _tmp) = test_app().await;
    app.clone().oneshot(post("/books/BTC-USD", json!({}))).await.unwrap();

    let mut resting = new_order("sell", "limit", Some(100), 10);
    resting["user_id"] = json!(7);
    app.clone().oneshot(post("/orders", resting)).await.unwrap();

    let mut taker = new_order("buy", "limit", Some(100), 10);
    taker["user_id"] = json!(8);
    app.clone().oneshot(post("/orders", taker)).await.unwrap();

    let res = app.clone().oneshot(get("/orders/7")).await.unwrap();
    let orders = body_json(res).await;
    assert_eq!(orders.as_array().unwrap().len(), 1);

    let res = app.oneshot(get("/orders/7/current")).await.unwrap();
    let current = body_json(res).await;
    assert!(current.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn deleting_a_book_cancels_resting_orders() {
    let (app, _tmp) = test_app().await;
    app.clone().oneshot(post("/books/BTC-USD", json!({}))).await.unwrap();

    let mut resting = new_order("buy", "limit", Some(90), 3);
    resting["user_id"] = json!(3);
    let res = app.clone().oneshot(post("/orders", resting)).await.unwrap();
    let updated: Value = body_json(res).await;
    let order_id = updated[0]["id"].as_u64().unwrap();

    let res = app.clone().oneshot(delete("/books/BTC-USD")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = app.oneshot(get("/orders/3")).await.unwrap();
    let orders = body_json(res).await;
    let order = orders
        .as_array()
        .unwrap()
        .iter()
        .find(|o| o["id"].as_u64() == Some(order_id))
        .unwrap();
    assert_eq!(order["status"], "canceled");
}
