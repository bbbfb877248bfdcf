//! HTTP + WebSocket transport: a thin translation layer over [`Exchange`].
//! No matching or persistence logic lives here — every handler parses its
//! request, calls one `Exchange` method, and maps the result to a
//! response.

use serde::{
    Deserialize, Serialize,
    de::DeserializeOwned,
};
use serde_json::json;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, warn};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        FromRequest, Path, Request, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};

use crate::errors::EngineError;
use crate::exchange::MatchEvent;
use crate::order::{Order, OrderKind};
use crate::orderbook::BookSnapshot;
use crate::state::AppState;
use crate::symbol::Symbol;

type ApiErr = (StatusCode, Json<serde_json::Value>);

fn err(status: StatusCode, msg: impl Into<String>) -> ApiErr {
    (status, Json(json!({ "error": msg.into() })))
}

/// Maps the core's error taxonomy (§7) onto HTTP status codes. The
/// mapping is purely a transport concern — the taxonomy itself is fixed.
fn engine_err(e: EngineError) -> ApiErr {
    let status = match e {
        EngineError::BookNotFound => StatusCode::NOT_FOUND,
        EngineError::BookAlreadyExists => StatusCode::CONFLICT,
        EngineError::OrderNotFound => StatusCode::NOT_FOUND,
        EngineError::LimitNotFound => StatusCode::NOT_FOUND,
        EngineError::InvalidNumber(_) => StatusCode::BAD_REQUEST,
        EngineError::InsufficientLiquidity => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::StoreFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    err(status, e.to_string())
}

fn bad_symbol(raw: &str) -> ApiErr {
    err(StatusCode::BAD_REQUEST, format!("unsupported symbol `{raw}`"))
}

/// Deserializes the request body as JSON, logging a warning with a
/// truncated body preview on failure rather than silently 422'ing.
pub struct LoggedJson<T>(pub T);

impl<S, T> FromRequest<S> for LoggedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiErr;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| err(StatusCode::BAD_REQUEST, e.to_string()))?;

        match serde_json::from_slice::<T>(&bytes) {
            Ok(val) => Ok(LoggedJson(val)),
            Err(e) => {
                let preview = String::from_utf8_lossy(&bytes);
                let preview = &preview[..preview.len().min(4096)];
                warn!(
                    error = %e,
                    %method,
                    %uri,
                    body_preview = %preview,
                    "request rejected: JSON deserialization failed"
                );
                Err(err(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Side {
    Buy,
    Sell,
}

impl Side {
    fn is_bid(self) -> bool {
        matches!(self, Side::Buy)
    }
}

/// Request payload for `POST /orders`.
#[derive(Deserialize)]
pub struct NewOrder {
    pub user_id: u64,
    pub symbol: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub kind: OrderKind,
    /// Canonical-decimal string. Required for `limit`, ignored for `market`.
    pub price: Option<String>,
    /// Canonical-decimal string.
    pub qty: String,
}

/// A websocket message: either a book snapshot or a match event,
/// internally tagged so clients can dispatch on `"type"`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsFrame {
    BookSnapshot(BookSnapshot),
    Match(MatchEvent),
}

fn parse_symbol(raw: &str) -> Result<Symbol, ApiErr> {
    Symbol::new(raw).map_err(|_| bad_symbol(raw))
}

/// `POST /books/{symbol}` — `CreateOrderBook`.
pub async fn create_order_book(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<StatusCode, ApiErr> {
    let symbol = parse_symbol(&symbol)?;
    state
        .exchange
        .add_order_book(symbol)
        .await
        .map(|_| StatusCode::CREATED)
        .map_err(engine_err)
}

/// `DELETE /books/{symbol}` — `DeleteOrderBook`.
pub async fn delete_order_book(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<StatusCode, ApiErr> {
    let symbol = parse_symbol(&symbol)?;
    state
        .exchange
        .delete_order_book(&symbol)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(engine_err)
}

/// `GET /book/{symbol}` — a snapshot of the current best-bid/best-ask
/// levels. Not part of §6.2's logical surface; exposed because a matching
/// engine with no way to see the book is unusable over HTTP.
pub async fn get_book(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<BookSnapshot>, ApiErr> {
    let symbol = parse_symbol(&symbol)?;
    state
        .exchange
        .get_book_snapshot(&symbol)
        .await
        .map(Json)
        .map_err(engine_err)
}

/// `POST /orders` — `PlaceOrder`.
pub async fn place_order(
    State(state): State<AppState>,
    LoggedJson(payload): LoggedJson<NewOrder>,
) -> Result<Json<Vec<Order>>, ApiErr> {
    let symbol = parse_symbol(&payload.symbol)?;
    let updated = state
        .exchange
        .place_order(
            payload.user_id,
            payload.side.is_bid(),
            symbol,
            payload.kind,
            payload.price.as_deref(),
            &payload.qty,
        )
        .await
        .map_err(engine_err)?;
    Ok(Json(updated))
}

/// `DELETE /orders/{symbol}/{id}` — `CancelOrder`.
pub async fn cancel_order(
    State(state): State<AppState>,
    Path((symbol, id)): Path<(String, u64)>,
) -> Result<Json<Order>, ApiErr> {
    let symbol = parse_symbol(&symbol)?;
    let updated = state
        .exchange
        .cancel_order(&symbol, id)
        .await
        .map_err(engine_err)?;
    info!(order_id = id, "order cancelled");
    Ok(Json(updated))
}

/// `GET /orders/{userId}/current` — `GetCurrentOrders`.
pub async fn get_current_orders(
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
) -> Result<Json<Vec<Order>>, ApiErr> {
    state
        .exchange
        .get_current_orders(user_id)
        .await
        .map(Json)
        .map_err(engine_err)
}

/// `GET /orders/{userId}` — `GetOrders`.
pub async fn get_orders(
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
) -> Result<Json<Vec<Order>>, ApiErr> {
    state
        .exchange
        .get_orders(user_id)
        .await
        .map(Json)
        .map_err(engine_err)
}

/// `GET /ws/{symbol}` — upgrades to a WebSocket and streams book
/// snapshots plus match events for that symbol.
pub async fn ws_handler(
    Path(symbol): Path<String>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiErr> {
    let symbol = parse_symbol(&symbol)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, symbol)))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, symbol: Symbol) {
    let mut match_rx = state.exchange.subscribe_matches();
    let mut book_rx = state.exchange.subscribe_book_updates();

    let initial = match state.exchange.get_book_snapshot(&symbol).await {
        Ok(snapshot) => snapshot,
        Err(_) => return,
    };
    if let Err(e) = socket
        .send(Message::Text(
            serde_json::to_string(&WsFrame::BookSnapshot(initial))
                .expect("snapshot serializes")
                .into(),
        ))
        .await
    {
        error!("failed to send initial snapshot: {e:?}");
        return;
    }

    loop {
        tokio::select! {
            Ok(event) = match_rx.recv() => {
                if event.symbol != symbol {
                    continue;
                }
                if let Err(e) = socket
                    .send(Message::Text(
                        serde_json::to_string(&WsFrame::Match(event)).expect("match serializes").into(),
                    ))
                    .await
                {
                    error!("websocket send (match) failed: {e:?}");
                    break;
                }
            }
            Ok(updated_symbol) = book_rx.recv() => {
                if updated_symbol != symbol {
                    continue;
                }
                let Ok(snapshot) = state.exchange.get_book_snapshot(&symbol).await else {
                    break;
                };
                if let Err(e) = socket
                    .send(Message::Text(
                        serde_json::to_string(&WsFrame::BookSnapshot(snapshot)).expect("snapshot serializes").into(),
                    ))
                    .await
                {
                    error!("websocket send (snapshot) failed: {e:?}");
                    break;
                }
            }
            else => break,
        }
    }
}

/// Builds the application `Router` with every route wired to `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(place_order))
        .route("/orders/{symbol}/{id}", delete(cancel_order))
        .route("/orders/{user_id}/current", get(get_current_orders))
        .route("/orders/{user_id}", get(get_orders))
        .route(
            "/books/{symbol}",
            post(create_order_book).delete(delete_order_book),
        )
        .route("/book/{symbol}", get(get_book))
        .route("/ws/{symbol}", get(ws_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .include_headers(false)
                        .level(tracing::Level::INFO),
                )
                .on_response(DefaultOnResponse::new().level(tracing::Level::INFO)),
        )
        .with_state(state)
}
