//! The exchange registry: the process-wide symbol -> book map, plus the
//! join point between the matching core and the external store.
//!
//! No matching logic lives here — `OrderBook` owns that. This module owns
//! dispatch (symbol -> book), order-id assignment via the store, and the
//! sequencing §7 demands around a fill: run the match against a staged
//! copy of the opposite side, try to persist it, and only make the fill
//! live once the store confirms it. A store failure, or a market order
//! that still has quantity left over, simply discards the staged fill.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::decimal::parse_decimal;
use crate::errors::EngineError;
use crate::order::{Order, OrderKind};
use crate::orderbook::{BookSnapshot, OrderBook};
use crate::store::{AddMatchesRequest, MatchLeg, Store};
use crate::symbol::Symbol;

/// A fill event broadcast to `GET /ws/{symbol}` subscribers, mirroring
/// what `addMatches` just persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchEvent {
    pub symbol: Symbol,
    pub taker_order_id: u64,
    pub matches: Vec<crate::order::Match>,
}

/// Owns every symbol's book and the handle to the external store.
pub struct Exchange {
    books: RwLock<HashMap<Symbol, Arc<OrderBook>>>,
    store: Mutex<Store>,
    match_tx: broadcast::Sender<MatchEvent>,
    book_tx: broadcast::Sender<Symbol>,
}

impl Exchange {
    pub fn open(store_path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let store = Store::open(store_path).map_err(|e| EngineError::StoreFailure(e.to_string()))?;
        let (match_tx, _) = broadcast::channel(1024);
        let (book_tx, _) = broadcast::channel(1024);
        Ok(Self {
            books: RwLock::new(HashMap::new()),
            store: Mutex::new(store),
            match_tx,
            book_tx,
        })
    }

    pub fn subscribe_matches(&self) -> broadcast::Receiver<MatchEvent> {
        self.match_tx.subscribe()
    }

    pub fn subscribe_book_updates(&self) -> broadcast::Receiver<Symbol> {
        self.book_tx.subscribe()
    }

    fn publish_match(&self, event: MatchEvent) {
        let _ = self.match_tx.send(event);
    }

    fn publish_book_update(&self, symbol: Symbol) {
        let _ = self.book_tx.send(symbol);
    }

    async fn book(&self, symbol: &Symbol) -> Result<Arc<OrderBook>, EngineError> {
        self.books
            .read()
            .await
            .get(symbol)
            .cloned()
            .ok_or(EngineError::BookNotFound)
    }

    pub async fn add_order_book(&self, symbol: Symbol) -> Result<(), EngineError> {
        let mut books = self.books.write().await;
        if books.contains_key(&symbol) {
            return Err(EngineError::BookAlreadyExists);
        }
        books.insert(symbol, Arc::new(OrderBook::new()));
        Ok(())
    }

    /// §9 Open Question 1, resolved: cancels every resting order on the
    /// book (notifying the store) before the book is dropped, rather than
    /// orphaning them.
    pub async fn delete_order_book(&self, symbol: &Symbol) -> Result<(), EngineError> {
        let book = {
            let mut books = self.books.write().await;
            books.remove(symbol).ok_or(EngineError::BookNotFound)?
        };
        let orphaned = book.drain_all().await;
        let mut store = self.store.lock().await;
        for order in orphaned {
            store.set_status_canceled(order.id)?;
        }
        Ok(())
    }

    /// Parses `price`/`qty`, assigns an id via the store, runs the fill
    /// pass, persists whatever it produced, and — for a limit order with
    /// quantity left over — rests the remainder. Returns the taker first,
    /// counterparties after, exactly as the store reports them back.
    ///
    /// `price` is ignored for `Market` orders and required for `Limit`.
    pub async fn place_order(
        &self,
        user_id: u64,
        is_bid: bool,
        symbol: Symbol,
        kind: OrderKind,
        price: Option<&str>,
        qty: &str,
    ) -> Result<Vec<Order>, EngineError> {
        let book = self.book(&symbol).await?;

        let price: Option<Decimal> = match kind {
            OrderKind::Limit => Some(parse_decimal(price.ok_or_else(|| {
                EngineError::InvalidNumber("limit order requires a price".to_string())
            })?)?),
            OrderKind::Market => None,
        };
        let qty: Decimal = parse_decimal(qty)?;

        let mut order = {
            let mut store = self.store.lock().await;
            store.create_order(user_id, is_bid, &symbol, kind, price, qty)?
        };

        // §4.3.1 step 1: a limit order that plainly doesn't cross skips the
        // fill path (and its opposite-side write lock) entirely, under a
        // cheap opposite-side read lock. This is an optimization only: if
        // the opposite side changes between this probe and a future call,
        // the match loop's own per-level price check (stage_fill) is what's
        // actually load-bearing, not this probe (§9).
        if kind == OrderKind::Limit {
            let price = order.price.expect("limit order carries a price");
            if !book.probe_crosses(order.is_bid, price).await {
                book.rest_limit_order(order.clone()).await;
                self.publish_book_update(symbol);
                return Ok(vec![order]);
            }
        }

        // The staged fill holds the opposite side's write lock from here
        // until it is either committed or dropped — nothing else can
        // observe the intermediate drained state in between (see
        // `StagedFill`'s docs), so no separate gate is needed to serialize
        // concurrent fills against this book.
        let staged = book.stage_fill(&mut order).await;

        if staged.matches.is_empty() {
            drop(staged);
            return match kind {
                OrderKind::Market => Err(EngineError::InsufficientLiquidity),
                OrderKind::Limit => {
                    book.rest_limit_order(order.clone()).await;
                    self.publish_book_update(symbol);
                    Ok(vec![order])
                }
            };
        }

        // §4.3.2 / §9 Open Question 3, resolved: a market order that still
        // has quantity left after the fill pass is rejected outright — no
        // matches are persisted and no resting liquidity is touched. The
        // staged fill is simply dropped here, which releases the opposite
        // side's lock having changed nothing.
        if kind == OrderKind::Market && !order.qty.is_zero() {
            drop(staged);
            return Err(EngineError::InsufficientLiquidity);
        }

        let legs = staged
            .matches
            .iter()
            .map(|m| MatchLeg {
                counter_order_id: m.counter_order_id,
                counter_order_size_filled: m.counter_order_size_filled,
                qty: m.qty,
                price: m.price,
            })
            .collect();

        let store_result = {
            let mut store = self.store.lock().await;
            store.add_matches(AddMatchesRequest {
                taker_order_id: order.id,
                taker_size_filled: order.size_filled,
                legs,
            })
        };

        let updated = match store_result {
            Ok(updated) => updated,
            Err(e) => {
                // §7: the store is the arbiter. The staged fill is dropped
                // without committing, so the book never diverges from what
                // was actually persisted — no rollback needed, because
                // nothing was ever made live.
                drop(staged);
                return Err(e.into());
            }
        };

        let matches = staged.matches.clone();
        staged.commit();

        if kind == OrderKind::Limit && !order.qty.is_zero() {
            book.rest_limit_order(order.clone()).await;
        }

        self.publish_match(MatchEvent {
            symbol: symbol.clone(),
            taker_order_id: order.id,
            matches,
        });
        self.publish_book_update(symbol);

        Ok(updated)
    }

    pub async fn cancel_order(&self, symbol: &Symbol, order_id: u64) -> Result<Order, EngineError> {
        let order = {
            let store = self.store.lock().await;
            store.get_order_by_id(order_id)?
        };
        if order.symbol != *symbol {
            return Err(EngineError::OrderNotFound);
        }
        let price = order.price.ok_or(EngineError::LimitNotFound)?;
        let book = self.book(&order.symbol).await?;
        book.cancel_limit_order(order_id, price, order.is_bid).await?;

        let updated = {
            let mut store = self.store.lock().await;
            store.set_status_canceled(order_id)?
        };
        self.publish_book_update(order.symbol);
        Ok(updated)
    }

    pub async fn get_current_orders(&self, user_id: u64) -> Result<Vec<Order>, EngineError> {
        Ok(self.store.lock().await.get_open_orders_by_user(user_id)?)
    }

    pub async fn get_orders(&self, user_id: u64) -> Result<Vec<Order>, EngineError> {
        Ok(self.store.lock().await.get_orders_by_user(user_id)?)
    }

    pub async fn get_book_snapshot(&self, symbol: &Symbol) -> Result<BookSnapshot, EngineError> {
        let book = self.book(symbol).await?;
        Ok(book.snapshot(symbol.clone()).await)
    }
}
