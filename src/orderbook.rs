//! The two-sided book: bid and ask [`BookSide`]s behind independent
//! `RwLock`s, plus the fill algorithm that crosses a taker against the
//! opposite side.
//!
//! Locking discipline (§5 of the design this follows): a single side is
//! never held as a writer by two callers at once, and the two sides are
//! never held as writers at the same time. A fill's opposite-side write
//! lock is held for the *entire* operation — match, persist, commit — not
//! just the match walk (see [`StagedFill`]); resting and cancelling only
//! ever touch the taker's own side and don't interact with it.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use crate::decimal::canonical_key;
use crate::errors::EngineError;
use crate::order::{Match, Order, OrderKind};
use crate::price_level::PriceLevel;
use crate::symbol::Symbol;

/// One side (bid or ask) of a book: price levels keyed by their canonical
/// decimal string, plus a best-price-first index over the keys that live
/// there and a running total of outstanding quantity.
///
/// `descending` fixes the sort direction once at construction: `true` for
/// the bid side (best = highest price), `false` for the ask side (best =
/// lowest price). Everything else about a `BookSide` is symmetric between
/// the two sides, which is why one struct serves both.
#[derive(Debug, Clone)]
pub struct BookSide {
    levels: HashMap<String, PriceLevel>,
    /// Prices with a non-empty level, sorted best-first. Re-sorted on
    /// insert of a brand new level; purely additive otherwise, since an
    /// existing level's price never changes.
    best: Vec<Decimal>,
    volume: Decimal,
    descending: bool,
}

impl BookSide {
    fn new(descending: bool) -> Self {
        Self {
            levels: HashMap::new(),
            best: Vec::new(),
            volume: Decimal::ZERO,
            descending,
        }
    }

    pub fn best_price(&self) -> Option<Decimal> {
        self.best.first().copied()
    }

    pub fn volume(&self) -> Decimal {
        self.volume
    }

    /// Best-first `(price, total_size)` pairs, for snapshots.
    pub fn levels_best_first(&self) -> Vec<(Decimal, Decimal)> {
        self.best
            .iter()
            .map(|p| {
                let level = self
                    .levels
                    .get(&canonical_key(*p))
                    .expect("every price in `best` has a level");
                (*p, level.total_size)
            })
            .collect()
    }

    fn get_or_create_level(&mut self, price: Decimal) -> &mut PriceLevel {
        let key = canonical_key(price);
        if !self.levels.contains_key(&key) {
            self.levels.insert(key.clone(), PriceLevel::new(price));
            self.best.push(price);
            self.sort_best();
        }
        self.levels.get_mut(&key).expect("just inserted")
    }

    fn sort_best(&mut self) {
        if self.descending {
            self.best.sort_by(|a, b| b.cmp(a));
        } else {
            self.best.sort_by(|a, b| a.cmp(b));
        }
    }

    /// A limit taker crosses the best opposite price iff the opposite
    /// side's best is no worse than the taker's limit.
    fn crosses(&self, is_bid_taker: bool, limit_price: Decimal) -> bool {
        match self.best_price() {
            Some(best) => {
                if is_bid_taker {
                    limit_price >= best
                } else {
                    limit_price <= best
                }
            }
            None => false,
        }
    }
}

/// A fill that has been computed but not yet made visible to the rest of
/// the book.
///
/// §7 mandates that a fill's mutations are "held in a local staging
/// buffer and applied only after `addMatches` returns successfully; on
/// store failure, the incoming order is rejected and no resting liquidity
/// is disturbed." `stage_fill` walks a *clone* of the opposite side —
/// `new_side` — leaving the live side untouched, while holding that live
/// side's write lock for as long as `StagedFill` lives. Holding the lock
/// across the caller's store round trip (rather than releasing it right
/// after the match walk) is what makes the staging actually airtight: no
/// concurrent probe, rest, cancel, or snapshot can observe the drained
/// intermediate state, because all of them need a lock on the very side
/// this guard already holds as a writer.
///
/// `commit` installs `new_side` in place of the live side and releases
/// the lock. Dropping a `StagedFill` without committing — the store
/// failed, or there was nothing to persist — releases the lock having
/// changed nothing; the live side is exactly as it was before `stage_fill`
/// was called.
pub struct StagedFill {
    guard: OwnedRwLockWriteGuard<BookSide>,
    new_side: BookSide,
    pub matches: Vec<Match>,
}

impl StagedFill {
    /// Makes the staged mutation live and releases the write lock.
    pub fn commit(self) {
        let StagedFill {
            mut guard,
            new_side,
            ..
        } = self;
        *guard = new_side;
    }
}

/// A snapshot of both sides, returned by the `GET /book/{symbol}` route
/// and pushed to `GET /ws/{symbol}` subscribers on every change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub symbol: Symbol,
    /// Best-first: `bids[0]` is the best bid.
    pub bids: Vec<(Decimal, Decimal)>,
    /// Best-first: `asks[0]` is the best ask.
    pub asks: Vec<(Decimal, Decimal)>,
}

/// One symbol's order book.
pub struct OrderBook {
    bid: Arc<RwLock<BookSide>>,
    ask: Arc<RwLock<BookSide>>,
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            bid: Arc::new(RwLock::new(BookSide::new(true))),
            ask: Arc::new(RwLock::new(BookSide::new(false))),
        }
    }

    fn side(&self, is_bid: bool) -> &Arc<RwLock<BookSide>> {
        if is_bid {
            &self.bid
        } else {
            &self.ask
        }
    }

    /// Whether a limit order at `price` on the given side would cross the
    /// current opposite best. Pure read, no mutation — used to decide
    /// whether a placement needs a fill pass at all before taking any
    /// write lock.
    pub async fn probe_crosses(&self, is_bid: bool, price: Decimal) -> bool {
        self.side(!is_bid).read().await.crosses(is_bid, price)
    }

    /// Crosses `taker` against the opposite side until it is fully filled,
    /// the opposite side runs out of crossable levels, or (for a limit
    /// taker) the opposite best no longer crosses the taker's price.
    ///
    /// Mutates `taker` in place (`qty`/`size_filled`) and returns a
    /// [`StagedFill`] holding the opposite side's write lock plus the
    /// would-be post-fill state of that side. Nothing about the live book
    /// changes until the caller calls [`StagedFill::commit`] — see its
    /// docs for why the lock is held for the whole staged window, not just
    /// this walk.
    pub async fn stage_fill(&self, taker: &mut Order) -> StagedFill {
        let opposite_is_bid = !taker.is_bid;
        let guard = Arc::clone(self.side(opposite_is_bid)).write_owned().await;
        let mut new_side = guard.clone();
        let mut matches = Vec::new();

        let mut removed_prefix = 0usize;
        for idx in 0..new_side.best.len() {
            let price = new_side.best[idx];
            if taker.kind == OrderKind::Limit {
                let limit_price = taker.price.expect("limit order carries a price");
                let crosses = if taker.is_bid {
                    limit_price >= price
                } else {
                    limit_price <= price
                };
                if !crosses {
                    break;
                }
            }

            let key = canonical_key(price);
            let level = new_side
                .levels
                .get_mut(&key)
                .expect("every price in `best` has a level");
            let taker_filled = level.match_orders(taker, &mut matches);

            if taker_filled {
                if level.total_size.is_zero() {
                    removed_prefix = idx + 1;
                }
                break;
            }
            // `match_orders` returning false means the level ran dry
            // before the taker did: empty by construction.
            removed_prefix = idx + 1;
        }

        for price in new_side.best.drain(0..removed_prefix) {
            new_side.levels.remove(&canonical_key(price));
        }

        let consumed: Decimal = matches.iter().map(|m| m.qty).sum();
        new_side.volume -= consumed;

        StagedFill {
            guard,
            new_side,
            matches,
        }
    }

    /// Adds `order` to the tail of its price level on its own side,
    /// creating the level if this is the first order at that price.
    /// Callers are expected to have already run any fill pass — this
    /// never matches, only rests.
    pub async fn rest_limit_order(&self, order: Order) {
        let mut side = self.side(order.is_bid).write().await;
        let qty = order.qty;
        let price = order.price.expect("limit order carries a price");
        side.get_or_create_level(price).append_order(order);
        side.volume += qty;
    }

    /// Removes a resting order by id from the level at `price` on `side`.
    /// Drops the level entirely if that empties it.
    pub async fn cancel_limit_order(
        &self,
        order_id: u64,
        price: Decimal,
        is_bid: bool,
    ) -> Result<(), EngineError> {
        let mut side = self.side(is_bid).write().await;
        let key = canonical_key(price);
        let level = side.levels.get_mut(&key).ok_or(EngineError::LimitNotFound)?;
        let removed = level
            .remove_order(order_id)
            .ok_or(EngineError::OrderNotFound)?;
        side.volume -= removed.qty;
        if level.total_size.is_zero() {
            side.levels.remove(&key);
            side.best.retain(|p| canonical_key(*p) != key);
        }
        Ok(())
    }

    /// Empties both sides and returns every resting order that was on
    /// them, bid side first. Used only when tearing a book down entirely
    /// (`deleteOrderBook`, §9 Open Question 1) — the registry removes the
    /// book from its symbol map under its own lock before calling this, so
    /// nothing else can be placing or cancelling against it concurrently.
    /// Sides are drained one at a time, never both as writers together.
    pub async fn drain_all(&self) -> Vec<Order> {
        let mut drained = Vec::new();
        {
            let mut side = self.bid.write().await;
            for price in std::mem::take(&mut side.best) {
                if let Some(level) = side.levels.remove(&canonical_key(price)) {
                    drained.extend(level.orders);
                }
            }
            side.volume = Decimal::ZERO;
        }
        {
            let mut side = self.ask.write().await;
            for price in std::mem::take(&mut side.best) {
                if let Some(level) = side.levels.remove(&canonical_key(price)) {
                    drained.extend(level.orders);
                }
            }
            side.volume = Decimal::ZERO;
        }
        drained
    }

    pub async fn volumes(&self) -> (Decimal, Decimal) {
        (self.bid.read().await.volume, self.ask.read().await.volume)
    }

    pub async fn snapshot(&self, symbol: Symbol) -> BookSnapshot {
        let bids = self.bid.read().await.levels_best_first();
        let asks = self.ask.read().await.levels_best_first();
        BookSnapshot { symbol, bids, asks }
    }
}
