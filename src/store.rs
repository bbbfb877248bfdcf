//! The external store: the durable record of every order and match the
//! core has ever produced.
//!
//! This is deliberately the same ParityDB + bincode + big-endian
//! composite-key recipe the original trade store used, generalized from
//! "append-only trade log" to the full `createOrder` / `getOrderById` /
//! `getOrdersByUser` / `getOpenOrdersByUser` / `setStatusCanceled` /
//! `addMatches` surface §6.1 asks an external store to expose. Four
//! columns:
//!
//! - `COL_ORDERS` — `orderId(u64 be)` -> bincode `Order`. Point lookups.
//! - `COL_USER_INDEX` — `userId(u64 be) ++ orderId(u64 be)` -> empty value,
//!   B-tree indexed so `getOrdersByUser` can prefix-scan.
//! - `COL_MATCHES` — `tsNanos(u128 be) ++ takerId(u64 be) ++
//!   counterId(u64 be) ++ seq(u16 be)` -> bincode `StoredMatch`. Append-only
//!   audit log, never read back by any operation this crate exposes today.
//! - `COL_META` — a single `next_order_id` counter.
//!
//! `createOrder` and `addMatches` each commit every column they touch in
//! one `Db::commit` call, which ParityDB applies atomically — that's what
//! makes `addMatches` transactional per §6.1.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use bincode::config::{self, standard};
use bincode::error::{DecodeError, EncodeError};
use parity_db::{BTreeIterator, ColId, Db, Options};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::order::{Order, OrderKind, OrderStatus};
use crate::symbol::Symbol;

const COL_ORDERS: ColId = 0;
const COL_USER_INDEX: ColId = 1;
const COL_MATCHES: ColId = 2;
const COL_META: ColId = 3;

const NEXT_ORDER_ID_KEY: &[u8] = b"next_order_id";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ParityDB error: {0}")]
    Parity(#[from] parity_db::Error),

    #[error("Bincode encode error: {0}")]
    BincodeEncode(#[from] EncodeError),

    #[error("Bincode decode error: {0}")]
    BincodeDecode(#[from] DecodeError),

    #[error("order not found")]
    NotFound,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One persisted match row: a taker consuming a counterparty at a given
/// price/qty, timestamped at insert.
#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
pub struct StoredMatch {
    pub taker_order_id: u64,
    pub counter_order_id: u64,
    #[bincode(with_serde)]
    pub qty: Decimal,
    #[bincode(with_serde)]
    pub price: Decimal,
    pub ts_nanos: u128,
}

/// One leg of an `addMatches` call: a single counterparty the taker
/// consumed, and that counterparty's post-call cumulative `sizeFilled`.
pub struct MatchLeg {
    pub counter_order_id: u64,
    pub counter_order_size_filled: Decimal,
    pub qty: Decimal,
    pub price: Decimal,
}

/// The full `addMatches` request: the taker's post-call `sizeFilled` plus
/// every counterparty leg it produced, in match order.
pub struct AddMatchesRequest {
    pub taker_order_id: u64,
    pub taker_size_filled: Decimal,
    pub legs: Vec<MatchLeg>,
}

pub struct Store {
    db: Db,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let mut opts = Options::with_columns(path.as_ref(), 4);
        opts.columns[COL_USER_INDEX as usize].btree_index = true;
        let db = Db::open_or_create(&opts)?;
        Ok(Store { db })
    }

    #[inline]
    fn order_key(order_id: u64) -> Vec<u8> {
        order_id.to_be_bytes().to_vec()
    }

    #[inline]
    fn user_index_prefix(user_id: u64) -> Vec<u8> {
        user_id.to_be_bytes().to_vec()
    }

    #[inline]
    fn user_index_key(user_id: u64, order_id: u64) -> Vec<u8> {
        let mut key = Self::user_index_prefix(user_id);
        key.extend_from_slice(&order_id.to_be_bytes());
        key
    }

    #[inline]
    fn match_key(ts_nanos: u128, taker_id: u64, counter_id: u64, seq: u16) -> Vec<u8> {
        let mut key = Vec::with_capacity(16 + 8 + 8 + 2);
        key.extend_from_slice(&ts_nanos.to_be_bytes());
        key.extend_from_slice(&taker_id.to_be_bytes());
        key.extend_from_slice(&counter_id.to_be_bytes());
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }

    #[inline]
    fn now_nanos() -> u128 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before the epoch")
            .as_nanos()
    }

    fn decode_order(bytes: &[u8]) -> StoreResult<Order> {
        let (order, _): (Order, usize) = bincode::decode_from_slice(bytes, config::standard())?;
        Ok(order)
    }

    fn next_order_id(&self) -> StoreResult<u64> {
        match self.db.get(COL_META, NEXT_ORDER_ID_KEY)? {
            Some(bytes) => Ok(u64::from_be_bytes(
                bytes[..8].try_into().expect("8-byte counter"),
            )),
            None => Ok(1),
        }
    }

    /// Assigns a fresh id and persists the new order, `Filling` with zero
    /// `sizeFilled`, before the matching core ever sees it.
    pub fn create_order(
        &mut self,
        user_id: u64,
        is_bid: bool,
        symbol: &Symbol,
        kind: OrderKind,
        price: Option<Decimal>,
        qty: Decimal,
    ) -> StoreResult<Order> {
        let id = self.next_order_id()?;
        let order = Order {
            id,
            user_id,
            symbol: symbol.clone(),
            is_bid,
            kind,
            price,
            qty,
            size_filled: Decimal::ZERO,
            status: OrderStatus::Filling,
        };
        let encoded = bincode::encode_to_vec(&order, standard())?;
        self.db.commit(vec![
            (COL_ORDERS, Self::order_key(id), Some(encoded)),
            (COL_USER_INDEX, Self::user_index_key(user_id, id), Some(Vec::new())),
            (
                COL_META,
                NEXT_ORDER_ID_KEY.to_vec(),
                Some((id + 1).to_be_bytes().to_vec()),
            ),
        ])?;
        Ok(order)
    }

    pub fn get_order_by_id(&self, order_id: u64) -> StoreResult<Order> {
        match self.db.get(COL_ORDERS, &Self::order_key(order_id))? {
            Some(bytes) => Self::decode_order(&bytes),
            None => Err(StoreError::NotFound),
        }
    }

    fn order_ids_for_user(&self, user_id: u64) -> StoreResult<Vec<u64>> {
        let mut it: BTreeIterator<'_> = self.db.iter(COL_USER_INDEX)?;
        let prefix = Self::user_index_prefix(user_id);
        it.seek(&prefix)?;
        let mut ids = Vec::new();
        while let Some((key, _)) = it.next()? {
            if !key.starts_with(&prefix) {
                break;
            }
            let order_id_bytes: [u8; 8] = key[8..16].try_into().expect("8-byte order id suffix");
            ids.push(u64::from_be_bytes(order_id_bytes));
        }
        Ok(ids)
    }

    pub fn get_orders_by_user(&self, user_id: u64) -> StoreResult<Vec<Order>> {
        self.order_ids_for_user(user_id)?
            .into_iter()
            .map(|id| self.get_order_by_id(id))
            .collect()
    }

    /// Per §6.1: orders with status in `{filling, canceled}` — the "open"
    /// set excludes only orders fully filled.
    pub fn get_open_orders_by_user(&self, user_id: u64) -> StoreResult<Vec<Order>> {
        Ok(self
            .get_orders_by_user(user_id)?
            .into_iter()
            .filter(|o| matches!(o.status, OrderStatus::Filling | OrderStatus::Canceled))
            .collect())
    }

    pub fn set_status_canceled(&mut self, order_id: u64) -> StoreResult<Order> {
        let mut order = self.get_order_by_id(order_id)?;
        order.status = OrderStatus::Canceled;
        let encoded = bincode::encode_to_vec(&order, standard())?;
        self.db
            .commit(vec![(COL_ORDERS, Self::order_key(order_id), Some(encoded))])?;
        Ok(order)
    }

    /// `qty + sizeFilled` is invariant per order (§8 invariant 1), so the
    /// store can re-derive `qty` and the `filling -> filled` transition
    /// from nothing but the new `sizeFilled`.
    fn apply_size_filled(existing: &Order, new_size_filled: Decimal) -> Order {
        let original_qty = existing.original_qty();
        let mut updated = existing.clone();
        updated.size_filled = new_size_filled;
        updated.qty = original_qty - new_size_filled;
        if updated.qty.is_zero() {
            updated.status = OrderStatus::Filled;
        }
        updated
    }

    /// Updates the taker's and every counterparty's `sizeFilled`, inserts
    /// one audit row per leg, and commits all of it in a single ParityDB
    /// transaction. Returns the updated orders, taker first.
    pub fn add_matches(&mut self, req: AddMatchesRequest) -> StoreResult<Vec<Order>> {
        let taker = self.get_order_by_id(req.taker_order_id)?;
        let updated_taker = Self::apply_size_filled(&taker, req.taker_size_filled);

        let mut changes = Vec::with_capacity(1 + req.legs.len() * 2);
        changes.push((
            COL_ORDERS,
            Self::order_key(updated_taker.id),
            Some(bincode::encode_to_vec(&updated_taker, standard())?),
        ));

        let mut updated = vec![updated_taker];
        let ts_nanos = Self::now_nanos();

        for (seq, leg) in req.legs.iter().enumerate() {
            let counter = self.get_order_by_id(leg.counter_order_id)?;
            let updated_counter = Self::apply_size_filled(&counter, leg.counter_order_size_filled);
            changes.push((
                COL_ORDERS,
                Self::order_key(updated_counter.id),
                Some(bincode::encode_to_vec(&updated_counter, standard())?),
            ));
            updated.push(updated_counter);

            let stored = StoredMatch {
                taker_order_id: req.taker_order_id,
                counter_order_id: leg.counter_order_id,
                qty: leg.qty,
                price: leg.price,
                ts_nanos,
            };
            changes.push((
                COL_MATCHES,
                Self::match_key(ts_nanos, req.taker_order_id, leg.counter_order_id, seq as u16),
                Some(bincode::encode_to_vec(&stored, standard())?),
            ));
        }

        self.db.commit(changes)?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn symbol() -> Symbol {
        Symbol::new("BTC-USD").unwrap()
    }

    #[test]
    fn create_order_assigns_increasing_ids() {
        let dir = tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();

        let a = store
            .create_order(1, true, &symbol(), OrderKind::Limit, Some(dec!(100)), dec!(5))
            .unwrap();
        let b = store
            .create_order(1, true, &symbol(), OrderKind::Limit, Some(dec!(101)), dec!(5))
            .unwrap();
        assert!(b.id > a.id);
        assert_eq!(a.status, OrderStatus::Filling);
        assert_eq!(a.size_filled, Decimal::ZERO);
    }

    #[test]
    fn get_order_by_id_roundtrips() {
        let dir = tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        let created = store
            .create_order(7, false, &symbol(), OrderKind::Market, None, dec!(3))
            .unwrap();
        let fetched = store.get_order_by_id(created.id).unwrap();
        assert_eq!(fetched.user_id, 7);
        assert_eq!(fetched.qty, dec!(3));
    }

    #[test]
    fn get_order_by_id_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        assert!(matches!(store.get_order_by_id(999), Err(StoreError::NotFound)));
    }

    #[test]
    fn orders_by_user_only_returns_that_user() {
        let dir = tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        store
            .create_order(1, true, &symbol(), OrderKind::Limit, Some(dec!(100)), dec!(1))
            .unwrap();
        store
            .create_order(2, true, &symbol(), OrderKind::Limit, Some(dec!(100)), dec!(1))
            .unwrap();
        store
            .create_order(1, false, &symbol(), OrderKind::Limit, Some(dec!(105)), dec!(2))
            .unwrap();

        let user1 = store.get_orders_by_user(1).unwrap();
        assert_eq!(user1.len(), 2);
        assert!(user1.iter().all(|o| o.user_id == 1));
    }

    #[test]
    fn set_status_canceled_persists() {
        let dir = tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        let order = store
            .create_order(1, true, &symbol(), OrderKind::Limit, Some(dec!(100)), dec!(5))
            .unwrap();
        let canceled = store.set_status_canceled(order.id).unwrap();
        assert_eq!(canceled.status, OrderStatus::Canceled);
        assert_eq!(
            store.get_order_by_id(order.id).unwrap().status,
            OrderStatus::Canceled
        );
    }

    #[test]
    fn open_orders_excludes_only_fully_filled() {
        let dir = tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        let filling = store
            .create_order(1, true, &symbol(), OrderKind::Limit, Some(dec!(100)), dec!(5))
            .unwrap();
        let to_fill = store
            .create_order(1, true, &symbol(), OrderKind::Limit, Some(dec!(100)), dec!(5))
            .unwrap();
        let to_cancel = store
            .create_order(1, true, &symbol(), OrderKind::Limit, Some(dec!(100)), dec!(5))
            .unwrap();
        store.set_status_canceled(to_cancel.id).unwrap();
        store
            .add_matches(AddMatchesRequest {
                taker_order_id: to_fill.id,
                taker_size_filled: dec!(5),
                legs: vec![],
            })
            .unwrap();

        let open = store.get_open_orders_by_user(1).unwrap();
        let open_ids: Vec<u64> = open.iter().map(|o| o.id).collect();
        assert!(open_ids.contains(&filling.id));
        assert!(open_ids.contains(&to_cancel.id));
        assert!(!open_ids.contains(&to_fill.id));
    }

    #[test]
    fn add_matches_updates_taker_and_counterparties_and_derives_filled() {
        let dir = tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        let taker = store
            .create_order(1, true, &symbol(), OrderKind::Limit, Some(dec!(100)), dec!(10))
            .unwrap();
        let maker = store
            .create_order(2, false, &symbol(), OrderKind::Limit, Some(dec!(100)), dec!(10))
            .unwrap();

        let updated = store
            .add_matches(AddMatchesRequest {
                taker_order_id: taker.id,
                taker_size_filled: dec!(10),
                legs: vec![MatchLeg {
                    counter_order_id: maker.id,
                    counter_order_size_filled: dec!(10),
                    qty: dec!(10),
                    price: dec!(100),
                }],
            })
            .unwrap();

        assert_eq!(updated.len(), 2);
        assert_eq!(updated[0].id, taker.id);
        assert_eq!(updated[0].status, OrderStatus::Filled);
        assert_eq!(updated[0].qty, Decimal::ZERO);
        assert_eq!(updated[1].id, maker.id);
        assert_eq!(updated[1].status, OrderStatus::Filled);
    }

    #[test]
    fn add_matches_on_missing_taker_fails_without_partial_commit() {
        let dir = tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        let maker = store
            .create_order(2, false, &symbol(), OrderKind::Limit, Some(dec!(100)), dec!(10))
            .unwrap();

        let err = store.add_matches(AddMatchesRequest {
            taker_order_id: 999,
            taker_size_filled: dec!(10),
            legs: vec![MatchLeg {
                counter_order_id: maker.id,
                counter_order_size_filled: dec!(10),
                qty: dec!(10),
                price: dec!(100),
            }],
        });
        assert!(matches!(err, Err(StoreError::NotFound)));
        // maker must be untouched since nothing was committed
        assert_eq!(
            store.get_order_by_id(maker.id).unwrap().status,
            OrderStatus::Filling
        );
    }
}
