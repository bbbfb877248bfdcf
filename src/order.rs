//! Order and match value types shared by the book, the registry, and the
//! store.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::symbol::Symbol;

/// `Limit` orders carry a price and rest if they don't fully cross.
/// `Market` orders carry no price and never rest — whatever doesn't fill
/// immediately is rejected (`InsufficientLiquidity`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Limit,
    Market,
}

/// Store-owned lifecycle state. The engine only ever moves an order's
/// `qty`/`size_filled`; deriving `Filling -> Filled` and recording
/// `Canceled` is the store's job (§6.1), not the book's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Filling,
    Filled,
    Canceled,
}

/// A live order. Lives only while resting or being matched — once fully
/// filled or canceled it leaves the book and the canonical copy is
/// whatever the store holds.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Order {
    pub id: u64,
    pub user_id: u64,
    #[bincode(with_serde)]
    pub symbol: Symbol,
    pub is_bid: bool,
    pub kind: OrderKind,
    /// Meaningful only for `Limit` orders.
    #[bincode(with_serde)]
    pub price: Option<Decimal>,
    /// Remaining outstanding quantity. Decreases monotonically to zero.
    #[bincode(with_serde)]
    pub qty: Decimal,
    /// Cumulative filled quantity. Increases monotonically.
    #[bincode(with_serde)]
    pub size_filled: Decimal,
    pub status: OrderStatus,
}

impl Order {
    /// `qty + size_filled` must equal this at every observable moment.
    pub fn original_qty(&self) -> Decimal {
        self.qty + self.size_filled
    }

    pub fn is_filled(&self) -> bool {
        self.qty.is_zero()
    }
}

/// One taker-consumes-maker event, priced at the *maker's* resting price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub price: Decimal,
    pub qty: Decimal,
    pub counter_order_id: u64,
    pub counter_order_size_filled: Decimal,
}
