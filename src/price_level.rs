//! A single price level: a FIFO queue of resting orders and the running
//! total of their outstanding quantity.

use std::collections::VecDeque;

use rust_decimal::Decimal;

use crate::order::{Match, Order};

#[derive(Debug, Clone)]
pub struct PriceLevel {
    pub price: Decimal,
    pub orders: VecDeque<Order>,
    pub total_size: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
            total_size: Decimal::ZERO,
        }
    }

    /// Pushes `order` to the tail of the queue. O(1).
    pub fn append_order(&mut self, order: Order) {
        self.total_size += order.qty;
        self.orders.push_back(order);
    }

    /// Walks the queue from the head, consuming `min(taker.qty,
    /// resting.qty)` against each resting order in turn and emitting a
    /// [`Match`] per resting order touched. Returns `true` iff `taker` was
    /// fully filled by this call.
    ///
    /// A resting order that reaches zero `qty` is popped from the head
    /// before the next iteration; a taker that reaches zero `qty` stops
    /// the walk immediately, including on the tie where both reach zero in
    /// the same step.
    pub fn match_orders(&mut self, taker: &mut Order, out_matches: &mut Vec<Match>) -> bool {
        while let Some(resting) = self.orders.front_mut() {
            let fill_qty = taker.qty.min(resting.qty);

            resting.size_filled += fill_qty;
            resting.qty -= fill_qty;
            taker.size_filled += fill_qty;
            taker.qty -= fill_qty;
            self.total_size -= fill_qty;

            out_matches.push(Match {
                price: self.price,
                qty: fill_qty,
                counter_order_id: resting.id,
                counter_order_size_filled: resting.size_filled,
            });

            if resting.qty.is_zero() {
                self.orders.pop_front();
            }
            if taker.qty.is_zero() {
                return true;
            }
        }
        false
    }

    /// Linear search by id; splices the order out and decrements
    /// `total_size` if found. Cancellation hits this path; fills only ever
    /// touch the head via `match_orders`. Returns the removed order (its
    /// `qty` is what the caller needs to adjust aggregate side volume);
    /// `None` is the spec's `false`.
    pub fn remove_order(&mut self, id: u64) -> Option<Order> {
        let pos = self.orders.iter().position(|o| o.id == id)?;
        let removed = self.orders.remove(pos).expect("position just found");
        self.total_size -= removed.qty;
        Some(removed)
    }
}
