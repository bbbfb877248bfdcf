//! A one-shot scripted run over a single in-process book: seeds resting
//! liquidity, crosses it with a couple of takers, and logs what happened.
//! Useful for a quick smoke test of a build without standing up the HTTP
//! surface or a client.

use std::path::Path;

use crate::exchange::Exchange;
use crate::order::OrderKind;
use crate::symbol::Symbol;

pub async fn run_simulation(store_path: impl AsRef<Path>) -> anyhow::Result<()> {
    let exchange = Exchange::open(store_path)?;
    let symbol = Symbol::new("DEMO-USD")?;
    exchange.add_order_book(symbol.clone()).await?;

    tracing::info!(%symbol, "seeding resting liquidity");
    exchange
        .place_order(1, false, symbol.clone(), OrderKind::Limit, Some("100"), "10")
        .await?;
    exchange
        .place_order(1, false, symbol.clone(), OrderKind::Limit, Some("101"), "5")
        .await?;
    exchange
        .place_order(2, true, symbol.clone(), OrderKind::Limit, Some("99"), "8")
        .await?;

    tracing::info!("crossing the book with a taker limit bid at 101");
    let updated = exchange
        .place_order(3, true, symbol.clone(), OrderKind::Limit, Some("101"), "12")
        .await?;
    for order in &updated {
        tracing::info!(
            id = order.id,
            status = ?order.status,
            qty = %order.qty,
            size_filled = %order.size_filled,
            "order updated by the cross"
        );
    }

    tracing::info!("crossing with a market sell for 3");
    match exchange
        .place_order(4, false, symbol.clone(), OrderKind::Market, None, "3")
        .await
    {
        Ok(updated) => {
            for order in &updated {
                tracing::info!(id = order.id, status = ?order.status, "order updated");
            }
        }
        Err(e) => tracing::warn!(error = %e, "market order did not fully fill"),
    }

    let snapshot = exchange.get_book_snapshot(&symbol).await?;
    tracing::info!(bids = ?snapshot.bids, asks = ?snapshot.asks, "final book state");
    Ok(())
}
