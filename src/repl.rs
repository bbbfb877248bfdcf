//! A local, non-networked REPL over a single in-process `Exchange`, for
//! ad-hoc poking at the matching core during development. Not a client of
//! the HTTP surface — it calls [`Exchange`] directly, so it works even when
//! nothing is listening on a port.

use std::io::{self, BufRead, Write};
use std::path::Path;

use crate::exchange::Exchange;
use crate::order::OrderKind;
use crate::symbol::Symbol;

fn print_help() {
    println!("commands:");
    println!("  create <symbol>");
    println!("  book <symbol>");
    println!("  place <symbol> <buy|sell> <limit|market> <price|-> <qty> [user_id]");
    println!("  cancel <symbol> <order_id>");
    println!("  orders <user_id>");
    println!("  current <user_id>");
    println!("  help");
    println!("  quit");
}

pub async fn run_repl(store_path: impl AsRef<Path>) -> anyhow::Result<()> {
    let exchange = Exchange::open(store_path)?;
    println!("order book engine REPL — `help` for commands, `quit` to exit");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let parts: Vec<&str> = line.split_whitespace().collect();

        match parts.as_slice() {
            [] => continue,
            ["quit"] | ["exit"] => break,
            ["help"] => print_help(),
            ["create", symbol] => match Symbol::new(*symbol) {
                Ok(symbol) => match exchange.add_order_book(symbol).await {
                    Ok(()) => println!("ok"),
                    Err(e) => println!("error: {e}"),
                },
                Err(e) => println!("error: {e}"),
            },
            ["book", symbol] => match Symbol::new(*symbol) {
                Ok(symbol) => match exchange.get_book_snapshot(&symbol).await {
                    Ok(snap) => {
                        println!("bids: {:?}", snap.bids);
                        println!("asks: {:?}", snap.asks);
                    }
                    Err(e) => println!("error: {e}"),
                },
                Err(e) => println!("error: {e}"),
            },
            ["place", symbol, side, kind, price, qty, rest @ ..] => {
                let user_id = rest.first().and_then(|s| s.parse().ok()).unwrap_or(1u64);
                let is_bid = match *side {
                    "buy" => true,
                    "sell" => false,
                    other => {
                        println!("error: side must be `buy` or `sell`, got `{other}`");
                        continue;
                    }
                };
                let kind = match *kind {
                    "limit" => OrderKind::Limit,
                    "market" => OrderKind::Market,
                    other => {
                        println!("error: kind must be `limit` or `market`, got `{other}`");
                        continue;
                    }
                };
                let price = if *price == "-" { None } else { Some(*price) };
                match Symbol::new(*symbol) {
                    Ok(symbol) => {
                        match exchange
                            .place_order(user_id, is_bid, symbol, kind, price, qty)
                            .await
                        {
                            Ok(updated) => {
                                for order in updated {
                                    println!(
                                        "order {} status={:?} qty={} size_filled={}",
                                        order.id, order.status, order.qty, order.size_filled
                                    );
                                }
                            }
                            Err(e) => println!("error: {e}"),
                        }
                    }
                    Err(e) => println!("error: {e}"),
                }
            }
            ["cancel", symbol, order_id] => {
                let order_id: u64 = match order_id.parse() {
                    Ok(id) => id,
                    Err(_) => {
                        println!("error: `{order_id}` is not a valid order id");
                        continue;
                    }
                };
                match Symbol::new(*symbol) {
                    Ok(symbol) => match exchange.cancel_order(&symbol, order_id).await {
                        Ok(order) => println!("order {} status={:?}", order.id, order.status),
                        Err(e) => println!("error: {e}"),
                    },
                    Err(e) => println!("error: {e}"),
                }
            }
            ["orders", user_id] => match user_id.parse() {
                Ok(user_id) => match exchange.get_orders(user_id).await {
                    Ok(orders) => {
                        for o in orders {
                            println!("{} status={:?} qty={}", o.id, o.status, o.qty);
                        }
                    }
                    Err(e) => println!("error: {e}"),
                },
                Err(_) => println!("error: `{user_id}` is not a valid user id"),
            },
            ["current", user_id] => match user_id.parse() {
                Ok(user_id) => match exchange.get_current_orders(user_id).await {
                    Ok(orders) => {
                        for o in orders {
                            println!("{} status={:?} qty={}", o.id, o.status, o.qty);
                        }
                    }
                    Err(e) => println!("error: {e}"),
                },
                Err(_) => println!("error: `{user_id}` is not a valid user id"),
            },
            other => println!("unrecognized command: {:?} (try `help`)", other),
        }
    }
    Ok(())
}
