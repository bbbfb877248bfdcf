use std::path::PathBuf;

use clap::{Parser, Subcommand};
use order_book_engine::{api, repl::run_repl, simulate::run_simulation, state::AppState, utils::shutdown_token};
use tracing_subscriber::EnvFilter;

/// A multi-symbol limit order book engine: HTTP + WebSocket front end over
/// an in-memory matching core backed by an embedded external store.
#[derive(Parser)]
#[command(name = "order-book-engine", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// TCP port the HTTP/WebSocket server listens on. Ignored by `simulate`
    /// and `repl`.
    #[arg(long, env = "ENGINE_PORT", default_value_t = 8080)]
    port: u16,

    /// Directory the external store persists orders and matches under.
    /// Created if it doesn't exist.
    #[arg(long, env = "ENGINE_STORE_PATH", default_value = "order_store")]
    store_path: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP/WebSocket server. The default when no subcommand is given.
    Serve,
    /// Seed a demo book and run a scripted sequence of crosses, logging the
    /// results. No server or network involved.
    Simulate,
    /// A local, non-networked REPL over a single in-process `Exchange`.
    Repl,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(cli.port, cli.store_path).await,
        Commands::Simulate => run_simulation(&cli.store_path).await,
        Commands::Repl => run_repl(&cli.store_path).await,
    }
}

async fn serve(port: u16, store_path: PathBuf) -> anyhow::Result<()> {
    let state = AppState::new(&store_path)
        .map_err(|e| anyhow::anyhow!("failed to open store at {:?}: {e}", store_path))?;

    let token = shutdown_token();
    let app = api::router(state);
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "order book engine listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(token.cancelled_owned())
        .await?;

    Ok(())
}
