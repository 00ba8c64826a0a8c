//! Agora relay server binary.
//!
//! Serves the REST endpoints and broadcasts chat and order updates to every
//! connected WebSocket client.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin agora-server
//! cargo run --bin agora-server -- --host 0.0.0.0 --port 3000 --seed-demo
//! ```

use clap::Parser;

use agora_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "agora-server")]
#[command(about = "Broadcast relay server for the Agora marketplace", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Register a couple of demo orders for shop 's1'
    #[arg(long, default_value_t = false)]
    seed_demo: bool,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();

    if let Err(e) = agora_server::run_server(args.host, args.port, args.seed_demo).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
