//! Agora console client.
//!
//! Customer mode chats with one shop over the optimistic send pipeline;
//! merchant mode watches the shop's inbox and order feed.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin agora-client -- --role customer --user-id c1 --shop-id s1
//! cargo run --bin agora-client -- --role merchant --user-id m1 --shop-id s1
//! ```

use clap::Parser;

use agora_client::console::{run_customer_console, run_merchant_console};
use agora_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "agora-client")]
#[command(about = "Console client for the Agora marketplace", long_about = None)]
struct Args {
    /// Role to connect as: customer or merchant
    #[arg(short, long)]
    role: String,

    /// User id to act as
    #[arg(short, long)]
    user_id: String,

    /// Shop to chat with (customer) or the operated shop (merchant)
    #[arg(short, long)]
    shop_id: String,

    /// Optional product context for the conversation
    #[arg(short, long)]
    product_id: Option<String>,

    /// Backend base URL
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server: String,

    /// Bearer token for the threads endpoint
    #[arg(long, default_value = "dev-token")]
    token: String,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    let result = match args.role.as_str() {
        "customer" => {
            run_customer_console(
                args.server,
                args.user_id,
                args.shop_id,
                args.product_id,
                args.token,
            )
            .await
        }
        "merchant" => {
            run_merchant_console(args.server, args.user_id, args.shop_id, args.token).await
        }
        other => {
            tracing::error!("Unknown role '{}'; expected customer or merchant", other);
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
