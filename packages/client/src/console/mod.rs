//! CLI console for the Agora client.
//!
//! Customer mode opens one live conversation with a shop; merchant mode
//! watches the shop's inbox and order feed. Both render connection status
//! from the debounced flags, never from raw link transitions.

mod formatter;
mod session;

pub use formatter::MessageFormatter;
pub use session::{run_customer_console, run_merchant_console};

use std::io::Write;

/// Redisplay the prompt after printing asynchronous output.
pub fn redisplay_prompt(prompt: &str) {
    print!("{}", prompt);
    std::io::stdout().flush().ok();
}
