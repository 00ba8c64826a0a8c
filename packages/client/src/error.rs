//! Error types for the Agora client.

use thiserror::Error;

/// Client-side errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure (dial error, abrupt close, hung handshake).
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server rejected the auth frame; reconnecting will not help.
    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    /// HTTP transport failure on a REST call.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The REST API answered with a non-success status.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}
