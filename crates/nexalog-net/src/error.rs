use thiserror::Error;

/// Errors produced by the REST and push adapters.
#[derive(Error, Debug)]
pub enum NetError {
    /// Transport-level HTTP failure (connect, timeout, body decode).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("Backend returned {status}: {message}")]
    Status { status: u16, message: String },

    /// A response did not carry a field the caller needs.
    #[error("Missing field in response: {0}")]
    MissingField(&'static str),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Malformed Engine.IO / Socket.IO frame.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server refused the Socket.IO namespace connection.
    #[error("Connection rejected: {0}")]
    ConnectRejected(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NetError>;
