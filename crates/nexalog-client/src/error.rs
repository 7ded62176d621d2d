use serde::Serialize;
use thiserror::Error;

use nexalog_net::NetError;

/// Errors surfaced by [`ClientHandle`](crate::runtime::ClientHandle) and
/// runtime start-up.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Net(#[from] NetError),

    #[error("No bearer token configured (set NEXALOG_TOKEN)")]
    MissingToken,

    /// The runtime task has exited; commands can no longer be delivered.
    #[error("Client runtime has stopped")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Failure flag shown for the open conversation. Cleared by the next
/// open/close; never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "camelCase")]
pub enum SessionError {
    #[error("Could not open conversation: {0}")]
    Resolve(String),

    #[error("Could not load messages: {0}")]
    Fetch(String),

    #[error("Could not send message: {0}")]
    Send(String),
}
