//! Canonical domain models held in memory by the client.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the UI layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nexalog_shared::{MessageId, ThreadId, UserId};

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message in canonical form, regardless of which route or
/// push event it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Durable backend identity, or a `tmp-` identity while unconfirmed.
    pub id: MessageId,
    /// Owning conversation or channel.
    #[serde(rename = "conversationId")]
    pub thread_id: Option<ThreadId>,
    /// Author.
    pub sender_id: Option<UserId>,
    /// Other party of a direct message, when the payload names one.
    pub recipient_id: Option<UserId>,
    /// Text body. Retained after deletion but never rendered.
    pub content: String,
    /// Creation time, used for page ordering.
    pub created_at: DateTime<Utc>,
    pub edited: bool,
    /// Soft-delete marker. A deleted row keeps its position.
    pub deleted: bool,
    /// Locally created and not yet confirmed by the backend.
    pub optimistic: bool,
    /// Display details carried by channel message payloads.
    pub author: Option<Author>,
}

impl Message {
    /// Content a renderer may show; `None` once the message is deleted.
    pub fn display_content(&self) -> Option<&str> {
        if self.deleted {
            None
        } else {
            Some(&self.content)
        }
    }
}

/// Author details embedded in channel messages (`user` / `User`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub username: String,
    pub avatar: Option<String>,
}

// ---------------------------------------------------------------------------
// Friend list
// ---------------------------------------------------------------------------

/// One row of the friend / conversation list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FriendEntry {
    pub user_id: UserId,
    pub username: Option<String>,
    /// Time of the most recent message exchanged with this user.
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl FriendEntry {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            username: None,
            last_activity_at: None,
        }
    }
}
