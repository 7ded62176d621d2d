//! Read-only view of the session handed to the UI.

use serde::Serialize;

use nexalog_shared::{Scope, UserId};
use nexalog_store::{FriendEntry, Message};

use crate::error::SessionError;

/// Everything a renderer needs to draw the chat screen.
///
/// Produced after every change by the runtime; the UI never mutates
/// session state directly.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ViewSnapshot {
    /// Authenticated user.
    pub me: Option<UserId>,

    /// Conversation or channel currently open.
    pub scope: Option<Scope>,

    /// Other party of the open direct conversation.
    pub peer: Option<UserId>,

    /// Messages of the open thread, oldest first. Deleted rows are kept;
    /// use [`Message::display_content`] to render them.
    pub messages: Vec<Message>,

    /// Friend list, most recent activity first.
    pub friends: Vec<FriendEntry>,

    /// Users currently online, sorted.
    pub online: Vec<UserId>,

    pub error: Option<SessionError>,

    /// Whether an older page may exist.
    pub has_more: bool,

    pub loading_older: bool,

    /// Whether the push channel is connected.
    pub connected: bool,
}
