//! Identity extraction from heterogeneous payloads.
//!
//! Every logical field has an ordered list of candidate field names; the
//! first candidate that resolves wins. Lookups never fail: a record without
//! any usable candidate simply yields `None`.

use serde_json::Value;

use crate::constants::TEMP_ID_PREFIX;
use crate::protocol::RawRecord;
use crate::types::{MessageId, ScopeKind, ThreadId, UserId};

pub const MESSAGE_ID_FIELDS: &[&str] = &[
    "ID_Message",
    "ID_Channel_message",
    "messageId",
    "MessageId",
    "id",
    "ID",
];

pub const CONVERSATION_ID_FIELDS: &[&str] =
    &["ID_Conversation", "conversationId", "ConversationId", "convId"];

const CHANNEL_MESSAGE_ID_FIELD: &str = "ID_Channel_message";

pub const CHANNEL_ID_FIELDS: &[&str] = &["ID_Channel", "channelId"];

pub const SENDER_ID_FIELDS: &[&str] = &[
    "ID_Sender",
    "fromId",
    "senderId",
    "user.ID_USER",
    "User.ID_USER",
    "ID_USER",
];

pub const RECIPIENT_ID_FIELDS: &[&str] = &["ID_Recipient", "toId", "recipientId"];

pub const CONTENT_FIELDS: &[&str] = &["content", "text", "message"];

pub const CREATED_AT_FIELDS: &[&str] = &["createdAt", "timestamp", "created_at"];

const PRESENCE_USER_FIELDS: &[&str] = &["userId", "ID_USER"];

/// Interpret a JSON value as a positive integer identity.
///
/// Accepts JSON integers, integral floats and numeric strings.
pub fn as_identity(value: &Value) -> Option<i64> {
    let id = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    (id > 0).then_some(id)
}

/// Interpret a JSON value as a message identity.
///
/// Strings carrying [`TEMP_ID_PREFIX`] are temporary; anything else must be
/// numeric to count as durable.
pub fn as_message_id(value: &Value) -> Option<MessageId> {
    if let Value::String(s) = value {
        if s.starts_with(TEMP_ID_PREFIX) {
            return Some(MessageId::Temporary(s.clone()));
        }
    }
    as_identity(value).map(MessageId::Durable)
}

pub fn message_id(raw: &RawRecord) -> Option<MessageId> {
    raw.first_of(MESSAGE_ID_FIELDS, as_message_id)
}

pub fn conversation_id(raw: &RawRecord) -> Option<ThreadId> {
    raw.first_of(CONVERSATION_ID_FIELDS, as_identity).map(ThreadId)
}

pub fn channel_id(raw: &RawRecord) -> Option<ThreadId> {
    raw.first_of(CHANNEL_ID_FIELDS, as_identity).map(ThreadId)
}

/// Thread identity for a given scope kind.
pub fn thread_id(raw: &RawRecord, kind: ScopeKind) -> Option<ThreadId> {
    match kind {
        ScopeKind::Conversation => conversation_id(raw),
        ScopeKind::Channel => channel_id(raw),
    }
}

/// Any thread identity, conversation fields first.
pub fn any_thread_id(raw: &RawRecord) -> Option<ThreadId> {
    conversation_id(raw).or_else(|| channel_id(raw))
}

/// True for channel traffic: a channel identity or a channel message id.
pub fn is_channel_record(raw: &RawRecord) -> bool {
    channel_id(raw).is_some()
        || raw
            .get_path(CHANNEL_MESSAGE_ID_FIELD)
            .and_then(as_identity)
            .is_some()
}

pub fn sender_id(raw: &RawRecord) -> Option<UserId> {
    raw.first_of(SENDER_ID_FIELDS, as_identity).map(UserId)
}

pub fn recipient_id(raw: &RawRecord) -> Option<UserId> {
    raw.first_of(RECIPIENT_ID_FIELDS, as_identity).map(UserId)
}

pub fn presence_user(raw: &RawRecord) -> Option<UserId> {
    raw.first_of(PRESENCE_USER_FIELDS, as_identity).map(UserId)
}

/// Deduce the other participant of a direct-message event.
///
/// Tries, in order: the sender when it is not `me`, the recipient when it is
/// not `me`, then whatever `known_peer` reports for the record's
/// conversation identity.
pub fn other_party(
    raw: &RawRecord,
    me: Option<UserId>,
    known_peer: impl Fn(ThreadId) -> Option<UserId>,
) -> Option<UserId> {
    if let Some(from) = sender_id(raw).filter(|id| Some(*id) != me) {
        return Some(from);
    }
    if let Some(to) = recipient_id(raw).filter(|id| Some(*id) != me) {
        return Some(to);
    }
    conversation_id(raw).and_then(known_peer)
}
