//! Payload shapes exchanged with the backend.
//!
//! REST items and push payloads do not share a schema: field names vary per
//! route and per event. They are carried as [`RawRecord`]s and only turned
//! into typed values through the lookups in [`crate::identity`] and
//! [`crate::normalize`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::*;
use crate::identity;
use crate::types::{Scope, ScopeKind, ThreadId, UserId};

/// A loosely-typed JSON object as received from the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(pub Map<String, Value>);

impl RawRecord {
    /// Wrap a JSON value. Anything but an object yields `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Look up a field by dotted path (`"user.ID_USER"`).
    /// `null` is treated the same as a missing field.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.0.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        if current.is_null() {
            None
        } else {
            Some(current)
        }
    }

    /// Return the first candidate field that `extract` can interpret.
    pub fn first_of<T>(&self, candidates: &[&str], extract: impl Fn(&Value) -> Option<T>) -> Option<T> {
        candidates
            .iter()
            .filter_map(|path| self.get_path(path))
            .find_map(extract)
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Events pushed by the backend over the socket channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// A new message was stored.
    MessageNew(RawRecord),
    /// An existing message was edited.
    MessageEdited(RawRecord),
    /// A message was soft-deleted.
    MessageDeleted(RawRecord),
    /// Inbox notification for a conversation the user is part of.
    InboxNew(RawRecord),
    /// A user came online.
    PresenceOnline(UserId),
    /// A user went offline.
    PresenceOffline(UserId),
    /// Any event this client does not consume.
    Other { name: String },
}

impl PushEvent {
    /// Decode a named socket event with its first argument.
    ///
    /// Message events with a non-object payload and presence events without
    /// a resolvable `userId` degrade to [`PushEvent::Other`].
    pub fn from_socket_event(name: &str, payload: Option<Value>) -> Self {
        let record = payload.and_then(RawRecord::from_value);
        let other = || Self::Other {
            name: name.to_string(),
        };

        match (name, record) {
            (EVENT_MESSAGE_NEW, Some(r)) => Self::MessageNew(r),
            (EVENT_MESSAGE_EDITED, Some(r)) => Self::MessageEdited(r),
            (EVENT_MESSAGE_DELETED, Some(r)) => Self::MessageDeleted(r),
            (EVENT_INBOX_NEW, Some(r)) => Self::InboxNew(r),
            (EVENT_PRESENCE_ONLINE, Some(r)) => identity::presence_user(&r)
                .map(Self::PresenceOnline)
                .unwrap_or_else(other),
            (EVENT_PRESENCE_OFFLINE, Some(r)) => identity::presence_user(&r)
                .map(Self::PresenceOffline)
                .unwrap_or_else(other),
            _ => other(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::MessageNew(_) => EVENT_MESSAGE_NEW,
            Self::MessageEdited(_) => EVENT_MESSAGE_EDITED,
            Self::MessageDeleted(_) => EVENT_MESSAGE_DELETED,
            Self::InboxNew(_) => EVENT_INBOX_NEW,
            Self::PresenceOnline(_) => EVENT_PRESENCE_ONLINE,
            Self::PresenceOffline(_) => EVENT_PRESENCE_OFFLINE,
            Self::Other { name } => name,
        }
    }
}

/// Join/leave signals sent by the client. Never received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    UserJoin(UserId),
    UserLeave(UserId),
    Join(Scope),
    Leave(Scope),
}

impl ControlSignal {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::UserJoin(_) => SIGNAL_USER_JOIN,
            Self::UserLeave(_) => SIGNAL_USER_LEAVE,
            Self::Join(scope) => match scope.kind {
                ScopeKind::Conversation => SIGNAL_CONV_JOIN,
                ScopeKind::Channel => SIGNAL_CHANNEL_JOIN,
            },
            Self::Leave(scope) => match scope.kind {
                ScopeKind::Conversation => SIGNAL_CONV_LEAVE,
                ScopeKind::Channel => SIGNAL_CHANNEL_LEAVE,
            },
        }
    }

    /// The single numeric argument sent with the signal.
    pub fn payload(&self) -> Value {
        match self {
            Self::UserJoin(UserId(id)) | Self::UserLeave(UserId(id)) => Value::from(*id),
            Self::Join(scope) | Self::Leave(scope) => {
                let ThreadId(id) = scope.id;
                Value::from(id)
            }
        }
    }
}
