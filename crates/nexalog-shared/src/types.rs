use serde::{Deserialize, Serialize};

use crate::constants::TEMP_ID_PREFIX;

// Backend user identity (`ID_USER`)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a message thread: a direct conversation or a server channel.
/// Both kinds share the same merge semantics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ThreadId(pub i64);

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message identity.
///
/// Durable identities are assigned by the backend. Temporary identities are
/// minted locally for optimistic entries and always carry [`TEMP_ID_PREFIX`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Durable(i64),
    Temporary(String),
}

impl MessageId {
    /// Wrap a locally generated token as a temporary identity, adding the
    /// prefix if the token does not already carry it.
    pub fn temporary(token: impl Into<String>) -> Self {
        let token = token.into();
        if token.starts_with(TEMP_ID_PREFIX) {
            Self::Temporary(token)
        } else {
            Self::Temporary(format!("{TEMP_ID_PREFIX}{token}"))
        }
    }

    pub fn is_durable(&self) -> bool {
        matches!(self, Self::Durable(_))
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    pub fn as_durable(&self) -> Option<i64> {
        match self {
            Self::Durable(id) => Some(*id),
            Self::Temporary(_) => None,
        }
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Durable(id) => write!(f, "{id}"),
            Self::Temporary(token) => f.write_str(token),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Conversation,
    Channel,
}

/// The thread currently open in a view.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub kind: ScopeKind,
    pub id: ThreadId,
}

impl Scope {
    pub fn conversation(id: ThreadId) -> Self {
        Self {
            kind: ScopeKind::Conversation,
            id,
        }
    }

    pub fn channel(id: ThreadId) -> Self {
        Self {
            kind: ScopeKind::Channel,
            id,
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ScopeKind::Conversation => write!(f, "conversation:{}", self.id),
            ScopeKind::Channel => write!(f, "channel:{}", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temporary_id_gets_prefix_once() {
        let a = MessageId::temporary("123-abc");
        let b = MessageId::temporary("tmp-123-abc");
        assert_eq!(a, b);
        assert!(a.is_temporary());
        assert_eq!(a.as_durable(), None);
    }

    #[test]
    fn test_message_id_serializes_untagged() {
        let durable = serde_json::to_value(MessageId::Durable(42)).unwrap();
        assert_eq!(durable, serde_json::json!(42));

        let temp = serde_json::to_value(MessageId::temporary("1")).unwrap();
        assert_eq!(temp, serde_json::json!("tmp-1"));
    }
}
