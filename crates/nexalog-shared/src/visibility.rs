//! Decides whether a pushed record belongs to the thread currently on screen.

use crate::identity;
use crate::protocol::RawRecord;
use crate::types::{Scope, UserId};

/// Return `true` when `raw` should be shown in the current view.
///
/// An explicit thread identity in the record is authoritative. Payloads
/// without one fall back to matching the {sender, recipient} pair against
/// {me, current peer} in either direction. Anything unresolvable is hidden.
pub fn is_visible(
    raw: &RawRecord,
    current: Option<Scope>,
    current_peer: Option<UserId>,
    me: Option<UserId>,
) -> bool {
    if let Some(scope) = current {
        if let Some(thread) = identity::thread_id(raw, scope.kind) {
            return thread == scope.id;
        }
    }

    let (Some(peer), Some(me)) = (current_peer, me) else {
        return false;
    };
    let (Some(from), Some(to)) = (identity::sender_id(raw), identity::recipient_id(raw)) else {
        return false;
    };

    (from == peer && to == me) || (from == me && to == peer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ThreadId;
    use serde_json::json;

    fn raw(v: serde_json::Value) -> RawRecord {
        RawRecord::from_value(v).unwrap()
    }

    #[test]
    fn test_explicit_conversation_is_authoritative() {
        let scope = Some(Scope::conversation(ThreadId(5)));
        let me = Some(UserId(3));
        let peer = Some(UserId(7));

        assert!(is_visible(&raw(json!({ "ID_Conversation": 5 })), scope, peer, me));
        // Matching pair does not rescue a record addressed elsewhere.
        let elsewhere = raw(json!({ "conversationId": 6, "fromId": 7, "toId": 3 }));
        assert!(!is_visible(&elsewhere, scope, peer, me));
    }

    #[test]
    fn test_fallback_sender_recipient_pair() {
        let scope = Some(Scope::conversation(ThreadId(5)));
        let me = Some(UserId(3));
        let event = raw(json!({ "fromId": 7, "toId": 3 }));

        assert!(is_visible(&event, scope, Some(UserId(7)), me));
        assert!(!is_visible(&event, scope, Some(UserId(9)), me));

        let mine = raw(json!({ "ID_Sender": 3, "ID_Recipient": 7 }));
        assert!(is_visible(&mine, scope, Some(UserId(7)), me));
    }

    #[test]
    fn test_fallback_while_conversation_unresolved() {
        let event = raw(json!({ "fromId": 7, "toId": 3 }));
        assert!(is_visible(&event, None, Some(UserId(7)), Some(UserId(3))));
    }

    #[test]
    fn test_fails_closed() {
        let scope = Some(Scope::conversation(ThreadId(5)));
        let only_sender = raw(json!({ "fromId": 7 }));
        assert!(!is_visible(&only_sender, scope, Some(UserId(7)), Some(UserId(3))));

        let pair = raw(json!({ "fromId": 7, "toId": 3 }));
        assert!(!is_visible(&pair, scope, None, Some(UserId(3))));
        assert!(!is_visible(&pair, scope, Some(UserId(7)), None));
    }

    #[test]
    fn test_channel_scope_uses_channel_fields() {
        let scope = Some(Scope::channel(ThreadId(2)));
        assert!(is_visible(&raw(json!({ "ID_Channel": 2 })), scope, None, None));
        assert!(!is_visible(&raw(json!({ "channelId": 4 })), scope, None, None));
        assert!(!is_visible(&raw(json!({ "ID_Conversation": 2 })), scope, None, None));
    }
}
