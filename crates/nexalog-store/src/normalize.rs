//! Maps raw REST items and push payloads into canonical [`Message`]s.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rand::Rng;
use serde_json::Value;
use tracing::debug;

use nexalog_shared::constants::TEMP_ID_PREFIX;
use nexalog_shared::identity::{self, CONTENT_FIELDS, CREATED_AT_FIELDS};
use nexalog_shared::{MessageId, RawRecord, ThreadId, UserId};

use crate::models::{Author, FriendEntry, Message};

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const TEMP_SUFFIX_LEN: usize = 10;

/// Values the normalizer falls back to when a record omits them.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext {
    /// Thread currently open; assigned to records without a thread identity.
    pub current_thread: Option<ThreadId>,
    /// Used for missing or unparseable timestamps and for minted identities.
    pub now: DateTime<Utc>,
}

impl NormalizeContext {
    pub fn new(current_thread: Option<ThreadId>) -> Self {
        Self {
            current_thread,
            now: Utc::now(),
        }
    }
}

/// Build a canonical message from a raw record.
pub fn normalize(raw: &RawRecord, ctx: &NormalizeContext) -> Message {
    let id = identity::message_id(raw).unwrap_or_else(|| mint_temporary_id(ctx.now));

    let created_at = raw
        .first_of(CREATED_AT_FIELDS, parse_timestamp)
        .unwrap_or_else(|| {
            debug!(id = %id, "Record without usable timestamp, defaulting to now");
            ctx.now
        });

    Message {
        id,
        thread_id: identity::any_thread_id(raw).or(ctx.current_thread),
        sender_id: identity::sender_id(raw),
        recipient_id: identity::recipient_id(raw),
        content: raw
            .first_of(CONTENT_FIELDS, |v| v.as_str().map(str::to_string))
            .unwrap_or_default(),
        created_at,
        edited: flag(raw, "edited"),
        deleted: flag(raw, "deleted"),
        optimistic: flag(raw, "optimistic"),
        author: author(raw),
    }
}

/// Mint a provisional identity: `tmp-<unix millis>-<random base36>`.
///
/// The random suffix keeps two sends within the same millisecond apart.
pub fn mint_temporary_id(now: DateTime<Utc>) -> MessageId {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..TEMP_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    MessageId::Temporary(format!(
        "{TEMP_ID_PREFIX}{}-{suffix}",
        now.timestamp_millis()
    ))
}

/// Parse an RFC 3339 string, a `YYYY-MM-DD HH:MM:SS` string (taken as UTC)
/// or a Unix timestamp in milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                        .ok()
                        .map(|naive| naive.and_utc())
                })
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

/// Build a friend-list row from a `/api/friends/myFriends` item.
pub fn friend_entry(raw: &RawRecord) -> Option<FriendEntry> {
    let user_id = raw
        .first_of(&["user.ID_USER", "ID_USER", "userId"], identity::as_identity)
        .map(UserId)?;

    Some(FriendEntry {
        user_id,
        username: raw.first_of(&["user.username", "username"], |v| {
            v.as_str().map(str::to_string)
        }),
        last_activity_at: raw.first_of(&["lastActivityAt"], parse_timestamp),
    })
}

fn flag(raw: &RawRecord, field: &str) -> bool {
    match raw.get_path(field) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    }
}

fn author(raw: &RawRecord) -> Option<Author> {
    let text = |candidates: &[&str]| raw.first_of(candidates, |v| v.as_str().map(str::to_string));

    let username = text(&["user.username", "User.username", "username"]);
    let avatar = text(&["user.avatar", "User.avatar", "avatar"]).filter(|a| !a.is_empty());

    match (username, avatar) {
        (None, None) => None,
        (username, avatar) => Some(Author {
            username: username.unwrap_or_else(|| "unknown".to_string()),
            avatar,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(v: Value) -> RawRecord {
        RawRecord::from_value(v).unwrap()
    }

    fn ctx() -> NormalizeContext {
        NormalizeContext {
            current_thread: Some(ThreadId(5)),
            now: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_normalize_conversation_item() {
        let m = normalize(
            &raw(json!({
                "ID_Message": 42,
                "ID_Conversation": 5,
                "ID_Sender": 7,
                "content": "hi",
                "createdAt": "2024-05-01T10:00:00.000Z",
                "edited": 1,
            })),
            &ctx(),
        );

        assert_eq!(m.id, MessageId::Durable(42));
        assert_eq!(m.thread_id, Some(ThreadId(5)));
        assert_eq!(m.sender_id, Some(UserId(7)));
        assert_eq!(m.content, "hi");
        assert_eq!(m.created_at, Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        assert!(m.edited);
        assert!(!m.deleted);
        assert!(!m.optimistic);
    }

    #[test]
    fn test_normalize_channel_item() {
        let m = normalize(
            &raw(json!({
                "ID_Channel_message": 9,
                "ID_Channel": 2,
                "message": "yo",
                "created_at": "2024-05-01 09:30:00",
                "user": { "ID_USER": 11, "username": "ala", "avatar": "" },
            })),
            &ctx(),
        );

        assert_eq!(m.id, MessageId::Durable(9));
        assert_eq!(m.thread_id, Some(ThreadId(2)));
        assert_eq!(m.sender_id, Some(UserId(11)));
        assert_eq!(m.content, "yo");
        assert_eq!(
            m.author,
            Some(Author {
                username: "ala".into(),
                avatar: None
            })
        );
    }

    #[test]
    fn test_defaults_for_sparse_record() {
        let c = ctx();
        let m = normalize(&raw(json!({ "text": "hello" })), &c);

        assert!(m.id.is_temporary());
        assert_eq!(m.thread_id, Some(ThreadId(5)));
        assert_eq!(m.created_at, c.now);
        assert_eq!(m.content, "hello");
        assert_eq!(m.author, None);
    }

    #[test]
    fn test_unparseable_timestamp_defaults_to_now() {
        let c = ctx();
        let m = normalize(&raw(json!({ "id": 1, "createdAt": "yesterday" })), &c);
        assert_eq!(m.created_at, c.now);
    }

    #[test]
    fn test_minted_ids_do_not_collide() {
        let now = Utc::now();
        let a = mint_temporary_id(now);
        let b = mint_temporary_id(now);
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("tmp-"));
    }

    #[test]
    fn test_friend_entry() {
        let f = friend_entry(&raw(json!({
            "user": { "ID_USER": 4, "username": "ola" },
            "lastActivityAt": "2024-05-01T10:00:00Z",
        })))
        .unwrap();

        assert_eq!(f.user_id, UserId(4));
        assert_eq!(f.username.as_deref(), Some("ola"));
        assert!(f.last_activity_at.is_some());

        assert!(friend_entry(&raw(json!({ "user": {} }))).is_none());
    }
}
