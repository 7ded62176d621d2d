//! REST backend adapter.
//!
//! The session layer only talks to the [`Backend`] trait; [`RestBackend`] is
//! the `reqwest` implementation used against the real service. Every request
//! carries `Authorization: Bearer <token>`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde_json::{json, Value};
use tracing::debug;

use nexalog_shared::identity::{self, as_identity};
use nexalog_shared::{RawRecord, Scope, ScopeKind, ThreadId, UserId};

use crate::error::{NetError, Result};

/// Bounds of a message page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: u32,
    /// Only return messages older than this durable identity.
    pub before: Option<i64>,
}

/// Operations the client core needs from the backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Identity of the authenticated user.
    async fn fetch_me(&self) -> Result<UserId>;

    /// Resolve (or create) the direct conversation with `peer`.
    async fn resolve_conversation(&self, peer: UserId) -> Result<ThreadId>;

    /// Fetch one page of messages, newest first or in any order.
    async fn fetch_page(&self, scope: Scope, page: PageRequest) -> Result<Vec<RawRecord>>;

    /// Store a new message. Returns the stored record when the backend
    /// echoes it back.
    async fn send_message(&self, scope: Scope, content: &str) -> Result<Option<RawRecord>>;

    /// One page of accepted friends.
    async fn fetch_friends(&self, page: u32, limit: u32) -> Result<Vec<RawRecord>>;
}

/// [`Backend`] over the service's HTTP routes.
#[derive(Clone)]
pub struct RestBackend {
    http: reqwest::Client,
    base: String,
    token: String,
}

impl RestBackend {
    pub fn new(api_base: &str, token: &str, timeout: Duration) -> Result<Self> {
        let base = api_base.trim().trim_end_matches('/').to_string();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(NetError::InvalidUrl(api_base.to_string()));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base,
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        debug!(path, "GET");
        let resp = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        read_json(resp).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        debug!(path, "POST");
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;
        read_json(resp).await
    }
}

#[async_trait]
impl Backend for RestBackend {
    async fn fetch_me(&self) -> Result<UserId> {
        let body = self.get_json("/api/user/me").await?;
        extract_me(&body).ok_or(NetError::MissingField("ID_USER"))
    }

    async fn resolve_conversation(&self, peer: UserId) -> Result<ThreadId> {
        let body = self
            .get_json(&format!("/api/chat/conversations/by-user/{peer}"))
            .await?;
        extract_conversation_id(&body).ok_or(NetError::MissingField("conversationId"))
    }

    async fn fetch_page(&self, scope: Scope, page: PageRequest) -> Result<Vec<RawRecord>> {
        let body = match scope.kind {
            ScopeKind::Conversation => {
                let mut path = format!(
                    "/api/chat/conversations/{}/messages?limit={}",
                    scope.id, page.limit
                );
                if let Some(before) = page.before {
                    path.push_str(&format!("&beforeId={before}"));
                }
                self.get_json(&path).await?
            }
            ScopeKind::Channel => {
                let mut req = json!({ "channelId": scope.id, "limit": page.limit });
                if let Some(before) = page.before {
                    req["beforeId"] = json!(before);
                }
                self.post_json("/api/channel-message/recent", &req).await?
            }
        };
        Ok(extract_list(&body, "messages"))
    }

    async fn send_message(&self, scope: Scope, content: &str) -> Result<Option<RawRecord>> {
        let body = match scope.kind {
            ScopeKind::Conversation => {
                self.post_json(
                    &format!("/api/chat/conversations/{}/messages", scope.id),
                    &json!({ "content": content }),
                )
                .await?
            }
            ScopeKind::Channel => {
                self.post_json(
                    "/api/channel-message/send",
                    &json!({ "channelId": scope.id, "content": content }),
                )
                .await?
            }
        };
        Ok(extract_sent(body))
    }

    async fn fetch_friends(&self, page: u32, limit: u32) -> Result<Vec<RawRecord>> {
        let body = self
            .get_json(&format!("/api/friends/myFriends?page={page}&limit={limit}"))
            .await?;
        Ok(extract_list(&body, "friends"))
    }
}

async fn read_json(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    let text = resp.text().await?;

    if !status.is_success() {
        return Err(NetError::Status {
            status: status.as_u16(),
            message: error_message(&text)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
        });
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

/// The `message` field of an error body, if any.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("message")?.as_str().map(str::to_string)
}

fn extract_me(body: &Value) -> Option<UserId> {
    body.pointer("/user/ID_USER")
        .or_else(|| body.get("ID_USER"))
        .and_then(as_identity)
        .map(UserId)
}

fn extract_conversation_id(body: &Value) -> Option<ThreadId> {
    ["conversationId", "ID_Conversation"]
        .iter()
        .filter_map(|key| body.get(*key))
        .find_map(as_identity)
        .map(ThreadId)
}

/// Object items of `body[key]`, or of `body` itself when it is an array.
fn extract_list(body: &Value, key: &str) -> Vec<RawRecord> {
    let items = match body {
        Value::Array(items) => Some(items),
        other => other.get(key).and_then(Value::as_array),
    };
    items
        .map(|items| {
            items
                .iter()
                .cloned()
                .filter_map(RawRecord::from_value)
                .collect()
        })
        .unwrap_or_default()
}

/// The stored message echoed by a send, under `message` / `data` or at the
/// top level. Only records with a message identity count.
fn extract_sent(body: Value) -> Option<RawRecord> {
    let mut record = RawRecord::from_value(body)?;
    for key in ["message", "data"] {
        if let Some(Value::Object(inner)) = record.0.remove(key) {
            let inner = RawRecord::from(inner);
            if identity::message_id(&inner).is_some() {
                return Some(inner);
            }
        }
    }
    identity::message_id(&record).map(|_| record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_me_shapes() {
        assert_eq!(extract_me(&json!({ "user": { "ID_USER": 3 } })), Some(UserId(3)));
        assert_eq!(extract_me(&json!({ "ID_USER": "4" })), Some(UserId(4)));
        assert_eq!(extract_me(&json!({ "user": {} })), None);
    }

    #[test]
    fn test_extract_conversation_id() {
        assert_eq!(extract_conversation_id(&json!({ "conversationId": 5 })), Some(ThreadId(5)));
        assert_eq!(extract_conversation_id(&json!({ "ID_Conversation": 6 })), Some(ThreadId(6)));
        assert_eq!(extract_conversation_id(&json!({})), None);
    }

    #[test]
    fn test_extract_list() {
        let body = json!({ "messages": [{ "id": 1 }, 7, { "id": 2 }] });
        assert_eq!(extract_list(&body, "messages").len(), 2);
        assert_eq!(extract_list(&json!([{ "id": 1 }]), "messages").len(), 1);
        assert!(extract_list(&json!({ "other": [] }), "messages").is_empty());
    }

    #[test]
    fn test_extract_sent() {
        let nested = extract_sent(json!({ "message": { "ID_Message": 42, "content": "hi" } })).unwrap();
        assert_eq!(nested.get_path("content"), Some(&json!("hi")));

        let flat = extract_sent(json!({ "ID_Message": 43, "content": "yo" }));
        assert!(flat.is_some());

        assert!(extract_sent(json!({ "message": "Saved" })).is_none());
        assert!(extract_sent(json!({ "ok": true })).is_none());
    }

    #[test]
    fn test_error_message() {
        assert_eq!(error_message(r#"{"message":"Forbidden"}"#).as_deref(), Some("Forbidden"));
        assert_eq!(error_message("<html>"), None);
    }

    #[test]
    fn test_rest_backend_rejects_bad_base() {
        assert!(RestBackend::new("localhost:4000", "t", Duration::from_secs(1)).is_err());
        assert!(RestBackend::new("http://localhost:4000/", "t", Duration::from_secs(1)).is_ok());
    }
}
