//! Engine.IO v4 / Socket.IO v5 text frame codec.
//!
//! Only the text packets a websocket-only client needs are supported:
//! binary attachments are rejected as protocol errors.
//!
//! An Engine.IO frame is a single type digit followed by its data. A
//! Socket.IO packet travels inside an Engine.IO `message` (type `4`) and
//! reads `<type>[<namespace>,][<ack id>][<json>]`, so a plain event on the
//! default namespace looks like `42["message:new",{...}]`.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{NetError, Result};

/// Handshake data sent by the server in the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    /// Interval between server pings, in milliseconds.
    pub ping_interval: u64,
    /// Grace period after a missed ping, in milliseconds.
    pub ping_timeout: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenInfo),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(frame: &str) -> Result<Self> {
        let mut chars = frame.chars();
        let kind = chars
            .next()
            .ok_or_else(|| NetError::Protocol("empty Engine.IO frame".into()))?;
        let data = chars.as_str();

        Ok(match kind {
            '0' => Self::Open(serde_json::from_str(data)?),
            '1' => Self::Close,
            '2' => Self::Ping(data.to_string()),
            '3' => Self::Pong(data.to_string()),
            '4' => Self::Message(data.to_string()),
            '5' => Self::Upgrade,
            '6' => Self::Noop,
            other => {
                return Err(NetError::Protocol(format!(
                    "unknown Engine.IO packet type {other:?}"
                )))
            }
        })
    }

    pub fn encode(&self) -> String {
        match self {
            // Clients never send `open`; encode it for completeness.
            Self::Open(info) => format!(
                "0{}",
                serde_json::json!({
                    "sid": info.sid,
                    "pingInterval": info.ping_interval,
                    "pingTimeout": info.ping_timeout,
                })
            ),
            Self::Close => "1".to_string(),
            Self::Ping(data) => format!("2{data}"),
            Self::Pong(data) => format!("3{data}"),
            Self::Message(data) => format!("4{data}"),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// Client: namespace connect with optional auth payload.
    /// Server: connect acknowledgement carrying the socket id.
    Connect(Option<Value>),
    Disconnect,
    Event {
        name: String,
        args: Vec<Value>,
        ack: Option<u64>,
    },
    Ack {
        id: u64,
        args: Vec<Value>,
    },
    ConnectError(Value),
}

impl SocketPacket {
    /// Build an event packet with a single argument.
    pub fn event(name: &str, payload: Value) -> Self {
        Self::Event {
            name: name.to_string(),
            args: vec![payload],
            ack: None,
        }
    }

    pub fn decode(data: &str) -> Result<Self> {
        let mut rest = data;
        let kind = rest
            .chars()
            .next()
            .ok_or_else(|| NetError::Protocol("empty Socket.IO packet".into()))?;
        rest = &rest[kind.len_utf8()..];

        // Namespace other than "/" is prefixed and comma-terminated.
        if rest.starts_with('/') {
            let end = rest
                .find(',')
                .ok_or_else(|| NetError::Protocol("unterminated namespace".into()))?;
            rest = &rest[end + 1..];
        }

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let ack = if digits > 0 {
            let id = rest[..digits]
                .parse::<u64>()
                .map_err(|e| NetError::Protocol(format!("bad ack id: {e}")))?;
            rest = &rest[digits..];
            Some(id)
        } else {
            None
        };

        let payload: Option<Value> = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str(rest)?)
        };

        match kind {
            '0' => Ok(Self::Connect(payload)),
            '1' => Ok(Self::Disconnect),
            '2' => {
                let mut items = match payload {
                    Some(Value::Array(items)) => items.into_iter(),
                    _ => return Err(NetError::Protocol("event without argument array".into())),
                };
                let name = match items.next() {
                    Some(Value::String(name)) => name,
                    _ => return Err(NetError::Protocol("event without name".into())),
                };
                Ok(Self::Event {
                    name,
                    args: items.collect(),
                    ack,
                })
            }
            '3' => {
                let id = ack.ok_or_else(|| NetError::Protocol("ack without id".into()))?;
                let args = match payload {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                };
                Ok(Self::Ack { id, args })
            }
            '4' => Ok(Self::ConnectError(payload.unwrap_or(Value::Null))),
            '5' | '6' => Err(NetError::Protocol(
                "binary Socket.IO packets are not supported".into(),
            )),
            other => Err(NetError::Protocol(format!(
                "unknown Socket.IO packet type {other:?}"
            ))),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Connect(None) => "0".to_string(),
            Self::Connect(Some(auth)) => format!("0{auth}"),
            Self::Disconnect => "1".to_string(),
            Self::Event { name, args, ack } => {
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                let ack = ack.map(|id| id.to_string()).unwrap_or_default();
                format!("2{ack}{}", Value::Array(items))
            }
            Self::Ack { id, args } => format!("3{id}{}", Value::Array(args.clone())),
            Self::ConnectError(data) => format!("4{data}"),
        }
    }

    /// Wrap as the Engine.IO frame that carries it.
    pub fn into_frame(self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }
}
