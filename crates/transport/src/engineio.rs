//! Engine.IO v4 / Socket.IO v5 text packet codec.
//!
//! Engine packets are a single type digit followed by an optional payload.
//! Socket packets ride inside engine `message` packets:
//!
//! ```text
//! 4 2 /ns, 12 ["event",{...}]
//! | |  |    |   +-- JSON data
//! | |  |    +------ optional ack id
//! | |  +----------- optional namespace (default "/")
//! | +-------------- socket packet type
//! +---------------- engine packet type
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub const DEFAULT_NAMESPACE: &str = "/";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("empty packet")]
    Empty,

    #[error("unknown packet type {0:?}")]
    UnknownType(char),

    #[error("binary packets are not supported")]
    Binary,

    #[error("invalid JSON payload: {0}")]
    InvalidJson(String),

    #[error("invalid event packet: {0}")]
    InvalidEvent(String),
}

/// Payload of the engine `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    Upgrade,
    Noop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        sid: Option<String>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        ack_id: Option<u64>,
        name: String,
        payload: Value,
    },
    Ack {
        namespace: String,
        ack_id: u64,
        args: Value,
    },
    ConnectError {
        namespace: String,
        message: String,
    },
}

impl EnginePacket {
    pub fn decode(text: &str) -> Result<Self, PacketError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(PacketError::Empty)?;
        let rest = chars.as_str();

        match kind {
            '0' => serde_json::from_str(rest)
                .map(Self::Open)
                .map_err(|e| PacketError::InvalidJson(e.to_string())),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping),
            '3' => Ok(Self::Pong),
            '4' => SocketPacket::decode(rest).map(Self::Message),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(PacketError::UnknownType(other)),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Open(handshake) => {
                format!("0{}", serde_json::to_string(handshake).unwrap_or_default())
            }
            Self::Close => "1".to_string(),
            Self::Ping => "2".to_string(),
            Self::Pong => "3".to_string(),
            Self::Message(packet) => format!("4{}", packet.encode()),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}

impl SocketPacket {
    /// Namespace connect request for the default namespace (`40`).
    pub fn connect_default() -> Self {
        Self::Connect {
            namespace: DEFAULT_NAMESPACE.to_string(),
            sid: None,
        }
    }

    pub fn decode(text: &str) -> Result<Self, PacketError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(PacketError::Empty)?;
        match kind {
            '0'..='4' => {}
            '5' | '6' => return Err(PacketError::Binary),
            other => return Err(PacketError::UnknownType(other)),
        }
        let rest = chars.as_str();

        let (namespace, rest) = match rest.strip_prefix('/') {
            Some(_) => match rest.find(',') {
                Some(idx) => (rest[..idx].to_string(), &rest[idx + 1..]),
                None => (rest.to_string(), ""),
            },
            None => (DEFAULT_NAMESPACE.to_string(), rest),
        };

        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let ack_id = rest[..digits].parse::<u64>().ok();
        let data = &rest[digits..];
        let value = if data.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str::<Value>(data)
                    .map_err(|e| PacketError::InvalidJson(e.to_string()))?,
            )
        };

        match kind {
            '0' => Ok(Self::Connect {
                namespace,
                sid: value
                    .as_ref()
                    .and_then(|v| v.get("sid"))
                    .and_then(Value::as_str)
                    .map(String::from),
            }),
            '1' => Ok(Self::Disconnect { namespace }),
            '2' => {
                let mut args = match value {
                    Some(Value::Array(args)) => args.into_iter(),
                    _ => return Err(PacketError::InvalidEvent("expected array".into())),
                };
                let name = match args.next() {
                    Some(Value::String(name)) => name,
                    _ => return Err(PacketError::InvalidEvent("missing event name".into())),
                };
                Ok(Self::Event {
                    namespace,
                    ack_id,
                    name,
                    payload: args.next().unwrap_or(Value::Null),
                })
            }
            '3' => Ok(Self::Ack {
                namespace,
                ack_id: ack_id
                    .ok_or_else(|| PacketError::InvalidEvent("ack without id".into()))?,
                args: value.unwrap_or(Value::Null),
            }),
            '4' => Ok(Self::ConnectError {
                namespace,
                message: match value {
                    Some(Value::String(message)) => message,
                    Some(v) => v
                        .get("message")
                        .and_then(Value::as_str)
                        .map(String::from)
                        .unwrap_or_else(|| v.to_string()),
                    None => "connect error".to_string(),
                },
            }),
            _ => Err(PacketError::UnknownType(kind)),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Connect { namespace, sid } => {
                let data = sid
                    .as_ref()
                    .map(|sid| json!({ "sid": sid }).to_string())
                    .unwrap_or_default();
                format!("0{}{}", namespace_prefix(namespace), data)
            }
            Self::Disconnect { namespace } => format!("1{}", namespace_prefix(namespace)),
            Self::Event {
                namespace,
                ack_id,
                name,
                payload,
            } => {
                let args = if payload.is_null() {
                    json!([name])
                } else {
                    json!([name, payload])
                };
                format!(
                    "2{}{}{}",
                    namespace_prefix(namespace),
                    ack_id.map(|id| id.to_string()).unwrap_or_default(),
                    args
                )
            }
            Self::Ack {
                namespace,
                ack_id,
                args,
            } => format!("3{}{}{}", namespace_prefix(namespace), ack_id, args),
            Self::ConnectError { namespace, message } => format!(
                "4{}{}",
                namespace_prefix(namespace),
                json!({ "message": message })
            ),
        }
    }
}

fn namespace_prefix(namespace: &str) -> String {
    if namespace == DEFAULT_NAMESPACE {
        String::new()
    } else {
        format!("{},", namespace)
    }
}
