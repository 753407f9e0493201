use std::time::Duration;

use thiserror::Error;

use crate::engineio::PacketError;

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "websocket")]
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] PacketError),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Unsupported transport: {0}")]
    UnsupportedTransport(String),

    #[error("Connection closed: {0}")]
    Closed(String),

    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),
}

impl ConnectionError {
    /// Reason string reported to the application when a session ends.
    pub fn reason(&self) -> String {
        match self {
            Self::Closed(reason) => reason.clone(),
            other => other.to_string(),
        }
    }
}
