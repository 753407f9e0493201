pub mod engineio;
pub mod error;
pub mod manager;

#[cfg(feature = "websocket")]
pub mod websocket;

// Re-exports for convenience
pub use error::ConnectionError;
pub use manager::{
    ConnectionConfig, ConnectionEvent, ConnectionHandle, ConnectionManager, ConnectionState,
    Connector, RawEvent, Session,
};
#[cfg(feature = "websocket")]
pub use websocket::SocketIoConnector;
