use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use geosolve_core::config::TransportKind;

use crate::engineio::{EnginePacket, SocketPacket};
use crate::error::ConnectionError;
use crate::manager::{ConnectionConfig, Connector, RawEvent, Session};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens Socket.IO sessions over a websocket.
pub struct SocketIoConnector {
    endpoint: Url,
    transports: Vec<TransportKind>,
}

impl SocketIoConnector {
    pub fn new(config: &ConnectionConfig) -> Result<Self, ConnectionError> {
        Ok(Self {
            endpoint: websocket_endpoint(&config.server_url, &config.path)?,
            transports: config.transports.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn connect_websocket(&self) -> Result<SocketIoSession, ConnectionError> {
        debug!("Opening websocket {}", self.endpoint);
        let (mut ws, _) = tokio_tungstenite::connect_async(self.endpoint.as_str()).await?;

        let handshake = match next_packet(&mut ws).await? {
            EnginePacket::Open(handshake) => handshake,
            other => {
                return Err(ConnectionError::Handshake(format!(
                    "expected open packet, got {:?}",
                    other
                )))
            }
        };

        ws.send(Message::Text(
            EnginePacket::Message(SocketPacket::connect_default())
                .encode()
                .into(),
        ))
        .await?;

        let sid = loop {
            match next_packet(&mut ws).await? {
                EnginePacket::Message(SocketPacket::Connect { sid, .. }) => {
                    break sid.unwrap_or_else(|| handshake.sid.clone());
                }
                EnginePacket::Message(SocketPacket::ConnectError { message, .. }) => {
                    return Err(ConnectionError::Handshake(message));
                }
                EnginePacket::Ping => {
                    ws.send(Message::Text(EnginePacket::Pong.encode().into()))
                        .await?;
                }
                EnginePacket::Noop => {}
                other => {
                    return Err(ConnectionError::Handshake(format!(
                        "unexpected packet {:?}",
                        other
                    )))
                }
            }
        };

        info!("Socket.IO session {} open on {}", sid, self.endpoint);
        Ok(SocketIoSession {
            ws,
            sid,
            liveness: Duration::from_millis(handshake.ping_interval + handshake.ping_timeout),
        })
    }
}

#[async_trait]
impl Connector for SocketIoConnector {
    async fn connect(&self) -> Result<Box<dyn Session>, ConnectionError> {
        let mut last_err = None;

        for transport in &self.transports {
            match transport {
                TransportKind::Websocket => match self.connect_websocket().await {
                    Ok(session) => return Ok(Box::new(session)),
                    Err(e) => {
                        debug!("Websocket transport failed: {}", e);
                        last_err = Some(e);
                    }
                },
                TransportKind::Polling => {
                    warn!("Polling transport is not supported, skipping");
                    if last_err.is_none() {
                        last_err = Some(ConnectionError::UnsupportedTransport("polling".into()));
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ConnectionError::UnsupportedTransport("none configured".into())))
    }
}

pub struct SocketIoSession {
    ws: WsStream,
    sid: String,
    /// Longest silence tolerated before the server is considered gone.
    liveness: Duration,
}

#[async_trait]
impl Session for SocketIoSession {
    fn sid(&self) -> &str {
        &self.sid
    }

    async fn next_event(&mut self) -> Result<RawEvent, ConnectionError> {
        loop {
            let packet = match tokio::time::timeout(self.liveness, next_packet(&mut self.ws)).await {
                Ok(packet) => packet,
                Err(_) => return Err(ConnectionError::Closed("ping timeout".into())),
            };

            let packet = match packet {
                Ok(packet) => packet,
                Err(ConnectionError::Protocol(e)) => {
                    warn!("Dropping undecodable packet: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            match packet {
                EnginePacket::Ping => {
                    self.ws
                        .send(Message::Text(EnginePacket::Pong.encode().into()))
                        .await?;
                }
                EnginePacket::Close => {
                    return Err(ConnectionError::Closed("transport close".into()));
                }
                EnginePacket::Message(SocketPacket::Event { name, payload, .. }) => {
                    return Ok(RawEvent { name, payload });
                }
                EnginePacket::Message(SocketPacket::Disconnect { .. }) => {
                    return Err(ConnectionError::Closed("io server disconnect".into()));
                }
                other => debug!("Ignoring packet {:?}", other),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self
            .ws
            .send(Message::Text(EnginePacket::Close.encode().into()))
            .await;
        let _ = self.ws.close(None).await;
    }
}

/// Read frames until the next text packet.
async fn next_packet(ws: &mut WsStream) -> Result<EnginePacket, ConnectionError> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return Ok(EnginePacket::decode(text.as_str())?),
            Some(Ok(Message::Close(_))) | None => {
                return Err(ConnectionError::Closed("transport close".into()))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

/// `http(s)://host[:port]` becomes `ws(s)://host[:port]{path}?EIO=4&transport=websocket`.
pub fn websocket_endpoint(server_url: &str, path: &str) -> Result<Url, ConnectionError> {
    let mut url =
        Url::parse(server_url).map_err(|e| ConnectionError::InvalidUrl(format!("{}: {}", server_url, e)))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ConnectionError::InvalidUrl(format!(
                "unsupported scheme {}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ConnectionError::InvalidUrl(server_url.to_string()))?;
    url.set_path(path);
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url)
}
