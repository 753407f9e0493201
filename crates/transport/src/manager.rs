//! Connection Manager: owns the realtime channel lifecycle.
//!
//! One background task connects through a [`Connector`], forwards every
//! inbound event to the application and applies the reconnection policy when
//! the session ends or a connect attempt fails. Lifecycle changes are
//! reported both as [`ConnectionEvent`]s on the application channel and as the
//! current [`ConnectionState`] on a watch channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use geosolve_core::config::{ConnectionSettings, TransportKind};

use crate::error::ConnectionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub server_url: String,
    pub path: String,
    pub transports: Vec<TransportKind>,
    pub reconnection: bool,
    pub reconnection_attempts: u32,
    pub reconnection_delay: Duration,
    pub reconnection_delay_max: Duration,
    pub timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self::from_settings(server_url, &ConnectionSettings::default())
    }

    pub fn from_settings(server_url: impl Into<String>, settings: &ConnectionSettings) -> Self {
        Self {
            server_url: server_url.into(),
            path: settings.path.clone(),
            transports: settings.transports.clone(),
            reconnection: settings.reconnection,
            reconnection_attempts: settings.reconnection_attempts,
            reconnection_delay: Duration::from_millis(settings.reconnection_delay_ms),
            reconnection_delay_max: Duration::from_millis(settings.reconnection_delay_max_ms),
            timeout: Duration::from_millis(settings.timeout_ms),
        }
    }

    /// Delay before reconnect attempt `attempt` (1-based):
    /// `min(delay * 2^(attempt-1), delay_max)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.reconnection_delay
            .saturating_mul(factor)
            .min(self.reconnection_delay_max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connected { sid: String },
    Disconnected { reason: String },
    ReconnectAttempt { attempt: u32, max: u32 },
    Reconnected { attempt: u32 },
    ConnectError { message: String },
    ReconnectFailed,
    Message { name: String, payload: Value },
}

/// A named event received on an open session.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub name: String,
    pub payload: Value,
}

/// An established realtime session.
#[async_trait]
pub trait Session: Send {
    fn sid(&self) -> &str;

    /// Wait for the next inbound event. An error ends the session; its
    /// [`ConnectionError::reason`] is reported as the disconnect reason.
    async fn next_event(&mut self) -> Result<RawEvent, ConnectionError>;

    async fn close(&mut self);
}

/// Opens sessions. Implemented over websockets in production and scripted in
/// tests.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Session>, ConnectionError>;
}

pub struct ConnectionManager<C> {
    config: ConnectionConfig,
    connector: C,
}

impl<C: Connector + 'static> ConnectionManager<C> {
    pub fn new(config: ConnectionConfig, connector: C) -> Self {
        Self { config, connector }
    }

    /// Start the connection loop. Events are delivered on `events` until the
    /// loop gives up, the handle disconnects, or the receiver is dropped.
    pub fn spawn(self, events: mpsc::UnboundedSender<ConnectionEvent>) -> ConnectionHandle {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let state_tx = Arc::new(state_tx);
        let task = tokio::spawn(self.run(events, state_tx.clone()));

        ConnectionHandle {
            state_tx,
            state_rx,
            task,
        }
    }

    async fn run(
        self,
        events: mpsc::UnboundedSender<ConnectionEvent>,
        state: Arc<watch::Sender<ConnectionState>>,
    ) {
        let max = self.config.reconnection_attempts;
        let mut attempt = 0u32;

        loop {
            if attempt == 0 {
                state.send_replace(ConnectionState::Connecting);
            } else {
                state.send_replace(ConnectionState::Reconnecting);
                info!("Reconnect attempt {}/{}", attempt, max);
                if events
                    .send(ConnectionEvent::ReconnectAttempt { attempt, max })
                    .is_err()
                {
                    return;
                }
            }

            let outcome = match tokio::time::timeout(self.config.timeout, self.connector.connect())
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ConnectionError::Timeout(self.config.timeout)),
            };

            match outcome {
                Ok(mut session) => {
                    let sid = session.sid().to_string();
                    info!("Realtime channel connected (sid={})", sid);
                    state.send_replace(ConnectionState::Connected);

                    if attempt > 0 {
                        let _ = events.send(ConnectionEvent::Reconnected { attempt });
                    }
                    if events.send(ConnectionEvent::Connected { sid }).is_err() {
                        session.close().await;
                        return;
                    }
                    attempt = 0;

                    let reason = match Self::pump(session.as_mut(), &events).await {
                        Some(reason) => reason,
                        None => {
                            debug!("Event receiver dropped, closing session");
                            session.close().await;
                            return;
                        }
                    };

                    warn!("Realtime channel disconnected: {}", reason);
                    state.send_replace(ConnectionState::Disconnected);
                    if events
                        .send(ConnectionEvent::Disconnected { reason })
                        .is_err()
                    {
                        return;
                    }
                }
                Err(e) => {
                    warn!("Connect failed: {}", e);
                    if events
                        .send(ConnectionEvent::ConnectError {
                            message: e.to_string(),
                        })
                        .is_err()
                    {
                        return;
                    }
                }
            }

            if !self.config.reconnection {
                state.send_replace(ConnectionState::Disconnected);
                return;
            }

            attempt += 1;
            if attempt > max {
                warn!("Giving up after {} reconnect attempts", max);
                state.send_replace(ConnectionState::Disconnected);
                let _ = events.send(ConnectionEvent::ReconnectFailed);
                return;
            }

            let delay = self.config.backoff(attempt);
            debug!("Reconnecting in {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }

    /// Forward events until the session ends. Returns the end reason, or
    /// `None` if the application stopped listening.
    async fn pump(
        session: &mut dyn Session,
        events: &mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Option<String> {
        loop {
            match session.next_event().await {
                Ok(RawEvent { name, payload }) => {
                    debug!("Received event {}", name);
                    if events
                        .send(ConnectionEvent::Message { name, payload })
                        .is_err()
                    {
                        return None;
                    }
                }
                Err(e) => return Some(e.reason()),
            }
        }
    }
}

/// Handle to a running connection loop.
pub struct ConnectionHandle {
    state_tx: Arc<watch::Sender<ConnectionState>>,
    state_rx: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Stop the loop and drop the session.
    pub fn disconnect(&self) {
        self.task.abort();
        self.state_tx.send_replace(ConnectionState::Disconnected);
        info!("Realtime channel closed by client");
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    enum Step {
        Fail(&'static str),
        Hang,
        Open(Vec<RawEvent>, &'static str),
    }

    struct ScriptedConnector {
        steps: Mutex<VecDeque<Step>>,
    }

    impl ScriptedConnector {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: Mutex::new(steps.into()),
            }
        }
    }

    struct ScriptedSession {
        events: VecDeque<RawEvent>,
        end: &'static str,
    }

    #[async_trait]
    impl Session for ScriptedSession {
        fn sid(&self) -> &str {
            "sid-1"
        }

        async fn next_event(&mut self) -> Result<RawEvent, ConnectionError> {
            match self.events.pop_front() {
                Some(ev) => Ok(ev),
                None => Err(ConnectionError::Closed(self.end.to_string())),
            }
        }

        async fn close(&mut self) {}
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self) -> Result<Box<dyn Session>, ConnectionError> {
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Open(events, end)) => Ok(Box::new(ScriptedSession {
                    events: events.into(),
                    end,
                })),
                Some(Step::Hang) => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                Some(Step::Fail(msg)) => Err(ConnectionError::Handshake(msg.to_string())),
                None => Err(ConnectionError::Handshake("refused".to_string())),
            }
        }
    }

    fn config(attempts: u32) -> ConnectionConfig {
        let mut config = ConnectionConfig::new("http://localhost:8000");
        config.reconnection_attempts = attempts;
        config
    }

    async fn collect(mut rx: mpsc::UnboundedReceiver<ConnectionEvent>) -> Vec<ConnectionEvent> {
        let mut out = Vec::new();
        while let Some(ev) = rx.recv().await {
            out.push(ev);
        }
        out
    }

    fn event(name: &str) -> RawEvent {
        RawEvent {
            name: name.to_string(),
            payload: json!({"task_id": "t1"}),
        }
    }

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::new("http://localhost:8000");
        assert_eq!(config.path, "/socket.io/");
        assert_eq!(
            config.transports,
            vec![TransportKind::Websocket, TransportKind::Polling]
        );
        assert!(config.reconnection);
        assert_eq!(config.reconnection_attempts, 5);
        assert_eq!(config.reconnection_delay, Duration::from_millis(1000));
        assert_eq!(config.timeout, Duration::from_millis(20_000));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = ConnectionConfig::new("http://localhost:8000");
        assert_eq!(config.backoff(1), Duration::from_millis(1000));
        assert_eq!(config.backoff(2), Duration::from_millis(2000));
        assert_eq!(config.backoff(3), Duration::from_millis(4000));
        assert_eq!(config.backoff(4), Duration::from_millis(5000));
        assert_eq!(config.backoff(40), Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forwards_messages_then_gives_up() {
        let connector = ScriptedConnector::new(vec![Step::Open(
            vec![event("task_update"), event("node_update")],
            "transport close",
        )]);
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionManager::new(config(2), connector).spawn(tx);

        let events = collect(rx).await;
        assert_eq!(
            events,
            vec![
                ConnectionEvent::Connected { sid: "sid-1".into() },
                ConnectionEvent::Message {
                    name: "task_update".into(),
                    payload: json!({"task_id": "t1"})
                },
                ConnectionEvent::Message {
                    name: "node_update".into(),
                    payload: json!({"task_id": "t1"})
                },
                ConnectionEvent::Disconnected {
                    reason: "transport close".into()
                },
                ConnectionEvent::ReconnectAttempt { attempt: 1, max: 2 },
                ConnectionEvent::ConnectError {
                    message: "Handshake failed: refused".into()
                },
                ConnectionEvent::ReconnectAttempt { attempt: 2, max: 2 },
                ConnectionEvent::ConnectError {
                    message: "Handshake failed: refused".into()
                },
                ConnectionEvent::ReconnectFailed,
            ]
        );
        assert_eq!(handle.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_after_failure_resets_counter() {
        let connector = ScriptedConnector::new(vec![
            Step::Fail("server down"),
            Step::Open(vec![], "ping timeout"),
        ]);
        let (tx, rx) = mpsc::unbounded_channel();
        let _handle = ConnectionManager::new(config(1), connector).spawn(tx);

        let events = collect(rx).await;
        assert_eq!(
            events,
            vec![
                ConnectionEvent::ConnectError {
                    message: "Handshake failed: server down".into()
                },
                ConnectionEvent::ReconnectAttempt { attempt: 1, max: 1 },
                ConnectionEvent::Reconnected { attempt: 1 },
                ConnectionEvent::Connected { sid: "sid-1".into() },
                ConnectionEvent::Disconnected {
                    reason: "ping timeout".into()
                },
                // The successful connection reset the budget to a full attempt
                ConnectionEvent::ReconnectAttempt { attempt: 1, max: 1 },
                ConnectionEvent::ConnectError {
                    message: "Handshake failed: refused".into()
                },
                ConnectionEvent::ReconnectFailed,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_between_attempts() {
        let connector = ScriptedConnector::new(vec![]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let start = tokio::time::Instant::now();
        let _handle = ConnectionManager::new(config(3), connector).spawn(tx);

        let mut attempt_times = Vec::new();
        while let Some(ev) = rx.recv().await {
            if let ConnectionEvent::ReconnectAttempt { .. } = ev {
                attempt_times.push(start.elapsed());
            }
        }
        assert_eq!(
            attempt_times,
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(3000),
                Duration::from_millis(7000),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_reconnection_when_disabled() {
        let connector = ScriptedConnector::new(vec![]);
        let mut config = config(5);
        config.reconnection = false;
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionManager::new(config, connector).spawn(tx);

        let events = collect(rx).await;
        assert_eq!(
            events,
            vec![ConnectionEvent::ConnectError {
                message: "Handshake failed: refused".into()
            }]
        );
        assert_eq!(handle.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let connector = ScriptedConnector::new(vec![Step::Hang]);
        let mut config = config(0);
        config.timeout = Duration::from_secs(20);
        let (tx, rx) = mpsc::unbounded_channel();
        let _handle = ConnectionManager::new(config, connector).spawn(tx);

        let events = collect(rx).await;
        assert_eq!(
            events,
            vec![
                ConnectionEvent::ConnectError {
                    message: "Timeout after 20s".into()
                },
                ConnectionEvent::ReconnectFailed,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_stops_loop() {
        let connector = ScriptedConnector::new(vec![Step::Hang]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ConnectionManager::new(config(5), connector).spawn(tx);
        assert_eq!(handle.state(), ConnectionState::Connecting);

        handle.disconnect();
        assert_eq!(handle.state(), ConnectionState::Disconnected);
        assert!(rx.recv().await.is_none());
    }
}
