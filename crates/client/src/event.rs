use std::time::Duration;

use crossterm::event::{Event as CrosstermEvent, EventStream, KeyEvent};
use futures::StreamExt;
use tokio::sync::mpsc;

use geosolve_core::payload::TaskStatusPayload;
use geosolve_core::types::TaskId;
use geosolve_transport::ConnectionEvent;

use crate::api::HealthProbe;

#[derive(Debug, Clone)]
pub enum Event {
    Key(KeyEvent),
    Resize,
    Tick,
    Connection(ConnectionEvent),
    /// Outcome of a spawned problem submission.
    SubmissionFinished(Result<TaskId, String>),
    /// Outcome of the status re-sync issued after a reconnect.
    StatusChecked {
        task_id: TaskId,
        result: Result<TaskStatusPayload, String>,
    },
    /// Health probe issued after a connect error.
    HealthProbed(HealthProbe),
}

pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<Event>,
    _task: tokio::task::JoinHandle<()>,
    /// Sender for injecting results of spawned requests into the event loop.
    pub inject_tx: mpsc::UnboundedSender<Event>,
}

impl EventHandler {
    /// Merge terminal input (when `with_terminal`), ticks and connection
    /// events into one stream.
    pub fn new(
        tick_rate_ms: u64,
        connection_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
        with_terminal: bool,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let inject_tx = tx.clone();

        let task = tokio::spawn(Self::event_loop(tx, tick_rate_ms, connection_rx, with_terminal));

        Self {
            rx,
            _task: task,
            inject_tx,
        }
    }

    async fn event_loop(
        tx: mpsc::UnboundedSender<Event>,
        tick_rate_ms: u64,
        mut connection_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
        with_terminal: bool,
    ) {
        let mut reader = with_terminal.then(EventStream::new);
        let mut tick = tokio::time::interval(Duration::from_millis(tick_rate_ms.max(1)));
        let mut connection_open = true;

        loop {
            tokio::select! {
                maybe_event = async {
                    match reader.as_mut() {
                        Some(r) => r.next().await,
                        None => std::future::pending().await,
                    }
                } => {
                    if let Some(Ok(evt)) = maybe_event {
                        match evt {
                            CrosstermEvent::Key(key) => {
                                let _ = tx.send(Event::Key(key));
                            }
                            CrosstermEvent::Resize(..) => {
                                let _ = tx.send(Event::Resize);
                            }
                            _ => {}
                        }
                    }
                }
                _ = tick.tick() => {
                    if tx.send(Event::Tick).is_err() {
                        break;
                    }
                }
                conn_event = connection_rx.recv(), if connection_open => {
                    match conn_event {
                        Some(ev) => {
                            let _ = tx.send(Event::Connection(ev));
                        }
                        None => connection_open = false,
                    }
                }
            }
        }
    }

    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}
