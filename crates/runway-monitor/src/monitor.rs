use crate::config::{MonitorConfig, PING_FRAME};
use crate::error::MonitorError;
use crate::status_client::StatusClient;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use runway_core::{
    classify_frame, EventBuffer, Frame, PollCommand, PollingFallback, SessionStore, Snapshot,
    StatusSnapshot, Transport, TransportAction, TransportInput,
};
use serde::Serialize;
use std::collections::VecDeque;
use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingConnect = Pin<Box<dyn Future<Output = Result<Socket, MonitorError>> + Send>>;
type FetchResult = Result<StatusSnapshot, MonitorError>;

const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

/// What consumers see: liveness plus the reduced snapshot of the event window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorView {
    pub live: bool,
    pub snapshot: Snapshot,
    pub last_server_heartbeat: Option<DateTime<Utc>>,
    pub buffered: usize,
}

pub struct Monitor;

impl Monitor {
    /// Spawns the monitor task on the current tokio runtime.
    ///
    /// The persisted window is restored before anything connects, so the
    /// first published view already reflects it.
    pub fn start(
        config: MonitorConfig,
        store: Arc<dyn SessionStore>,
    ) -> Result<MonitorHandle, MonitorError> {
        let status = StatusClient::new(&config)?;
        let event_url = config.event_url()?.to_string();
        let buffer = EventBuffer::with_capacity(store, config.buffer_capacity);
        let initial = MonitorView {
            live: false,
            snapshot: buffer.snapshot(),
            last_server_heartbeat: None,
            buffered: buffer.len(),
        };
        let (view_tx, views) = watch::channel(initial);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let driver = Driver {
            transport: Transport::new(config.backoff),
            config,
            event_url,
            status,
            polling: PollingFallback::new(),
            buffer,
            socket: None,
            connecting: None,
            reconnect: None,
            heartbeat: None,
            poll_ticker: None,
            fetches: JoinSet::new(),
            last_server_heartbeat: None,
            view_tx,
        };
        let task = tokio::spawn(driver.run(shutdown_rx));
        Ok(MonitorHandle {
            views,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }
}

/// Owner of a running monitor. Dropping it without `stop` aborts the task.
pub struct MonitorHandle {
    views: watch::Receiver<MonitorView>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn view(&self) -> MonitorView {
        self.views.borrow().clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.views.borrow().snapshot.clone()
    }

    pub fn is_live(&self) -> bool {
        self.views.borrow().live
    }

    pub fn subscribe(&self) -> watch::Receiver<MonitorView> {
        self.views.clone()
    }

    /// Tears the monitor down and waits for it. When this returns the
    /// connection is closed and no timer or fetch of this monitor remains.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!("runway_monitor_join_error: {err}");
            }
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Driver {
    config: MonitorConfig,
    event_url: String,
    status: StatusClient,
    transport: Transport,
    polling: PollingFallback,
    buffer: EventBuffer,
    socket: Option<Socket>,
    connecting: Option<PendingConnect>,
    reconnect: Option<Pin<Box<Sleep>>>,
    heartbeat: Option<Interval>,
    poll_ticker: Option<Interval>,
    fetches: JoinSet<FetchResult>,
    last_server_heartbeat: Option<DateTime<Utc>>,
    view_tx: watch::Sender<MonitorView>,
}

impl Driver {
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        info!("runway_monitor_started: {}", self.event_url);
        let command = self.polling.on_liveness(false);
        self.apply_poll_command(command);
        self.dispatch(TransportInput::Start).await;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                result = wait_connect(&mut self.connecting) => {
                    self.on_connect(result).await;
                }
                frame = next_frame(&mut self.socket) => {
                    self.on_frame(frame).await;
                }
                _ = wait_tick(&mut self.heartbeat) => {
                    self.dispatch(TransportInput::HeartbeatDue).await;
                }
                _ = wait_sleep(&mut self.reconnect) => {
                    self.reconnect = None;
                    self.dispatch(TransportInput::ReconnectDue).await;
                }
                _ = wait_tick(&mut self.poll_ticker) => {
                    if self.polling.on_tick() {
                        self.spawn_fetch();
                    }
                }
                Some(joined) = self.fetches.join_next(), if !self.fetches.is_empty() => {
                    self.on_fetch(joined);
                }
            }
        }

        self.teardown().await;
    }

    async fn on_connect(&mut self, result: Result<Socket, MonitorError>) {
        self.connecting = None;
        match result {
            Ok(socket) => {
                info!("runway_connected: {}", self.event_url);
                self.socket = Some(socket);
                self.dispatch(TransportInput::Opened).await;
            }
            Err(err) => {
                warn!("runway_connect_error: {err}");
                self.dispatch(TransportInput::Errored).await;
            }
        }
    }

    async fn on_frame(&mut self, frame: Option<Result<Message, tungstenite::Error>>) {
        match frame {
            Some(Ok(Message::Text(text))) => self.ingest(&text),
            Some(Ok(Message::Close(_))) | None => {
                info!("runway_disconnected");
                self.socket = None;
                self.dispatch(TransportInput::Closed).await;
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                warn!("runway_socket_error: {err}");
                self.socket = None;
                self.dispatch(TransportInput::Errored).await;
            }
        }
    }

    fn ingest(&mut self, text: &str) {
        match classify_frame(text) {
            Ok(Frame::Event(event)) => {
                debug!("runway_event: {}", event.kind());
                self.buffer.append(event);
                self.publish();
            }
            Ok(Frame::ServerHeartbeat) => {
                self.last_server_heartbeat = Some(Utc::now());
                self.publish();
            }
            Err(err) => debug!("runway_frame_rejected: {err}"),
        }
    }

    async fn dispatch(&mut self, input: TransportInput) {
        let was_live = self.transport.is_live();
        let mut inputs = VecDeque::from([input]);
        while let Some(input) = inputs.pop_front() {
            for action in self.transport.handle(input) {
                if let Some(follow_up) = self.perform(action).await {
                    inputs.push_back(follow_up);
                }
            }
        }
        let live = self.transport.is_live();
        if live == was_live {
            return;
        }
        if !self.transport.is_disabled() {
            let command = self.polling.on_liveness(live);
            self.apply_poll_command(command);
        }
        self.publish();
    }

    async fn perform(&mut self, action: TransportAction) -> Option<TransportInput> {
        match action {
            TransportAction::OpenConnection => {
                let url = self.event_url.clone();
                let limit = self.config.connect_timeout;
                let connect: PendingConnect = Box::pin(async move {
                    let (socket, _) = tokio::time::timeout(limit, connect_async(url))
                        .await
                        .map_err(|_| MonitorError::ConnectTimeout(limit))??;
                    Ok::<Socket, MonitorError>(socket)
                });
                self.connecting = Some(connect);
            }
            TransportAction::StartHeartbeat => {
                self.heartbeat = Some(delayed_interval(self.config.heartbeat_interval));
            }
            TransportAction::SendPing => {
                if let Some(socket) = self.socket.as_mut() {
                    if let Err(err) = socket.send(Message::Text(PING_FRAME.to_string())).await {
                        warn!("runway_ping_error: {err}");
                        self.socket = None;
                        return Some(TransportInput::Errored);
                    }
                }
            }
            TransportAction::StopHeartbeat => self.heartbeat = None,
            TransportAction::ScheduleReconnect(delay) => {
                info!(
                    "runway_reconnect_scheduled: delay_ms={} attempt={}",
                    delay.as_millis(),
                    self.transport.retry_count()
                );
                self.reconnect = Some(Box::pin(tokio::time::sleep(delay)));
            }
            TransportAction::CancelReconnect => self.reconnect = None,
            TransportAction::CloseConnection => {
                self.connecting = None;
                if let Some(mut socket) = self.socket.take() {
                    let _ = tokio::time::timeout(CLOSE_TIMEOUT, socket.close(None)).await;
                }
            }
        }
        None
    }

    fn apply_poll_command(&mut self, command: PollCommand) {
        match command {
            PollCommand::FetchNowAndStartTicker => {
                debug!("runway_poll_started");
                self.spawn_fetch();
                self.poll_ticker = Some(delayed_interval(self.config.poll_interval));
            }
            PollCommand::StopTicker => {
                debug!("runway_poll_stopped");
                self.poll_ticker = None;
            }
            PollCommand::Nothing => {}
        }
    }

    fn spawn_fetch(&mut self) {
        let client = self.status.clone();
        self.fetches.spawn(async move { client.fetch().await });
    }

    fn on_fetch(&mut self, joined: Result<FetchResult, JoinError>) {
        match joined {
            Ok(Ok(status)) => {
                if self.buffer.extend(status.polled_events()) > 0 {
                    self.publish();
                }
            }
            Ok(Err(err)) => debug!("runway_poll_error: {err}"),
            Err(err) => debug!("runway_poll_join_error: {err}"),
        }
    }

    async fn teardown(&mut self) {
        self.dispatch(TransportInput::Teardown).await;
        self.poll_ticker = None;
        self.fetches.abort_all();
        self.publish();
        info!("runway_monitor_stopped");
    }

    fn publish(&self) {
        self.view_tx.send_replace(MonitorView {
            live: self.transport.is_live(),
            snapshot: self.buffer.snapshot(),
            last_server_heartbeat: self.last_server_heartbeat,
            buffered: self.buffer.len(),
        });
    }
}

fn delayed_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn wait_connect(connecting: &mut Option<PendingConnect>) -> Result<Socket, MonitorError> {
    match connecting.as_mut() {
        Some(connect) => connect.await,
        None => pending().await,
    }
}

async fn next_frame(socket: &mut Option<Socket>) -> Option<Result<Message, tungstenite::Error>> {
    match socket.as_mut() {
        Some(socket) => socket.next().await,
        None => pending().await,
    }
}

async fn wait_tick(interval: &mut Option<Interval>) {
    match interval.as_mut() {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

async fn wait_sleep(sleep: &mut Option<Pin<Box<Sleep>>>) {
    match sleep.as_mut() {
        Some(sleep) => sleep.await,
        None => pending().await,
    }
}
