//! The hub session: one physical link, its background loop, and automatic
//! reconnection.
//!
//! [`HubSession`] owns at most one live [`Transport`] at a time. A background
//! task multiplexes outgoing frames, keep-alive pings and inbound records with
//! `tokio::select!`, decodes every inbound invocation into a [`ServerEvent`]
//! and fans it out through the session's [`EventBus`].
//!
//! When the link drops unexpectedly the task keeps the same command channel
//! and event bus, and redials through the [`Connector`] following the
//! configured [`ReconnectPolicy`]. Progress is reported to a
//! [`LifecycleListener`].

use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::config::{ClientConfig, ReconnectPolicy};
use crate::error::{Result, TruthOrDareError};
use crate::event::{EventBus, EventKind, HandlerId, ServerEvent};
use crate::protocol::{
    handshake_request, split_records, ClientOperation, HandshakeResponse, HubMessage,
};
use crate::transport::{Connector, Transport};

const PING_FRAME: &str = "{\"type\":6}\u{1e}";

/// Status of the physical link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkStatus {
    /// Never started.
    Idle,
    /// Handshake done; frames flow.
    Open,
    /// The link dropped and the session is redialing.
    Retrying,
    /// Stopped, rejected by the server, or out of reconnect attempts.
    Closed,
}

/// Callbacks for link lifecycle edges. Called from the session task; must not block.
pub trait LifecycleListener: Send + Sync + 'static {
    /// The link dropped and automatic reconnection began.
    fn on_reconnecting(&self, _reason: Option<&str>) {}

    /// A reconnect attempt succeeded.
    fn on_reconnected(&self) {}

    /// The session reached its terminal close.
    fn on_close(&self, _reason: Option<&str>) {}
}

struct NoopListener;

impl LifecycleListener for NoopListener {}

/// Per-session timing taken from [`ClientConfig`].
#[derive(Debug, Clone)]
struct SessionOptions {
    endpoint: String,
    reconnect: ReconnectPolicy,
    handshake_timeout: Duration,
    keepalive_interval: Duration,
    server_timeout: Duration,
    shutdown_timeout: Duration,
}

impl From<&ClientConfig> for SessionOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            endpoint: config.endpoint(),
            reconnect: config.reconnect.clone(),
            handshake_timeout: config.handshake_timeout,
            keepalive_interval: config.keepalive_interval.max(Duration::from_millis(1)),
            server_timeout: config.server_timeout,
            shutdown_timeout: config.shutdown_timeout,
        }
    }
}

/// State shared between the session handle and its loop task.
struct Shared {
    options: SessionOptions,
    connector: Arc<dyn Connector>,
    bus: EventBus,
    listener: Arc<dyn LifecycleListener>,
    link: watch::Sender<LinkStatus>,
    drops: watch::Sender<u64>,
}

impl Shared {
    fn set_link(&self, status: LinkStatus) {
        let previous = self.link.send_replace(status);
        if previous != status {
            debug!(from = ?previous, to = ?status, "link status changed");
        }
    }

    /// Count one lost link. Frames queued or written on it are gone.
    fn record_drop(&self) {
        self.drops.send_modify(|drops| *drops = drops.wrapping_add(1));
    }

    fn finish(&self, reason: Option<String>) {
        self.set_link(LinkStatus::Closed);
        info!(reason = reason.as_deref().unwrap_or("stopped"), "session closed");
        self.listener.on_close(reason.as_deref());
    }
}

#[derive(Default)]
struct TaskSlot {
    handle: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

// ── Session handle ──────────────────────────────────────────────────

/// One logical connection to the room hub.
///
/// Handlers registered with [`on`](Self::on) survive reconnects and restarts:
/// they belong to the session object, not to the physical link.
pub struct HubSession {
    shared: Arc<Shared>,
    cmd_tx: StdMutex<Option<mpsc::UnboundedSender<String>>>,
    task: Mutex<TaskSlot>,
}

impl HubSession {
    /// Create an idle session for `config`'s endpoint. Nothing is dialed until
    /// [`start`](Self::start).
    pub fn new(config: &ClientConfig, connector: Arc<dyn Connector>) -> Self {
        Self::with_listener(config, connector, Arc::new(NoopListener))
    }

    /// Like [`new`](Self::new), reporting lifecycle edges to `listener`.
    pub fn with_listener(
        config: &ClientConfig,
        connector: Arc<dyn Connector>,
        listener: Arc<dyn LifecycleListener>,
    ) -> Self {
        let (link, _) = watch::channel(LinkStatus::Idle);
        let (drops, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                options: SessionOptions::from(config),
                connector,
                bus: EventBus::new(),
                listener,
                link,
                drops,
            }),
            cmd_tx: StdMutex::new(None),
            task: Mutex::new(TaskSlot::default()),
        }
    }

    /// Dial the hub and complete the handshake.
    ///
    /// Succeeds immediately when the link is already open.
    ///
    /// # Errors
    ///
    /// Returns [`TruthOrDareError::Connection`] (or another connection-class
    /// error) when the hub is unreachable, [`TruthOrDareError::Handshake`] when
    /// it rejects the handshake, and [`TruthOrDareError::Connection`] while an
    /// automatic reconnect is in progress.
    pub async fn start(&self) -> Result<()> {
        let mut slot = self.task.lock().await;
        match self.status() {
            LinkStatus::Open => return Ok(()),
            LinkStatus::Retrying => {
                return Err(TruthOrDareError::Connection(
                    "automatic reconnection in progress".into(),
                ));
            }
            LinkStatus::Idle | LinkStatus::Closed => {}
        }

        if let Some(stale) = slot.handle.take() {
            stale.abort();
        }

        let endpoint = &self.shared.options.endpoint;
        debug!(endpoint = %endpoint, "starting session");
        let (transport, backlog) = open_link(&self.shared).await.inspect_err(|e| {
            warn!(endpoint = %endpoint, error = %e, "session start failed");
        })?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        *self.cmd_tx.lock().unwrap_or_else(PoisonError::into_inner) = Some(cmd_tx);
        self.shared.set_link(LinkStatus::Open);
        info!(endpoint = %endpoint, "session open");

        slot.handle = Some(tokio::spawn(session_loop(
            Arc::clone(&self.shared),
            transport,
            backlog,
            cmd_rx,
            shutdown_rx,
        )));
        slot.shutdown_tx = Some(shutdown_tx);
        Ok(())
    }

    /// Close the link. Best effort: never fails, and aborts the loop task if
    /// it does not exit within the shutdown timeout.
    pub async fn stop(&self) {
        let mut slot = self.task.lock().await;
        debug!("session stop requested");

        if let Some(tx) = slot.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.cmd_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(mut task) = slot.handle.take() {
            match tokio::time::timeout(self.shared.options.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => warn!("session loop terminated with join error: {join_err}"),
                Err(_) => {
                    warn!("session loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session loop aborted: {join_err}");
                    }
                }
            }
        }

        if !matches!(self.status(), LinkStatus::Idle | LinkStatus::Closed) {
            self.shared.finish(None);
        }
    }

    /// Queue `op` for sending. Fire-and-forget: no acknowledgement is awaited.
    ///
    /// # Errors
    ///
    /// Returns [`TruthOrDareError::NotConnected`] unless the link is open, and
    /// [`TruthOrDareError::Serialization`] if the arguments cannot be encoded.
    pub fn send(&self, op: &ClientOperation) -> Result<()> {
        if self.status() != LinkStatus::Open {
            return Err(TruthOrDareError::NotConnected);
        }
        let frame = op.to_hub_message().to_frame()?;
        let guard = self.cmd_tx.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = guard.as_ref().ok_or(TruthOrDareError::NotConnected)?;
        tx.send(frame).map_err(|_| TruthOrDareError::NotConnected)?;
        debug!(op = op.target(), "operation queued");
        Ok(())
    }

    /// Subscribe `handler` to every event of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        self.shared.bus.on(kind, Arc::new(handler))
    }

    /// Detach a handler. Returns `false` if it was not registered.
    pub fn off(&self, kind: EventKind, id: HandlerId) -> bool {
        self.shared.bus.off(kind, id)
    }

    /// Number of handlers currently registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.shared.bus.handler_count(kind)
    }

    /// Current link status.
    pub fn status(&self) -> LinkStatus {
        *self.shared.link.borrow()
    }

    /// Watch the link status.
    pub fn subscribe_status(&self) -> watch::Receiver<LinkStatus> {
        self.shared.link.subscribe()
    }

    /// Watch the number of links lost so far.
    ///
    /// The value changes every time an open link drops, whether or not a
    /// reconnect follows. Anything sent before the change may never have
    /// reached the hub, and its answer will not arrive on the next link.
    pub fn subscribe_drops(&self) -> watch::Receiver<u64> {
        self.shared.drops.subscribe()
    }

    /// Resolves once the session reaches its terminal close.
    pub async fn closed(&self) {
        let mut rx = self.shared.link.subscribe();
        let _ = rx.wait_for(|status| *status == LinkStatus::Closed).await;
    }

    /// The hub URL this session dials.
    pub fn endpoint(&self) -> &str {
        &self.shared.options.endpoint
    }
}

impl std::fmt::Debug for HubSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubSession")
            .field("endpoint", &self.shared.options.endpoint)
            .field("status", &self.status())
            .field("bus", &self.shared.bus)
            .finish()
    }
}

impl Drop for HubSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().handle.take() {
            task.abort();
        }
    }
}

// ── Dialing ─────────────────────────────────────────────────────────

fn as_connection_error(err: TruthOrDareError) -> TruthOrDareError {
    if err.is_connection() {
        err
    } else {
        TruthOrDareError::Connection(err.to_string())
    }
}

/// Dial, send the handshake and wait for its answer. Returns the open
/// transport plus any records that arrived in the same frame as the answer.
async fn open_link(shared: &Shared) -> Result<(Box<dyn Transport>, Vec<String>)> {
    let options = &shared.options;
    let mut transport = shared
        .connector
        .connect(&options.endpoint)
        .await
        .map_err(as_connection_error)?;

    if let Err(e) = transport.send(handshake_request()).await {
        let _ = transport.close().await;
        return Err(as_connection_error(e));
    }

    let reply = match tokio::time::timeout(options.handshake_timeout, transport.recv()).await {
        Ok(Some(Ok(text))) => text,
        Ok(Some(Err(e))) => {
            let _ = transport.close().await;
            return Err(as_connection_error(e));
        }
        Ok(None) => {
            return Err(TruthOrDareError::Connection("connection closed during handshake".into()));
        }
        Err(_) => {
            let _ = transport.close().await;
            return Err(TruthOrDareError::Connection("handshake timed out".into()));
        }
    };

    let mut records = split_records(&reply);
    let verdict = records
        .next()
        .ok_or_else(|| TruthOrDareError::Handshake("empty handshake response".into()))
        .and_then(|record| {
            HandshakeResponse::parse(record)
                .map_err(|e| TruthOrDareError::Handshake(format!("malformed response: {e}")))
        });
    match verdict {
        Ok(HandshakeResponse { error: None }) => {}
        Ok(HandshakeResponse { error: Some(error) }) => {
            let _ = transport.close().await;
            return Err(TruthOrDareError::Handshake(error));
        }
        Err(e) => {
            let _ = transport.close().await;
            return Err(e);
        }
    }

    let backlog = records.map(str::to_string).collect();
    Ok((transport, backlog))
}

// ── Session loop ────────────────────────────────────────────────────

/// Why the inner link loop returned.
enum LinkExit {
    Shutdown,
    Lost {
        reason: Option<String>,
        allow_reconnect: bool,
    },
}

enum Redial {
    Opened(Box<dyn Transport>, Vec<String>),
    Shutdown,
    Exhausted(Option<String>),
}

async fn session_loop(
    shared: Arc<Shared>,
    mut transport: Box<dyn Transport>,
    mut backlog: Vec<String>,
    mut cmd_rx: mpsc::UnboundedReceiver<String>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!("session loop started");

    loop {
        let exit = match process_records(&shared, backlog.drain(..)) {
            Some(lost) => lost,
            None => drive_link(&shared, &mut transport, &mut cmd_rx, &mut shutdown_rx).await,
        };
        let _ = transport.close().await;

        match exit {
            LinkExit::Shutdown => {
                shared.finish(None);
                break;
            }
            LinkExit::Lost {
                reason,
                allow_reconnect,
            } => {
                let reconnect = allow_reconnect && shared.options.reconnect.enabled;
                if reconnect {
                    shared.set_link(LinkStatus::Retrying);
                } else {
                    shared.finish(reason.clone());
                }
                shared.record_drop();
                discard_commands(&mut cmd_rx, "lost link");
                if !reconnect {
                    break;
                }
                match redial(&shared, &mut shutdown_rx, reason).await {
                    Redial::Opened(next, records) => {
                        discard_commands(&mut cmd_rx, "reconnect gap");
                        transport = next;
                        backlog = records;
                        shared.set_link(LinkStatus::Open);
                        shared.listener.on_reconnected();
                    }
                    Redial::Shutdown => {
                        shared.finish(None);
                        break;
                    }
                    Redial::Exhausted(reason) => {
                        error!(
                            reason = reason.as_deref().unwrap_or("unknown"),
                            "reconnect attempts exhausted"
                        );
                        shared.finish(reason);
                        break;
                    }
                }
            }
        }
    }

    debug!("session loop exited");
}

fn discard_commands(cmd_rx: &mut mpsc::UnboundedReceiver<String>, during: &'static str) {
    let mut dropped = 0_usize;
    while cmd_rx.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        warn!(dropped, during, "discarded queued operations");
    }
}

/// Pump one open link until it is lost or the session is stopped.
async fn drive_link(
    shared: &Shared,
    transport: &mut Box<dyn Transport>,
    cmd_rx: &mut mpsc::UnboundedReceiver<String>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> LinkExit {
    let options = &shared.options;
    let mut keepalive = tokio::time::interval_at(
        Instant::now() + options.keepalive_interval,
        options.keepalive_interval,
    );
    keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let silence = tokio::time::sleep(options.server_timeout);
    tokio::pin!(silence);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(frame) = cmd else {
                    debug!("command channel closed");
                    return LinkExit::Shutdown;
                };
                if let Err(e) = transport.send(frame).await {
                    error!("transport send error: {e}");
                    return LinkExit::Lost {
                        reason: Some(format!("transport send error: {e}")),
                        allow_reconnect: true,
                    };
                }
            }

            _ = &mut *shutdown_rx => {
                debug!("shutdown signal received");
                return LinkExit::Shutdown;
            }

            _ = keepalive.tick() => {
                trace!("sending keep-alive ping");
                if let Err(e) = transport.send(PING_FRAME.to_string()).await {
                    error!("keep-alive send error: {e}");
                    return LinkExit::Lost {
                        reason: Some(format!("transport send error: {e}")),
                        allow_reconnect: true,
                    };
                }
            }

            () = &mut silence => {
                warn!(timeout_ms = options.server_timeout.as_millis() as u64, "server went silent");
                return LinkExit::Lost {
                    reason: Some("server timeout elapsed without receiving a message".into()),
                    allow_reconnect: true,
                };
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        let deadline = Instant::now() + options.server_timeout;
                        silence.as_mut().reset(deadline);
                        if let Some(lost) = process_records(shared, split_records(&text)) {
                            return lost;
                        }
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        return LinkExit::Lost {
                            reason: Some(format!("transport receive error: {e}")),
                            allow_reconnect: true,
                        };
                    }
                    None => {
                        debug!("transport closed by server");
                        return LinkExit::Lost {
                            reason: Some("connection closed by server".into()),
                            allow_reconnect: true,
                        };
                    }
                }
            }
        }
    }
}

/// Decode and dispatch records in order. Stops at a server close record.
fn process_records<I>(shared: &Shared, records: I) -> Option<LinkExit>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    for record in records {
        let record = record.as_ref();
        match HubMessage::parse(record) {
            Ok(HubMessage::Invocation { target, arguments }) => {
                match ServerEvent::from_invocation(&target, arguments) {
                    Ok(event) => {
                        debug!(event = %event.kind(), "event received");
                        shared.bus.dispatch(&event);
                    }
                    Err(TruthOrDareError::UnknownEvent(_)) => {
                        debug!(target = %target, "ignoring unknown event");
                    }
                    Err(e) => warn!(target = %target, error = %e, "dropping undecodable event"),
                }
            }
            Ok(HubMessage::Ping) => trace!("ping received"),
            Ok(HubMessage::Completion {
                invocation_id,
                error,
            }) => debug!(invocation_id = %invocation_id, ?error, "ignoring completion"),
            Ok(HubMessage::Close {
                error,
                allow_reconnect,
            }) => {
                info!(?error, allow_reconnect, "server closed the connection");
                return Some(LinkExit::Lost {
                    reason: error.or_else(|| Some("server closed the connection".into())),
                    allow_reconnect,
                });
            }
            Ok(HubMessage::Other(kind)) => trace!(kind, "ignoring hub record"),
            Err(e) => warn!(error = %e, record = %record, "failed to decode hub record"),
        }
    }
    None
}

/// Redial with backoff until a link opens, the policy gives up, or the session is stopped.
async fn redial(
    shared: &Shared,
    shutdown_rx: &mut oneshot::Receiver<()>,
    reason: Option<String>,
) -> Redial {
    shared.set_link(LinkStatus::Retrying);
    warn!(
        reason = reason.as_deref().unwrap_or("unknown"),
        "connection lost; reconnecting"
    );
    shared.listener.on_reconnecting(reason.as_deref());

    let policy = &shared.options.reconnect;
    let mut last_error = reason;
    let mut attempt: u32 = 0;

    while policy.allows(attempt) {
        let delay = policy.delay_for(attempt);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "waiting before reconnect attempt");
        tokio::select! {
            _ = &mut *shutdown_rx => return Redial::Shutdown,
            () = tokio::time::sleep(delay) => {}
        }

        let opened = tokio::select! {
            _ = &mut *shutdown_rx => return Redial::Shutdown,
            opened = open_link(shared) => opened,
        };
        match opened {
            Ok((transport, backlog)) => {
                info!(attempt, "reconnected");
                return Redial::Opened(transport, backlog);
            }
            Err(e) => {
                warn!(attempt, error = %e, "reconnect attempt failed");
                last_error = Some(e.to_string());
            }
        }
        attempt = attempt.saturating_add(1);
    }

    Redial::Exhausted(last_error)
}
