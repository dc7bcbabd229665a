#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for the integration tests.
//!
//! [`LoopbackConnector`] hands the client an in-memory transport per dial and
//! gives the test the other end as a [`ServerLink`], so a test can play the
//! hub: read the client's invocations and push events back.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use truth_or_dare_client::protocol::{split_records, HubMessage, RECORD_SEPARATOR};
use truth_or_dare_client::{ClientConfig, Connector, ReconnectPolicy, Transport, TruthOrDareError};

/// How long helpers wait for something the test expects to happen.
pub const PATIENCE: Duration = Duration::from_secs(5);

// ── Transport ───────────────────────────────────────────────────────

enum Inbound {
    Frame(String),
    Close,
}

/// Client end of an in-memory link.
pub struct LoopbackTransport {
    incoming: mpsc::UnboundedReceiver<Inbound>,
    outgoing: mpsc::UnboundedSender<String>,
    closed: bool,
    broken: bool,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), TruthOrDareError> {
        if self.closed {
            return Err(TruthOrDareError::TransportClosed);
        }
        if self.broken && !message.contains("\"protocol\"") {
            return Err(TruthOrDareError::TransportSend("broken pipe".into()));
        }
        self.outgoing
            .send(message)
            .map_err(|_| TruthOrDareError::TransportSend("server end dropped".into()))
    }

    async fn recv(&mut self) -> Option<Result<String, TruthOrDareError>> {
        match self.incoming.recv().await {
            Some(Inbound::Frame(text)) => Some(Ok(text)),
            Some(Inbound::Close) | None => None,
        }
    }

    async fn close(&mut self) -> Result<(), TruthOrDareError> {
        self.closed = true;
        Ok(())
    }
}

/// Server end of an in-memory link.
pub struct ServerLink {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<Inbound>,
}

impl ServerLink {
    /// Push one event to the client.
    pub fn push(&self, target: &str, payload: Value) {
        self.push_frame(event_record(target, payload));
    }

    /// Push several events in one frame.
    pub fn push_batch(&self, events: &[(&str, Value)]) {
        let frame: String = events
            .iter()
            .map(|(target, payload)| event_record(target, payload.clone()))
            .collect();
        self.push_frame(frame);
    }

    /// Push a raw frame.
    pub fn push_frame(&self, frame: impl Into<String>) {
        let _ = self.to_client.send(Inbound::Frame(frame.into()));
    }

    /// Close the link from the server side.
    pub fn hang_up(&self) {
        let _ = self.to_client.send(Inbound::Close);
    }

    /// Next record the client sent, of any type.
    pub async fn next_record(&mut self) -> Option<HubMessage> {
        let frame = tokio::time::timeout(PATIENCE, self.from_client.recv())
            .await
            .ok()??;
        let record = split_records(&frame).next()?.to_string();
        if record.contains("\"protocol\"") {
            return Some(HubMessage::Other(0));
        }
        HubMessage::parse(&record).ok()
    }

    /// Next invocation the client sent, skipping the handshake and pings.
    pub async fn next_invocation(&mut self) -> Option<(String, Vec<Value>)> {
        loop {
            match self.next_record().await? {
                HubMessage::Invocation { target, arguments } => return Some((target, arguments)),
                _ => continue,
            }
        }
    }
}

/// A `type: 1` invocation record for `target` carrying `payload`.
pub fn event_record(target: &str, payload: Value) -> String {
    let mut record = json!({ "type": 1, "target": target, "arguments": [payload] }).to_string();
    record.push(RECORD_SEPARATOR);
    record
}

// ── Connector ───────────────────────────────────────────────────────

/// What the next dial does.
#[derive(Debug, Clone)]
pub enum Dial {
    /// Open a link and accept the handshake.
    Accept,
    /// Fail to connect.
    Refuse,
    /// Open a link but reject the handshake with this error.
    RejectHandshake(String),
    /// Accept the handshake, then fail every later send.
    AcceptBrokenSend,
    /// Accept the handshake, then close the link right away.
    AcceptThenHangUp,
}

/// Scripted in-memory connector. Dials follow the script, then [`Dial::Accept`].
pub struct LoopbackConnector {
    script: StdMutex<VecDeque<Dial>>,
    after_script: StdMutex<Dial>,
    dial_delay: StdMutex<Option<Duration>>,
    dials: AtomicUsize,
    links: mpsc::UnboundedSender<ServerLink>,
}

impl LoopbackConnector {
    /// A connector plus the receiver of server ends, one per accepted dial.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerLink>) {
        let (links, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: StdMutex::new(VecDeque::new()),
            after_script: StdMutex::new(Dial::Accept),
            dial_delay: StdMutex::new(None),
            dials: AtomicUsize::new(0),
            links,
        });
        (connector, rx)
    }

    /// Queue scripted dial outcomes.
    pub fn script(&self, dials: impl IntoIterator<Item = Dial>) {
        self.script.lock().unwrap().extend(dials);
    }

    /// What every dial does once the script is used up.
    pub fn then_always(&self, dial: Dial) {
        *self.after_script.lock().unwrap() = dial;
    }

    /// Make every dial take `delay`.
    pub fn slow_down(&self, delay: Duration) {
        *self.dial_delay.lock().unwrap() = Some(delay);
    }

    /// Number of dials so far.
    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self, _endpoint: &str) -> Result<Box<dyn Transport>, TruthOrDareError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let delay = *self.dial_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let dial = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.after_script.lock().unwrap().clone());

        let handshake = match &dial {
            Dial::Refuse => {
                return Err(TruthOrDareError::Connection("connection refused".into()));
            }
            Dial::Accept | Dial::AcceptBrokenSend | Dial::AcceptThenHangUp => "{}".to_string(),
            Dial::RejectHandshake(error) => json!({ "error": error }).to_string(),
        };

        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();
        let _ = to_client.send(Inbound::Frame(format!("{handshake}{RECORD_SEPARATOR}")));
        if matches!(dial, Dial::AcceptThenHangUp) {
            let _ = to_client.send(Inbound::Close);
        }
        let _ = self.links.send(ServerLink {
            from_client,
            to_client,
        });
        Ok(Box::new(LoopbackTransport {
            incoming,
            outgoing,
            closed: false,
            broken: matches!(dial, Dial::AcceptBrokenSend),
        }))
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// A configuration with quick reconnects and no call timeout.
pub fn test_config() -> ClientConfig {
    ClientConfig::new("http://hub.test")
        .with_reconnect(
            ReconnectPolicy::default()
                .with_delays(Duration::from_millis(10), Duration::from_millis(40)),
        )
        .with_shutdown_timeout(Duration::from_millis(200))
}

/// Receive the next server end within [`PATIENCE`].
pub async fn next_link(links: &mut mpsc::UnboundedReceiver<ServerLink>) -> ServerLink {
    tokio::time::timeout(PATIENCE, links.recv())
        .await
        .expect("no dial within patience")
        .expect("connector dropped")
}

/// Install a tracing subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
