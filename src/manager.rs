//! Connection lifecycle management.
//!
//! [`ConnectionManager`] owns the one [`HubSession`] of a client, publishes a
//! [`ConnectionState`] signal and hands out a live session through
//! [`ensure_connection`](ConnectionManager::ensure_connection). Concurrent
//! callers share a single physical connect attempt.
//!
//! | From          | Trigger                              | To                          |
//! |---------------|--------------------------------------|-----------------------------|
//! | Disconnected  | `ensure_connection`                  | Connecting                  |
//! | Connecting    | start succeeds / fails               | Connected / Disconnected    |
//! | Connected     | unexpected close                     | Reconnecting / Disconnected |
//! | Reconnecting  | reconnected                          | Connected                   |
//! | Reconnecting  | retries exhausted                    | Disconnected                |
//! | any           | `stop`                               | Disconnecting, Disconnected |

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{Result, TruthOrDareError};
use crate::session::{HubSession, LifecycleListener, LinkStatus};
use crate::transport::Connector;

/// Connection state as seen by the rest of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Disconnecting,
}

/// Something that registers permanent handlers on a session.
///
/// [`attach`](Self::attach) runs once per session object, right after the
/// manager creates it, so handlers are never registered twice even across
/// reconnects and restarts.
pub trait SessionSubscriber: Send + Sync + 'static {
    /// Register handlers on `session`.
    fn attach(self: Arc<Self>, session: &HubSession);
}

/// Translates session lifecycle callbacks into [`ConnectionState`] changes.
struct StateRecorder {
    state: Arc<watch::Sender<ConnectionState>>,
}

impl StateRecorder {
    fn set(&self, next: ConnectionState) {
        set_state(&self.state, next);
    }
}

impl LifecycleListener for StateRecorder {
    fn on_reconnecting(&self, reason: Option<&str>) {
        warn!(reason = reason.unwrap_or("unknown"), "connection lost");
        self.set(ConnectionState::Reconnecting);
    }

    fn on_reconnected(&self) {
        self.set(ConnectionState::Connected);
    }

    fn on_close(&self, reason: Option<&str>) {
        if let Some(reason) = reason {
            info!(reason, "connection closed");
        }
        self.set(ConnectionState::Disconnected);
    }
}

fn set_state(state: &watch::Sender<ConnectionState>, next: ConnectionState) {
    let previous = state.send_replace(next);
    if previous != next {
        debug!(from = ?previous, to = ?next, "connection state changed");
    }
}

/// Publish `Connected` unless the link already left the open state. The
/// check runs under the state lock, so a later lifecycle edge cannot be
/// overwritten.
fn publish_connected(state: &watch::Sender<ConnectionState>, session: &HubSession) {
    state.send_if_modified(|current| {
        let link = session.status();
        if link != LinkStatus::Open {
            debug!(?link, "link moved on before the connect attempt settled");
            return false;
        }
        if *current == ConnectionState::Connected {
            return false;
        }
        debug!(from = ?*current, to = ?ConnectionState::Connected, "connection state changed");
        *current = ConnectionState::Connected;
        true
    });
}

type AttemptFuture = Shared<BoxFuture<'static, std::result::Result<Arc<HubSession>, String>>>;

struct InFlight {
    id: u64,
    attempt: AttemptFuture,
}

type AttemptSlot = Arc<Mutex<Option<InFlight>>>;

/// Clears the attempt slot when the attempt task ends, however it ends.
struct AttemptGuard {
    slot: AttemptSlot,
    id: u64,
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|in_flight| in_flight.id == self.id) {
            *slot = None;
            debug!(attempt = self.id, "connect attempt slot cleared");
        }
    }
}

/// Owns the session and drives it through [`ConnectionState`].
pub struct ConnectionManager {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    state: Arc<watch::Sender<ConnectionState>>,
    session: Mutex<Option<Arc<HubSession>>>,
    in_flight: AttemptSlot,
    next_attempt: AtomicU64,
    subscribers: Mutex<Vec<Arc<dyn SessionSubscriber>>>,
}

impl ConnectionManager {
    /// Create a disconnected manager. No session exists until the first
    /// [`ensure_connection`](Self::ensure_connection).
    pub fn new(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            connector,
            state: Arc::new(state),
            session: Mutex::new(None),
            in_flight: Arc::new(Mutex::new(None)),
            next_attempt: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a subscriber. Attaches right away if the session already exists.
    pub fn add_subscriber(&self, subscriber: Arc<dyn SessionSubscriber>) {
        let session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(session) = session {
            Arc::clone(&subscriber).attach(&session);
        }
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscriber);
    }

    /// Return a session with an open link, connecting if needed.
    ///
    /// Concurrent callers join the same attempt, so at most one physical
    /// connect is outstanding. While the session is reconnecting on its own,
    /// callers wait for the outcome; if the retries run out they start a
    /// fresh attempt.
    ///
    /// # Errors
    ///
    /// Returns [`TruthOrDareError::Connection`] when the connect attempt fails.
    pub async fn ensure_connection(&self) -> Result<Arc<HubSession>> {
        loop {
            match self.state() {
                ConnectionState::Connected => {
                    if let Some(session) = self.live_session() {
                        return Ok(session);
                    }
                    if let Some(session) = self.session() {
                        if session.status() == LinkStatus::Retrying {
                            // Link dropped; the state change is about to follow.
                            let mut link = session.subscribe_status();
                            let _ = link.wait_for(|s| *s != LinkStatus::Retrying).await;
                            continue;
                        }
                    }
                }
                ConnectionState::Reconnecting | ConnectionState::Disconnecting => {
                    self.wait_until_settled().await;
                    continue;
                }
                ConnectionState::Disconnected | ConnectionState::Connecting => {}
            }

            let attempt = self.join_or_start_attempt();
            return attempt.await.map_err(TruthOrDareError::Connection);
        }
    }

    /// Stop the session. Waits for an in-flight connect attempt first.
    pub async fn stop(&self) {
        let attempt = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|in_flight| in_flight.attempt.clone());
        if let Some(attempt) = attempt {
            let _ = attempt.await;
        }

        set_state(&self.state, ConnectionState::Disconnecting);
        if let Some(session) = self.session() {
            session.stop().await;
        }
        set_state(&self.state, ConnectionState::Disconnected);
        info!("connection stopped");
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch the connection state.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// The session object, if one was created.
    pub fn session(&self) -> Option<Arc<HubSession>> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn live_session(&self) -> Option<Arc<HubSession>> {
        self.session()
            .filter(|session| session.status() == LinkStatus::Open)
    }

    async fn wait_until_settled(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx
            .wait_for(|state| {
                !matches!(
                    state,
                    ConnectionState::Reconnecting | ConnectionState::Disconnecting
                )
            })
            .await;
    }

    fn join_or_start_attempt(&self) -> AttemptFuture {
        let mut slot = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(in_flight) = slot.as_ref() {
            debug!(attempt = in_flight.id, "joining in-flight connect attempt");
            return in_flight.attempt.clone();
        }

        let id = self.next_attempt.fetch_add(1, Ordering::Relaxed);
        set_state(&self.state, ConnectionState::Connecting);
        let session = self.session_object();
        let state = Arc::clone(&self.state);
        let guard = AttemptGuard {
            slot: Arc::clone(&self.in_flight),
            id,
        };

        debug!(attempt = id, endpoint = session.endpoint(), "starting connect attempt");
        let task = tokio::spawn(async move {
            let _guard = guard;
            match session.start().await {
                Ok(()) => {
                    publish_connected(&state, &session);
                    Ok(session)
                }
                Err(e) => {
                    warn!(attempt = id, error = %e, "connect attempt failed");
                    state.send_if_modified(|current| {
                        let failed = *current == ConnectionState::Connecting;
                        if failed {
                            *current = ConnectionState::Disconnected;
                        }
                        failed
                    });
                    Err(e.to_string())
                }
            }
        });
        let attempt = async move {
            task.await
                .unwrap_or_else(|join_err| Err(format!("connect task failed: {join_err}")))
        }
        .boxed()
        .shared();

        *slot = Some(InFlight {
            id,
            attempt: attempt.clone(),
        });
        attempt
    }

    /// The session object, created and handed to subscribers on first use.
    fn session_object(&self) -> Arc<HubSession> {
        let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = slot.as_ref() {
            return Arc::clone(session);
        }

        let listener = Arc::new(StateRecorder {
            state: Arc::clone(&self.state),
        });
        let session = Arc::new(HubSession::with_listener(
            &self.config,
            Arc::clone(&self.connector),
            listener,
        ));
        let subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for subscriber in subscribers {
            subscriber.attach(&session);
        }
        debug!(endpoint = session.endpoint(), "session created");
        *slot = Some(Arc::clone(&session));
        session
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.config.endpoint())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::transport::Transport;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct Unreachable {
        dials: AtomicUsize,
    }

    #[async_trait]
    impl Connector for Unreachable {
        async fn connect(&self, _endpoint: &str) -> Result<Box<dyn Transport>> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Err(TruthOrDareError::Connection("connection refused".into()))
        }
    }

    struct CountingSubscriber {
        attached: AtomicUsize,
    }

    impl SessionSubscriber for CountingSubscriber {
        fn attach(self: Arc<Self>, session: &HubSession) {
            self.attached.fetch_add(1, Ordering::SeqCst);
            session.on(EventKind::GameEnded, |_| {});
        }
    }

    fn manager() -> (ConnectionManager, Arc<Unreachable>) {
        let connector = Arc::new(Unreachable {
            dials: AtomicUsize::new(0),
        });
        let manager = ConnectionManager::new(
            ClientConfig::new("http://127.0.0.1:9"),
            Arc::clone(&connector) as Arc<dyn Connector>,
        );
        (manager, connector)
    }

    #[tokio::test]
    async fn failed_start_surfaces_and_returns_to_disconnected() {
        let (manager, connector) = manager();
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        let err = manager.ensure_connection().await.unwrap_err();
        assert!(matches!(err, TruthOrDareError::Connection(ref m) if m.contains("refused")));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(connector.dials.load(Ordering::SeqCst), 1);
        assert!(manager.in_flight.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_failures_share_one_dial() {
        let (manager, connector) = manager();
        let (a, b, c) = tokio::join!(
            manager.ensure_connection(),
            manager.ensure_connection(),
            manager.ensure_connection()
        );
        assert!(a.is_err() && b.is_err() && c.is_err());
        assert_eq!(connector.dials.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscribers_attach_once_per_session_object() {
        let (manager, _) = manager();
        let subscriber = Arc::new(CountingSubscriber {
            attached: AtomicUsize::new(0),
        });
        manager.add_subscriber(Arc::clone(&subscriber) as Arc<dyn SessionSubscriber>);

        let _ = manager.ensure_connection().await;
        let _ = manager.ensure_connection().await;
        assert_eq!(subscriber.attached.load(Ordering::SeqCst), 1);
        let session = manager.session().unwrap();
        assert_eq!(session.handler_count(EventKind::GameEnded), 1);
    }

    #[tokio::test]
    async fn stop_without_session_ends_disconnected() {
        let (manager, _) = manager();
        let mut states = manager.subscribe_state();
        manager.stop().await;
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), ConnectionState::Disconnected);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }
}
