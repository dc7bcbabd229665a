//! Event-correlated remote calls.
//!
//! The hub does not answer invocations directly. Instead it pushes a
//! `...Success` event to the caller, or the generic `OperationFailed` event.
//! [`invoke`] turns that into a request/response future: it subscribes
//! temporary handlers to the success event and the failure event, sends the
//! operation, and settles exactly once with whichever arrives first. Both
//! handlers are removed on every outcome.
//!
//! # Shared failure event
//!
//! `OperationFailed` carries no correlation id. While two calls are pending,
//! a failure meant for one of them rejects both. Callers that need to tell
//! failures apart should issue conflicting operations one at a time.
//!
//! # Lost links
//!
//! A call pending when its link drops is rejected with
//! [`TruthOrDareError::ConnectionClosed`], whether or not the session
//! reconnects afterwards. Calls made while the session is reconnecting are
//! held by the client until the link is back.
//!
//! # Abandoned calls
//!
//! Dropping the future returned by [`invoke`] does not remove its handlers
//! right away; they are removed when one of the awaited events next fires.

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, TruthOrDareError};
use crate::event::{EventKind, HandlerId, ServerEvent};
use crate::protocol::{ClientOperation, ErrorDetails, ErrorEnvelope};
use crate::session::HubSession;

/// One outstanding call.
struct PendingCall {
    id: Uuid,
    op: &'static str,
    success: EventKind,
    resolver: Mutex<Option<oneshot::Sender<Result<ServerEvent>>>>,
    handlers: Mutex<Vec<(EventKind, HandlerId)>>,
}

impl PendingCall {
    /// Resolve with `outcome` unless already settled, and detach both handlers.
    /// Returns `true` if this call settled it.
    fn settle(&self, session: &HubSession, outcome: Result<ServerEvent>) -> bool {
        let resolver = self
            .resolver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.detach(session);

        let Some(resolver) = resolver else {
            return false;
        };
        let (id, op) = (self.id, self.op);
        match &outcome {
            Ok(event) => debug!(call = %id, op, event = %event.kind(), "call resolved"),
            Err(e) => debug!(call = %id, op, error = %e, "call rejected"),
        }
        let _ = resolver.send(outcome);
        true
    }

    fn detach(&self, session: &HubSession) {
        let handlers = std::mem::take(
            &mut *self
                .handlers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for (kind, id) in handlers {
            session.off(kind, id);
        }
    }

    fn on_event(&self, session: &HubSession, event: &ServerEvent) {
        let outcome = if event.kind() == self.success {
            Ok(event.clone())
        } else {
            Err(failure_from(event))
        };
        self.settle(session, outcome);
    }
}

fn failure_from(event: &ServerEvent) -> TruthOrDareError {
    match event {
        ServerEvent::OperationFailed(envelope) => {
            TruthOrDareError::OperationFailed(envelope.clone())
        }
        other => TruthOrDareError::OperationFailed(ErrorEnvelope {
            status_code: None,
            errors: ErrorDetails {
                message: Some(format!("{} received", other.kind())),
                ..ErrorDetails::default()
            },
        }),
    }
}

async fn deadline(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}

/// Send `op` and wait for `success` or `failure`, whichever the server pushes first.
///
/// The returned event is always of kind `success`.
///
/// # Errors
///
/// - [`TruthOrDareError::NotConnected`] if the operation could not be queued;
///   the handlers are already removed when this is returned.
/// - [`TruthOrDareError::OperationFailed`] when the failure event arrives.
/// - [`TruthOrDareError::ConnectionClosed`] when the link drops or the
///   session closes for good before either event. A dropped link rejects
///   the call even if the session reconnects: the operation or its answer
///   may have been lost with it.
/// - [`TruthOrDareError::Timeout`] when `timeout` is set and elapses.
pub async fn invoke(
    session: &Arc<HubSession>,
    op: ClientOperation,
    success: EventKind,
    failure: EventKind,
    timeout: Option<Duration>,
) -> Result<ServerEvent> {
    let (tx, mut rx) = oneshot::channel();
    let call = Arc::new(PendingCall {
        id: Uuid::new_v4(),
        op: op.target(),
        success,
        resolver: Mutex::new(Some(tx)),
        handlers: Mutex::new(Vec::with_capacity(2)),
    });

    {
        let mut handlers = call.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let mut kinds = vec![success];
        if failure != success {
            kinds.push(failure);
        }
        for kind in kinds {
            let pending = Arc::clone(&call);
            let weak: Weak<HubSession> = Arc::downgrade(session);
            let id = session.on(kind, move |event| {
                if let Some(session) = weak.upgrade() {
                    pending.on_event(&session, event);
                }
            });
            handlers.push((kind, id));
        }
    }
    debug!(call = %call.id, op = call.op, %success, %failure, "call registered");

    let mut drops = session.subscribe_drops();
    if let Err(e) = session.send(&op) {
        warn!(call = %call.id, op = call.op, error = %e, "call could not be sent");
        call.detach(session);
        return Err(e);
    }

    let settled = tokio::select! {
        biased;
        settled = &mut rx => settled,
        () = session.closed() => {
            call.settle(session, Err(TruthOrDareError::ConnectionClosed));
            (&mut rx).await
        }
        Ok(()) = drops.changed() => {
            warn!(call = %call.id, op = call.op, "link dropped before the call settled");
            call.settle(session, Err(TruthOrDareError::ConnectionClosed));
            (&mut rx).await
        }
        () = deadline(timeout) => {
            call.settle(session, Err(TruthOrDareError::Timeout));
            (&mut rx).await
        }
    };
    settled.unwrap_or(Err(TruthOrDareError::ConnectionClosed))
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
    use crate::error_codes::ErrorCode;
    use crate::protocol::Acknowledgement;

    #[test]
    fn operation_failed_keeps_its_envelope() {
        let envelope = ErrorEnvelope::new(ErrorCode::NotYourTurn, "wait");
        let err = failure_from(&ServerEvent::OperationFailed(envelope.clone()));
        assert_eq!(err.envelope(), Some(&envelope));
    }

    #[test]
    fn other_failure_events_name_themselves() {
        let err = failure_from(&ServerEvent::LeaveRoomSuccess(Acknowledgement::default()));
        assert_eq!(
            err.envelope().unwrap().message(),
            "LeaveRoomSuccess received"
        );
    }
}
