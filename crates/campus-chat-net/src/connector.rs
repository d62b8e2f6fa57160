//! Transport connector.
//!
//! [`ConnectionManager`] is the process-scoped owner of the single real-time
//! connection of an authenticated session. It is built once at login,
//! shared (behind an `Arc`) with every surface that needs the connection,
//! and torn down at logout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use campus_chat_shared::constants::{EVENT_CONNECT, EVENT_DISCONNECT};
use campus_chat_shared::protocol::Frame;
use campus_chat_shared::{LocalIdentity, UserId};

use crate::error::NetError;
use crate::registry::{Handler, HandlerId, HandlerRegistry};
use crate::transport::{PubSubTransport, TransportCommand, TransportNotification};

pub struct ConnectionManager {
    transport: Arc<dyn PubSubTransport>,
    active: Mutex<Option<ConnectionHandle>>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn PubSubTransport>) -> Self {
        Self {
            transport,
            active: Mutex::new(None),
        }
    }

    /// Return the live connection for `identity`, opening it if needed.
    ///
    /// Calling this while already connected as the same user returns the
    /// existing handle. A different user replaces the previous connection.
    /// Must be called from within a tokio runtime.
    pub fn connect(&self, identity: &LocalIdentity) -> ConnectionHandle {
        let mut active = self.lock_active();

        if let Some(handle) = active.as_ref() {
            if !handle.is_closed() && handle.user_id() == &identity.id {
                debug!(user = %identity.id, "Reusing existing connection");
                return handle.clone();
            }
            info!(
                previous = %handle.user_id(),
                user = %identity.id,
                "Replacing connection for a different session"
            );
            handle.close();
        }

        let channels = self.transport.open(identity);
        let handle = ConnectionHandle::new(identity.id.clone(), channels.cmd_tx);
        tokio::spawn(dispatch_loop(handle.clone(), channels.notif_rx));

        info!(user = %identity.id, "Real-time connection opened");
        *active = Some(handle.clone());
        handle
    }

    /// The live connection, if any.
    pub fn current(&self) -> Option<ConnectionHandle> {
        self.lock_active()
            .as_ref()
            .filter(|h| !h.is_closed())
            .cloned()
    }

    /// Emit on the live connection; `NotConnected` when there is none.
    pub fn send(&self, event: &str, payload: Value) -> Result<(), NetError> {
        match self.current() {
            Some(handle) => handle.send(event, payload),
            None => Err(NetError::NotConnected),
        }
    }

    /// Tear the connection down. Safe to call when already disconnected.
    pub fn disconnect(&self) {
        if let Some(handle) = self.lock_active().take() {
            info!(user = %handle.user_id(), "Disconnecting real-time connection");
            handle.close();
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ConnectionHandle>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Cheap, cloneable reference to one connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<Inner>,
}

struct Inner {
    user_id: UserId,
    cmd_tx: mpsc::UnboundedSender<TransportCommand>,
    registry: Mutex<HandlerRegistry>,
    connected: AtomicBool,
    closed: AtomicBool,
}

impl ConnectionHandle {
    fn new(user_id: UserId, cmd_tx: mpsc::UnboundedSender<TransportCommand>) -> Self {
        Self {
            inner: Arc::new(Inner {
                user_id,
                cmd_tx,
                registry: Mutex::new(HandlerRegistry::new()),
                connected: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.inner.user_id
    }

    /// Register a handler for `event`. Keep the returned id to remove it.
    pub fn subscribe<F>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        self.registry().subscribe(event, handler)
    }

    pub fn unsubscribe(&self, event: &str, id: HandlerId) -> bool {
        self.registry().unsubscribe(event, id)
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.registry().handler_count(event)
    }

    /// Fire-and-forget emit. Delivery is only ever confirmed by a separate
    /// inbound event.
    ///
    /// Fails with `NotConnected` while the transport reports the link as
    /// down. Nothing is held back for a later reconnect.
    pub fn send(&self, event: &str, payload: Value) -> Result<(), NetError> {
        if self.is_closed() || !self.is_connected() {
            return Err(NetError::NotConnected);
        }
        self.inner
            .cmd_tx
            .send(TransportCommand::Emit(Frame::new(event, payload)))
            .map_err(|_| NetError::NotConnected)?;
        debug!(event, "Emitted event");
        Ok(())
    }

    /// Whether the transport currently reports an established link.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn same_connection(&self, other: &ConnectionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.connected.store(false, Ordering::SeqCst);
        self.registry().clear();
        let _ = self.inner.cmd_tx.send(TransportCommand::Close);
    }

    fn registry(&self) -> MutexGuard<'_, HandlerRegistry> {
        self.inner.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn dispatch(&self, event: &str, payload: &Value) {
        let handlers = self.registry().handlers_for(event);
        if handlers.is_empty() {
            debug!(event, "No handler registered for event");
        }
        for handler in handlers {
            handler(payload);
        }
    }
}

/// Deliver transport notifications to subscribed handlers, in the order the
/// transport produced them.
async fn dispatch_loop(
    handle: ConnectionHandle,
    mut notif_rx: mpsc::Receiver<TransportNotification>,
) {
    while let Some(notification) = notif_rx.recv().await {
        if handle.is_closed() {
            break;
        }
        match notification {
            TransportNotification::Connected => {
                handle.inner.connected.store(true, Ordering::SeqCst);
                info!(user = %handle.user_id(), "Transport connected");
                handle.dispatch(EVENT_CONNECT, &Value::Null);
            }
            TransportNotification::Disconnected { reason } => {
                handle.inner.connected.store(false, Ordering::SeqCst);
                warn!(user = %handle.user_id(), reason = %reason, "Transport disconnected");
                handle.dispatch(EVENT_DISCONNECT, &json!({ "reason": reason }));
            }
            TransportNotification::Frame(frame) => {
                handle.dispatch(&frame.event, &frame.data);
            }
        }
    }
    debug!(user = %handle.user_id(), "Dispatch loop ended");
}
