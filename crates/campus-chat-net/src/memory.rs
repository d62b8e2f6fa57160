//! In-process transport.
//!
//! [`MemoryTransport`] stands in for a network client and [`MemoryServer`]
//! is the far end: it sees every emitted frame and can push events, drop
//! the link and bring it back. Used by tests and by embedders that run the
//! chat engine against a simulated backend.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use campus_chat_shared::constants::CHANNEL_CAPACITY;
use campus_chat_shared::protocol::Frame;
use campus_chat_shared::{LocalIdentity, UserId};

use crate::transport::{PubSubTransport, TransportChannels, TransportCommand, TransportNotification};

#[derive(Default)]
struct Shared {
    notif_tx: Option<mpsc::Sender<TransportNotification>>,
    user: Option<UserId>,
    open_count: usize,
}

pub struct MemoryTransport {
    shared: Arc<Mutex<Shared>>,
    outbound_tx: mpsc::UnboundedSender<Frame>,
}

pub struct MemoryServer {
    shared: Arc<Mutex<Shared>>,
    outbound_rx: mpsc::UnboundedReceiver<Frame>,
}

impl MemoryTransport {
    pub fn new() -> (Self, MemoryServer) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        (
            Self {
                shared: shared.clone(),
                outbound_tx,
            },
            MemoryServer {
                shared,
                outbound_rx,
            },
        )
    }
}

impl PubSubTransport for MemoryTransport {
    fn open(&self, identity: &LocalIdentity) -> TransportChannels {
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<TransportCommand>();
        let (notif_tx, notif_rx) = mpsc::channel(CHANNEL_CAPACITY);

        // Report the link as up straight away; the channel is fresh so this
        // cannot fail.
        let _ = notif_tx.try_send(TransportNotification::Connected);

        let generation = {
            let mut shared = lock(&self.shared);
            shared.notif_tx = Some(notif_tx);
            shared.user = Some(identity.id.clone());
            shared.open_count += 1;
            shared.open_count
        };

        let shared = self.shared.clone();
        let outbound_tx = self.outbound_tx.clone();
        tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                match cmd {
                    TransportCommand::Emit(frame) => {
                        let _ = outbound_tx.send(frame);
                    }
                    TransportCommand::Close => break,
                }
            }
            // A newer link may already have replaced this one.
            let mut shared = lock(&shared);
            if shared.open_count == generation {
                shared.notif_tx = None;
                shared.user = None;
            }
            debug!(generation, "Memory transport closed");
        });

        TransportChannels { cmd_tx, notif_rx }
    }
}

impl MemoryServer {
    /// Push an event to the client. Returns `false` when no link is open.
    pub async fn push(&self, event: &str, data: Value) -> bool {
        self.notify(TransportNotification::Frame(Frame::new(event, data)))
            .await
    }

    /// Simulate a dropped link (the client keeps its handle).
    pub async fn drop_connection(&self, reason: &str) -> bool {
        self.notify(TransportNotification::Disconnected {
            reason: reason.to_string(),
        })
        .await
    }

    /// Simulate the transport reconnecting on its own.
    pub async fn restore_connection(&self) -> bool {
        self.notify(TransportNotification::Connected).await
    }

    /// Next frame emitted by the client.
    pub async fn next_outbound(&mut self) -> Option<Frame> {
        self.outbound_rx.recv().await
    }

    pub fn try_outbound(&mut self) -> Option<Frame> {
        self.outbound_rx.try_recv().ok()
    }

    /// How many times a connection was opened through this transport.
    pub fn open_count(&self) -> usize {
        lock(&self.shared).open_count
    }

    pub fn is_open(&self) -> bool {
        lock(&self.shared).notif_tx.is_some()
    }

    /// User the current link was opened for.
    pub fn connected_user(&self) -> Option<UserId> {
        lock(&self.shared).user.clone()
    }

    async fn notify(&self, notification: TransportNotification) -> bool {
        let tx = lock(&self.shared).notif_tx.clone();
        match tx {
            Some(tx) => tx.send(notification).await.is_ok(),
            None => false,
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_reports_connected_and_forwards_emits() {
        let (transport, mut server) = MemoryTransport::new();
        let mut channels = transport.open(&LocalIdentity::new("u1", "alice", "t"));

        assert_eq!(
            channels.notif_rx.recv().await,
            Some(TransportNotification::Connected)
        );
        assert_eq!(server.connected_user(), Some(UserId::from("u1")));

        channels
            .cmd_tx
            .send(TransportCommand::Emit(Frame::new("ping", Value::Null)))
            .unwrap();
        assert_eq!(server.next_outbound().await.unwrap().event, "ping");
    }

    #[tokio::test]
    async fn test_push_without_link() {
        let (_transport, server) = MemoryTransport::new();
        assert!(!server.is_open());
        assert!(!server.push("receiveMessage", Value::Null).await);
    }
}
