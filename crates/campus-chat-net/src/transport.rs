//! The seam to the underlying publish/subscribe client.
//!
//! A transport runs in its own tokio task. The connector talks to it through
//! a command channel and reads typed notifications back, the same split the
//! rest of the stack uses for long-lived network tasks. Reconnecting after a
//! drop is entirely the transport's business; the connector only ever sees
//! `Connected` / `Disconnected` signals.

use tokio::sync::mpsc;

use campus_chat_shared::protocol::Frame;
use campus_chat_shared::LocalIdentity;

/// Commands sent *into* the transport task.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCommand {
    /// Emit a frame. Fire-and-forget.
    Emit(Frame),
    /// Close the connection and end the task.
    Close,
}

/// Notifications sent *from* the transport task.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportNotification {
    /// The connection is (re)established.
    Connected,
    /// The connection dropped. The transport may reconnect on its own.
    Disconnected { reason: String },
    /// A frame arrived from the server.
    Frame(Frame),
}

/// Channel pair returned when a transport is opened.
pub struct TransportChannels {
    pub cmd_tx: mpsc::UnboundedSender<TransportCommand>,
    pub notif_rx: mpsc::Receiver<TransportNotification>,
}

/// An underlying real-time client library.
///
/// `open` must be called from within a tokio runtime; it spawns the
/// connection task and returns immediately. Connection progress is reported
/// through `TransportNotification::Connected`.
pub trait PubSubTransport: Send + Sync {
    fn open(&self, identity: &LocalIdentity) -> TransportChannels;
}
