//! WebSocket transport.
//!
//! Speaks JSON `{ "event": ..., "data": ... }` text frames. The connection
//! task reconnects on its own with exponential backoff. The connector stops
//! accepting emits once it sees the link go down; the few that race the
//! `Disconnected` notification are held in a bounded buffer and flushed on
//! reconnect. A frame whose write fails is dropped, never retried.

use std::collections::VecDeque;
use std::time::Duration;

use futures::{Sink, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, WebSocketStream};
use tracing::{debug, error, info, warn};

use campus_chat_shared::constants::{CHANNEL_CAPACITY, MAX_RECONNECT_DELAY_MS};
use campus_chat_shared::protocol::Frame;
use campus_chat_shared::{LocalIdentity, UserId};

use crate::error::NetError;
use crate::transport::{PubSubTransport, TransportChannels, TransportCommand, TransportNotification};

pub struct WsTransport {
    url: String,
    reconnect_delay: Duration,
}

impl WsTransport {
    pub fn new(url: impl Into<String>, reconnect_delay: Duration) -> Self {
        Self {
            url: url.into(),
            reconnect_delay,
        }
    }
}

impl PubSubTransport for WsTransport {
    fn open(&self, identity: &LocalIdentity) -> TransportChannels {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (notif_tx, notif_rx) = mpsc::channel(CHANNEL_CAPACITY);

        tokio::spawn(run_connection(
            self.url.clone(),
            identity.clone(),
            self.reconnect_delay,
            cmd_rx,
            notif_tx,
        ));

        TransportChannels { cmd_tx, notif_rx }
    }
}

/// Build the upgrade request: the user id travels in the query string and
/// the bearer credential in the `Authorization` header.
pub fn build_request(url: &str, identity: &LocalIdentity) -> Result<Request, NetError> {
    let endpoint = with_user_query(url, &identity.id);
    let mut request = endpoint
        .as_str()
        .into_client_request()
        .map_err(|e| NetError::InvalidUrl(e.to_string()))?;
    let bearer = HeaderValue::from_str(&format!("Bearer {}", identity.token))
        .map_err(|e| NetError::Handshake(e.to_string()))?;
    request.headers_mut().insert(AUTHORIZATION, bearer);
    Ok(request)
}

fn with_user_query(url: &str, user: &UserId) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}userId={user}")
}

/// Delay before reconnect attempt `attempt` (1-based).
fn backoff(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(6));
    base.saturating_mul(factor)
        .min(Duration::from_millis(MAX_RECONNECT_DELAY_MS))
}

enum SessionEnd {
    /// Close requested by the owner; the task must exit.
    Closed,
    /// The link dropped; reconnect.
    Dropped(String),
}

async fn run_connection(
    url: String,
    identity: LocalIdentity,
    base_delay: Duration,
    mut cmd_rx: mpsc::UnboundedReceiver<TransportCommand>,
    notif_tx: mpsc::Sender<TransportNotification>,
) {
    let mut pending: VecDeque<Frame> = VecDeque::new();
    let mut attempt: u32 = 0;

    loop {
        let request = match build_request(&url, &identity) {
            Ok(r) => r,
            Err(e) => {
                error!(url = %url, error = %e, "Cannot build connection request");
                let _ = notif_tx
                    .send(TransportNotification::Disconnected {
                        reason: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        match connect_async(request).await {
            Ok((stream, _response)) => {
                attempt = 0;
                info!(url = %url, user = %identity.id, "WebSocket connected");
                if notif_tx.send(TransportNotification::Connected).await.is_err() {
                    return;
                }
                match run_session(stream, &mut cmd_rx, &notif_tx, &mut pending).await {
                    SessionEnd::Closed => {
                        info!(user = %identity.id, "WebSocket closed");
                        return;
                    }
                    SessionEnd::Dropped(reason) => {
                        warn!(reason = %reason, "WebSocket dropped");
                        if notif_tx
                            .send(TransportNotification::Disconnected { reason })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(url = %url, attempt, error = %e, "WebSocket connect failed");
            }
        }

        attempt += 1;
        let delay = backoff(base_delay, attempt);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "Waiting before reconnect");
        if !wait_buffering(delay, &mut cmd_rx, &mut pending).await {
            return;
        }
    }
}

/// Sleep for `delay` while buffering emits. Returns `false` on close.
async fn wait_buffering(
    delay: Duration,
    cmd_rx: &mut mpsc::UnboundedReceiver<TransportCommand>,
    pending: &mut VecDeque<Frame>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = cmd_rx.recv() => match cmd {
                Some(TransportCommand::Emit(frame)) => {
                    buffer_frame(pending, frame);
                }
                Some(TransportCommand::Close) | None => return false,
            },
        }
    }
}

/// Hold `frame` until the link is back. Returns `false` (dropping the
/// frame) once the buffer is full.
fn buffer_frame(pending: &mut VecDeque<Frame>, frame: Frame) -> bool {
    if pending.len() >= CHANNEL_CAPACITY {
        warn!(event = %frame.event, buffered = pending.len(), "Offline buffer full, dropping frame");
        return false;
    }
    pending.push_back(frame);
    true
}

async fn run_session<S>(
    stream: WebSocketStream<S>,
    cmd_rx: &mut mpsc::UnboundedReceiver<TransportCommand>,
    notif_tx: &mpsc::Sender<TransportNotification>,
    pending: &mut VecDeque<Frame>,
) -> SessionEnd
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut write, mut read) = stream.split();

    while let Some(frame) = pending.pop_front() {
        if let Err(reason) = write_frame(&mut write, &frame).await {
            warn!(event = %frame.event, "Dropping buffered frame after write failure");
            return SessionEnd::Dropped(reason);
        }
    }

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(TransportCommand::Emit(frame)) => {
                    if let Err(reason) = write_frame(&mut write, &frame).await {
                        warn!(event = %frame.event, "Dropping frame after write failure");
                        return SessionEnd::Dropped(reason);
                    }
                }
                Some(TransportCommand::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Closed;
                }
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => match Frame::from_text(text.as_str()) {
                    Ok(frame) => {
                        if notif_tx.send(TransportNotification::Frame(frame)).await.is_err() {
                            return SessionEnd::Closed;
                        }
                    }
                    Err(e) => warn!(error = %e, "Discarding undecodable frame"),
                },
                Some(Ok(Message::Close(close))) => {
                    return SessionEnd::Dropped(format!("closed by server: {close:?}"));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
                None => return SessionEnd::Dropped("stream ended".to_string()),
            },
        }
    }
}

async fn write_frame<W>(write: &mut W, frame: &Frame) -> Result<(), String>
where
    W: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let text = match frame.to_text() {
        Ok(t) => t,
        Err(e) => {
            warn!(event = %frame.event, error = %e, "Cannot encode frame");
            return Ok(());
        }
    };
    write
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| e.to_string())
}
