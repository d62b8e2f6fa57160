//! Chat runtime: the single event loop that owns [`ChatState`].
//!
//! User commands, inbound real-time events and fetch completions are
//! queued on channels and applied one at a time inside a dedicated tokio
//! task. Fetches run as separate tasks and report back through the
//! completion channel, so an inbound message is processed even while a
//! history fetch is still outstanding. Every applied input publishes a
//! fresh [`ChatSnapshot`] on a watch channel.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use campus_chat_net::{ConnectionHandle, ConnectionManager, HandlerId};
use campus_chat_shared::constants::{
    DEFAULT_FETCH_TIMEOUT_SECS, EVENT_CONNECT, EVENT_DISCONNECT, EVENT_ERROR,
    EVENT_MESSAGE_SENT, EVENT_RECEIVE_MESSAGE, EVENT_SEND_MESSAGE,
};
use campus_chat_shared::error::FetchKind;
use campus_chat_shared::protocol::InboundEvent;
use campus_chat_shared::{ChatError, ContactSummary, LocalIdentity, Message, SenderRef, UserId};

use crate::api::ChatApi;
use crate::auth::SessionStatus;
use crate::badge::BadgePolicy;
use crate::error::ApiError;
use crate::session::OpenTicket;
use crate::state::{ChatSnapshot, ChatState, Effect};

/// Events the runtime listens to on the connection.
const SUBSCRIBED_EVENTS: [&str; 5] = [
    EVENT_RECEIVE_MESSAGE,
    EVENT_MESSAGE_SENT,
    EVENT_ERROR,
    EVENT_CONNECT,
    EVENT_DISCONNECT,
];

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub badge_policy: BadgePolicy,
    pub fetch_timeout: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            badge_policy: BadgePolicy::default(),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }
}

// ---------------------------------------------------------------------------
// Command / completion types
// ---------------------------------------------------------------------------

/// Commands sent *into* the runtime task.
#[derive(Debug)]
enum ChatCommand {
    SetSession(SessionStatus),
    StartChat(SenderRef),
    Open(SenderRef),
    Close,
    Send {
        text: String,
        reply: oneshot::Sender<Result<(), ChatError>>,
    },
    ResetBadge,
    DismissNotice,
    RefreshContacts,
    Shutdown,
}

/// Fetch results reported back by spawned tasks. `epoch` identifies the
/// session that issued the fetch.
#[derive(Debug)]
enum Completion {
    Contacts {
        epoch: u64,
        result: Result<Vec<ContactSummary>, ChatError>,
    },
    History {
        epoch: u64,
        ticket: OpenTicket,
        result: Result<Vec<Message>, ChatError>,
    },
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable front door to the runtime task. Every surface (header badge,
/// chat view, CLI) holds one of these and reads the same snapshot stream.
#[derive(Clone)]
pub struct ChatHandle {
    cmd_tx: mpsc::UnboundedSender<ChatCommand>,
    snapshot_rx: watch::Receiver<ChatSnapshot>,
}

impl ChatHandle {
    /// Report the authentication state. Chat activates on `Authenticated`
    /// and tears down on anything else.
    pub fn set_session(&self, status: SessionStatus) {
        self.command(ChatCommand::SetSession(status));
    }

    /// Open a chat with a peer that may not be in the list yet.
    pub fn start_chat(&self, peer: SenderRef) {
        self.command(ChatCommand::StartChat(peer));
    }

    pub fn open(&self, peer: SenderRef) {
        self.command(ChatCommand::Open(peer));
    }

    pub fn close(&self) {
        self.command(ChatCommand::Close);
    }

    /// Send `text` to the open conversation.
    ///
    /// `Ok` means the message was handed to the transport. It shows up in
    /// the conversation only once the server echoes it back.
    pub async fn send(&self, text: impl Into<String>) -> Result<(), ChatError> {
        let (reply, rx) = oneshot::channel();
        self.command(ChatCommand::Send {
            text: text.into(),
            reply,
        });
        rx.await.unwrap_or(Err(ChatError::Inactive))
    }

    pub fn reset_badge(&self) {
        self.command(ChatCommand::ResetBadge);
    }

    pub fn dismiss_notice(&self) {
        self.command(ChatCommand::DismissNotice);
    }

    pub fn refresh_contacts(&self) {
        self.command(ChatCommand::RefreshContacts);
    }

    pub fn shutdown(&self) {
        self.command(ChatCommand::Shutdown);
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Wait until a published snapshot satisfies `predicate`.
    pub async fn wait_for<F>(&self, predicate: F) -> Option<ChatSnapshot>
    where
        F: FnMut(&ChatSnapshot) -> bool,
    {
        let mut rx = self.snapshot_rx.clone();
        let snapshot = rx.wait_for(predicate).await.ok().map(|s| s.clone());
        snapshot
    }

    fn command(&self, cmd: ChatCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            debug!("Chat runtime has stopped, command dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime task
// ---------------------------------------------------------------------------

/// Spawn the runtime task and return its handle. Must be called from within
/// a tokio runtime.
pub fn spawn_runtime(
    manager: Arc<ConnectionManager>,
    api: Arc<dyn ChatApi>,
    options: RuntimeOptions,
) -> ChatHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (completion_tx, completion_rx) = mpsc::unbounded_channel();

    let state = ChatState::new(options.badge_policy);
    let (snapshot_tx, snapshot_rx) = watch::channel(state.snapshot());

    let runtime = ChatRuntime {
        state,
        manager,
        api,
        fetch_timeout: options.fetch_timeout,
        epoch: 0,
        connection: None,
        subscriptions: Vec::new(),
        event_tx,
        completion_tx,
        snapshot_tx,
    };
    tokio::spawn(runtime.run(cmd_rx, event_rx, completion_rx));

    ChatHandle {
        cmd_tx,
        snapshot_rx,
    }
}

struct ChatRuntime {
    state: ChatState,
    manager: Arc<ConnectionManager>,
    api: Arc<dyn ChatApi>,
    fetch_timeout: Duration,
    /// Bumped on every activation and teardown; stale work is dropped.
    epoch: u64,
    connection: Option<ConnectionHandle>,
    subscriptions: Vec<(&'static str, HandlerId)>,
    event_tx: mpsc::UnboundedSender<(u64, InboundEvent)>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    snapshot_tx: watch::Sender<ChatSnapshot>,
}

impl ChatRuntime {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<ChatCommand>,
        mut event_rx: mpsc::UnboundedReceiver<(u64, InboundEvent)>,
        mut completion_rx: mpsc::UnboundedReceiver<Completion>,
    ) {
        info!("Chat runtime started");
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(ChatCommand::Shutdown) | None => break,
                        Some(cmd) => self.on_command(cmd),
                    }
                }
                Some((epoch, event)) = event_rx.recv() => {
                    if epoch == self.epoch {
                        let effects = self.state.handle_event(event);
                        self.execute(effects);
                    } else {
                        debug!(epoch, current = self.epoch, "Dropping event from a previous session");
                    }
                }
                Some(completion) = completion_rx.recv() => {
                    self.on_completion(completion);
                }
            }
            self.publish();
        }

        self.teardown();
        self.publish();
        info!("Chat runtime stopped");
    }

    fn on_command(&mut self, cmd: ChatCommand) {
        match cmd {
            ChatCommand::SetSession(status) => self.set_session(status),
            ChatCommand::StartChat(peer) => {
                let effects = self.state.start_chat(peer);
                self.execute(effects);
            }
            ChatCommand::Open(peer) => {
                let effects = self.state.open_conversation(peer);
                self.execute(effects);
            }
            ChatCommand::Close => self.state.close_conversation(),
            ChatCommand::Send { text, reply } => {
                let result = self.send(&text);
                if let Err(e) = &result {
                    if *e == ChatError::NotConnected {
                        self.state.record_send_failure(e);
                    }
                }
                let _ = reply.send(result);
            }
            ChatCommand::ResetBadge => self.state.reset_badge(),
            ChatCommand::DismissNotice => self.state.dismiss_notice(),
            ChatCommand::RefreshContacts => {
                let effects = self.state.refresh_contacts();
                self.execute(effects);
            }
            // Handled by the loop.
            ChatCommand::Shutdown => {}
        }
    }

    fn set_session(&mut self, status: SessionStatus) {
        match status {
            SessionStatus::Authenticated(me) => {
                if self.state.me() == Some(&me) {
                    return;
                }
                self.teardown();
                self.activate(me);
            }
            SessionStatus::Resolving => {
                debug!("Session resolving, chat stays inactive");
                self.teardown();
            }
            SessionStatus::Unauthenticated => self.teardown(),
        }
    }

    fn activate(&mut self, me: LocalIdentity) {
        self.epoch += 1;
        let handle = self.manager.connect(&me);

        for event in SUBSCRIBED_EVENTS {
            let tx = self.event_tx.clone();
            let epoch = self.epoch;
            let id = handle.subscribe(event, move |data: &Value| {
                let _ = tx.send((epoch, InboundEvent::parse(event, data)));
            });
            self.subscriptions.push((event, id));
        }

        let effects = self.state.activate(me);
        // The link may have come up before the handlers were in place.
        if handle.is_connected() {
            self.state.handle_event(InboundEvent::Connected);
        }
        self.connection = Some(handle);
        self.execute(effects);
    }

    /// Unsubscribe, disconnect and forget all chat state.
    fn teardown(&mut self) {
        if let Some(handle) = self.connection.take() {
            for (event, id) in self.subscriptions.drain(..) {
                handle.unsubscribe(event, id);
            }
            self.manager.disconnect();
        }
        self.subscriptions.clear();
        if self.state.is_active() {
            self.epoch += 1;
            self.state.deactivate();
        }
    }

    fn send(&self, text: &str) -> Result<(), ChatError> {
        let payload = self.state.prepare_send(text)?;
        self.manager
            .send(EVENT_SEND_MESSAGE, payload.to_value())
            .map_err(ChatError::from)
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Contacts { epoch, result } => {
                if epoch != self.epoch {
                    debug!("Dropping contact snapshot from a previous session");
                    return;
                }
                self.state.apply_contacts(result);
            }
            Completion::History {
                epoch,
                ticket,
                result,
            } => {
                if epoch != self.epoch {
                    debug!("Dropping history from a previous session");
                    return;
                }
                self.state.apply_history(&ticket, result);
            }
        }
    }

    fn execute(&self, effects: Vec<Effect>) {
        let Some(me) = self.state.me().cloned() else {
            return;
        };
        for effect in effects {
            match effect {
                Effect::FetchContacts => self.spawn_fetch_contacts(me.clone()),
                Effect::FetchHistory(ticket) => self.spawn_fetch_history(me.clone(), ticket),
                Effect::MarkRead(peer) => self.spawn_mark_read(me.clone(), peer),
            }
        }
    }

    fn spawn_fetch_contacts(&self, me: LocalIdentity) {
        let api = self.api.clone();
        let tx = self.completion_tx.clone();
        let epoch = self.epoch;
        let timeout = self.fetch_timeout;
        tokio::spawn(async move {
            let result = with_timeout(timeout, api.fetch_contacts(&me))
                .await
                .map_err(|e| e.into_chat(FetchKind::Contacts));
            let _ = tx.send(Completion::Contacts { epoch, result });
        });
    }

    fn spawn_fetch_history(&self, me: LocalIdentity, ticket: OpenTicket) {
        let api = self.api.clone();
        let tx = self.completion_tx.clone();
        let epoch = self.epoch;
        let timeout = self.fetch_timeout;
        tokio::spawn(async move {
            let result = with_timeout(timeout, api.fetch_history(&me, &ticket.peer))
                .await
                .map_err(|e| e.into_chat(FetchKind::History));
            let _ = tx.send(Completion::History {
                epoch,
                ticket,
                result,
            });
        });
    }

    fn spawn_mark_read(&self, me: LocalIdentity, peer: UserId) {
        let api = self.api.clone();
        let timeout = self.fetch_timeout;
        tokio::spawn(async move {
            match with_timeout(timeout, api.mark_read(&me, &peer)).await {
                Ok(()) => debug!(peer = %peer, "Marked conversation read"),
                Err(e) => warn!(peer = %peer, error = %e, "Mark-as-read failed"),
            }
        });
    }

    fn publish(&self) {
        let snapshot = self.state.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, ApiError>
where
    F: std::future::Future<Output = Result<T, ApiError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::Timeout),
    }
}
