//! Chat state reducer.
//!
//! [`ChatState`] owns the directory, the open conversation and the badge,
//! and applies every input (user commands, inbound events, fetch
//! completions) synchronously. Anything that needs the network comes back
//! as an [`Effect`] for the runtime to execute, which keeps this module
//! free of I/O and fully deterministic.

use serde::Serialize;
use tracing::{debug, info, warn};

use campus_chat_shared::protocol::{InboundEvent, SendMessagePayload};
use campus_chat_shared::{ChatError, ContactSummary, LocalIdentity, Message, SenderRef, UserId};

use crate::badge::{BadgePolicy, UnreadBadge};
use crate::directory::{ContactDirectory, ContactFields};
use crate::session::{ConversationSession, OpenTicket, ReceiveOutcome, SessionPhase};

/// Network work requested by the reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    FetchContacts,
    FetchHistory(OpenTicket),
    /// Fire-and-forget read acknowledgement.
    MarkRead(UserId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NoticeKind {
    NotConnected,
    FetchFailed,
    Transport,
}

/// Inline, dismissible error shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

impl Notice {
    pub fn from_error(err: &ChatError) -> Self {
        let kind = match err {
            ChatError::NotConnected => NoticeKind::NotConnected,
            ChatError::FetchFailed { .. } => NoticeKind::FetchFailed,
            _ => NoticeKind::Transport,
        };
        Self {
            kind,
            text: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub peer: SenderRef,
    #[serde(skip)]
    pub phase: SessionPhase,
    pub loading: bool,
    pub messages: Vec<Message>,
}

/// Read-only view published to UI surfaces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSnapshot {
    pub active: bool,
    pub connected: bool,
    pub contacts_loading: bool,
    pub contacts: Vec<ContactSummary>,
    pub conversation: Option<ConversationView>,
    pub badge: u32,
    pub notice: Option<Notice>,
}

pub struct ChatState {
    me: Option<LocalIdentity>,
    directory: ContactDirectory,
    session: ConversationSession,
    badge: UnreadBadge,
    connected: bool,
    contacts_loading: bool,
    notice: Option<Notice>,
}

impl ChatState {
    pub fn new(policy: BadgePolicy) -> Self {
        Self {
            me: None,
            directory: ContactDirectory::new(),
            session: ConversationSession::new(),
            badge: UnreadBadge::new(policy),
            connected: false,
            contacts_loading: false,
            notice: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.me.is_some()
    }

    pub fn me(&self) -> Option<&LocalIdentity> {
        self.me.as_ref()
    }

    pub fn directory(&self) -> &ContactDirectory {
        &self.directory
    }

    pub fn session(&self) -> &ConversationSession {
        &self.session
    }

    pub fn badge(&self) -> &UnreadBadge {
        &self.badge
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    // -- Session lifecycle ------------------------------------------------

    /// Start a chat session for `me` and request the contact snapshot.
    pub fn activate(&mut self, me: LocalIdentity) -> Vec<Effect> {
        if self.me.as_ref() == Some(&me) {
            return Vec::new();
        }
        if self.is_active() {
            self.deactivate();
        }
        info!(user = %me.id, "Chat session activated");
        self.me = Some(me);
        self.contacts_loading = true;
        vec![Effect::FetchContacts]
    }

    /// Drop all chat state (logout).
    pub fn deactivate(&mut self) {
        if let Some(me) = self.me.take() {
            info!(user = %me.id, "Chat session deactivated");
        }
        self.directory.clear();
        self.session.close();
        self.badge.clear();
        self.connected = false;
        self.contacts_loading = false;
        self.notice = None;
    }

    pub fn refresh_contacts(&mut self) -> Vec<Effect> {
        if !self.is_active() {
            return Vec::new();
        }
        self.contacts_loading = true;
        vec![Effect::FetchContacts]
    }

    // -- Fetch completions ------------------------------------------------

    pub fn apply_contacts(&mut self, result: Result<Vec<ContactSummary>, ChatError>) {
        if !self.is_active() {
            debug!("Ignoring contact snapshot for an inactive session");
            return;
        }
        self.contacts_loading = false;
        match result {
            Ok(snapshot) => {
                self.directory.load_snapshot(snapshot);
                if self.badge.seed(self.directory.total_unread()) {
                    debug!(badge = self.badge.count(), "Seeded unread badge");
                }
                self.clear_notice_of(NoticeKind::FetchFailed);
            }
            Err(e) => {
                warn!(error = %e, "Contact fetch failed, keeping current list");
                self.notice = Some(Notice::from_error(&e));
            }
        }
    }

    /// Returns `false` when the result was for a conversation that is no
    /// longer being opened.
    pub fn apply_history(
        &mut self,
        ticket: &OpenTicket,
        result: Result<Vec<Message>, ChatError>,
    ) -> bool {
        let applied = match result {
            Ok(history) => {
                let count = history.len();
                let applied = self.session.complete_open(ticket, history);
                if applied {
                    debug!(peer = %ticket.peer, count, "Conversation history loaded");
                    self.clear_notice_of(NoticeKind::FetchFailed);
                }
                applied
            }
            Err(e) => {
                let applied = self.session.fail_open(ticket);
                if applied {
                    warn!(peer = %ticket.peer, error = %e, "History fetch failed");
                    self.notice = Some(Notice::from_error(&e));
                }
                applied
            }
        };
        if !applied {
            debug!(
                peer = %ticket.peer,
                generation = ticket.generation,
                "Discarding stale history result"
            );
        }
        applied
    }

    // -- User commands ----------------------------------------------------

    /// Start a chat from outside the list (e.g. a product page), adding a
    /// skeleton entry when the peer is unknown, then open it.
    pub fn start_chat(&mut self, peer: SenderRef) -> Vec<Effect> {
        if !self.is_active() || peer.is_unknown() {
            return Vec::new();
        }
        if self.directory.insert_skeleton(&peer) {
            debug!(peer = %peer.id, "Added skeleton contact");
        }
        self.open_conversation(peer)
    }

    /// Open the conversation with `peer`: clear its unread counter,
    /// acknowledge reads, then request history.
    pub fn open_conversation(&mut self, peer: SenderRef) -> Vec<Effect> {
        if !self.is_active() || peer.is_unknown() {
            return Vec::new();
        }
        let peer = self.enrich(peer);
        self.directory.clear_unread(&peer.id);
        let peer_id = peer.id.clone();
        let ticket = self.session.open(peer);
        debug!(peer = %peer_id, generation = ticket.generation, "Opening conversation");
        vec![Effect::MarkRead(peer_id), Effect::FetchHistory(ticket)]
    }

    pub fn close_conversation(&mut self) {
        self.session.close();
    }

    /// Validate an outgoing message. The runtime hands the payload to the
    /// transport; nothing is added to the list until the echo arrives.
    pub fn prepare_send(&self, text: &str) -> Result<SendMessagePayload, ChatError> {
        if !self.is_active() {
            return Err(ChatError::Inactive);
        }
        self.session.prepare_send(text)
    }

    pub fn record_send_failure(&mut self, err: &ChatError) {
        warn!(error = %err, "Send failed");
        self.notice = Some(Notice::from_error(err));
    }

    /// User navigated to the conversation list.
    pub fn reset_badge(&mut self) {
        self.badge.reset();
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    // -- Inbound events ---------------------------------------------------

    pub fn handle_event(&mut self, event: InboundEvent) -> Vec<Effect> {
        if !self.is_active() {
            debug!(?event, "Ignoring event for an inactive session");
            return Vec::new();
        }
        match event {
            InboundEvent::ReceiveMessage(message) | InboundEvent::MessageSent(message) => {
                self.on_message(message)
            }
            InboundEvent::Error(text) => {
                warn!(error = %text, "Server reported an error");
                self.notice = Some(Notice {
                    kind: NoticeKind::Transport,
                    text,
                });
                Vec::new()
            }
            InboundEvent::Connected => {
                self.connected = true;
                self.clear_notice_of(NoticeKind::NotConnected);
                Vec::new()
            }
            InboundEvent::Disconnected => {
                self.connected = false;
                Vec::new()
            }
            InboundEvent::Unknown(name) => {
                debug!(event = %name, "Ignoring unknown event");
                Vec::new()
            }
        }
    }

    fn on_message(&mut self, message: Message) -> Vec<Effect> {
        let me = match &self.me {
            Some(me) => me.id.clone(),
            None => return Vec::new(),
        };
        let mut effects = Vec::new();
        let from_me = message.is_from(&me);
        let sender = message.sender.clone();

        // Sidebar
        if from_me {
            let target = message
                .receiver_id
                .clone()
                .or_else(|| self.session.peer_id().cloned());
            if let Some(target) = target {
                let peer = self.session.peer().filter(|p| p.id == target).cloned();
                let fields = ContactFields::from_message(&message, peer.as_ref());
                self.directory.upsert(&target, fields, false);
            }
        } else if sender.is_unknown() {
            debug!(message = %message.id, "Message without a resolvable sender");
        } else {
            let viewing = self.session.is_viewing(&sender.id);
            let fields = ContactFields::from_message(&message, Some(&sender));
            self.directory.upsert(&sender.id, fields, !viewing);
            self.badge.on_inbound(viewing);
        }

        // Conversation. An own message sent to someone else (from another
        // device) stays out of the open list.
        let elsewhere = from_me
            && message
                .receiver_id
                .as_ref()
                .is_some_and(|to| self.session.peer_id() != Some(to));
        if elsewhere {
            return effects;
        }
        match self.session.receive(message, &me) {
            ReceiveOutcome::Appended { from_peer: true } => {
                effects.push(Effect::MarkRead(sender.id));
            }
            ReceiveOutcome::Duplicate => {
                debug!(peer = %sender.id, "Dropped duplicate message");
            }
            _ => {}
        }

        effects
    }

    // -- Helpers ----------------------------------------------------------

    /// Fill missing display fields of `peer` from the directory.
    fn enrich(&self, mut peer: SenderRef) -> SenderRef {
        if let Some(entry) = self.directory.get(&peer.id) {
            if peer.display_name.is_none() {
                peer.display_name = Some(entry.display_name.clone());
            }
            if peer.handle.is_none() && !entry.handle.is_empty() {
                peer.handle = Some(entry.handle.clone());
            }
        }
        peer
    }

    fn clear_notice_of(&mut self, kind: NoticeKind) {
        if self.notice.as_ref().map(|n| n.kind) == Some(kind) {
            self.notice = None;
        }
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            active: self.is_active(),
            connected: self.connected,
            contacts_loading: self.contacts_loading,
            contacts: self.directory.entries().to_vec(),
            conversation: self.session.peer().map(|peer| ConversationView {
                peer: peer.clone(),
                phase: self.session.phase(),
                loading: self.session.is_loading(),
                messages: self.session.messages().to_vec(),
            }),
            badge: self.badge.count(),
            notice: self.notice.clone(),
        }
    }
}
