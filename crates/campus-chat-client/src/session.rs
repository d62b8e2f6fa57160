//! The open conversation.
//!
//! `Closed -> Opening -> Open -> Closed`. At most one conversation is live;
//! opening another peer discards the previous message list. History
//! arrivals are matched against an [`OpenTicket`] so a fetch issued for a
//! conversation that has since been replaced is ignored.

use std::collections::HashSet;

use campus_chat_shared::protocol::SendMessagePayload;
use campus_chat_shared::{ChatError, Message, MessageId, SenderRef, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Closed,
    /// History requested, not yet arrived.
    Opening,
    Open,
}

/// Identifies one `open` call. Compared when its history fetch completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenTicket {
    pub peer: UserId,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// No open conversation, or the message belongs to another one.
    Ignored,
    /// Already in the list.
    Duplicate,
    Appended { from_peer: bool },
}

#[derive(Debug, Clone)]
enum State {
    Closed,
    Opening {
        peer: SenderRef,
        generation: u64,
    },
    Open {
        peer: SenderRef,
        messages: Vec<Message>,
        ids: HashSet<MessageId>,
    },
}

#[derive(Debug, Clone)]
pub struct ConversationSession {
    state: State,
    generation: u64,
}

impl Default for ConversationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationSession {
    pub fn new() -> Self {
        Self {
            state: State::Closed,
            generation: 0,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match self.state {
            State::Closed => SessionPhase::Closed,
            State::Opening { .. } => SessionPhase::Opening,
            State::Open { .. } => SessionPhase::Open,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.phase() == SessionPhase::Opening
    }

    pub fn peer(&self) -> Option<&SenderRef> {
        match &self.state {
            State::Closed => None,
            State::Opening { peer, .. } | State::Open { peer, .. } => Some(peer),
        }
    }

    pub fn peer_id(&self) -> Option<&UserId> {
        self.peer().map(|p| &p.id)
    }

    /// Whether `user`'s conversation is the one on screen (loading or not).
    pub fn is_viewing(&self, user: &UserId) -> bool {
        !user.is_empty() && self.peer_id() == Some(user)
    }

    pub fn messages(&self) -> &[Message] {
        match &self.state {
            State::Open { messages, .. } => messages,
            _ => &[],
        }
    }

    /// Start opening `peer`, discarding whatever was open before.
    pub fn open(&mut self, peer: SenderRef) -> OpenTicket {
        self.generation += 1;
        let ticket = OpenTicket {
            peer: peer.id.clone(),
            generation: self.generation,
        };
        self.state = State::Opening {
            peer,
            generation: self.generation,
        };
        ticket
    }

    fn is_current(&self, ticket: &OpenTicket) -> bool {
        matches!(
            &self.state,
            State::Opening { peer, generation }
                if peer.id == ticket.peer && *generation == ticket.generation
        )
    }

    /// History arrived. Returns `false` when the ticket is stale and the
    /// result was dropped.
    pub fn complete_open(&mut self, ticket: &OpenTicket, history: Vec<Message>) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        let peer = match std::mem::replace(&mut self.state, State::Closed) {
            State::Opening { peer, .. } => peer,
            // is_current guarantees Opening
            other => {
                self.state = other;
                return false;
            }
        };

        let mut ids = HashSet::with_capacity(history.len());
        let messages = history
            .into_iter()
            .filter(|m| ids.insert(m.id.clone()))
            .collect();

        self.state = State::Open {
            peer,
            messages,
            ids,
        };
        true
    }

    /// History fetch failed. The conversation opens empty so the user can
    /// still send. Returns `false` for a stale ticket.
    pub fn fail_open(&mut self, ticket: &OpenTicket) -> bool {
        self.complete_open(ticket, Vec::new())
    }

    pub fn close(&mut self) {
        self.state = State::Closed;
    }

    /// Apply an incoming or confirmed message.
    ///
    /// Only applies while `Open`, and only for messages sent by the open
    /// peer or by `me`. Inserting is idempotent on the message id, so a
    /// push and a send confirmation of the same message, in either order,
    /// leave a single entry.
    pub fn receive(&mut self, message: Message, me: &UserId) -> ReceiveOutcome {
        let State::Open { peer, messages, ids } = &mut self.state else {
            return ReceiveOutcome::Ignored;
        };

        let from_peer = message.is_from(&peer.id);
        let from_me = message.is_from(me);
        if !from_peer && !from_me {
            return ReceiveOutcome::Ignored;
        }

        if !ids.insert(message.id.clone()) {
            return ReceiveOutcome::Duplicate;
        }
        messages.push(message);
        ReceiveOutcome::Appended {
            from_peer: from_peer && !from_me,
        }
    }

    /// Validate `text` and build the outbound payload. Nothing is inserted
    /// locally: the message appears once the server confirms it.
    pub fn prepare_send(&self, text: &str) -> Result<SendMessagePayload, ChatError> {
        let content = text.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let peer = self.peer_id().ok_or(ChatError::NoOpenConversation)?;
        Ok(SendMessagePayload {
            receiver_id: peer.clone(),
            content: content.to_string(),
        })
    }
}
