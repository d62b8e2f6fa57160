//! End-to-end flows through the runtime against an in-process transport
//! and a scripted REST backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use campus_chat_client::{
    spawn_runtime, ApiError, BadgePolicy, ChatApi, ChatHandle, ChatSnapshot, NoticeKind,
    RuntimeOptions, SessionStatus,
};
use campus_chat_net::{ConnectionManager, MemoryServer, MemoryTransport};
use campus_chat_shared::constants::{EVENT_MESSAGE_SENT, EVENT_RECEIVE_MESSAGE, EVENT_SEND_MESSAGE};
use campus_chat_shared::{
    ChatError, ContactSummary, LocalIdentity, Message, MessageId, SenderRef, UserId,
};

const WAIT: Duration = Duration::from_secs(2);

#[derive(Default)]
struct FakeApi {
    contacts: Mutex<Option<Result<Vec<ContactSummary>, String>>>,
    history: Mutex<HashMap<UserId, Vec<Message>>>,
    gates: Mutex<HashMap<UserId, Arc<Notify>>>,
    reads: Mutex<Vec<UserId>>,
}

impl FakeApi {
    fn with_contacts(contacts: Vec<ContactSummary>) -> Self {
        let api = Self::default();
        *api.contacts.lock().unwrap() = Some(Ok(contacts));
        api
    }

    fn set_history(&self, peer: &str, messages: Vec<Message>) {
        self.history.lock().unwrap().insert(UserId::from(peer), messages);
    }

    /// Hold history for `peer` until the returned notify fires.
    fn gate_history(&self, peer: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().unwrap().insert(UserId::from(peer), gate.clone());
        gate
    }

    fn reads(&self) -> Vec<UserId> {
        self.reads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn fetch_contacts(&self, _me: &LocalIdentity) -> Result<Vec<ContactSummary>, ApiError> {
        match self.contacts.lock().unwrap().clone() {
            Some(Ok(contacts)) => Ok(contacts),
            Some(Err(message)) => Err(ApiError::Status { status: 503, message }),
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_history(
        &self,
        _me: &LocalIdentity,
        peer: &UserId,
    ) -> Result<Vec<Message>, ApiError> {
        let gate = self.gates.lock().unwrap().get(peer).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(self.history.lock().unwrap().get(peer).cloned().unwrap_or_default())
    }

    async fn mark_read(&self, _me: &LocalIdentity, peer: &UserId) -> Result<(), ApiError> {
        self.reads.lock().unwrap().push(peer.clone());
        Ok(())
    }
}

struct Harness {
    handle: ChatHandle,
    server: MemoryServer,
    manager: Arc<ConnectionManager>,
    api: Arc<FakeApi>,
}

fn alice() -> LocalIdentity {
    LocalIdentity::new("u1", "alice", "token-a")
}

fn harness(api: FakeApi, policy: BadgePolicy) -> Harness {
    let (transport, server) = MemoryTransport::new();
    let manager = Arc::new(ConnectionManager::new(Arc::new(transport)));
    let api = Arc::new(api);
    let handle = spawn_runtime(
        manager.clone(),
        api.clone(),
        RuntimeOptions {
            badge_policy: policy,
            fetch_timeout: Duration::from_secs(1),
        },
    );
    Harness {
        handle,
        server,
        manager,
        api,
    }
}

async fn wait_until<F>(handle: &ChatHandle, predicate: F) -> ChatSnapshot
where
    F: FnMut(&ChatSnapshot) -> bool,
{
    tokio::time::timeout(WAIT, handle.wait_for(predicate))
        .await
        .expect("timed out waiting for snapshot")
        .expect("runtime stopped")
}

async fn eventually<F: FnMut() -> bool>(mut check: F) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn login(h: &Harness) {
    h.handle.set_session(SessionStatus::Authenticated(alice()));
    wait_until(&h.handle, |s| s.active && s.connected && !s.contacts_loading).await;
}

async fn open(h: &Harness, peer: &str) {
    h.handle.open(SenderRef::new(peer));
    let peer = UserId::from(peer);
    wait_until(&h.handle, |s| {
        s.conversation
            .as_ref()
            .is_some_and(|c| c.peer.id == peer && !c.loading)
    })
    .await;
}

fn raw_message(id: &str, sender: &str, receiver: &str, content: &str) -> Value {
    json!({
        "message": {
            "_id": id,
            "senderId": sender,
            "receiverId": receiver,
            "content": content,
            "createdAt": "2024-05-01T10:00:00Z"
        }
    })
}

fn unread(snapshot: &ChatSnapshot, peer: &str) -> u32 {
    snapshot
        .contacts
        .iter()
        .find(|c| c.peer_id.as_str() == peer)
        .map(|c| c.unread_count)
        .unwrap_or_default()
}

#[tokio::test]
async fn test_send_echo_and_double_delivery_show_once() {
    let mut h = harness(
        FakeApi::with_contacts(vec![ContactSummary::new("u2", "Rafi")]),
        BadgePolicy::CountAll,
    );
    login(&h).await;
    open(&h, "u2").await;

    h.handle.send("  hello  ").await.unwrap();
    let frame = h.server.next_outbound().await.unwrap();
    assert_eq!(frame.event, EVENT_SEND_MESSAGE);
    assert_eq!(frame.data, json!({ "receiverId": "u2", "content": "hello" }));

    // Nothing is shown before the server confirms.
    assert!(h.handle.snapshot().conversation.unwrap().messages.is_empty());

    let id = uuid::Uuid::new_v4().to_string();
    let echo = raw_message(&id, "u1", "u2", "hello");
    assert!(h.server.push(EVENT_MESSAGE_SENT, echo.clone()).await);
    assert!(h.server.push(EVENT_RECEIVE_MESSAGE, echo).await);
    // Marker: once u3 shows up, both copies above have been applied.
    h.server
        .push(EVENT_RECEIVE_MESSAGE, raw_message("m-x", "u3", "u1", "ping"))
        .await;

    let snap = wait_until(&h.handle, |s| unread(s, "u3") == 1).await;
    let view = snap.conversation.unwrap();
    assert_eq!(view.messages.len(), 1);
    assert_eq!(view.messages[0].id, MessageId::from(id.as_str()));

    let row = snap.contacts.iter().find(|c| c.peer_id.as_str() == "u2").unwrap();
    assert_eq!(row.last_message.as_deref(), Some("hello"));
    assert_eq!(row.unread_count, 0);
    // Own messages never touch the badge.
    assert_eq!(snap.badge, 1);
}

#[tokio::test]
async fn test_badge_counts_and_resets_independently() {
    let h = harness(FakeApi::default(), BadgePolicy::CountAll);
    login(&h).await;
    assert_eq!(h.handle.snapshot().badge, 0);

    h.server
        .push(EVENT_RECEIVE_MESSAGE, raw_message("m1", "u2", "u1", "a"))
        .await;
    h.server
        .push(EVENT_RECEIVE_MESSAGE, raw_message("m2", "u3", "u1", "b"))
        .await;
    wait_until(&h.handle, |s| s.badge == 2).await;

    h.handle.reset_badge();
    let snap = wait_until(&h.handle, |s| s.badge == 0).await;
    assert_eq!(unread(&snap, "u2"), 1);
    assert_eq!(unread(&snap, "u3"), 1);
    assert_eq!(snap.contacts[0].peer_id, UserId::from("u3"));
}

#[tokio::test]
async fn test_badge_seeded_from_contacts() {
    let h = harness(
        FakeApi::with_contacts(vec![
            ContactSummary { unread_count: 2, ..ContactSummary::new("u2", "Rafi") },
            ContactSummary { unread_count: 1, ..ContactSummary::new("u3", "Nadia") },
        ]),
        BadgePolicy::CountAll,
    );
    login(&h).await;
    assert_eq!(h.handle.snapshot().badge, 3);

    // Opening clears the row, not the badge.
    open(&h, "u2").await;
    let snap = h.handle.snapshot();
    assert_eq!(unread(&snap, "u2"), 0);
    assert_eq!(snap.badge, 3);
}

#[tokio::test]
async fn test_open_marks_read_and_receives_from_peer() {
    let api = FakeApi::default();
    api.set_history(
        "u2",
        vec![Message {
            id: MessageId::from("h1"),
            sender: SenderRef::new("u2"),
            receiver_id: Some(UserId::from("u1")),
            content: "earlier".into(),
            created_at: None,
        }],
    );
    let h = harness(api, BadgePolicy::CountAll);
    login(&h).await;
    open(&h, "u2").await;
    assert_eq!(h.handle.snapshot().conversation.unwrap().messages.len(), 1);

    h.server
        .push(EVENT_RECEIVE_MESSAGE, raw_message("m1", "u2", "u1", "hi"))
        .await;
    let snap = wait_until(&h.handle, |s| {
        s.conversation.as_ref().is_some_and(|c| c.messages.len() == 2)
    })
    .await;
    assert_eq!(unread(&snap, "u2"), 0);

    let api = h.api.clone();
    eventually(|| api.reads().len() == 2).await;
    assert!(h.api.reads().iter().all(|p| p.as_str() == "u2"));
}

#[tokio::test]
async fn test_skip_open_policy() {
    let h = harness(FakeApi::default(), BadgePolicy::SkipOpenConversation);
    login(&h).await;
    open(&h, "u2").await;

    h.server
        .push(EVENT_RECEIVE_MESSAGE, raw_message("m1", "u2", "u1", "hi"))
        .await;
    h.server
        .push(EVENT_RECEIVE_MESSAGE, raw_message("m2", "u3", "u1", "yo"))
        .await;
    let snap = wait_until(&h.handle, |s| unread(s, "u3") == 1).await;
    assert_eq!(snap.badge, 1);
}

#[tokio::test]
async fn test_stale_history_is_discarded() {
    let api = FakeApi::default();
    api.set_history(
        "peerA",
        vec![Message {
            id: MessageId::from("a1"),
            sender: SenderRef::new("peerA"),
            receiver_id: None,
            content: "from A".into(),
            created_at: None,
        }],
    );
    let gate = api.gate_history("peerA");
    let h = harness(api, BadgePolicy::CountAll);
    login(&h).await;

    h.handle.open(SenderRef::new("peerA"));
    open(&h, "peerB").await;
    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let view = h.handle.snapshot().conversation.unwrap();
    assert_eq!(view.peer.id, UserId::from("peerB"));
    assert!(view.messages.is_empty());
}

#[tokio::test]
async fn test_inactive_until_authenticated() {
    let h = harness(FakeApi::default(), BadgePolicy::CountAll);

    h.handle.set_session(SessionStatus::Resolving);
    h.handle.open(SenderRef::new("u2"));
    assert_eq!(h.handle.send("hi").await, Err(ChatError::Inactive));

    h.handle.set_session(SessionStatus::Unauthenticated);
    assert_eq!(h.handle.send("hi").await, Err(ChatError::Inactive));

    assert_eq!(h.server.open_count(), 0);
    let snap = h.handle.snapshot();
    assert!(!snap.active);
    assert!(snap.conversation.is_none());
}

#[tokio::test]
async fn test_logout_tears_down() {
    let h = harness(
        FakeApi::with_contacts(vec![ContactSummary::new("u2", "Rafi")]),
        BadgePolicy::CountAll,
    );
    login(&h).await;
    open(&h, "u2").await;
    assert_eq!(h.server.connected_user(), Some(UserId::from("u1")));

    h.handle.set_session(SessionStatus::Unauthenticated);
    let snap = wait_until(&h.handle, |s| !s.active).await;
    assert_eq!(snap, ChatSnapshot::default());
    assert!(h.manager.current().is_none());

    let server = &h.server;
    eventually(|| !server.is_open()).await;
    assert!(!h.server.push(EVENT_RECEIVE_MESSAGE, raw_message("m1", "u2", "u1", "hi")).await);
}

#[tokio::test]
async fn test_login_is_idempotent() {
    let h = harness(FakeApi::default(), BadgePolicy::CountAll);
    login(&h).await;
    h.handle.set_session(SessionStatus::Authenticated(alice()));
    // Round-trip a command so the second login has been processed.
    let _ = h.handle.send("").await;
    assert_eq!(h.server.open_count(), 1);
}

#[tokio::test]
async fn test_send_without_connection_reports_not_connected() {
    let h = harness(FakeApi::default(), BadgePolicy::CountAll);
    login(&h).await;
    open(&h, "u2").await;

    h.manager.disconnect();
    assert_eq!(h.handle.send("hello").await, Err(ChatError::NotConnected));

    let snap = wait_until(&h.handle, |s| s.notice.is_some()).await;
    assert_eq!(snap.notice.unwrap().kind, NoticeKind::NotConnected);
    h.handle.dismiss_notice();
    wait_until(&h.handle, |s| s.notice.is_none()).await;
}

#[tokio::test]
async fn test_send_while_link_down_reports_not_connected() {
    let mut h = harness(FakeApi::default(), BadgePolicy::CountAll);
    login(&h).await;
    open(&h, "u2").await;

    h.server.drop_connection("network lost").await;
    wait_until(&h.handle, |s| !s.connected).await;

    assert_eq!(h.handle.send("hello").await, Err(ChatError::NotConnected));
    let snap = wait_until(&h.handle, |s| s.notice.is_some()).await;
    assert_eq!(snap.notice.unwrap().kind, NoticeKind::NotConnected);
    assert!(h.server.try_outbound().is_none());

    // Back online: the notice clears and sending works again.
    h.server.restore_connection().await;
    wait_until(&h.handle, |s| s.connected && s.notice.is_none()).await;
    h.handle.send("hello").await.unwrap();
    let frame = tokio::time::timeout(WAIT, h.server.next_outbound())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frame.data["content"], "hello");
}

#[tokio::test]
async fn test_empty_send_is_rejected_locally() {
    let mut h = harness(FakeApi::default(), BadgePolicy::CountAll);
    login(&h).await;

    assert_eq!(h.handle.send("hi").await, Err(ChatError::NoOpenConversation));

    open(&h, "u2").await;
    assert_eq!(h.handle.send("   ").await, Err(ChatError::EmptyMessage));
    assert!(h.server.try_outbound().is_none());
}

#[tokio::test]
async fn test_contact_fetch_failure_sets_notice() {
    let api = FakeApi::default();
    *api.contacts.lock().unwrap() = Some(Err("maintenance".into()));
    let h = harness(api, BadgePolicy::CountAll);

    h.handle.set_session(SessionStatus::Authenticated(alice()));
    let snap = wait_until(&h.handle, |s| s.notice.is_some()).await;
    assert_eq!(snap.notice.as_ref().unwrap().kind, NoticeKind::FetchFailed);
    assert!(snap.contacts.is_empty());
    assert!(!snap.contacts_loading);
}

#[tokio::test]
async fn test_server_error_event_sets_notice() {
    let h = harness(FakeApi::default(), BadgePolicy::CountAll);
    login(&h).await;

    h.server
        .push("error", json!({ "message": "Receiver not found" }))
        .await;
    let snap = wait_until(&h.handle, |s| s.notice.is_some()).await;
    let notice = snap.notice.unwrap();
    assert_eq!(notice.kind, NoticeKind::Transport);
    assert_eq!(notice.text, "Receiver not found");
}

#[tokio::test]
async fn test_disconnect_and_restore_flip_connected() {
    let h = harness(FakeApi::default(), BadgePolicy::CountAll);
    login(&h).await;

    h.server.drop_connection("network lost").await;
    wait_until(&h.handle, |s| !s.connected).await;
    h.server.restore_connection().await;
    wait_until(&h.handle, |s| s.connected).await;
}
