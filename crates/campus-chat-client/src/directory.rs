//! Contact directory: the ordered conversation list.
//!
//! Holds at most one [`ContactSummary`] per peer, most recently active
//! first. Server snapshots are merged per key (snapshot wins) and entries
//! only known locally survive a snapshot that does not mention them.
//! Entries are never removed during a session.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use campus_chat_shared::constants::{SKELETON_DISPLAY_NAME, SKELETON_PREVIEW};
use campus_chat_shared::{ContactSummary, Message, SenderRef, UserId};

/// Fields carried by an upsert. `None` keeps what the directory knows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactFields {
    pub display_name: Option<String>,
    pub handle: Option<String>,
    pub last_message: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
}

impl ContactFields {
    /// Preview fields from `message`, display fields from `peer` if known.
    pub fn from_message(message: &Message, peer: Option<&SenderRef>) -> Self {
        Self {
            display_name: peer.and_then(|p| p.display_name.clone()),
            handle: peer.and_then(|p| p.handle.clone()),
            last_message: Some(message.content.clone()).filter(|c| !c.is_empty()),
            last_message_time: message.created_at,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContactDirectory {
    // Index 0 is the most recently active entry.
    entries: Vec<ContactSummary>,
}

impl ContactDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ContactSummary] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, peer_id: &UserId) -> Option<&ContactSummary> {
        self.entries.iter().find(|c| &c.peer_id == peer_id)
    }

    fn position(&self, peer_id: &UserId) -> Option<usize> {
        self.entries.iter().position(|c| &c.peer_id == peer_id)
    }

    /// Merge a server snapshot.
    ///
    /// Snapshot entries come first, in snapshot order, with exactly the
    /// snapshot's fields. Local entries absent from the snapshot follow,
    /// untouched and in their previous relative order.
    pub fn load_snapshot(&mut self, snapshot: Vec<ContactSummary>) {
        let mut seen: HashSet<UserId> = HashSet::with_capacity(snapshot.len());
        let mut merged: Vec<ContactSummary> = Vec::with_capacity(snapshot.len() + self.entries.len());

        for contact in snapshot {
            if contact.peer_id.is_empty() || !seen.insert(contact.peer_id.clone()) {
                continue;
            }
            merged.push(contact);
        }

        let fetched = merged.len();
        merged.extend(
            self.entries
                .drain(..)
                .filter(|c| !seen.contains(&c.peer_id)),
        );

        debug!(
            fetched,
            preserved = merged.len() - fetched,
            "Merged contact snapshot"
        );
        self.entries = merged;
    }

    /// Insert or update the entry for `peer_id` and move it to the front.
    ///
    /// Increments the unread counter by one when `increment_unread` is set;
    /// never decrements. Returns `None` for an empty peer id.
    pub fn upsert(
        &mut self,
        peer_id: &UserId,
        fields: ContactFields,
        increment_unread: bool,
    ) -> Option<&ContactSummary> {
        if peer_id.is_empty() {
            return None;
        }

        let mut entry = match self.position(peer_id) {
            Some(idx) => self.entries.remove(idx),
            None => ContactSummary {
                peer_id: peer_id.clone(),
                display_name: SKELETON_DISPLAY_NAME.to_string(),
                handle: String::new(),
                last_message: Some(SKELETON_PREVIEW.to_string()),
                last_message_time: None,
                unread_count: 0,
            },
        };

        if let Some(name) = fields.display_name {
            entry.display_name = name;
        }
        if let Some(handle) = fields.handle {
            entry.handle = handle;
        }
        if let Some(text) = fields.last_message {
            entry.last_message = Some(text);
        }
        if let Some(ts) = fields.last_message_time {
            entry.last_message_time = Some(ts);
        }
        if increment_unread {
            entry.unread_count = entry.unread_count.saturating_add(1);
        }

        self.entries.insert(0, entry);
        self.entries.first()
    }

    /// Add a skeleton entry at the front for a peer not yet listed.
    /// Returns `false` (and changes nothing) if the peer is already present.
    pub fn insert_skeleton(&mut self, peer: &SenderRef) -> bool {
        if peer.is_unknown() || self.position(&peer.id).is_some() {
            return false;
        }
        self.entries.insert(0, ContactSummary::skeleton(peer));
        true
    }

    /// Zero the unread counter of one entry. Returns `false` if absent.
    pub fn clear_unread(&mut self, peer_id: &UserId) -> bool {
        match self.entries.iter_mut().find(|c| &c.peer_id == peer_id) {
            Some(entry) => {
                entry.unread_count = 0;
                true
            }
            None => false,
        }
    }

    pub fn total_unread(&self) -> u32 {
        self.entries
            .iter()
            .fold(0u32, |acc, c| acc.saturating_add(c.unread_count))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_chat_shared::MessageId;

    fn contact(id: &str, name: &str, unread: u32) -> ContactSummary {
        ContactSummary {
            unread_count: unread,
            last_message: Some(format!("last from {name}")),
            ..ContactSummary::new(id, name)
        }
    }

    fn ids(dir: &ContactDirectory) -> Vec<&str> {
        dir.entries().iter().map(|c| c.peer_id.as_str()).collect()
    }

    fn preview(text: &str) -> ContactFields {
        ContactFields {
            last_message: Some(text.to_string()),
            ..ContactFields::default()
        }
    }

    #[test]
    fn test_snapshot_preserves_local_only_entries() {
        let mut dir = ContactDirectory::new();
        dir.insert_skeleton(&SenderRef::new("y"));
        let y_before = dir.get(&UserId::from("y")).cloned().unwrap();

        let x = contact("x", "Xavier", 2);
        dir.load_snapshot(vec![x.clone()]);

        assert_eq!(ids(&dir), vec!["x", "y"]);
        assert_eq!(dir.get(&UserId::from("x")), Some(&x));
        assert_eq!(dir.get(&UserId::from("y")), Some(&y_before));
    }

    #[test]
    fn test_snapshot_wins_per_key() {
        let mut dir = ContactDirectory::new();
        dir.upsert(&UserId::from("x"), preview("local"), true);

        let fresh = contact("x", "Xavier", 0);
        dir.load_snapshot(vec![fresh.clone()]);

        assert_eq!(dir.len(), 1);
        assert_eq!(dir.get(&UserId::from("x")), Some(&fresh));
    }

    #[test]
    fn test_snapshot_duplicates_keep_first() {
        let mut dir = ContactDirectory::new();
        dir.load_snapshot(vec![contact("a", "First", 1), contact("a", "Second", 5)]);
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.get(&UserId::from("a")).unwrap().display_name, "First");
    }

    #[test]
    fn test_upsert_moves_to_front() {
        let mut dir = ContactDirectory::new();
        dir.load_snapshot(vec![contact("a", "A", 0), contact("b", "B", 0), contact("c", "C", 0)]);

        dir.upsert(&UserId::from("c"), preview("newest"), false);
        assert_eq!(ids(&dir), vec!["c", "a", "b"]);

        dir.upsert(&UserId::from("b"), preview("even newer"), false);
        assert_eq!(ids(&dir), vec!["b", "c", "a"]);
        assert_eq!(
            dir.get(&UserId::from("b")).unwrap().last_message.as_deref(),
            Some("even newer")
        );
    }

    #[test]
    fn test_upsert_increment_and_clear() {
        let mut dir = ContactDirectory::new();
        dir.load_snapshot(vec![contact("p1", "P", 3)]);

        dir.upsert(&UserId::from("p1"), preview("one"), true);
        dir.upsert(&UserId::from("p1"), preview("two"), true);
        assert_eq!(dir.get(&UserId::from("p1")).unwrap().unread_count, 5);

        dir.upsert(&UserId::from("p1"), preview("three"), false);
        assert_eq!(dir.get(&UserId::from("p1")).unwrap().unread_count, 5);

        assert!(dir.clear_unread(&UserId::from("p1")));
        assert_eq!(dir.get(&UserId::from("p1")).unwrap().unread_count, 0);
    }

    #[test]
    fn test_upsert_inserts_unknown_peer() {
        let mut dir = ContactDirectory::new();
        let msg = Message {
            id: MessageId::from("m1"),
            sender: SenderRef {
                id: UserId::from("u7"),
                handle: Some("nadia".into()),
                display_name: Some("Nadia".into()),
            },
            receiver_id: None,
            content: "still selling the lamp?".into(),
            created_at: None,
        };
        let fields = ContactFields::from_message(&msg, Some(&msg.sender));
        let entry = dir.upsert(&UserId::from("u7"), fields, true).cloned().unwrap();

        assert_eq!(entry.display_name, "Nadia");
        assert_eq!(entry.handle, "nadia");
        assert_eq!(entry.last_message.as_deref(), Some("still selling the lamp?"));
        assert_eq!(entry.unread_count, 1);
    }

    #[test]
    fn test_upsert_keeps_known_display_fields() {
        let mut dir = ContactDirectory::new();
        dir.load_snapshot(vec![contact("u2", "Rafi Ahmed", 0)]);

        dir.upsert(&UserId::from("u2"), preview("ok"), false);
        assert_eq!(dir.get(&UserId::from("u2")).unwrap().display_name, "Rafi Ahmed");
    }

    #[test]
    fn test_upsert_rejects_empty_peer() {
        let mut dir = ContactDirectory::new();
        assert!(dir.upsert(&UserId::default(), preview("x"), true).is_none());
        assert!(dir.is_empty());
    }

    #[test]
    fn test_skeleton_only_when_absent() {
        let mut dir = ContactDirectory::new();
        dir.load_snapshot(vec![contact("a", "A", 0), contact("b", "B", 1)]);

        assert!(!dir.insert_skeleton(&SenderRef::new("b")));
        assert_eq!(ids(&dir), vec!["a", "b"]);
        assert_eq!(dir.get(&UserId::from("b")).unwrap().unread_count, 1);

        assert!(dir.insert_skeleton(&SenderRef::new("n")));
        assert_eq!(ids(&dir), vec!["n", "a", "b"]);
    }

    #[test]
    fn test_clear_unread_missing_entry() {
        let mut dir = ContactDirectory::new();
        assert!(!dir.clear_unread(&UserId::from("ghost")));
    }

    #[test]
    fn test_total_unread() {
        let mut dir = ContactDirectory::new();
        dir.load_snapshot(vec![contact("a", "A", 2), contact("b", "B", 3)]);
        assert_eq!(dir.total_unread(), 5);
    }
}
