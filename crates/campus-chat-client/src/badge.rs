//! Global unread badge shown outside the chat view.
//!
//! The badge is tracked independently of the per-contact counters in the
//! directory. It only grows on inbound messages and only returns to zero
//! when the user navigates to the conversation list, so the two are
//! allowed to disagree. There is no decrement.

use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BadgePolicy {
    /// Count every inbound message from someone else, even when that
    /// conversation is open on screen.
    #[default]
    CountAll,
    /// Do not count messages whose conversation is currently open.
    SkipOpenConversation,
}

impl FromStr for BadgePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "count-all" => Ok(Self::CountAll),
            "skip-open" => Ok(Self::SkipOpenConversation),
            other => Err(format!("unknown badge policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UnreadBadge {
    count: u32,
    policy: BadgePolicy,
    seeded: bool,
}

impl UnreadBadge {
    pub fn new(policy: BadgePolicy) -> Self {
        Self {
            count: 0,
            policy,
            seeded: false,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn policy(&self) -> BadgePolicy {
        self.policy
    }

    pub fn increment(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    /// Apply an inbound message from someone else. `viewing` tells whether
    /// that sender's conversation is open. Returns whether it was counted.
    pub fn on_inbound(&mut self, viewing: bool) -> bool {
        if viewing && self.policy == BadgePolicy::SkipOpenConversation {
            return false;
        }
        self.increment();
        true
    }

    /// User navigated to the conversation list.
    pub fn reset(&mut self) {
        self.count = 0;
    }

    /// Set the value from the first contact snapshot of a session. The
    /// server total already includes pushes counted before it arrived, so
    /// it replaces the count. Later calls are ignored.
    pub fn seed(&mut self, total_unread: u32) -> bool {
        if self.seeded {
            return false;
        }
        self.seeded = true;
        self.count = total_unread;
        true
    }

    /// Forget everything, including the seed (session ended).
    pub fn clear(&mut self) {
        self.count = 0;
        self.seeded = false;
    }
}
