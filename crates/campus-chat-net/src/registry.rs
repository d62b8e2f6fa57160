//! Event handler registry.
//!
//! Handlers are keyed by the [`HandlerId`] handed out at registration, not by
//! event name alone, so one surface removing its listener never strips
//! another surface's listener for the same event.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

/// Callback invoked with the payload of an event.
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Identity of one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

#[derive(Default)]
pub struct HandlerRegistry {
    next_id: u64,
    handlers: HashMap<String, Vec<(HandlerId, Handler)>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event`. Handlers for one event run in
    /// registration order.
    pub fn subscribe(&mut self, event: &str, handler: Handler) -> HandlerId {
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        self.handlers
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Remove one registration. Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, event: &str, id: HandlerId) -> bool {
        let Some(list) = self.handlers.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(hid, _)| *hid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.handlers.remove(event);
        }
        removed
    }

    /// Snapshot of the handlers for `event`, so callers can invoke them
    /// without holding the registry lock.
    pub fn handlers_for(&self, event: &str) -> Vec<Handler> {
        self.handlers
            .get(event)
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.get(event).map(Vec::len).unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}
