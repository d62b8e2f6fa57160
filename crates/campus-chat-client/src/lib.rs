//! # campus-chat-client
//!
//! Conversation and presence synchronization for the campus marketplace
//! chat: the contact directory, the open conversation, the global unread
//! badge, and the event loop that keeps them consistent against a server
//! that pushes events asynchronously and unreliably.

pub mod api;
pub mod auth;
pub mod badge;
pub mod config;
pub mod directory;
pub mod logging;
pub mod runtime;
pub mod session;
pub mod state;

mod error;

pub use api::{ChatApi, HttpChatApi};
pub use auth::SessionStatus;
pub use badge::{BadgePolicy, UnreadBadge};
pub use config::ClientConfig;
pub use directory::{ContactDirectory, ContactFields};
pub use error::ApiError;
pub use runtime::{spawn_runtime, ChatHandle, RuntimeOptions};
pub use session::{ConversationSession, OpenTicket, ReceiveOutcome, SessionPhase};
pub use state::{ChatSnapshot, ChatState, ConversationView, Effect, Notice, NoticeKind};
