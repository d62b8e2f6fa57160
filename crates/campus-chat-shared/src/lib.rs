//! # campus-chat-shared
//!
//! Types shared by every layer of the campus marketplace chat client:
//! identities, the canonical message and contact models, the real-time wire
//! protocol, and the normalizer that turns loosely shaped server payloads
//! into those canonical models.

pub mod constants;
pub mod error;
pub mod models;
pub mod normalize;
pub mod protocol;
pub mod types;

pub use error::ChatError;
pub use models::{ContactSummary, Message};
pub use types::{LocalIdentity, MessageId, SenderRef, UserId};
