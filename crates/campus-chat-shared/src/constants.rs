/// Outbound event carrying a new chat message.
pub const EVENT_SEND_MESSAGE: &str = "sendMessage";

/// Inbound event pushed when another party sends to the local user.
pub const EVENT_RECEIVE_MESSAGE: &str = "receiveMessage";

/// Inbound confirmation echo of the local user's own send.
pub const EVENT_MESSAGE_SENT: &str = "messageSent";

/// Inbound transport/application error notice.
pub const EVENT_ERROR: &str = "error";

/// Synthetic events raised by the connector when the transport (re)connects
/// or drops. Never sent over the wire.
pub const EVENT_CONNECT: &str = "connect";
pub const EVENT_DISCONNECT: &str = "disconnect";

/// Display name given to a locally synthesized contact entry.
pub const SKELETON_DISPLAY_NAME: &str = "Unknown user";

/// Preview text shown for a contact with no recorded conversation.
pub const SKELETON_PREVIEW: &str = "No messages yet";

/// Default REST API base URL (local development backend)
pub const DEFAULT_API_URL: &str = "http://localhost:5000/api/v1";

/// Default real-time endpoint
pub const DEFAULT_SOCKET_URL: &str = "ws://localhost:5000/ws";

/// Default timeout for contact/history fetches, in seconds
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 15;

/// Base delay before the transport retries a dropped connection
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;

/// Upper bound for the reconnect backoff
pub const MAX_RECONNECT_DELAY_MS: u64 = 30_000;

/// Capacity of the bounded command/notification channels
pub const CHANNEL_CAPACITY: usize = 256;
