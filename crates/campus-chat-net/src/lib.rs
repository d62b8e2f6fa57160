// Real-time transport layer: one connection per authenticated session.

pub mod connector;
pub mod error;
pub mod memory;
pub mod registry;
pub mod transport;
pub mod ws;

pub use connector::{ConnectionHandle, ConnectionManager};
pub use error::NetError;
pub use memory::{MemoryServer, MemoryTransport};
pub use registry::{HandlerId, HandlerRegistry};
pub use transport::{PubSubTransport, TransportChannels, TransportCommand, TransportNotification};
pub use ws::WsTransport;
