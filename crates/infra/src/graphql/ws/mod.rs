//! GraphQL subscriptions over WebSocket (`graphql-transport-ws`)

mod protocol;
mod transport;

pub use protocol::{ClientMessage, ServerMessage, SUBPROTOCOL};
pub use transport::{WebSocketConfig, WebSocketTransport};
