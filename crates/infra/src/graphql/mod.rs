//! GraphQL endpoints: operations over HTTP, subscriptions over WebSocket,
//! and the credential refresh mutation.

pub mod refresh;
pub mod transport;
pub mod ws;

pub use refresh::GraphQLRefreshClient;
pub use transport::HttpTransport;
pub use ws::{WebSocketConfig, WebSocketTransport};
