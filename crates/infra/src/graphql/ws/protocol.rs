//! `graphql-transport-ws` frames

use graphlink_domain::{GraphQLError, GraphQLRequest, GraphQLResponse};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// WebSocket subprotocol negotiated on connect
pub const SUBPROTOCOL: &str = "graphql-transport-ws";

/// Frames sent by the client
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage<'a> {
    ConnectionInit {
        payload: Map<String, Value>,
    },
    Subscribe {
        id: &'a str,
        payload: &'a GraphQLRequest,
    },
    Complete {
        id: &'a str,
    },
    Ping {},
    Pong {},
}

impl ClientMessage<'_> {
    /// `connection_init` carrying the bearer credential, if any
    pub fn init(access_token: Option<&str>) -> Self {
        let mut payload = Map::new();
        if let Some(token) = access_token {
            payload.insert("Authorization".to_string(), Value::String(format!("Bearer {token}")));
        }
        Self::ConnectionInit { payload }
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Frames received from the server
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionAck {
        #[serde(default)]
        payload: Option<Value>,
    },
    Next {
        id: String,
        payload: GraphQLResponse,
    },
    Error {
        id: String,
        payload: Vec<GraphQLError>,
    },
    Complete {
        id: String,
    },
    Ping {
        #[serde(default)]
        payload: Option<Value>,
    },
    Pong {
        #[serde(default)]
        payload: Option<Value>,
    },
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
