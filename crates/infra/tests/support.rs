//! Local `graphql-transport-ws` server driven step by step from tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use graphlink_core::{MemoryCredentialStore, TokenStore};
use graphlink_domain::CredentialPair;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct WsServer {
    listener: TcpListener,
    pub addr: SocketAddr,
}

impl WsServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        Self { listener, addr }
    }

    pub fn url(&self) -> url::Url {
        url::Url::parse(&format!("ws://{}/graphql", self.addr)).expect("valid test URL")
    }

    /// Accept the next connection, echoing the subprotocol the client asked for
    pub async fn accept(&self) -> ServerConn {
        let (stream, _) = tokio::time::timeout(STEP_TIMEOUT, self.listener.accept())
            .await
            .expect("client should connect")
            .expect("accept connection");

        let echo_protocol = |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
            let offered = request.headers().get(SEC_WEBSOCKET_PROTOCOL).cloned();
            assert_eq!(offered, Some(HeaderValue::from_static("graphql-transport-ws")));
            response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("graphql-transport-ws"));
            Ok(response)
        };
        let socket = tokio_tungstenite::accept_hdr_async(stream, echo_protocol)
            .await
            .expect("WebSocket handshake");
        ServerConn { socket }
    }

    /// True if no client connects within `within`
    pub async fn stays_quiet(&self, within: Duration) -> bool {
        tokio::time::timeout(within, self.listener.accept()).await.is_err()
    }

    /// Accept, expect `connection_init` and acknowledge it; returns the init payload
    pub async fn accept_and_ack(&self) -> (ServerConn, Value) {
        let mut conn = self.accept().await;
        let init = conn.recv_json().await;
        assert_eq!(init["type"], "connection_init");
        conn.send_json(json!({ "type": "connection_ack" })).await;
        (conn, init["payload"].clone())
    }
}

pub struct ServerConn {
    socket: WebSocketStream<TcpStream>,
}

impl ServerConn {
    /// Next protocol frame, skipping pings
    pub async fn recv_json(&mut self) -> Value {
        loop {
            match self.recv().await {
                Some(Message::Text(text)) => {
                    let frame: Value = serde_json::from_str(&text).expect("client sent JSON");
                    if frame["type"] != "ping" {
                        return frame;
                    }
                }
                Some(Message::Close(_)) | None => panic!("client closed the connection"),
                Some(_) => {}
            }
        }
    }

    pub async fn recv(&mut self) -> Option<Message> {
        tokio::time::timeout(STEP_TIMEOUT, self.socket.next())
            .await
            .expect("client should send a frame")
            .and_then(Result::ok)
    }

    /// True once the client closes the socket
    pub async fn closed_by_client(&mut self) -> bool {
        loop {
            match self.recv().await {
                Some(Message::Close(_)) | None => return true,
                Some(Message::Text(text)) if text.contains("\"ping\"") => {}
                Some(other) => panic!("unexpected frame before close: {other:?}"),
            }
        }
    }

    pub async fn send_json(&mut self, frame: Value) {
        self.socket.send(Message::Text(frame.to_string())).await.expect("send frame");
    }

    pub async fn next(&mut self, id: &Value, data: Value) {
        self.send_json(json!({ "type": "next", "id": id, "payload": { "data": data } })).await;
    }

    pub async fn close_with(mut self, code: u16, reason: &str) {
        let frame = CloseFrame { code: CloseCode::from(code), reason: reason.to_string().into() };
        let _ = self.socket.close(Some(frame)).await;
    }
}

pub async fn store_with(access_token: &str) -> Arc<TokenStore> {
    let pair = CredentialPair::new(access_token, Some("refresh-token".to_string()));
    let store = Arc::new(TokenStore::new(Arc::new(MemoryCredentialStore::with_pair(pair))));
    store.initialize().await.expect("memory store loads");
    store
}
