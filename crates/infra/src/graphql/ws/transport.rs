//! Streaming transport over a single multiplexed WebSocket
//!
//! A background actor task owns the socket. Callers talk to it through a
//! command channel, so `subscribe` never blocks and needs no lock.
//!
//! Connection lifecycle:
//! - opened lazily on the first subscription
//! - `connection_init` carries the bearer credential held by the token store
//!   at that moment, on every (re)connect
//! - closed once the last subscription ends
//! - on an unexpected disconnect, reconnects with backoff and re-subscribes
//!   every live operation; once reconnects are exhausted every live
//!   subscription receives a terminal error. A connection only resets the
//!   reconnect budget once it has proved healthy by delivering data or
//!   answering a keepalive ping

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, StreamExt};
use futures_util::{Sink, SinkExt};
use graphlink_common::resilience::{BackoffStrategy, RetryConfig};
use graphlink_core::{EventSink, StreamEvent, StreamingTransport, SubscriptionGuard, TokenStore};
use graphlink_domain::{GraphLinkConfig, GraphQLError, GraphQLRequest, TransportError};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use super::protocol::{ClientMessage, ServerMessage, SUBPROTOCOL};
use crate::errors::IntoTransportError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Writer = SplitSink<Socket, Message>;

/// Streaming connection tuning
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub url: Url,
    /// Limit for the TCP/TLS/upgrade handshake and for `connection_ack`
    pub connect_timeout: Duration,
    /// Interval between protocol-level pings
    pub keepalive: Duration,
    /// Reconnects tried after a connection is lost; 0 fails immediately
    pub reconnect_attempts: u32,
    pub reconnect_backoff: RetryConfig,
}

impl WebSocketConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            connect_timeout: Duration::from_secs(10),
            keepalive: Duration::from_secs(30),
            reconnect_attempts: 5,
            reconnect_backoff: RetryConfig {
                backoff: BackoffStrategy::Exponential {
                    initial_delay: Duration::from_millis(500),
                    base: 2.0,
                    max_delay: Duration::from_secs(10),
                },
                ..RetryConfig::default()
            },
        }
    }

    /// # Errors
    /// Returns `TransportError::Config` if `ws_endpoint` is not a valid URL
    pub fn from_config(config: &GraphLinkConfig) -> Result<Self, TransportError> {
        let url = Url::parse(&config.ws_endpoint)
            .map_err(|e| TransportError::Config(format!("invalid ws_endpoint: {e}")))?;
        let subscriptions = &config.subscriptions;
        Ok(Self {
            connect_timeout: Duration::from_secs(subscriptions.connect_timeout_secs),
            keepalive: Duration::from_secs(subscriptions.keepalive_secs.max(1)),
            reconnect_attempts: subscriptions.reconnect_attempts,
            ..Self::new(url)
        })
    }
}

enum Command {
    Subscribe { id: String, request: GraphQLRequest, sink: EventSink },
    Unsubscribe { id: String },
}

/// GraphQL subscriptions over `graphql-transport-ws`
#[derive(Debug)]
pub struct WebSocketTransport {
    commands: mpsc::UnboundedSender<Command>,
    next_id: AtomicU64,
}

impl WebSocketTransport {
    /// Spawn the connection actor. Must be called within a tokio runtime.
    pub fn new(config: WebSocketConfig, store: Arc<TokenStore>) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let actor =
            ConnectionActor { config, store, commands: receiver, live: HashMap::new(), healthy: false };
        tokio::spawn(actor.run());
        Self { commands, next_id: AtomicU64::new(1) }
    }
}

impl StreamingTransport for WebSocketTransport {
    fn subscribe(&self, request: GraphQLRequest, sink: EventSink) -> Box<dyn SubscriptionGuard> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let command = Command::Subscribe { id: id.clone(), request, sink };
        if let Err(mpsc::error::SendError(Command::Subscribe { sink, .. })) = self.commands.send(command) {
            let _ = sink.send(StreamEvent::Error(TransportError::Network(
                "streaming transport has shut down".into(),
            )));
        }
        Box::new(WsSubscriptionGuard { id, commands: self.commands.clone() })
    }
}

/// Sends `complete` for its operation when released
struct WsSubscriptionGuard {
    id: String,
    commands: mpsc::UnboundedSender<Command>,
}

impl SubscriptionGuard for WsSubscriptionGuard {
    fn unsubscribe(self: Box<Self>) {}
}

impl Drop for WsSubscriptionGuard {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Unsubscribe { id: std::mem::take(&mut self.id) });
    }
}

struct LiveSubscription {
    request: GraphQLRequest,
    sink: EventSink,
}

enum Disconnect {
    /// No subscriptions left
    Idle,
    /// Every handle to the transport is gone
    Shutdown,
    Lost(TransportError),
}

struct ConnectionActor {
    config: WebSocketConfig,
    store: Arc<TokenStore>,
    commands: mpsc::UnboundedReceiver<Command>,
    live: HashMap<String, LiveSubscription>,
    /// Current connection has delivered data or answered a ping
    healthy: bool,
}

impl ConnectionActor {
    async fn run(mut self) {
        debug!(url = %self.config.url, "streaming transport started");
        while let Some(command) = self.commands.recv().await {
            self.apply_offline(command);
            if self.live.is_empty() {
                continue;
            }
            if matches!(self.stay_connected().await, Disconnect::Shutdown) {
                break;
            }
        }
        debug!("streaming transport stopped");
    }

    fn apply_offline(&mut self, command: Command) {
        match command {
            Command::Subscribe { id, request, sink } => {
                self.live.insert(id, LiveSubscription { request, sink });
            }
            Command::Unsubscribe { id } => {
                self.live.remove(&id);
            }
        }
    }

    /// Keep a connection up while subscriptions exist
    async fn stay_connected(&mut self) -> Disconnect {
        let mut failures = 0u32;
        loop {
            let reason = match self.connect().await {
                Ok(socket) => {
                    self.healthy = false;
                    match self.serve(socket).await {
                        Disconnect::Lost(reason) => {
                            if self.healthy {
                                failures = 0;
                            }
                            reason
                        }
                        done => return done,
                    }
                }
                Err(reason) => reason,
            };

            if self.live.is_empty() {
                return Disconnect::Idle;
            }
            if failures >= self.config.reconnect_attempts {
                error!(attempts = failures, error = %reason, "giving up on streaming connection");
                self.fail_all(&reason);
                return Disconnect::Idle;
            }

            let delay = self.config.reconnect_backoff.delay_for(failures);
            failures += 1;
            warn!(attempt = failures, ?delay, error = %reason, "streaming connection lost, reconnecting");
            if let Some(done) = self.wait_offline(delay).await {
                return done;
            }
        }
    }

    /// Sleep out a reconnect delay while still accepting commands
    async fn wait_offline(&mut self, delay: Duration) -> Option<Disconnect> {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => return None,
                command = self.commands.recv() => match command {
                    Some(command) => {
                        self.apply_offline(command);
                        if self.live.is_empty() {
                            return Some(Disconnect::Idle);
                        }
                    }
                    None => return Some(Disconnect::Shutdown),
                },
            }
        }
    }

    fn fail_all(&mut self, reason: &TransportError) {
        for (_, live) in self.live.drain() {
            let _ = live.sink.send(StreamEvent::Error(reason.clone()));
        }
    }

    async fn connect(&mut self) -> Result<Socket, TransportError> {
        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(IntoTransportError::into_transport)?;
        request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));

        let limit = self.config.connect_timeout;
        let (mut socket, _) = timeout(limit, connect_async(request))
            .await
            .map_err(|_| TransportError::Timeout(limit))?
            .map_err(IntoTransportError::into_transport)?;

        let token = self.store.access_token();
        send_frame(&mut socket, &ClientMessage::init(token.as_deref())).await?;
        timeout(limit, await_ack(&mut socket)).await.map_err(|_| TransportError::Timeout(limit))??;

        info!(url = %self.config.url, subscriptions = self.live.len(), "streaming connection established");
        for (id, live) in &self.live {
            send_frame(&mut socket, &ClientMessage::Subscribe { id, payload: &live.request }).await?;
        }
        Ok(socket)
    }

    async fn serve(&mut self, socket: Socket) -> Disconnect {
        let (mut write, mut read) = socket.split();
        let period = self.config.keepalive;
        let mut keepalive = tokio::time::interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let outcome = tokio::select! {
                command = self.commands.recv() => self.on_command(command, &mut write).await,
                _ = keepalive.tick() => send_frame(&mut write, &ClientMessage::Ping {}).await.map(|()| None),
                message = read.next() => self.on_message(message, &mut write).await,
            };

            match outcome {
                Ok(None) => {}
                Ok(Some(done)) => {
                    let _ = write.close().await;
                    return done;
                }
                Err(reason) => return Disconnect::Lost(reason),
            }

            if self.live.is_empty() {
                debug!("last subscription ended, closing streaming connection");
                let _ = write.close().await;
                return Disconnect::Idle;
            }
        }
    }

    async fn on_command(
        &mut self,
        command: Option<Command>,
        write: &mut Writer,
    ) -> Result<Option<Disconnect>, TransportError> {
        match command {
            None => Ok(Some(Disconnect::Shutdown)),
            Some(Command::Subscribe { id, request, sink }) => {
                let live = self.live.entry(id.clone()).or_insert(LiveSubscription { request, sink });
                send_frame(write, &ClientMessage::Subscribe { id: &id, payload: &live.request }).await?;
                Ok(None)
            }
            Some(Command::Unsubscribe { id }) => {
                if self.live.remove(&id).is_some() {
                    debug!(id, "unsubscribing");
                    send_frame(write, &ClientMessage::Complete { id: &id }).await?;
                }
                Ok(None)
            }
        }
    }

    async fn on_message(
        &mut self,
        message: Option<Result<Message, WsError>>,
        write: &mut Writer,
    ) -> Result<Option<Disconnect>, TransportError> {
        match message {
            None => Err(TransportError::Network("WebSocket stream ended".into())),
            Some(Err(e)) => Err(e.into_transport()),
            Some(Ok(Message::Text(text))) => self.on_frame(&text, write).await.map(|()| None),
            Some(Ok(Message::Close(frame))) => Err(closed(frame)),
            Some(Ok(_)) => Ok(None),
        }
    }

    async fn on_frame(&mut self, text: &str, write: &mut Writer) -> Result<(), TransportError> {
        let frame = match ServerMessage::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "ignoring malformed frame");
                return Ok(());
            }
        };

        match frame {
            ServerMessage::Next { id, payload } => {
                self.healthy = true;
                let delivered = self.live.get(&id).map(|live| live.sink.send(StreamEvent::Next(payload)).is_ok());
                if delivered == Some(false) {
                    // Receiver dropped without unsubscribing
                    self.live.remove(&id);
                    send_frame(write, &ClientMessage::Complete { id: &id }).await?;
                }
            }
            ServerMessage::Error { id, payload } => {
                if let Some(live) = self.live.remove(&id) {
                    let _ = live.sink.send(StreamEvent::Error(subscription_error(payload)));
                }
            }
            ServerMessage::Complete { id } => {
                if let Some(live) = self.live.remove(&id) {
                    let _ = live.sink.send(StreamEvent::Complete);
                }
            }
            ServerMessage::Ping { .. } => send_frame(write, &ClientMessage::Pong {}).await?,
            ServerMessage::Pong { .. } => {
                self.healthy = true;
                debug!("keepalive acknowledged");
            }
            ServerMessage::ConnectionAck { .. } => debug!("ignoring repeated connection_ack"),
        }
        Ok(())
    }
}

async fn send_frame<S>(sink: &mut S, frame: &ClientMessage<'_>) -> Result<(), TransportError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let text = frame.to_text().map_err(IntoTransportError::into_transport)?;
    sink.send(Message::Text(text)).await.map_err(IntoTransportError::into_transport)
}

async fn await_ack(socket: &mut Socket) -> Result<(), TransportError> {
    while let Some(message) = socket.next().await {
        match message.map_err(IntoTransportError::into_transport)? {
            Message::Text(text) => match ServerMessage::parse(&text) {
                Ok(ServerMessage::ConnectionAck { .. }) => return Ok(()),
                Ok(ServerMessage::Ping { .. }) => send_frame(socket, &ClientMessage::Pong {}).await?,
                Ok(other) => debug!(?other, "ignoring frame before connection_ack"),
                Err(e) => return Err(e.into_transport()),
            },
            Message::Close(frame) => return Err(closed(frame)),
            _ => {}
        }
    }
    Err(TransportError::Network("connection closed before connection_ack".into()))
}

/// Map a close frame; 4401/4403 are the protocol's authentication codes.
fn closed(frame: Option<CloseFrame<'_>>) -> TransportError {
    match frame {
        Some(frame) => {
            let code = u16::from(frame.code);
            match code {
                4401 | 4403 => TransportError::Auth(format!("server closed stream: {}", frame.reason)),
                4400 | 4409 | 4429 => {
                    TransportError::Protocol(format!("server closed stream ({code}): {}", frame.reason))
                }
                _ => TransportError::Network(format!("server closed stream ({code}): {}", frame.reason)),
            }
        }
        None => TransportError::Network("server closed stream".into()),
    }
}

/// Terminal error for an `error` frame
fn subscription_error(errors: Vec<GraphQLError>) -> TransportError {
    if errors.iter().any(GraphQLError::is_unauthenticated) {
        let message = errors.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join(", ");
        TransportError::Auth(message)
    } else {
        TransportError::GraphQL(errors)
    }
}
