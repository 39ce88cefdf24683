//! Subscription adapter
//!
//! Turns the push events of a [`StreamingTransport`] into a uniform
//! [`Stream`] of results with next/error/complete semantics:
//! - each subscribe creates exactly one network subscription
//! - a terminal event (error or complete) is delivered at most once and
//!   ends the stream
//! - unsubscribing, or dropping the [`Subscription`], tears the network
//!   subscription down and suppresses any further delivery

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use graphlink_domain::{GraphQLRequest, GraphQLResponse, Result};
use tokio::sync::mpsc;
use tracing::debug;

use crate::ports::{StreamEvent, StreamingTransport, SubscriptionGuard};

/// One live streaming operation
pub struct Subscription {
    events: mpsc::UnboundedReceiver<StreamEvent>,
    guard: Option<Box<dyn SubscriptionGuard>>,
    finished: bool,
}

impl Subscription {
    /// Open a network subscription for `request` on `transport`
    pub fn open(transport: &dyn StreamingTransport, request: GraphQLRequest) -> Self {
        let (sink, events) = mpsc::unbounded_channel();
        let guard = transport.subscribe(request, sink);
        Self { events, guard: Some(guard), finished: false }
    }

    /// Stop receiving events and tear the network subscription down.
    ///
    /// Idempotent; also happens automatically on drop.
    pub fn unsubscribe(&mut self) {
        if !self.finished {
            debug!("unsubscribing");
        }
        self.finish();
    }

    /// Whether the stream has ended (terminal event or unsubscribe)
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn finish(&mut self) {
        self.finished = true;
        self.events.close();
        if let Some(guard) = self.guard.take() {
            guard.unsubscribe();
        }
    }
}

impl Stream for Subscription {
    type Item = Result<GraphQLResponse>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match self.events.poll_recv(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(StreamEvent::Next(response))) => Poll::Ready(Some(Ok(response))),
            Poll::Ready(Some(StreamEvent::Error(error))) => {
                debug!(error = %error, "subscription terminated with error");
                self.finish();
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(Some(StreamEvent::Complete) | None) => {
                debug!("subscription completed");
                self.finish();
                Poll::Ready(None)
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.finish();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("finished", &self.finished).finish_non_exhaustive()
    }
}

/// Cold description of a subscription.
///
/// Nothing touches the network until [`subscribe`](Self::subscribe) is
/// called; every call starts a fresh network subscription, so a finished
/// stream can be restarted by subscribing again.
#[derive(Clone)]
pub struct SubscriptionSource {
    transport: Arc<dyn StreamingTransport>,
    request: GraphQLRequest,
}

impl SubscriptionSource {
    pub fn new(transport: Arc<dyn StreamingTransport>, request: GraphQLRequest) -> Self {
        Self { transport, request }
    }

    pub fn request(&self) -> &GraphQLRequest {
        &self.request
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription::open(self.transport.as_ref(), self.request.clone())
    }
}

impl fmt::Debug for SubscriptionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionSource").field("request", &self.request).finish_non_exhaustive()
    }
}
