//! Session lifecycle notifications

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::ports::SessionRedirect;

const EVENT_CAPACITY: usize = 16;

/// Session transitions observable by the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new access credential was stored
    Refreshed,
    /// The session could not be recovered; the app was sent to `redirect_to`
    Expired { redirect_to: String, reason: String },
    /// Credentials were cleared on request
    LoggedOut,
}

/// Fans session transitions out to the redirect hook and to subscribers
pub struct SessionEvents {
    redirect: Arc<dyn SessionRedirect>,
    login_route: String,
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new(redirect: Arc<dyn SessionRedirect>, login_route: impl Into<String>) -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { redirect, login_route: login_route.into(), sender }
    }

    /// Receive every transition from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn login_route(&self) -> &str {
        &self.login_route
    }

    pub(crate) fn refreshed(&self) {
        info!("Access credential refreshed");
        // No receivers is fine
        let _ = self.sender.send(SessionEvent::Refreshed);
    }

    pub(crate) fn expired(&self, reason: &str) {
        warn!(reason, route = %self.login_route, "Session expired");
        self.redirect.redirect(&self.login_route);
        let _ = self.sender.send(SessionEvent::Expired {
            redirect_to: self.login_route.clone(),
            reason: reason.to_string(),
        });
    }

    pub(crate) fn logged_out(&self) {
        info!("Credentials cleared (logged out)");
        let _ = self.sender.send(SessionEvent::LoggedOut);
    }
}

impl std::fmt::Debug for SessionEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEvents").field("login_route", &self.login_route).finish()
    }
}
