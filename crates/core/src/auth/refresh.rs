//! Single-flight credential refresh
//!
//! When operations fail with an authentication signal, exactly one refresh
//! request is issued no matter how many operations failed concurrently.
//! Every operation that observed the failure is parked on a continuation and
//! released exactly once when that refresh settles: all replay after a
//! success, all fail after a failure.
//!
//! The in-progress flag and the waiter queue live behind one async mutex,
//! and the credential store is only written while holding it, so "check
//! in-progress, then set" and "compare credential, then refresh" are each a
//! single atomic step even on a multi-threaded runtime.
//!
//! The refresh itself runs on a spawned task: if the caller that triggered
//! it is cancelled, the refresh still completes and the queued operations
//! are still resolved.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use graphlink_domain::{CredentialPair, GraphQLResponse, Result, TransportError};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::middleware::AuthMiddleware;
use super::session::{SessionEvent, SessionEvents};
use super::token_store::TokenStore;
use crate::pipeline::OperationRequest;
use crate::ports::{Exchange, RefreshClient};

/// How a settled refresh resolves its continuations
#[derive(Debug, Clone, PartialEq, Eq)]
enum RefreshOutcome {
    Refreshed,
    Failed(String),
}

#[derive(Debug, Default)]
struct RefreshState {
    in_flight: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
    /// Access credential the last failed refresh tried to replace
    revoked: Option<String>,
}

/// Owns the refresh-in-progress flag and the pending continuations
pub struct RefreshCoordinator {
    store: Arc<TokenStore>,
    client: Arc<dyn RefreshClient>,
    session: SessionEvents,
    state: Mutex<RefreshState>,
    auto_refresh: SyncMutex<Option<JoinHandle<()>>>,
}

/// Shortest gap between two proactive refreshes
const MIN_REFRESH_SPACING: Duration = Duration::from_secs(1);

impl RefreshCoordinator {
    pub fn new(
        store: Arc<TokenStore>,
        client: Arc<dyn RefreshClient>,
        session: SessionEvents,
    ) -> Self {
        Self {
            store,
            client,
            session,
            state: Mutex::new(RefreshState::default()),
            auto_refresh: SyncMutex::new(None),
        }
    }

    pub fn store(&self) -> Arc<TokenStore> {
        Arc::clone(&self.store)
    }

    /// Receive session transitions (refreshed, expired, logged out)
    pub fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.session.subscribe()
    }

    /// Store credentials obtained by a login flow
    ///
    /// # Errors
    /// Returns `TransportError::Config` if the credentials cannot be persisted
    pub async fn login(&self, pair: CredentialPair) -> Result<()> {
        let mut state = self.state.lock().await;
        state.revoked = None;
        self.store.set(pair).await.map_err(|e| TransportError::Config(e.to_string()))
    }

    /// Clear credentials on request
    ///
    /// # Errors
    /// Returns `TransportError::Config` if persisted credentials cannot be removed
    pub async fn logout(&self) -> Result<()> {
        let result = {
            let _state = self.state.lock().await;
            self.store.clear().await
        };
        self.session.logged_out();
        result.map_err(|e| TransportError::Config(e.to_string()))
    }

    /// Recover from an authentication failure.
    ///
    /// `failed_with` is the access credential the failed request carried.
    /// Resolves `Ok(())` once the operation may be replayed, or
    /// `Err(SessionExpired)` once the session is gone.
    ///
    /// - refresh in flight: enqueue and wait for it
    /// - credential already replaced since the request was sent: replay at
    ///   once, no new refresh
    /// - otherwise: start the single refresh and wait for it
    ///
    /// # Errors
    /// Returns `TransportError::SessionExpired` when the refresh failed
    #[instrument(skip_all)]
    pub async fn recover(self: &Arc<Self>, failed_with: Option<&str>) -> Result<()> {
        let (sender, receiver) = oneshot::channel();
        {
            let mut state = self.state.lock().await;
            if state.in_flight {
                debug!(waiting = state.waiters.len() + 1, "refresh in flight, queueing continuation");
                state.waiters.push(sender);
            } else if self.is_stale(failed_with) {
                debug!("credential already refreshed since request was sent, replaying");
                return Ok(());
            } else if failed_with.is_some() && state.revoked.as_deref() == failed_with {
                debug!("credential was revoked by an earlier failed refresh");
                return Err(TransportError::SessionExpired("session already expired".to_string()));
            } else {
                state.in_flight = true;
                state.waiters.push(sender);
                drop(state);
                self.spawn_refresh();
            }
        }

        match receiver.await {
            Ok(RefreshOutcome::Refreshed) => Ok(()),
            Ok(RefreshOutcome::Failed(reason)) => Err(TransportError::SessionExpired(reason)),
            Err(_) => Err(TransportError::SessionExpired("refresh task was aborted".to_string())),
        }
    }

    /// Refresh now regardless of expiry, sharing any refresh already in flight
    ///
    /// # Errors
    /// Returns `TransportError::SessionExpired` when the refresh failed
    pub async fn refresh_now(self: &Arc<Self>) -> Result<()> {
        let current = self.store.access_token();
        self.recover(current.as_deref()).await
    }

    /// Whether a refresh is currently running
    pub async fn is_refreshing(&self) -> bool {
        self.state.lock().await.in_flight
    }

    fn is_stale(&self, failed_with: Option<&str>) -> bool {
        match (self.store.access_token(), failed_with) {
            (Some(current), Some(used)) => current != used,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Run the refresh on its own task. A supervisor settles the queued
    /// continuations as a failure if that task panics or is aborted.
    fn spawn_refresh(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let worker = Arc::clone(&this);
            let refresh = tokio::spawn(async move {
                let result = worker.request_new_credentials().await;
                worker.settle(result).await;
            });
            if let Err(e) = refresh.await {
                error!(error = %e, "refresh task did not finish");
                this.settle(Err("refresh task did not finish".to_string())).await;
            }
        });
    }

    async fn settle(&self, result: std::result::Result<(String, Option<i64>), String>) {
        let mut state = self.state.lock().await;
        if !state.in_flight {
            return;
        }
        let outcome = match result {
            Ok((access_token, expires_in)) => {
                match self.store.replace_access_token(access_token, expires_in).await {
                    Ok(true) => {
                        state.revoked = None;
                        RefreshOutcome::Refreshed
                    }
                    Ok(false) => {
                        warn!("credentials were cleared while refreshing");
                        RefreshOutcome::Failed("session ended during refresh".to_string())
                    }
                    Err(e) => {
                        // Memory already holds the new credential
                        warn!(error = %e, "refreshed credentials could not be persisted");
                        state.revoked = None;
                        RefreshOutcome::Refreshed
                    }
                }
            }
            Err(reason) => {
                state.revoked = self.store.access_token();
                if let Err(e) = self.store.clear().await {
                    warn!(error = %e, "persisted credentials could not be removed");
                }
                RefreshOutcome::Failed(reason)
            }
        };
        state.in_flight = false;
        let waiters = std::mem::take(&mut state.waiters);
        drop(state);

        debug!(continuations = waiters.len(), "resolving queued operations");
        for waiter in waiters {
            // A dropped receiver means that caller went away
            let _ = waiter.send(outcome.clone());
        }

        match outcome {
            RefreshOutcome::Refreshed => self.session.refreshed(),
            RefreshOutcome::Failed(reason) => self.session.expired(&reason),
        }
    }

    async fn request_new_credentials(&self) -> std::result::Result<(String, Option<i64>), String> {
        let refresh_token =
            self.store.refresh_token().ok_or_else(|| "no refresh credential available".to_string())?;

        let response = self.client.refresh(&refresh_token).await.map_err(|e| {
            error!(error = %e, "refresh request failed");
            e.to_string()
        })?;

        let Some(access_token) = response.granted_token() else {
            let reason = response.denial_reason();
            error!(reason = %reason, "refresh denied");
            return Err(reason);
        };

        info!("Successfully refreshed access credential");
        Ok((access_token.to_string(), response.expires_in))
    }

    /// Start the background auto-refresh task, replacing any running one.
    ///
    /// Sleeps until the access credential enters the refresh threshold, then
    /// refreshes through the same single-flight path as reactive refreshes.
    /// Re-checks every `idle_interval` while unauthenticated, when no expiry
    /// is known, and after a failed refresh. The task holds only a weak
    /// reference and is aborted when the coordinator is dropped.
    pub fn spawn_auto_refresh(self: &Arc<Self>, threshold_seconds: i64, idle_interval: Duration) {
        let weak = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            info!("Starting credential auto-refresh background task");
            let mut just_refreshed = false;
            loop {
                let Some(this) = weak.upgrade() else { break };
                let Some(pair) = this.store.get() else {
                    drop(this);
                    tokio::time::sleep(idle_interval).await;
                    continue;
                };
                let wait = auto_refresh_delay(
                    pair.seconds_until_expiry(),
                    threshold_seconds,
                    idle_interval,
                    just_refreshed,
                );
                drop(this);

                if !wait.is_zero() {
                    debug!(seconds = wait.as_secs(), "auto-refresh sleeping");
                    tokio::time::sleep(wait).await;
                }
                just_refreshed = false;

                // The wait ends at the threshold; a credential replaced in the
                // meantime gets a fresh schedule
                let Some(this) = weak.upgrade() else { break };
                let unchanged = this.store.access_token().as_deref() == Some(pair.access_token.as_str());
                if pair.expires_at.is_none() || !unchanged {
                    continue;
                }

                info!("Auto-refresh: credential expiring soon, refreshing");
                let refreshed = this.recover(Some(&pair.access_token)).await;
                drop(this);
                match refreshed {
                    Ok(()) => just_refreshed = true,
                    Err(e) => {
                        error!(error = %e, "Auto-refresh failed");
                        tokio::time::sleep(idle_interval).await;
                    }
                }
            }
            debug!("auto-refresh task stopped");
        });

        if let Some(previous) = self.auto_refresh.lock().replace(task) {
            previous.abort();
        }
    }

    /// Stop the auto-refresh task if one is running
    pub fn stop_auto_refresh(&self) {
        if let Some(task) = self.auto_refresh.lock().take() {
            task.abort();
        }
    }

    pub fn is_auto_refreshing(&self) -> bool {
        self.auto_refresh.lock().as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for RefreshCoordinator {
    fn drop(&mut self) {
        self.stop_auto_refresh();
    }
}

/// How long the auto-refresh task sleeps before its next check.
///
/// Right after a refresh the wait never drops to zero, even when the new
/// credential's whole lifetime is inside the threshold: it is half the
/// remaining lifetime, between one second and `idle_interval`.
fn auto_refresh_delay(
    seconds_until_expiry: Option<i64>,
    threshold_seconds: i64,
    idle_interval: Duration,
    just_refreshed: bool,
) -> Duration {
    let Some(remaining) = seconds_until_expiry else {
        return idle_interval;
    };
    let until_threshold = remaining.saturating_sub(threshold_seconds);
    if until_threshold > 0 {
        return Duration::from_secs(until_threshold.unsigned_abs());
    }
    if just_refreshed {
        let half_life = Duration::from_secs(u64::try_from(remaining / 2).unwrap_or(0));
        return half_life.clamp(MIN_REFRESH_SPACING, idle_interval.max(MIN_REFRESH_SPACING));
    }
    Duration::ZERO
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator").field("store", &self.store).finish_non_exhaustive()
    }
}

/// Pipeline stage wiring the coordinator onto the error path.
///
/// An authentication failure (`Err(Auth)` or an UNAUTHENTICATED GraphQL
/// error) parks the operation on the coordinator; once released, the
/// credential is re-attached and the operation is replayed exactly once.
pub struct RefreshStage<N> {
    coordinator: Arc<RefreshCoordinator>,
    middleware: AuthMiddleware,
    next: N,
}

impl<N> RefreshStage<N> {
    pub fn new(coordinator: Arc<RefreshCoordinator>, middleware: AuthMiddleware, next: N) -> Self {
        Self { coordinator, middleware, next }
    }
}

#[async_trait]
impl<N: Exchange> Exchange for RefreshStage<N> {
    async fn execute(&self, request: OperationRequest) -> Result<GraphQLResponse> {
        let mut replay = request.clone();
        let failed_with = request.bearer().map(str::to_owned);

        match self.next.execute(request).await {
            Ok(response) if !response.is_unauthenticated() => return Ok(response),
            Err(e) if !e.is_auth() => return Err(e),
            Ok(_) => debug!(operation = %replay.operation.display_name(), "unauthenticated GraphQL error"),
            Err(e) => debug!(operation = %replay.operation.display_name(), error = %e, "authentication failure"),
        }

        self.coordinator.recover(failed_with.as_deref()).await?;

        self.middleware.apply(&mut replay);
        match self.next.execute(replay).await {
            Ok(response) if response.is_unauthenticated() => {
                Err(TransportError::Auth("still unauthenticated after credential refresh".into()))
            }
            other => other,
        }
    }
}
