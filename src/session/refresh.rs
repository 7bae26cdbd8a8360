//! Token refresh coordination.
//!
//! At most one refresh exchange is in flight at a time. The first caller
//! becomes the leader and talks to the backend; everyone who arrives while
//! the exchange runs waits on its outcome instead of issuing a duplicate
//! request that would burn the rotating refresh token.
//!
//! A proactive timer fires shortly before the access token expires so that
//! in the common case requests never see a 401 at all. The timer re-arms
//! itself after every successful refresh.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, warn};

use crate::api::ParishApi;
use crate::store::tokens::TokenStore;
use crate::timer::TimerHandle;
use crate::types::TokenPair;

use super::{LogoutReason, SessionEvent};

/// Result of a refresh attempt, shared by the leader with every waiter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New tokens are in the store; callers should retry with them.
    Refreshed,
    /// The refresh token was rejected or unusable. Teardown is underway.
    SessionLost,
}

enum Role {
    Leader(watch::Sender<Option<RefreshOutcome>>),
    Follower(watch::Receiver<Option<RefreshOutcome>>),
}

/// Clears the coordinator's in-flight slot when dropped. The leader's future
/// lives inside the proactive timer task and can be aborted mid-exchange by
/// `cancel`; without this, the slot would keep a receiver whose sender is
/// gone and every later caller would wait on a channel nobody resolves.
struct InflightSlot<'a>(&'a RefreshCoordinator);

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        self.0.clear_inflight();
    }
}

pub struct RefreshCoordinator {
    api: Arc<dyn ParishApi>,
    tokens: TokenStore,
    lifetime: Duration,
    lead: Duration,
    inflight: std::sync::Mutex<Option<watch::Receiver<Option<RefreshOutcome>>>>,
    proactive: std::sync::Mutex<Option<TimerHandle>>,
    active: AtomicBool,
    events: broadcast::Sender<SessionEvent>,
    teardown: mpsc::UnboundedSender<LogoutReason>,
}

impl RefreshCoordinator {
    pub fn new(
        api: Arc<dyn ParishApi>,
        tokens: TokenStore,
        lifetime: Duration,
        lead: Duration,
        events: broadcast::Sender<SessionEvent>,
        teardown: mpsc::UnboundedSender<LogoutReason>,
    ) -> Arc<Self> {
        Arc::new(Self {
            api,
            tokens,
            lifetime,
            lead,
            inflight: std::sync::Mutex::new(None),
            proactive: std::sync::Mutex::new(None),
            active: AtomicBool::new(false),
            events,
            teardown,
        })
    }

    /// Mark the coordinator live. Called when a session is established.
    pub fn activate(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    /// Stop refreshing. Cancels the proactive timer; an exchange already in
    /// flight finishes but discards its result instead of writing tokens.
    pub fn cancel(&self) {
        self.active.store(false, Ordering::SeqCst);
        let mut slot = self.proactive.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(timer) = slot.take() {
            timer.cancel();
        }
    }

    /// Schedule the proactive refresh from the stored expiry. An already
    /// expired token is left to the reactive 401 path.
    pub fn arm(self: &Arc<Self>) {
        let mut slot = self.proactive.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(timer) = slot.take() {
            timer.cancel();
        }
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        let pair = match self.tokens.get() {
            Ok(Some(pair)) => pair,
            _ => return,
        };
        let remaining = pair.remaining_ms();
        if remaining <= 0 {
            return;
        }
        let lead_ms = self.lead.as_millis() as i64;
        let delay = if remaining > lead_ms {
            Duration::from_millis((remaining - lead_ms) as u64)
        } else {
            Duration::ZERO
        };
        debug!(delay_ms = delay.as_millis() as u64, "proactive refresh armed");
        let this = Arc::clone(self);
        *slot = Some(TimerHandle::once(delay, async move {
            this.refresh().await;
        }));
    }

    /// Refresh the token pair, deduplicating concurrent callers. Every
    /// caller observes the outcome of exactly one backend exchange.
    pub async fn refresh(self: &Arc<Self>) -> RefreshOutcome {
        let role = {
            let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
            match inflight.as_ref() {
                Some(rx) => Role::Follower(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    *inflight = Some(rx);
                    Role::Leader(tx)
                }
            }
        };
        match role {
            Role::Leader(tx) => {
                let slot = InflightSlot(self.as_ref());
                let outcome = self.perform_refresh().await;
                drop(slot);
                let _ = tx.send(Some(outcome));
                outcome
            }
            Role::Follower(mut rx) => match rx.wait_for(|seen| seen.is_some()).await {
                Ok(seen) => (*seen).unwrap_or(RefreshOutcome::SessionLost),
                Err(_) => RefreshOutcome::SessionLost,
            },
        }
    }

    fn clear_inflight(&self) {
        let mut slot = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }

    async fn perform_refresh(self: &Arc<Self>) -> RefreshOutcome {
        if !self.active.load(Ordering::SeqCst) {
            return RefreshOutcome::SessionLost;
        }
        let pair = match self.tokens.get() {
            Ok(Some(pair)) => pair,
            _ => {
                warn!("refresh requested with no stored tokens");
                let _ = self.teardown.send(LogoutReason::RefreshFailed);
                return RefreshOutcome::SessionLost;
            }
        };
        match self.api.refresh(&pair.refresh_token).await {
            Ok(response) => {
                // A logout may have raced the exchange; do not resurrect the
                // session by writing fresh tokens over a cleared store.
                if !self.active.load(Ordering::SeqCst) {
                    return RefreshOutcome::SessionLost;
                }
                let rotated = response.refresh_token.unwrap_or(pair.refresh_token);
                let fresh = TokenPair::issued(response.access_token, rotated, self.lifetime);
                if let Err(err) = self.tokens.put(&fresh) {
                    warn!(error = %err, "failed to persist refreshed tokens");
                    let _ = self.teardown.send(LogoutReason::RefreshFailed);
                    return RefreshOutcome::SessionLost;
                }
                if let Some(user) = response.user {
                    if let Err(err) = self.tokens.save_user(&user) {
                        warn!(error = %err, "failed to persist refreshed user profile");
                    }
                }
                debug!(expires_at_ms = fresh.expires_at_ms, "token pair refreshed");
                let _ = self.events.send(SessionEvent::Refreshed {
                    expires_at_ms: fresh.expires_at_ms,
                });
                self.arm();
                RefreshOutcome::Refreshed
            }
            Err(err) => {
                warn!(error = %err, "refresh exchange failed, ending session");
                let _ = self.teardown.send(LogoutReason::RefreshFailed);
                RefreshOutcome::SessionLost
            }
        }
    }
}
