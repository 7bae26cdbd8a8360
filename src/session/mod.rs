//! Session lifecycle facade.
//!
//! `SessionManager` owns the whole client-side session: login and logout,
//! the stored token pair, proactive and reactive refresh, inactivity
//! tracking, and cross-client logout propagation. Hosts drive it with user
//! activity signals and calls, and observe it through a broadcast event
//! stream.

pub mod activity;
mod cache;
mod crosstab;
mod refresh;
mod scheduler;

pub use activity::ActivityKind;
pub use refresh::RefreshOutcome;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::api::{ApiRequest, ApiResponse, ParishApi};
use crate::config::Config;
use crate::error::{ApiError, SessionError};
use crate::store::tokens::TokenStore;
use crate::store::ClientStore;
use crate::types::{TokenPair, UserProfile};

use cache::TtlCache;
use refresh::RefreshCoordinator;
use scheduler::SessionScheduler;

/// Capacity of the session event channel.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// How long a fetched permission catalog stays fresh.
const PERMISSION_CATALOG_TTL: Duration = Duration::from_secs(60);

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogoutReason {
    /// The user asked to log out.
    Requested,
    /// The inactivity deadline passed without an extension.
    Inactivity,
    /// The refresh token was rejected or unusable.
    RefreshFailed,
    /// Another client over the same store logged out.
    CrossTab,
}

/// Session lifecycle notifications, broadcast to every subscriber.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    LoggedIn { user: UserProfile },
    Refreshed { expires_at_ms: i64 },
    /// The inactivity warning should be shown; `grace` is how long the user
    /// has to extend before automatic logout.
    InactivityWarning { grace: Duration },
    /// The user extended the session from the warning prompt.
    Extended,
    LoggedOut { reason: LogoutReason },
}

struct SessionInner {
    api: Arc<dyn ParishApi>,
    tokens: TokenStore,
    access_token_lifetime: Duration,
    user: RwLock<Option<UserProfile>>,
    refresh: Arc<RefreshCoordinator>,
    scheduler: Arc<SessionScheduler>,
    catalog: TtlCache<Vec<String>>,
    events: broadcast::Sender<SessionEvent>,
    /// Set just before this client writes its own logout marker, so the
    /// observer's echo of that marker is not treated as a foreign logout.
    suppress_crosstab: AtomicBool,
    /// Serializes teardown. `logout` can overlap the supervisor's own
    /// teardown across the backend-notify suspension point; the gate keeps
    /// the idempotence check and the cleanup atomic.
    teardown_gate: tokio::sync::Mutex<()>,
}

/// Handle to one client session. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
    activity: mpsc::UnboundedSender<ActivityKind>,
}

impl SessionManager {
    pub fn new(api: Arc<dyn ParishApi>, store: Arc<dyn ClientStore>, config: &Config) -> Self {
        let tokens = TokenStore::new(Arc::clone(&store));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (teardown_tx, mut teardown_rx) = mpsc::unbounded_channel();

        let refresh = RefreshCoordinator::new(
            Arc::clone(&api),
            tokens.clone(),
            config.session.access_token_lifetime,
            config.session.refresh_lead_time,
            events.clone(),
            teardown_tx.clone(),
        );
        let scheduler = SessionScheduler::new(
            config.session.inactivity_warning_delay,
            config.session.inactivity_logout_delay,
            events.clone(),
            teardown_tx.clone(),
        );
        crosstab::spawn_observer(store, teardown_tx);

        let inner = Arc::new(SessionInner {
            api,
            tokens,
            access_token_lifetime: config.session.access_token_lifetime,
            user: RwLock::new(None),
            refresh,
            scheduler: Arc::clone(&scheduler),
            catalog: TtlCache::new(PERMISSION_CATALOG_TTL),
            events,
            suppress_crosstab: AtomicBool::new(false),
            teardown_gate: tokio::sync::Mutex::new(()),
        });

        // Teardown supervisor: serializes every logout path through one task.
        let weak: Weak<SessionInner> = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some(reason) = teardown_rx.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                if reason == LogoutReason::CrossTab
                    && inner.suppress_crosstab.swap(false, Ordering::SeqCst)
                {
                    continue;
                }
                inner.do_logout(reason).await;
            }
        });

        let (activity_tx, activity_rx) = mpsc::unbounded_channel();
        activity::spawn_activity_pump(activity_rx, scheduler);

        Self {
            inner,
            activity: activity_tx,
        }
    }

    /// Subscribe to session lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Exchange credentials for a session. On success the token pair and
    /// profile are persisted, the proactive refresh is armed, and
    /// inactivity tracking starts.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, SessionError> {
        let response = match self.inner.api.login(email, password).await {
            Ok(response) => response,
            Err(ApiError::Status(code, body)) if (400..500).contains(&code) => {
                return Err(SessionError::Credential(ApiError::server_message(&body)));
            }
            Err(ApiError::Status(code, body)) => {
                return Err(SessionError::Network(format!(
                    "login failed with status {code}: {}",
                    ApiError::server_message(&body)
                )));
            }
            Err(ApiError::Http(err)) => return Err(SessionError::Network(err.to_string())),
        };

        let pair = TokenPair::issued(
            response.access_token,
            response.refresh_token,
            self.inner.access_token_lifetime,
        );
        self.inner.tokens.put(&pair)?;
        self.inner.tokens.save_user(&response.user)?;
        *self.write_user() = Some(response.user.clone());

        self.inner.refresh.activate();
        self.inner.refresh.arm();
        self.inner.scheduler.start();
        info!(user = %response.user.email, "session established");
        let _ = self.inner.events.send(SessionEvent::LoggedIn {
            user: response.user.clone(),
        });
        Ok(response.user)
    }

    /// Revive a persisted session, validating the stored access token
    /// against the backend and refreshing once if it has gone stale.
    /// `Ok(None)` means no usable session exists and login is required;
    /// `Err(RefreshExpired)` means a session was found but could not be
    /// revalidated.
    pub async fn resume(&self) -> Result<Option<UserProfile>, SessionError> {
        let Some(pair) = self.inner.tokens.get()? else {
            return Ok(None);
        };
        self.inner.refresh.activate();

        let profile = match self.inner.api.profile(&pair.access_token).await {
            Ok(profile) => profile,
            Err(ApiError::Status(401, _)) => match self.inner.refresh.refresh().await {
                RefreshOutcome::Refreshed => {
                    let pair = self
                        .inner
                        .tokens
                        .get()?
                        .ok_or(SessionError::NotAuthenticated)?;
                    match self.inner.api.profile(&pair.access_token).await {
                        Ok(profile) => profile,
                        Err(err) => {
                            warn!(error = %err, "profile fetch failed after refresh");
                            self.inner.do_logout(LogoutReason::RefreshFailed).await;
                            return Ok(None);
                        }
                    }
                }
                RefreshOutcome::SessionLost => return Err(SessionError::RefreshExpired),
            },
            Err(err) => {
                warn!(error = %err, "stored session could not be revalidated");
                self.inner.do_logout(LogoutReason::RefreshFailed).await;
                return Ok(None);
            }
        };

        if let Err(err) = self.inner.tokens.save_user(&profile) {
            warn!(error = %err, "failed to persist resumed profile");
        }
        *self.write_user() = Some(profile.clone());
        self.inner.refresh.arm();
        self.inner.scheduler.start();
        info!(user = %profile.email, "session resumed");
        let _ = self.inner.events.send(SessionEvent::LoggedIn {
            user: profile.clone(),
        });
        Ok(Some(profile))
    }

    /// End the session on the user's request. Idempotent.
    pub async fn logout(&self) {
        self.inner.do_logout(LogoutReason::Requested).await;
    }

    /// Issue an authorized API call. A 401 triggers one refresh and one
    /// retry; a second rejection or a lost session surfaces as
    /// `AuthorizationRejected`.
    pub async fn authorized_call(
        &self,
        request: &ApiRequest,
    ) -> Result<ApiResponse, SessionError> {
        let pair = self
            .inner
            .tokens
            .get()?
            .ok_or(SessionError::NotAuthenticated)?;
        match self.inner.api.call(request, &pair.access_token).await {
            Ok(response) => Ok(response),
            Err(ApiError::Status(401, body)) => {
                debug!(path = %request.path, "call rejected, attempting refresh");
                match self.inner.refresh.refresh().await {
                    RefreshOutcome::Refreshed => {
                        let pair = self
                            .inner
                            .tokens
                            .get()?
                            .ok_or(SessionError::NotAuthenticated)?;
                        match self.inner.api.call(request, &pair.access_token).await {
                            Ok(response) => Ok(response),
                            Err(ApiError::Status(401, body)) => {
                                Err(SessionError::AuthorizationRejected {
                                    status: 401,
                                    message: ApiError::server_message(&body),
                                })
                            }
                            Err(ApiError::Status(code, body)) => {
                                Err(SessionError::Api(ApiError::Status(code, body)))
                            }
                            Err(ApiError::Http(err)) => {
                                Err(SessionError::Network(err.to_string()))
                            }
                        }
                    }
                    RefreshOutcome::SessionLost => Err(SessionError::AuthorizationRejected {
                        status: 401,
                        message: ApiError::server_message(&body),
                    }),
                }
            }
            Err(ApiError::Status(code, body)) => {
                Err(SessionError::Api(ApiError::Status(code, body)))
            }
            Err(ApiError::Http(err)) => Err(SessionError::Network(err.to_string())),
        }
    }

    /// Report user activity. Cheap; bursts are throttled downstream.
    pub fn record_activity(&self, kind: ActivityKind) {
        let _ = self.activity.send(kind);
    }

    /// Extend the session from the inactivity warning prompt.
    pub fn extend_session(&self) -> bool {
        self.inner.scheduler.extend_session()
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.read_user().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read_user().is_some()
    }

    /// Check a permission against the signed-in user's grants.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.read_user()
            .as_ref()
            .map(|user| user.has_permission(permission))
            .unwrap_or(false)
    }

    /// Fetch the full permission catalog, served from a short-lived cache.
    pub async fn permission_catalog(&self) -> Result<Vec<String>, SessionError> {
        if let Some(cached) = self.inner.catalog.get() {
            return Ok(cached);
        }
        let response = self
            .authorized_call(&ApiRequest::get("/api/permissions"))
            .await?;
        let catalog = parse_permission_catalog(&response.body);
        self.inner.catalog.put(catalog.clone());
        Ok(catalog)
    }

    /// Theme preference for the signed-in user, with app-wide fallback.
    pub fn theme(&self) -> Result<String, SessionError> {
        let user_id = self.read_user().as_ref().map(|user| user.id);
        Ok(self.inner.tokens.theme(user_id)?)
    }

    pub fn set_theme(&self, theme: &str) -> Result<(), SessionError> {
        let user_id = self.read_user().as_ref().map(|user| user.id);
        Ok(self.inner.tokens.set_theme(user_id, theme)?)
    }

    fn read_user(&self) -> std::sync::RwLockReadGuard<'_, Option<UserProfile>> {
        self.inner.user.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_user(&self) -> std::sync::RwLockWriteGuard<'_, Option<UserProfile>> {
        self.inner.user.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionInner {
    /// Tear the session down. Safe to call from any path and any number of
    /// times; only the first call for a live session does work.
    async fn do_logout(&self, reason: LogoutReason) {
        let _gate = self.teardown_gate.lock().await;
        let user = {
            let mut user = self.user.write().unwrap_or_else(|e| e.into_inner());
            user.take()
        };
        let pair = self.tokens.get().ok().flatten();
        if user.is_none() && pair.is_none() {
            return;
        }

        self.scheduler.end();
        self.refresh.cancel();
        self.catalog.invalidate();

        // Best effort; the session ends locally regardless. A cross-tab
        // logout already notified the backend from the originating client.
        if reason != LogoutReason::CrossTab {
            if let Some(pair) = &pair {
                if let Err(err) = self.api.logout(&pair.access_token).await {
                    debug!(error = %err, "backend logout notification failed");
                }
            }
        }

        if let Err(err) = self.tokens.clear() {
            warn!(error = %err, "failed to clear stored session");
        }
        if reason != LogoutReason::CrossTab {
            self.suppress_crosstab.store(true, Ordering::SeqCst);
            if let Err(err) = self.tokens.mark_logout() {
                warn!(error = %err, "failed to write logout marker");
            }
        }

        info!(?reason, "session ended");
        let _ = self.events.send(SessionEvent::LoggedOut { reason });
    }
}

/// Normalize the backend's permission catalog. Entries arrive either as
/// plain strings or as objects carrying `name` (preferred) or `id`.
fn parse_permission_catalog(body: &serde_json::Value) -> Vec<String> {
    body.get("permissions")
        .and_then(|value| value.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    if let Some(text) = item.as_str() {
                        return Some(text.to_string());
                    }
                    let field = item.get("name").or_else(|| item.get("id"))?;
                    match field {
                        serde_json::Value::String(text) => Some(text.clone()),
                        serde_json::Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}
