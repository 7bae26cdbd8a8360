//! End-to-end session lifecycle scenarios against a scripted backend.
//!
//! Time is paused in every test, so lifetimes of minutes run instantly and
//! timer-driven behavior is deterministic.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use sacristan::api::{ApiRequest, ApiResponse, LoginResponse, ParishApi, RefreshResponse};
use sacristan::config::{Config, SessionConfig};
use sacristan::error::{ApiError, SessionError};
use sacristan::session::{ActivityKind, LogoutReason, SessionEvent, SessionManager};
use sacristan::store::{ClientStore, MemoryStore};
use sacristan::types::UserProfile;

const LIFETIME: Duration = Duration::from_secs(600);
const LEAD: Duration = Duration::from_secs(60);
const WARN: Duration = Duration::from_secs(45);
const LOGOUT: Duration = Duration::from_secs(60);

/// Scripted backend. Tracks which access token is currently honored and
/// counts every exchange.
struct ScriptedApi {
    logins: AtomicUsize,
    refreshes: AtomicUsize,
    logouts: AtomicUsize,
    calls: AtomicUsize,
    valid_access: Mutex<String>,
    valid_refresh: Mutex<String>,
    logout_delay: Mutex<Duration>,
}

impl ScriptedApi {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            logins: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            logouts: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            valid_access: Mutex::new(String::new()),
            valid_refresh: Mutex::new(String::new()),
            logout_delay: Mutex::new(Duration::ZERO),
        })
    }

    fn user() -> UserProfile {
        serde_json::from_value(serde_json::json!({
            "id": 1,
            "name": "Ana",
            "email": "ana@example.org",
            "role": "secretary",
            "permissions": ["users.read"]
        }))
        .unwrap()
    }

    /// Simulate server-side expiry of the current access token.
    fn expire_access(&self) {
        self.valid_access.lock().unwrap().clear();
    }
}

#[async_trait]
impl ParishApi for ScriptedApi {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
        if password != "secret" {
            return Err(ApiError::Status(
                401,
                r#"{"error":"Credenciales inválidas"}"#.to_string(),
            ));
        }
        let access = format!("acc-login-{n}");
        let refresh = format!("ref-login-{n}");
        *self.valid_access.lock().unwrap() = access.clone();
        *self.valid_refresh.lock().unwrap() = refresh.clone();
        let mut user = Self::user();
        user.email = email.to_string();
        Ok(LoginResponse {
            access_token: access,
            refresh_token: refresh,
            user,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.valid_refresh.lock().unwrap() != refresh_token {
            return Err(ApiError::Status(
                401,
                r#"{"error":"Token inválido","expired":true}"#.to_string(),
            ));
        }
        let access = format!("acc-refresh-{n}");
        let refresh = format!("ref-refresh-{n}");
        *self.valid_access.lock().unwrap() = access.clone();
        *self.valid_refresh.lock().unwrap() = refresh.clone();
        Ok(RefreshResponse {
            access_token: access,
            refresh_token: Some(refresh),
            user: None,
        })
    }

    async fn logout(&self, _access_token: &str) -> Result<(), ApiError> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.logout_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn profile(&self, access_token: &str) -> Result<UserProfile, ApiError> {
        if *self.valid_access.lock().unwrap() != access_token {
            return Err(ApiError::Status(
                401,
                r#"{"error":"Token expirado","expired":true}"#.to_string(),
            ));
        }
        Ok(Self::user())
    }

    async fn call(&self, request: &ApiRequest, access_token: &str) -> Result<ApiResponse, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.valid_access.lock().unwrap() != access_token {
            return Err(ApiError::Status(
                401,
                r#"{"error":"Token expirado","expired":true}"#.to_string(),
            ));
        }
        let body = if request.path == "/api/permissions" {
            serde_json::json!({"permissions": ["users.read", {"name": "roles.write"}]})
        } else {
            serde_json::json!({"ok": true})
        };
        Ok(ApiResponse { status: 200, body })
    }
}

fn test_config() -> Config {
    Config {
        base_url: "http://parish.test".to_string(),
        http_timeout: Duration::from_secs(5),
        session: SessionConfig {
            access_token_lifetime: LIFETIME,
            refresh_lead_time: LEAD,
            inactivity_warning_delay: WARN,
            inactivity_logout_delay: LOGOUT,
        },
    }
}

fn manager(api: Arc<ScriptedApi>, store: Arc<dyn ClientStore>) -> SessionManager {
    SessionManager::new(api, store, &test_config())
}

async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

async fn next_event(rx: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("event channel closed")
}

#[tokio::test(start_paused = true)]
async fn login_persists_session_and_emits_event() {
    let api = ScriptedApi::new();
    let session = manager(Arc::clone(&api), Arc::new(MemoryStore::new()));
    let mut events = session.subscribe();

    let user = session.login("ana@example.org", "secret").await.unwrap();
    assert_eq!(user.email, "ana@example.org");
    assert!(session.is_authenticated());
    assert!(session.has_permission("users.read"));
    assert!(!session.has_permission("roles.write"));

    match next_event(&mut events).await {
        SessionEvent::LoggedIn { user } => assert_eq!(user.email, "ana@example.org"),
        other => panic!("expected LoggedIn, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn bad_credentials_surface_the_server_message() {
    let api = ScriptedApi::new();
    let session = manager(Arc::clone(&api), Arc::new(MemoryStore::new()));

    let err = session
        .login("ana@example.org", "wrong")
        .await
        .expect_err("login should fail");
    match err {
        SessionError::Credential(message) => assert_eq!(message, "Credenciales inválidas"),
        other => panic!("expected Credential, got {other:?}"),
    }
    assert!(!session.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn proactive_refresh_fires_before_expiry_and_rearms() {
    let api = ScriptedApi::new();
    let session = manager(Arc::clone(&api), Arc::new(MemoryStore::new()));
    let mut events = session.subscribe();

    session.login("ana@example.org", "secret").await.unwrap();
    let _ = next_event(&mut events).await;

    // Keep the inactivity scheduler alive; only the refresh timing is under
    // test here.
    for _ in 0..28 {
        tokio::time::sleep(Duration::from_secs(40)).await;
        session.record_activity(ActivityKind::KeyPress);
        settle().await;
    }

    // 600s lifetime with a 60s lead: one refresh at ~540s, another ~540s
    // after that.
    assert!(api.refreshes.load(Ordering::SeqCst) >= 2);
    assert!(session.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn idle_session_warns_then_logs_out() {
    let api = ScriptedApi::new();
    let session = manager(Arc::clone(&api), Arc::new(MemoryStore::new()));
    let mut events = session.subscribe();

    session.login("ana@example.org", "secret").await.unwrap();
    let _ = next_event(&mut events).await;

    tokio::time::sleep(Duration::from_secs(46)).await;
    settle().await;
    match next_event(&mut events).await {
        SessionEvent::InactivityWarning { grace } => assert_eq!(grace, Duration::from_secs(15)),
        other => panic!("expected InactivityWarning, got {other:?}"),
    }

    tokio::time::sleep(Duration::from_secs(15)).await;
    settle().await;
    match next_event(&mut events).await {
        SessionEvent::LoggedOut { reason } => assert_eq!(reason, LogoutReason::Inactivity),
        other => panic!("expected LoggedOut, got {other:?}"),
    }
    assert!(!session.is_authenticated());
    assert_eq!(api.logouts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn extension_from_the_warning_defers_logout() {
    let api = ScriptedApi::new();
    let session = manager(Arc::clone(&api), Arc::new(MemoryStore::new()));
    let mut events = session.subscribe();

    session.login("ana@example.org", "secret").await.unwrap();
    let _ = next_event(&mut events).await;

    tokio::time::sleep(Duration::from_secs(46)).await;
    settle().await;
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::InactivityWarning { .. }
    ));

    assert!(session.extend_session());
    assert!(matches!(next_event(&mut events).await, SessionEvent::Extended));

    // The full logout delay would have elapsed from the original activity.
    tokio::time::sleep(Duration::from_secs(20)).await;
    settle().await;
    assert!(session.is_authenticated());
    assert_eq!(api.logouts.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn rejected_call_refreshes_and_retries_once() {
    let api = ScriptedApi::new();
    let session = manager(Arc::clone(&api), Arc::new(MemoryStore::new()));

    session.login("ana@example.org", "secret").await.unwrap();
    api.expire_access();

    let response = session
        .authorized_call(&ApiRequest::get("/api/users/profile"))
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(api.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(api.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn rejected_refresh_tears_the_session_down() {
    let api = ScriptedApi::new();
    let session = manager(Arc::clone(&api), Arc::new(MemoryStore::new()));
    let mut events = session.subscribe();

    session.login("ana@example.org", "secret").await.unwrap();
    let _ = next_event(&mut events).await;

    api.expire_access();
    *api.valid_refresh.lock().unwrap() = String::new();

    let err = session
        .authorized_call(&ApiRequest::get("/api/users/profile"))
        .await
        .expect_err("call should fail");
    match err {
        SessionError::AuthorizationRejected { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Token expirado");
        }
        other => panic!("expected AuthorizationRejected, got {other:?}"),
    }

    settle().await;
    match next_event(&mut events).await {
        SessionEvent::LoggedOut { reason } => assert_eq!(reason, LogoutReason::RefreshFailed),
        other => panic!("expected LoggedOut, got {other:?}"),
    }
    assert!(!session.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn logout_is_idempotent_and_notifies_backend_once() {
    let api = ScriptedApi::new();
    let session = manager(Arc::clone(&api), Arc::new(MemoryStore::new()));

    session.login("ana@example.org", "secret").await.unwrap();
    session.logout().await;
    session.logout().await;
    settle().await;

    assert_eq!(api.logouts.load(Ordering::SeqCst), 1);
    assert!(!session.is_authenticated());
    assert_eq!(
        session
            .authorized_call(&ApiRequest::get("/api/users/profile"))
            .await
            .err()
            .map(|e| e.to_string()),
        Some(SessionError::NotAuthenticated.to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn overlapping_logouts_notify_backend_once() {
    let api = ScriptedApi::new();
    // Widen the window: the backend notification suspends mid-teardown.
    *api.logout_delay.lock().unwrap() = Duration::from_millis(100);
    let session = manager(Arc::clone(&api), Arc::new(MemoryStore::new()));

    session.login("ana@example.org", "secret").await.unwrap();
    let mut events = session.subscribe();
    while events.try_recv().is_ok() {}

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.logout().await }
    });
    let second = tokio::spawn({
        let session = session.clone();
        async move { session.logout().await }
    });
    first.await.unwrap();
    second.await.unwrap();
    settle().await;

    assert_eq!(api.logouts.load(Ordering::SeqCst), 1);
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::LoggedOut { reason: LogoutReason::Requested }
    ));
    assert!(events.try_recv().is_err(), "duplicate LoggedOut emitted");
    assert!(!session.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn logout_propagates_to_clients_sharing_the_store() {
    let api = ScriptedApi::new();
    let store: Arc<dyn ClientStore> = Arc::new(MemoryStore::new());
    let tab_a = manager(Arc::clone(&api), Arc::clone(&store));
    let tab_b = manager(Arc::clone(&api), Arc::clone(&store));

    tab_a.login("ana@example.org", "secret").await.unwrap();
    assert_eq!(tab_b.resume().await.unwrap().map(|u| u.email).as_deref(), Some("ana@example.org"));

    let mut b_events = tab_b.subscribe();
    tab_a.logout().await;
    settle().await;

    match next_event(&mut b_events).await {
        SessionEvent::LoggedOut { reason } => assert_eq!(reason, LogoutReason::CrossTab),
        other => panic!("expected LoggedOut, got {other:?}"),
    }
    assert!(!tab_b.is_authenticated());
    // Only the originating client told the backend.
    assert_eq!(api.logouts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn resume_revives_a_stored_session_after_staleness() {
    let api = ScriptedApi::new();
    let store: Arc<dyn ClientStore> = Arc::new(MemoryStore::new());

    {
        let session = manager(Arc::clone(&api), Arc::clone(&store));
        session.login("ana@example.org", "secret").await.unwrap();
    }

    // The access token went stale while the client was away.
    api.expire_access();

    let session = manager(Arc::clone(&api), Arc::clone(&store));
    let user = session.resume().await.unwrap().expect("session revives");
    assert_eq!(user.email, "ana@example.org");
    assert_eq!(api.refreshes.load(Ordering::SeqCst), 1);
    assert!(session.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn resume_with_revoked_refresh_token_requires_login() {
    let api = ScriptedApi::new();
    let store: Arc<dyn ClientStore> = Arc::new(MemoryStore::new());

    {
        let session = manager(Arc::clone(&api), Arc::clone(&store));
        session.login("ana@example.org", "secret").await.unwrap();
    }
    api.expire_access();
    *api.valid_refresh.lock().unwrap() = String::new();

    let session = manager(Arc::clone(&api), Arc::clone(&store));
    let err = session.resume().await.expect_err("resume should fail");
    assert!(matches!(err, SessionError::RefreshExpired));

    settle().await;
    assert!(!session.is_authenticated());
    assert!(session.resume().await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn permission_catalog_is_cached_for_its_ttl() {
    let api = ScriptedApi::new();
    let session = manager(Arc::clone(&api), Arc::new(MemoryStore::new()));

    session.login("ana@example.org", "secret").await.unwrap();

    let first = session.permission_catalog().await.unwrap();
    assert_eq!(first, vec!["users.read", "roles.write"]);
    let second = session.permission_catalog().await.unwrap();
    assert_eq!(second, first);
    assert_eq!(api.calls.load(Ordering::SeqCst), 1);

    // Stay active so the inactivity logout does not fire while the cache
    // entry goes stale.
    for _ in 0..2 {
        tokio::time::sleep(Duration::from_secs(31)).await;
        session.record_activity(ActivityKind::PointerMove);
        settle().await;
    }
    let third = session.permission_catalog().await.unwrap();
    assert_eq!(third, first);
    assert_eq!(api.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn theme_prefers_the_user_override() {
    let api = ScriptedApi::new();
    let session = manager(Arc::clone(&api), Arc::new(MemoryStore::new()));

    assert_eq!(session.theme().unwrap(), "blue");
    session.set_theme("green").unwrap();
    assert_eq!(session.theme().unwrap(), "green");

    session.login("ana@example.org", "secret").await.unwrap();
    assert_eq!(session.theme().unwrap(), "green");
    session.set_theme("red").unwrap();
    assert_eq!(session.theme().unwrap(), "red");
    session.logout().await;
    assert_eq!(session.theme().unwrap(), "green");
}
