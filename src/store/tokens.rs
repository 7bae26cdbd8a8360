//! Typed accessors over the client store.
//!
//! Key schema mirrors what the original client kept in browser storage:
//! token pair fields, the serialized user profile, a per-user theme
//! override, and the cross-tab logout marker.

use std::sync::Arc;

use crate::error::StoreError;
use crate::types::{unix_now_ms, TokenPair, UserProfile};

use super::ClientStore;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const TOKEN_EXPIRY_KEY: &str = "token_expiry";
pub const USER_KEY: &str = "user";
pub const LOGOUT_EVENT_KEY: &str = "logout_event";
pub const APP_THEME_KEY: &str = "app-theme";

pub const DEFAULT_THEME: &str = "blue";

fn user_theme_key(user_id: i64) -> String {
    format!("theme:{user_id}")
}

/// Token and session fields in the durable store.
///
/// Pure get/set/clear; writers are already serialized by the refresh lock
/// and the facade, so no locking happens at this layer.
#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn ClientStore>,
}

impl TokenStore {
    pub fn new(store: Arc<dyn ClientStore>) -> Self {
        Self { store }
    }

    /// Write the pair as one atomic unit.
    pub fn put(&self, pair: &TokenPair) -> Result<(), StoreError> {
        self.store.set_many(&[
            (ACCESS_TOKEN_KEY, pair.access_token.clone()),
            (REFRESH_TOKEN_KEY, pair.refresh_token.clone()),
            (TOKEN_EXPIRY_KEY, pair.expires_at_ms.to_string()),
        ])
    }

    /// Read the stored pair. All three fields must be present; a partial
    /// record reads as no session.
    pub fn get(&self) -> Result<Option<TokenPair>, StoreError> {
        let (Some(access_token), Some(refresh_token), Some(expiry)) = (
            self.store.get(ACCESS_TOKEN_KEY)?,
            self.store.get(REFRESH_TOKEN_KEY)?,
            self.store.get(TOKEN_EXPIRY_KEY)?,
        ) else {
            return Ok(None);
        };
        let expires_at_ms = expiry
            .parse::<i64>()
            .map_err(|e| StoreError::Invalid(format!("token_expiry is not an integer: {e}")))?;
        Ok(Some(TokenPair {
            access_token,
            refresh_token,
            expires_at_ms,
        }))
    }

    /// Remove the pair and the stored profile as one unit.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove_many(&[
            ACCESS_TOKEN_KEY,
            REFRESH_TOKEN_KEY,
            TOKEN_EXPIRY_KEY,
            USER_KEY,
        ])
    }

    pub fn save_user(&self, user: &UserProfile) -> Result<(), StoreError> {
        self.store.set(USER_KEY, &serde_json::to_string(user)?)
    }

    pub fn load_user(&self) -> Result<Option<UserProfile>, StoreError> {
        match self.store.get(USER_KEY)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Write the cross-tab logout marker (epoch millis).
    pub fn mark_logout(&self) -> Result<(), StoreError> {
        self.store
            .set(LOGOUT_EVENT_KEY, &unix_now_ms().to_string())
    }

    /// Theme preference: per-user override, then the app-wide setting,
    /// then the built-in default.
    pub fn theme(&self, user_id: Option<i64>) -> Result<String, StoreError> {
        if let Some(id) = user_id {
            if let Some(theme) = self.store.get(&user_theme_key(id))? {
                return Ok(theme);
            }
        }
        Ok(self
            .store
            .get(APP_THEME_KEY)?
            .unwrap_or_else(|| DEFAULT_THEME.to_string()))
    }

    pub fn set_theme(&self, user_id: Option<i64>, theme: &str) -> Result<(), StoreError> {
        match user_id {
            Some(id) => self.store.set(&user_theme_key(id), theme),
            None => self.store.set(APP_THEME_KEY, theme),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn token_store() -> TokenStore {
        TokenStore::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn pair_round_trips_as_a_unit() {
        let tokens = token_store();
        assert!(tokens.get().unwrap().is_none());

        let pair = TokenPair::issued("acc".into(), "ref".into(), Duration::from_secs(60));
        tokens.put(&pair).unwrap();
        assert_eq!(tokens.get().unwrap(), Some(pair));

        tokens.clear().unwrap();
        assert!(tokens.get().unwrap().is_none());
    }

    #[test]
    fn partial_record_reads_as_no_session() {
        let store = Arc::new(MemoryStore::new());
        store.set(ACCESS_TOKEN_KEY, "acc").unwrap();
        store.set(TOKEN_EXPIRY_KEY, "12345").unwrap();
        let tokens = TokenStore::new(store);
        assert!(tokens.get().unwrap().is_none());
    }

    #[test]
    fn corrupt_expiry_is_an_error_not_a_session() {
        let store = Arc::new(MemoryStore::new());
        store.set(ACCESS_TOKEN_KEY, "acc").unwrap();
        store.set(REFRESH_TOKEN_KEY, "ref").unwrap();
        store.set(TOKEN_EXPIRY_KEY, "soon").unwrap();
        let tokens = TokenStore::new(store);
        assert!(tokens.get().is_err());
    }

    #[test]
    fn clear_also_drops_the_stored_profile() {
        let tokens = token_store();
        let user = UserProfile {
            id: 3,
            name: "Ana".into(),
            email: "ana@example.org".into(),
            role: Some("admin".into()),
            permissions: vec!["users.read".into()],
        };
        tokens.save_user(&user).unwrap();
        assert_eq!(tokens.load_user().unwrap(), Some(user));
        tokens.clear().unwrap();
        assert!(tokens.load_user().unwrap().is_none());
    }

    #[test]
    fn theme_falls_back_from_user_to_app_to_default() {
        let tokens = token_store();
        assert_eq!(tokens.theme(Some(9)).unwrap(), DEFAULT_THEME);

        tokens.set_theme(None, "green").unwrap();
        assert_eq!(tokens.theme(Some(9)).unwrap(), "green");

        tokens.set_theme(Some(9), "purple").unwrap();
        assert_eq!(tokens.theme(Some(9)).unwrap(), "purple");
        // Other users keep the app-wide setting.
        assert_eq!(tokens.theme(Some(10)).unwrap(), "green");
    }
}
