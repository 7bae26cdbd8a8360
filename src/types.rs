//! Public session model types.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Access/refresh credential pair with its computed expiry.
///
/// Owned by the token store and always written as a unit. `expires_at_ms`
/// is derived exclusively as issue time plus the configured access-token
/// lifetime, never parsed out of the token itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at_ms: i64,
}

impl TokenPair {
    /// Build a pair issued now, expiring after `lifetime`.
    pub fn issued(access_token: String, refresh_token: String, lifetime: Duration) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at_ms: unix_now_ms().saturating_add(lifetime.as_millis() as i64),
        }
    }

    /// Milliseconds until expiry; negative when already stale.
    pub fn remaining_ms(&self) -> i64 {
        self.expires_at_ms - unix_now_ms()
    }
}

/// Authenticated user profile as returned by the backend.
///
/// Unknown fields (status strings, timestamps) are ignored on decode so the
/// client survives backend additions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl UserProfile {
    /// Pure membership check against the effective permission set.
    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.iter().any(|p| p == name)
    }
}

/// Current wall-clock time as epoch milliseconds.
pub fn unix_now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
