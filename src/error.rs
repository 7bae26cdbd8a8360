//! Unified error types for the session client.

use std::fmt;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors when loading or parsing configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Toml(e) => write!(f, "toml: {e}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e)
    }
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Errors from the durable client key-value store.
#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Serde(serde_json::Error),
    Invalid(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Serde(e) => write!(f, "serde: {e}"),
            Self::Invalid(msg) => write!(f, "invalid store state: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e)
    }
}

// ---------------------------------------------------------------------------
// ApiError
// ---------------------------------------------------------------------------

/// Errors from the HTTP API layer.
#[derive(Debug)]
pub enum ApiError {
    /// Network / reqwest-level error.
    Http(reqwest::Error),
    /// Non-2xx status from the API, with the raw response body.
    Status(u16, String),
}

impl ApiError {
    /// Status code for `Status` errors.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status(code, _) => Some(*code),
            Self::Http(_) => None,
        }
    }

    /// Extract the server's structured `{"error": "..."}` message from a
    /// response body, falling back to the raw body when it is not JSON.
    pub fn server_message(body: &str) -> String {
        serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or_else(|| body.trim().to_string())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "http: {e}"),
            Self::Status(code, body) => write!(f, "status {code}: {body}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e)
    }
}

// ---------------------------------------------------------------------------
// SessionError — top-level
// ---------------------------------------------------------------------------

/// Failures surfaced by the session facade.
///
/// Refresh failures never appear here as a distinct in-band error for
/// ordinary callers: they tear the session down and the affected call
/// resolves with the original rejection (`AuthorizationRejected`).
#[derive(Debug)]
pub enum SessionError {
    /// Login rejected by the backend (bad credentials, malformed request).
    Credential(String),
    /// A saved session could not be revalidated; login is required again.
    RefreshExpired,
    /// Transient connectivity failure.
    Network(String),
    /// An authorized call was rejected and the retry path could not recover.
    AuthorizationRejected { status: u16, message: String },
    /// No session: login has not happened or the store holds no tokens.
    NotAuthenticated,
    Store(StoreError),
    Api(ApiError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credential(msg) => write!(f, "login rejected: {msg}"),
            Self::RefreshExpired => {
                write!(f, "saved session has expired or was revoked; log in again")
            }
            Self::Network(msg) => write!(f, "network: {msg}"),
            Self::AuthorizationRejected { status, message } => {
                write!(f, "authorization rejected ({status}): {message}")
            }
            Self::NotAuthenticated => write!(f, "not authenticated"),
            Self::Store(e) => write!(f, "store: {e}"),
            Self::Api(e) => write!(f, "api: {e}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
