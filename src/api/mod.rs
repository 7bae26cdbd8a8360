//! HTTP boundary to the parish backend.
//!
//! The session core talks to [`ParishApi`], never to reqwest directly, so
//! tests can drive the token lifecycle against a scripted backend.

mod http;

pub use http::HttpParishApi;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ApiError;
use crate::types::UserProfile;

/// Method subset the parish API uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

/// An authorized business-data request, relative to the backend origin.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: HttpMethod,
    /// Absolute path, e.g. `/api/parroquias`.
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            body: Some(body),
        }
    }
}

/// Successful response to an authorized call.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

/// Login exchange payload.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserProfile,
}

/// Refresh exchange payload. The server rotates the refresh token and may
/// return the profile; both are optional on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

/// The authentication and data surface of the backend.
///
/// Non-2xx responses surface as [`ApiError::Status`]; a 401 from `call` is
/// the sole trigger for the facade's reactive refresh path.
#[async_trait]
pub trait ParishApi: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError>;
    /// Authorized by the refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError>;
    /// Best-effort revocation, authorized by the access token.
    async fn logout(&self, access_token: &str) -> Result<(), ApiError>;
    /// Current profile for the bearer of `access_token`.
    async fn profile(&self, access_token: &str) -> Result<UserProfile, ApiError>;
    /// Any authorized business-data call.
    async fn call(&self, request: &ApiRequest, access_token: &str)
        -> Result<ApiResponse, ApiError>;
}
