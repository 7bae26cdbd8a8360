//! reqwest implementation of the parish API.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ApiError;
use crate::types::UserProfile;

use super::{ApiRequest, ApiResponse, HttpMethod, LoginResponse, ParishApi, RefreshResponse};

/// HTTP client for the parish backend.
pub struct HttpParishApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpParishApi {
    /// Build a client with an explicit request timeout. Every exchange
    /// carries the timeout; a client without one is never constructed.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sacristan/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Convert a non-2xx response into `ApiError::Status` with its body.
async fn status_error(response: reqwest::Response) -> ApiError {
    let code = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ApiError::Status(code, body)
}

#[async_trait]
impl ParishApi for HttpParishApi {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let response = self
            .http
            .post(self.endpoint("/api/auth/login"))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(response.json().await?)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError> {
        let response = self
            .http
            .post(self.endpoint("/api/auth/refresh"))
            .bearer_auth(refresh_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(response.json().await?)
    }

    async fn logout(&self, access_token: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.endpoint("/api/auth/logout"))
            .bearer_auth(access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(())
    }

    async fn profile(&self, access_token: &str) -> Result<UserProfile, ApiError> {
        let response = self
            .http
            .get(self.endpoint("/api/users/profile"))
            .bearer_auth(access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(response.json().await?)
    }

    async fn call(
        &self,
        request: &ApiRequest,
        access_token: &str,
    ) -> Result<ApiResponse, ApiError> {
        let url = self.endpoint(&request.path);
        let mut builder = match request.method {
            HttpMethod::Get => self.http.get(url),
            HttpMethod::Post => self.http.post(url),
            HttpMethod::Put => self.http.put(url),
            HttpMethod::Delete => self.http.delete(url),
        };
        builder = builder.bearer_auth(access_token);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        // Tolerate empty or non-JSON success bodies.
        let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);
        Ok(ApiResponse { status, body })
    }
}
