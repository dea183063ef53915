//! API client for the evensplit REST service.
//!
//! Every call goes through `ApiClient::execute`, which attaches the bearer
//! token and turns failures into an `ApiError`. The client never changes
//! the session itself; reacting to `Unauthorized` is the interceptor's job.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::auth::SessionStore;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

const LOGIN_PATH: &str = "/auth/login";
const SIGNUP_PATH: &str = "/auth/signup";

/// One outbound call. Built per request and dropped afterwards.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub endpoint: String,
    pub method: Method,
    pub body: Option<Value>,
    /// Overrides the session token when set
    pub token: Option<String>,
    pub requires_auth: bool,
}

impl ApiRequest {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            body: None,
            token: None,
            requires_auth: true,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    pub fn post(endpoint: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, endpoint).with_body(body)
    }

    pub fn put(endpoint: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, endpoint).with_body(body)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::DELETE, endpoint)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Mark the endpoint as callable without a session
    pub fn public(mut self) -> Self {
        self.requires_auth = false;
        self
    }
}

/// Body of a successful `/auth/login`
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub user: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignUpResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// API client for the evensplit service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: SessionStore,
}

impl ApiClient {
    /// Create a new API client with the default timeout
    pub fn new(base_url: impl Into<String>, session: SessionStore) -> Result<Self> {
        Self::with_timeout(base_url, session, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        session: SessionStore,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    fn auth_headers(token: Option<&str>) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::Unauthorized)?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Run a request and return the decoded JSON body.
    ///
    /// Authenticated requests without a token fail with `Unauthorized`
    /// before anything is sent. An empty success body decodes as `Null`.
    pub async fn execute(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let (status, body) = self.send(request).await?;
        Self::check_response(status, &body)
    }

    /// Send a request and read the raw status and body
    async fn send(&self, request: ApiRequest) -> Result<(StatusCode, String), ApiError> {
        let token = request
            .token
            .or_else(|| self.session.token())
            .filter(|t| !t.is_empty());

        if request.requires_auth && token.is_none() {
            debug!(endpoint = %request.endpoint, "No token for authenticated request");
            return Err(ApiError::Unauthorized);
        }

        let url = self.url(&request.endpoint);
        debug!(method = %request.method, url = %url, "Sending request");

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(Self::auth_headers(token.as_deref())?)
            .header(header::ACCEPT, "application/json");
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::from_transport(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::from_transport(&e))?;
        Ok((status, body))
    }

    /// Map a status and body to the decoded JSON or a classified error
    fn check_response(status: StatusCode, body: &str) -> Result<Value, ApiError> {
        if !status.is_success() {
            debug!(status = status.as_u16(), "Request failed");
            return Err(ApiError::from_status(status, body));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(body)
            .map_err(|e| ApiError::DomainError(format!("Invalid response: {}", e)))
    }

    async fn execute_as<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        Self::decode(self.execute(request).await?)
    }

    fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
        serde_json::from_value(value)
            .map_err(|e| ApiError::DomainError(format!("Invalid response: {}", e)))
    }

    fn to_body<B: Serialize>(body: &B) -> Result<Value, ApiError> {
        serde_json::to_value(body)
            .map_err(|e| ApiError::DomainError(format!("Invalid request body: {}", e)))
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.execute_as(ApiRequest::get(endpoint)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute_as(ApiRequest::post(endpoint, Self::to_body(body)?))
            .await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute_as(ApiRequest::put(endpoint, Self::to_body(body)?))
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.execute_as(ApiRequest::delete(endpoint)).await
    }

    // ===== Authentication =====

    /// Exchange credentials for a token. The session is left untouched;
    /// callers store the token with `SessionStore::set_token`.
    ///
    /// Refused credentials come back as `DomainError` with the server's
    /// reason, never `Unauthorized`, so they cannot end a live session.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let body = serde_json::json!({ "email": email, "password": password });
        let (status, body) = self
            .send(ApiRequest::post(LOGIN_PATH, body).public())
            .await?;
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::credentials_rejected(&body));
        }
        Self::decode(Self::check_response(status, &body)?)
    }

    pub async fn signup(&self, request: &SignUpRequest) -> Result<SignUpResponse, ApiError> {
        let body = Self::to_body(request)?;
        self.execute_as(ApiRequest::post(SIGNUP_PATH, body).public())
            .await
    }
}
