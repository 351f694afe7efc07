use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use super::session::Session;
use super::TokenPair;
use crate::envelope;
use crate::errors::{ClientError, Result};
use crate::storage::{FileStore, MemoryStore, SecureStore};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};

/// Backend used when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5113/api";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_USER_AGENT: &str = concat!("paynotice-client/", env!("CARGO_PKG_VERSION"));

const REFRESH_PATH: &str = "/auth/refresh";

/// Client options. Pass this into the `new()` function of the Client.
#[derive(Clone)]
pub struct ClientOptions {
    /// Backend API root, e.g. `https://pay.example.org/api`.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    pub user_agent: String,
    /// Where the credential pair and pending marker live (default: in memory).
    pub store: Option<Arc<dyn SecureStore>>,
    /// Override the HTTP transport (default: reqwest).
    pub transport: Option<Arc<dyn HttpTransport>>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            store: None,
            transport: None,
        }
    }
}

impl ClientOptions {
    /// Defaults overridden by `PAYNOTICE_API_URL`, `PAYNOTICE_TIMEOUT_SECS`
    /// and `PAYNOTICE_STORE_DIR`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut options = Self::default();

        if let Some(url) = lookup("PAYNOTICE_API_URL") {
            options.base_url = url;
        }

        if let Some(secs) = lookup("PAYNOTICE_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                ClientError::InvalidRequest(format!(
                    "PAYNOTICE_TIMEOUT_SECS is not a number: {}",
                    secs
                ))
            })?;
            options.timeout = Duration::from_secs(secs);
        }

        if let Some(dir) = lookup("PAYNOTICE_STORE_DIR") {
            let store = FileStore::open(&PathBuf::from(dir))?;
            options.store = Some(Arc::new(store));
        }

        Ok(options)
    }
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .field("store", &self.store.as_ref().map(|_| "<store>"))
            .field("transport", &self.transport.as_ref().map(|_| "<transport>"))
            .finish()
    }
}

/// One call against the backend, relative to the base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<String>,
    /// Sent as-is, except that `Content-Type` is always JSON and
    /// `Authorization` is replaced when a token is attached.
    pub headers: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    /// Attach a JSON body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        let body =
            serde_json::to_string(body).map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
        self.body = Some(body);
        Ok(self)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub user_name: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub user_name: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// Whatever the register endpoint chose to echo back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResult {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default, alias = "id")]
    pub user_id: Option<String>,
}

/// Payment-notice backend client.
///
/// Cheap to clone; clones share the session and transport.
#[derive(Clone)]
pub struct Client {
    base_url: String,
    session: Arc<Session>,
    transport: Arc<dyn HttpTransport>,
}

impl Client {
    /// Creates a new client.
    pub fn new(options: ClientOptions) -> Result<Self> {
        let parsed = Url::parse(&options.base_url)
            .map_err(|e| ClientError::InvalidBaseUrl(format!("{}: {}", options.base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::InvalidBaseUrl(format!(
                "unsupported scheme {}",
                parsed.scheme()
            )));
        }

        let store: Arc<dyn SecureStore> = options
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));

        let transport: Arc<dyn HttpTransport> = match options.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(options.timeout, &options.user_agent)?),
        };

        Ok(Self {
            base_url: options.base_url.trim_end_matches('/').to_string(),
            session: Arc::new(Session::new(store)),
            transport,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ==================== Auth ====================

    /// Log in and persist the issued pair.
    pub async fn login(&self, user_name: &str, password: &str) -> Result<TokenPair> {
        let request = ApiRequest::post("/Auth/login").json(&LoginRequest {
            user_name: user_name.to_string(),
            password: password.to_string(),
        })?;

        let response = self.dispatch(&request, None).await?;
        expect_success(&response)?;

        let tokens: TokenPair = envelope::decode_body(&response.body)?;
        // A new login replaces the previous identity, role included.
        self.session.clear()?;
        self.session.store_tokens(&tokens)?;

        tracing::info!(user = user_name, role = ?tokens.role, "logged in");
        Ok(tokens)
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<RegisterResult> {
        let request = ApiRequest::post("/auth/register").json(request)?;

        let response = self.dispatch(&request, None).await?;
        expect_success(&response)?;

        if response.body.trim().is_empty() {
            return Ok(RegisterResult::default());
        }
        Ok(response.json()?)
    }

    /// Tell the backend to drop the refresh token, then forget the pair
    /// locally. The backend call is best effort.
    pub async fn logout(&self) -> Result<()> {
        match self.send(&ApiRequest::post("/auth/logout")).await {
            Ok(response) if !response.is_success() => {
                tracing::debug!(status = response.status, "logout rejected by backend")
            }
            Err(err) => tracing::debug!(error = %err, "logout call failed"),
            Ok(_) => {}
        }

        self.force_logout()
    }

    /// Forget the credential pair without telling the backend.
    pub fn force_logout(&self) -> Result<()> {
        self.session.clear()?;
        tracing::info!("session cleared");
        Ok(())
    }

    // ==================== Gateway ====================

    /// Send `request` with the stored bearer token.
    ///
    /// A 401 triggers one refresh; if that produces a new pair the request
    /// is sent once more with the new token and that answer is returned.
    /// Otherwise the original 401 comes back untouched. Any other status is
    /// returned as-is. Transport failures are not retried.
    pub async fn send(&self, request: &ApiRequest) -> Result<HttpResponse> {
        let token = self.session.access_token();
        let response = self.dispatch(request, token.as_deref()).await?;

        if !response.is_unauthorized() {
            return Ok(response);
        }

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            "401, attempting token refresh"
        );

        match self.refresh_after_unauthorized(token.as_deref()).await {
            Some(fresh) => self.dispatch(request, Some(&fresh)).await,
            None => Ok(response),
        }
    }

    /// Exchange the stored refresh token for a new pair.
    pub async fn refresh(&self) -> Result<TokenPair> {
        let _guard = self.session.lock_refresh().await;
        self.refresh_locked().await
    }

    /// Returns the token to retry with, or `None` when no retry should happen.
    async fn refresh_after_unauthorized(&self, used: Option<&str>) -> Option<String> {
        let _guard = self.session.lock_refresh().await;

        // Another call may have refreshed while this one waited on the lock.
        if let Some(current) = self.session.access_token() {
            if used != Some(current.as_str()) {
                tracing::debug!("token already refreshed by a concurrent call");
                return Some(current);
            }
        }

        match self.refresh_locked().await {
            Ok(tokens) => Some(tokens.access_token),
            Err(ClientError::NotLoggedIn) => {
                tracing::debug!("no refresh token stored");
                None
            }
            Err(err) => {
                tracing::warn!(error = %err, "token refresh failed");
                None
            }
        }
    }

    /// Caller must hold the session refresh lock.
    async fn refresh_locked(&self) -> Result<TokenPair> {
        let refresh_token = self.session.refresh_token().ok_or(ClientError::NotLoggedIn)?;

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct RefreshRequest<'a> {
            refresh_token: &'a str,
        }

        let request = ApiRequest::post(REFRESH_PATH).json(&RefreshRequest {
            refresh_token: &refresh_token,
        })?;

        let response = self.dispatch(&request, None).await?;

        if !response.is_success() {
            // The backend refused this refresh token outright; it will not
            // become valid again.
            if matches!(response.status, 400 | 401 | 403) {
                tracing::info!(
                    status = response.status,
                    "refresh token rejected, clearing session"
                );
                self.session.clear()?;
            }
            return Err(ClientError::Api {
                status: response.status,
                message: envelope::error_message(&response.body, response.status),
            });
        }

        let tokens: TokenPair = envelope::decode_body(&response.body)?;
        // A new login replaces the previous identity, role included.
        self.session.clear()?;
        self.session.store_tokens(&tokens)?;

        tracing::debug!("token pair refreshed");
        Ok(tokens)
    }

    /// One round trip, no refresh handling.
    async fn dispatch(&self, request: &ApiRequest, token: Option<&str>) -> Result<HttpResponse> {
        let mut headers: Vec<(String, String)> = request
            .headers
            .iter()
            .filter(|(name, _)| {
                !name.eq_ignore_ascii_case("content-type")
                    && !(token.is_some() && name.eq_ignore_ascii_case("authorization"))
            })
            .cloned()
            .collect();

        if let Some(token) = token {
            headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }
        headers.push(("Content-Type".to_string(), "application/json".to_string()));

        let http_request = HttpRequest {
            method: request.method,
            url: self.url(&request.path),
            headers,
            body: request.body.clone(),
        };

        tracing::debug!(method = %http_request.method, url = %http_request.url, "sending request");
        let response = self.transport.execute(http_request).await?;
        tracing::debug!(status = response.status, "received response");

        Ok(response)
    }

    fn url(&self, path: &str) -> String {
        // Append a / to path if it does not start with one
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    // ==================== Typed helpers ====================

    /// Send through the gateway and decode a bare or enveloped body.
    pub async fn call_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let response = self.send(&request).await?;
        expect_success(&response)?;
        envelope::decode_body(&response.body)
    }

    /// Send through the gateway, ignoring the body on success.
    pub async fn call(&self, request: ApiRequest) -> Result<()> {
        let response = self.send(&request).await?;
        expect_success(&response)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.call_json(ApiRequest::get(path)).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call_json(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call_json(ApiRequest::put(path).json(body)?).await
    }

    pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call_json(ApiRequest::patch(path).json(body)?).await
    }
}

/// Map a non-2xx response to `ClientError::Api`.
pub(crate) fn expect_success(response: &HttpResponse) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }
    Err(ClientError::Api {
        status: response.status,
        message: envelope::error_message(&response.body, response.status),
    })
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .field("session", &self.session)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_from_lookup() {
        let options = ClientOptions::from_lookup(|key| match key {
            "PAYNOTICE_API_URL" => Some("https://pay.example.org/api/".to_string()),
            "PAYNOTICE_TIMEOUT_SECS" => Some("5".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(options.base_url, "https://pay.example.org/api/");
        assert_eq!(options.timeout, Duration::from_secs(5));
        assert!(options.store.is_none());
    }

    #[test]
    fn options_reject_bad_timeout() {
        let result = ClientOptions::from_lookup(|key| {
            (key == "PAYNOTICE_TIMEOUT_SECS").then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(ClientError::InvalidRequest(_))));
    }

    #[test]
    fn new_rejects_non_http_base_url() {
        let options = ClientOptions {
            base_url: "ftp://example.org".to_string(),
            ..Default::default()
        };
        assert!(matches!(Client::new(options), Err(ClientError::InvalidBaseUrl(_))));
    }

    #[test]
    fn url_joins_with_and_without_leading_slash() {
        let client = Client::new(ClientOptions {
            base_url: "http://localhost:5113/api/".to_string(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(client.url("/auth/users"), "http://localhost:5113/api/auth/users");
        assert_eq!(client.url("auth/users"), "http://localhost:5113/api/auth/users");
    }
}
