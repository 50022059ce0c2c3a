// ! HTTP client with bearer authorization
// !
// ! Module wraps `reqwest` so every outgoing API request carries a valid
// ! bearer token, refreshing and retrying once when the API answers 401.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::validation::MANAGED_HEADERS;
use crate::core::error::{AuthError, AuthResult};
use crate::transport::DEFAULT_USER_AGENT;
use crate::transport::traits::TokenProvider;
use crate::utils::uri::join_api_path;

/// HTTP client that attaches `Authorization: Bearer <token>` to every request
#[derive(Clone)]
pub struct AuthorizedHttpClient {
    /// Shared HTTP client
    inner: Client,
    /// Token source
    tokens: Arc<dyn TokenProvider>,
    /// Base URL relative paths are joined onto
    api_url: String,
    /// Whether `api_url` is the test environment
    is_test_environment: bool,
    /// Custom headers sent on every request
    headers: HeaderMap,
}

impl AuthorizedHttpClient {
    /// Create a client sending requests to `api_url`
    pub fn new(inner: Client, tokens: Arc<dyn TokenProvider>, api_url: impl Into<String>) -> Self {
        Self {
            inner,
            tokens,
            api_url: api_url.into(),
            is_test_environment: false,
            headers: HeaderMap::new(),
        }
    }

    /// Mark the API URL as the test environment
    pub fn with_test_environment(mut self, is_test: bool) -> Self {
        self.is_test_environment = is_test;
        self
    }

    /// Send these headers on every request
    ///
    /// Headers managed by the client and invalid names or values are skipped.
    pub fn with_headers(mut self, headers: &BTreeMap<String, String>) -> Self {
        for (name, value) in headers {
            if MANAGED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                debug!("Ignoring managed header '{}'", name);
                continue;
            }
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    self.headers.insert(name, value);
                }
                _ => warn!("Ignoring invalid custom header '{}'", name),
            }
        }
        self
    }

    /// API base URL
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Whether requests go to the test environment
    pub fn is_test_environment(&self) -> bool {
        self.is_test_environment
    }

    /// Start a request; relative paths are joined onto the API URL
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.inner
            .request(method, join_api_path(&self.api_url, path))
    }

    /// Start a GET request
    pub fn get(&self, path: &str) -> RequestBuilder {
        self.request(Method::GET, path)
    }

    /// Start a POST request
    pub fn post(&self, path: &str) -> RequestBuilder {
        self.request(Method::POST, path)
    }

    /// Start a PUT request
    pub fn put(&self, path: &str) -> RequestBuilder {
        self.request(Method::PUT, path)
    }

    /// Start a PATCH request
    pub fn patch(&self, path: &str) -> RequestBuilder {
        self.request(Method::PATCH, path)
    }

    /// Start a DELETE request
    pub fn delete(&self, path: &str) -> RequestBuilder {
        self.request(Method::DELETE, path)
    }

    /// Send a request with authorization
    ///
    /// A 401 response triggers a refresh of the rejected token and a single
    /// retry. Requests with streaming bodies cannot be replayed and return
    /// the 401 response as-is. Other statuses are returned to the caller.
    pub async fn send(&self, request: RequestBuilder) -> AuthResult<Response> {
        let replay = request.try_clone();
        let token = self.tokens.bearer_token().await?;
        let response = self.dispatch(request, &token).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(replay) = replay else {
            warn!("API rejected the bearer token; request body cannot be replayed");
            return Ok(response);
        };

        debug!("API rejected the bearer token, refreshing and retrying once");
        let fresh = self
            .tokens
            .refresh_rejected(&token)
            .await
            .map_err(|e| e.with_context("during token refresh after HTTP 401"))?;

        self.dispatch(replay, &fresh).await
    }

    async fn dispatch(&self, request: RequestBuilder, token: &str) -> AuthResult<Response> {
        request
            .headers(self.headers.clone())
            .header(USER_AGENT, DEFAULT_USER_AGENT)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuthError::from(e).with_context("API request failed"))
    }
}

impl fmt::Debug for AuthorizedHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedHttpClient")
            .field("api_url", &self.api_url)
            .field("is_test_environment", &self.is_test_environment)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}
