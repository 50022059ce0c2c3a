// ! Client-Credentials Authorization Client
// !
// ! Module provides the main authentication client. It validates the
// ! configuration, resolves tenant endpoints, exchanges client credentials
// ! for access tokens and keeps the token cache fresh. Concurrent refreshes
// ! are collapsed into a single token request.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{Instrument, debug, info, warn};

use crate::auth::config::AuthConfig;
use crate::auth::discovery::{DISCOVERY_CACHE_TTL, DiscoveryClient};
use crate::auth::endpoints::{EndpointResolver, ResolvedEndpoints};
use crate::auth::errors::classify_token_status;
use crate::auth::token::{CachedToken, DEFAULT_TOKEN_LIFETIME, TokenCache};
use crate::auth::types::{CLIENT_CREDENTIALS_GRANT, TokenResponse};
use crate::auth::validation::ConfigValidator;
use crate::core::error::{AuthError, AuthResult};
use crate::core::logging::{ErrorContext, ErrorLogger};
use crate::core::retry::{RetryConfig, RetryPolicy};
use crate::transport::build_http_client;
use crate::transport::http_auth::AuthorizedHttpClient;
use crate::transport::traits::TokenProvider;

/// Lifecycle of an [`AuthClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthState {
    /// No token has been requested yet
    Uninitialized,
    /// First token request in progress
    Authenticating,
    /// A token is cached
    Authenticated,
    /// A token is cached and a replacement is being requested
    RefreshInFlight,
    /// Credentials or configuration were rejected; terminal for this instance
    Failed,
}

impl AuthState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Authenticating,
            2 => Self::Authenticated,
            3 => Self::RefreshInFlight,
            4 => Self::Failed,
            _ => Self::Uninitialized,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Authenticating => 1,
            Self::Authenticated => 2,
            Self::RefreshInFlight => 3,
            Self::Failed => 4,
        }
    }
}

/// Why a refresh was requested
#[derive(Debug, Clone, Copy)]
enum RefreshMode<'a> {
    /// Refresh unless a fresh token is already cached
    IfNeeded,
    /// The API rejected this token; refresh unless it was already replaced
    Rejected(&'a str),
}

/// Outcome of the latest refresh, shared with callers that waited on it
#[derive(Default)]
struct RefreshSlot {
    last_token: Option<CachedToken>,
    last_error: Option<AuthError>,
    failure: Option<AuthError>,
}

/// Restores a settled state if a refresh future is dropped mid-flight
struct InFlightGuard<'a> {
    client: &'a AuthClient,
    had_token: bool,
    settled: bool,
}

impl InFlightGuard<'_> {
    fn settle(mut self, state: AuthState) {
        self.client.set_state(state);
        self.settled = true;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let has_token = self
            .client
            .inner
            .cache
            .try_has_valid()
            .unwrap_or(self.had_token);
        self.client.set_state(if has_token {
            AuthState::Authenticated
        } else {
            AuthState::Uninitialized
        });
        debug!("Token refresh cancelled before completion");
    }
}

struct AuthClientInner {
    config: AuthConfig,
    endpoints: ResolvedEndpoints,
    http_client: Client,
    discovery: Option<DiscoveryClient>,
    cache: TokenCache,
    retry: RetryPolicy,
    state: AtomicU8,
    refresh: Mutex<RefreshSlot>,
    generation: AtomicU64,
}

/// OAuth2 client-credentials client
///
/// Cheap to clone; clones share the token cache, discovery cache and
/// refresh coordination.
#[derive(Clone)]
pub struct AuthClient {
    inner: Arc<AuthClientInner>,
}

/// Builder for [`AuthClient`]
pub struct AuthClientBuilder {
    config: AuthConfig,
    retry_config: Option<RetryConfig>,
    http_client: Option<Client>,
    discovery_ttl: Duration,
}

impl AuthClientBuilder {
    /// Start from a configuration
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            retry_config: None,
            http_client: None,
            discovery_ttl: DISCOVERY_CACHE_TTL,
        }
    }

    /// Override the retry schedule derived from `max_retries`
    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = Some(retry_config);
        self
    }

    /// Use a preconfigured HTTP client
    pub fn with_http_client(mut self, http_client: Client) -> Self {
        self.http_client = Some(http_client);
        self
    }

    /// Override how long discovery documents are cached
    pub fn with_discovery_ttl(mut self, ttl: Duration) -> Self {
        self.discovery_ttl = ttl;
        self
    }

    /// Validate the configuration and build the client
    ///
    /// No network call is made.
    pub fn build(self) -> AuthResult<AuthClient> {
        let config = self.config;

        let endpoints = EndpointResolver::from_config(&config)
            .resolve(&config.tenant_id, config.environment.as_deref().unwrap_or(""))?;

        for warning in ConfigValidator::validate(&config).into_result()? {
            warn!("Authentication configuration: {}", warning);
        }

        let allow_http = config.is_mock();
        let http_client = match self.http_client {
            Some(client) => client,
            None => build_http_client(config.timeout, allow_http)?,
        };

        let discovery = match (&config.base_url, &config.token_url) {
            (Some(base_url), None) if !config.disable_discovery => Some(
                DiscoveryClient::with_client(http_client.clone(), base_url, allow_http)?
                    .with_cache_ttl(self.discovery_ttl),
            ),
            _ => None,
        };

        let retry = RetryPolicy::new(
            self.retry_config
                .unwrap_or_else(|| RetryConfig::from_max_retries(config.max_retries)),
        );

        info!(
            "Authentication client ready for tenant {} (api: {}, test environment: {})",
            config.tenant_id, endpoints.api_url, endpoints.is_test_environment
        );

        Ok(AuthClient {
            inner: Arc::new(AuthClientInner {
                config,
                endpoints,
                http_client,
                discovery,
                cache: TokenCache::new(),
                retry,
                state: AtomicU8::new(AuthState::Uninitialized.as_u8()),
                refresh: Mutex::new(RefreshSlot::default()),
                generation: AtomicU64::new(0),
            }),
        })
    }
}

impl AuthClient {
    /// Create a client with default retry and HTTP settings
    pub fn new(config: AuthConfig) -> AuthResult<Self> {
        AuthClientBuilder::new(config).build()
    }

    /// Start building a client
    pub fn builder(config: AuthConfig) -> AuthClientBuilder {
        AuthClientBuilder::new(config)
    }

    /// Obtain a token, checking requested scopes against discovery first
    ///
    /// Does nothing if a fresh token is already cached.
    pub async fn authenticate(&self) -> AuthResult<()> {
        if let Some(discovery) = &self.inner.discovery {
            if !self.inner.config.scopes.is_empty() {
                discovery.validate_scopes(&self.inner.config.scopes).await?;
            }
        }

        self.refresh(RefreshMode::IfNeeded).await.map(|_| ())
    }

    /// Return a valid access token, refreshing transparently
    ///
    /// A cached token that is not yet due for refresh is returned without
    /// any network call. If a due token cannot be refreshed because of a
    /// transient failure it is still returned while it remains valid.
    pub async fn token(&self) -> AuthResult<String> {
        let Some(cached) = self.inner.cache.get().await else {
            let token = self.refresh(RefreshMode::IfNeeded).await?;
            return Ok(token.access_token().to_string());
        };

        if !cached.is_due_for_refresh() {
            return Ok(cached.access_token().to_string());
        }

        match self.refresh(RefreshMode::IfNeeded).await {
            Ok(token) => Ok(token.access_token().to_string()),
            Err(error) if !error.is_fatal() && cached.is_valid() => {
                warn!(
                    "Proactive token refresh failed ({}), using cached token until {}",
                    error.category(),
                    cached.expires_at
                );
                Ok(cached.access_token().to_string())
            }
            Err(error) => Err(error),
        }
    }

    /// HTTP client for API calls that attaches a fresh bearer token
    pub fn http_client(&self) -> AuthorizedHttpClient {
        let provider: Arc<dyn TokenProvider> = Arc::new(self.clone());
        AuthorizedHttpClient::new(
            self.inner.http_client.clone(),
            provider,
            self.inner.endpoints.api_url.clone(),
        )
        .with_test_environment(self.inner.endpoints.is_test_environment)
        .with_headers(&self.inner.config.custom_headers)
    }

    /// Current lifecycle state
    pub fn state(&self) -> AuthState {
        AuthState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Whether a valid token is cached
    pub async fn is_authenticated(&self) -> bool {
        self.inner.cache.get().await.is_some()
    }

    /// The cached token, if valid
    pub async fn cached_token(&self) -> Option<CachedToken> {
        self.inner.cache.get().await
    }

    /// Drop the cached token so the next call fetches a new one
    pub async fn invalidate(&self) {
        self.inner.cache.clear().await;
        debug!("Token cache invalidated");
    }

    /// Resolved endpoints
    pub fn endpoints(&self) -> &ResolvedEndpoints {
        &self.inner.endpoints
    }

    /// The configuration this client was built from
    pub fn config(&self) -> &AuthConfig {
        &self.inner.config
    }

    /// Discovery client, when discovery is in use
    pub fn discovery(&self) -> Option<&DiscoveryClient> {
        self.inner.discovery.as_ref()
    }

    fn set_state(&self, state: AuthState) {
        self.inner.state.store(state.as_u8(), Ordering::Release);
    }

    /// Refresh the token, collapsing concurrent callers
    ///
    /// Callers queue on the refresh lock. A caller that acquires it after
    /// another refresh completed adopts that outcome instead of issuing a
    /// new request. The lock is never held by the token cache itself.
    async fn refresh(&self, mode: RefreshMode<'_>) -> AuthResult<CachedToken> {
        let inner = &self.inner;
        let observed = inner.generation.load(Ordering::Acquire);
        let mut slot = inner.refresh.lock().await;

        if let Some(failure) = &slot.failure {
            return Err(failure.clone());
        }

        let refreshed_meanwhile = inner.generation.load(Ordering::Acquire) != observed;
        if refreshed_meanwhile {
            if let Some(error) = &slot.last_error {
                return Err(error.clone());
            }
            if let (RefreshMode::IfNeeded, Some(token)) = (mode, &slot.last_token) {
                if token.is_valid() {
                    return Ok(token.clone());
                }
            }
        }

        let cached = inner.cache.get().await;
        if let Some(token) = &cached {
            let reusable = match mode {
                RefreshMode::IfNeeded => !token.is_due_for_refresh(),
                RefreshMode::Rejected(rejected) => token.access_token() != rejected,
            };
            if reusable {
                return Ok(token.clone());
            }
        }

        let mut had_token = cached.is_some();
        if let RefreshMode::Rejected(rejected) = mode {
            if inner.cache.clear_if_matches(rejected).await {
                had_token = false;
            }
        }

        self.set_state(if had_token {
            AuthState::RefreshInFlight
        } else {
            AuthState::Authenticating
        });
        let guard = InFlightGuard {
            client: self,
            had_token,
            settled: false,
        };

        let outcome = self
            .fetch_token()
            .await
            .map_err(|e| e.with_context("during token refresh"));
        inner.generation.fetch_add(1, Ordering::AcqRel);

        match outcome {
            Ok(token) => {
                inner.cache.replace(token.clone()).await;
                slot.last_token = Some(token.clone());
                slot.last_error = None;
                guard.settle(AuthState::Authenticated);
                info!(
                    "Obtained access token for tenant {} (expires at {})",
                    inner.config.tenant_id, token.expires_at
                );
                Ok(token)
            }
            Err(error) => {
                slot.last_token = None;
                if error.is_fatal() {
                    inner.cache.clear().await;
                    slot.failure = Some(error.clone());
                    guard.settle(AuthState::Failed);
                } else if inner.cache.get().await.is_some() {
                    guard.settle(AuthState::Authenticated);
                } else {
                    guard.settle(AuthState::Uninitialized);
                }
                error.log_with_context(
                    &ErrorContext::new("token_refresh")
                        .with_component("auth_client")
                        .with_tenant(inner.config.tenant_id.clone()),
                );
                slot.last_error = Some(error.clone());
                Err(error)
            }
        }
    }

    /// Resolve the token endpoint and exchange credentials, with retries
    async fn fetch_token(&self) -> AuthResult<CachedToken> {
        let endpoint = self.resolve_token_endpoint().await?;
        let context = ErrorContext::new("token_exchange")
            .with_component("auth_client")
            .with_tenant(self.inner.config.tenant_id.clone())
            .with_extra("token_endpoint", endpoint.clone());

        let span = ErrorLogger::create_operation_span(&context);
        let endpoint = endpoint.as_str();
        self.inner
            .retry
            .execute(context, move || self.exchange_credentials(endpoint))
            .instrument(span)
            .await
    }

    async fn resolve_token_endpoint(&self) -> AuthResult<String> {
        let inner = &self.inner;
        if let Some(token_url) = &inner.config.token_url {
            return Ok(token_url.clone());
        }

        match &inner.discovery {
            Some(discovery) => {
                discovery
                    .get_token_endpoint(Some(&inner.endpoints.auth_url))
                    .await
            }
            None => Ok(inner.endpoints.auth_url.clone()),
        }
    }

    async fn exchange_credentials(&self, endpoint: &str) -> AuthResult<CachedToken> {
        let config = &self.inner.config;
        let scope = config.scope_param();

        let mut form = vec![
            ("grant_type", CLIENT_CREDENTIALS_GRANT),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.expose_secret().as_str()),
        ];
        if let Some(scope) = scope.as_deref() {
            form.push(("scope", scope));
        }

        debug!("Requesting access token from {}", endpoint);

        let response = self
            .inner
            .http_client
            .post(endpoint)
            .header(ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::from(e).with_context("Token request failed"))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::from(e).with_context("Failed to read token response"))?;

        if status != StatusCode::OK {
            return Err(classify_token_status(status, &headers, &body));
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            AuthError::server(format!("Token endpoint returned a malformed response: {e}"))
                .with_retryable(false)
                .with_cause(e)
        })?;

        if parsed.access_token.is_empty() {
            return Err(
                AuthError::server("Token endpoint returned an empty access token")
                    .with_retryable(false),
            );
        }

        let lifetime = match parsed.expires_in {
            Some(0) => {
                return Err(AuthError::server(
                    "Token endpoint returned an access token that has already expired",
                )
                .with_retryable(false));
            }
            Some(seconds) => Duration::from_secs(seconds),
            None => DEFAULT_TOKEN_LIFETIME,
        };

        Ok(CachedToken::new(parsed.access_token, parsed.token_type, lifetime).with_scope(parsed.scope))
    }
}

#[async_trait]
impl TokenProvider for AuthClient {
    async fn bearer_token(&self) -> AuthResult<String> {
        self.token().await
    }

    async fn refresh_rejected(&self, rejected: &str) -> AuthResult<String> {
        let token = self.refresh(RefreshMode::Rejected(rejected)).await?;
        Ok(token.access_token().to_string())
    }
}

impl fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthClient")
            .field("tenant_id", &self.inner.config.tenant_id)
            .field("endpoints", &self.inner.endpoints)
            .field("state", &self.state())
            .finish()
    }
}
