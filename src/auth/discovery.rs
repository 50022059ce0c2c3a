// ! Authorization Server Discovery
// !
// ! Module fetches and caches the authorization server metadata published at
// ! the well-known discovery path. Only validated documents are cached.

use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::auth::errors::classify_discovery_status;
use crate::auth::types::DiscoveryDocument;
use crate::core::error::{AuthError, AuthResult};
use crate::core::logging::{ErrorContext, ErrorLogger};
use crate::transport::{DEFAULT_USER_AGENT, build_http_client};
use crate::utils::uri::{discovery_url, parse_endpoint_url};

/// How long a validated discovery document stays cached
pub const DISCOVERY_CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct CachedDocument {
    document: Arc<DiscoveryDocument>,
    fetched_at: Instant,
}

/// Discovery client for authorization server metadata
#[derive(Debug, Clone)]
pub struct DiscoveryClient {
    http_client: Client,
    discovery_url: String,
    allow_http: bool,
    cache_ttl: Duration,
    cache: Arc<RwLock<HashMap<String, CachedDocument>>>,
}

impl DiscoveryClient {
    /// Create a discovery client for an authorization server base URL
    ///
    /// `allow_http` permits plain HTTP for local mock servers.
    pub fn new(base_url: &str, allow_http: bool) -> AuthResult<Self> {
        let http_client = build_http_client(crate::auth::config::DEFAULT_TIMEOUT, allow_http)?;
        Self::with_client(http_client, base_url, allow_http)
    }

    /// Create with a preconfigured HTTP client
    pub fn with_client(http_client: Client, base_url: &str, allow_http: bool) -> AuthResult<Self> {
        parse_endpoint_url(base_url, allow_http)
            .map_err(|e| e.with_context("Invalid discovery base URL"))?;

        Ok(Self {
            http_client,
            discovery_url: discovery_url(base_url),
            allow_http,
            cache_ttl: DISCOVERY_CACHE_TTL,
            cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Override the cache TTL
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// The URL documents are fetched from
    pub fn discovery_url(&self) -> &str {
        &self.discovery_url
    }

    /// Fetch the discovery document, serving it from cache while fresh
    pub async fn fetch_discovery(&self) -> AuthResult<Arc<DiscoveryDocument>> {
        if let Some(document) = self.cached_document().await {
            debug!("Using cached discovery document for {}", self.discovery_url);
            return Ok(document);
        }

        debug!("Fetching discovery document from {}", self.discovery_url);

        let response = self
            .http_client
            .get(&self.discovery_url)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, DEFAULT_USER_AGENT)
            .send()
            .await
            .map_err(|e| AuthError::from(e).with_context("Discovery request failed"))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(classify_discovery_status(status, response.headers()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AuthError::from(e).with_context("Failed to read discovery response"))?;

        let document: DiscoveryDocument = serde_json::from_str(&body).map_err(|e| {
            AuthError::discovery(format!("Malformed discovery document: {e}")).with_cause(e)
        })?;
        document.validate(self.allow_http)?;

        let document = Arc::new(document);
        self.cache.write().await.insert(
            self.discovery_url.clone(),
            CachedDocument {
                document: Arc::clone(&document),
                fetched_at: Instant::now(),
            },
        );

        info!(
            "Discovered token endpoint {} (issuer {})",
            document.token_endpoint, document.issuer
        );
        Ok(document)
    }

    /// Resolve the token endpoint, falling back when discovery fails
    ///
    /// The fallback is used only if it is a well-formed URL; otherwise the
    /// discovery error is returned.
    pub async fn get_token_endpoint(&self, fallback: Option<&str>) -> AuthResult<String> {
        let error = match self.fetch_discovery().await {
            Ok(document) => return Ok(document.token_endpoint.clone()),
            Err(error) => error,
        };

        let context = ErrorContext::new("get_token_endpoint")
            .with_component("discovery")
            .with_extra("discovery_url", self.discovery_url.clone());

        let usable_fallback =
            fallback.filter(|url| parse_endpoint_url(url, self.allow_http).is_ok());

        match usable_fallback {
            Some(url) => {
                info!(
                    "Discovery unavailable ({}), using fallback token endpoint {}",
                    error.category(),
                    url
                );
                Ok(url.to_string())
            }
            None => {
                let error = error.with_context("Discovery failed and no fallback token URL is available");
                ErrorLogger::log_error(&error, &context);
                Err(error)
            }
        }
    }

    /// Scopes advertised by the server; empty when none are advertised
    pub async fn get_supported_scopes(&self) -> AuthResult<Vec<String>> {
        let document = self.fetch_discovery().await?;
        Ok(document.scopes_supported.clone().unwrap_or_default())
    }

    /// Check requested scopes against the advertised ones
    ///
    /// Best-effort: when the scope list cannot be fetched, or the server
    /// advertises none, validation is skipped.
    pub async fn validate_scopes(&self, requested: &[String]) -> AuthResult<()> {
        let supported = match self.get_supported_scopes().await {
            Ok(supported) => supported,
            Err(error) => {
                warn!("Skipping scope validation: {}", error);
                return Ok(());
            }
        };

        if supported.is_empty() {
            return Ok(());
        }

        let unsupported: Vec<&str> = requested
            .iter()
            .filter(|scope| !supported.contains(scope))
            .map(String::as_str)
            .collect();

        if unsupported.is_empty() {
            Ok(())
        } else {
            Err(AuthError::configuration(format!(
                "Scopes not supported by the authorization server: {}",
                unsupported.join(", ")
            )))
        }
    }

    /// Drop every cached document
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
        debug!("Discovery cache cleared");
    }

    async fn cached_document(&self) -> Option<Arc<DiscoveryDocument>> {
        let cache = self.cache.read().await;
        cache
            .get(&self.discovery_url)
            .filter(|entry| entry.fetched_at.elapsed() < self.cache_ttl)
            .map(|entry| Arc::clone(&entry.document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::AuthErrorKind;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn metadata(server: &MockServer) -> serde_json::Value {
        json!({
            "issuer": server.uri(),
            "token_endpoint": format!("{}/oauth2/token", server.uri()),
            "grant_types_supported": ["client_credentials"],
            "scopes_supported": ["infra.read", "infra.write"]
        })
    }

    #[test]
    fn test_rejects_insecure_base_url() {
        let err = DiscoveryClient::new("http://auth.example.com", false).unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_fetch_sends_expected_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .and(header("accept", "application/json"))
            .and(header("user-agent", DEFAULT_USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_json(metadata(&server)))
            .expect(1)
            .mount(&server)
            .await;

        let client = DiscoveryClient::new(&server.uri(), true).unwrap();
        let document = client.fetch_discovery().await.unwrap();

        assert_eq!(
            document.token_endpoint,
            format!("{}/oauth2/token", server.uri())
        );
    }

    #[tokio::test]
    async fn test_invalid_document_is_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": server.uri(),
                "token_endpoint": format!("{}/oauth2/token", server.uri()),
                "grant_types_supported": ["authorization_code"]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = DiscoveryClient::new(&server.uri(), true).unwrap();
        for _ in 0..2 {
            let err = client.fetch_discovery().await.unwrap_err();
            assert_eq!(err.kind(), AuthErrorKind::Discovery);
            assert!(!err.is_retryable());
        }
    }

    #[tokio::test]
    async fn test_malformed_json_is_discovery_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
            .mount(&server)
            .await;

        let client = DiscoveryClient::new(&server.uri(), true).unwrap();
        let err = client.fetch_discovery().await.unwrap_err();

        assert_eq!(err.kind(), AuthErrorKind::Discovery);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = DiscoveryClient::new(&server.uri(), true).unwrap();
        let err = client.fetch_discovery().await.unwrap_err();

        assert_eq!(err.kind(), AuthErrorKind::Server);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_malformed_fallback_is_not_used() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = DiscoveryClient::new(&server.uri(), true).unwrap();
        let err = client.get_token_endpoint(Some("not a url")).await.unwrap_err();

        assert_eq!(err.kind(), AuthErrorKind::Discovery);
        assert!(err.message().contains("no fallback"));

        let err = client.get_token_endpoint(None).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::Discovery);
    }

    #[tokio::test]
    async fn test_scope_validation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(metadata(&server)))
            .mount(&server)
            .await;

        let client = DiscoveryClient::new(&server.uri(), true).unwrap();
        assert_eq!(
            client.get_supported_scopes().await.unwrap(),
            vec!["infra.read".to_string(), "infra.write".to_string()]
        );
        assert!(client.validate_scopes(&["infra.read".to_string()]).await.is_ok());

        let err = client
            .validate_scopes(&["infra.admin".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::Configuration);
        assert!(err.message().contains("infra.admin"));
    }

    #[tokio::test]
    async fn test_scope_validation_skips_on_outage() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = DiscoveryClient::new(&server.uri(), true).unwrap();
        assert!(client.validate_scopes(&["anything".to_string()]).await.is_ok());
    }

    #[tokio::test]
    async fn test_clear_cache_forces_refetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(metadata(&server)))
            .expect(2)
            .mount(&server)
            .await;

        let client = DiscoveryClient::new(&server.uri(), true).unwrap();
        client.fetch_discovery().await.unwrap();
        client.fetch_discovery().await.unwrap();
        client.clear_cache().await;
        client.fetch_discovery().await.unwrap();
    }
}
