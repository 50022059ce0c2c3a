// ! Endpoint resolution
// !
// ! Module derives the authorization and API URLs for a tenant. Resolution
// ! is pure: the same tenant id and overrides always produce the same
// ! endpoints.

use std::fmt;
use std::str::FromStr;

use crate::auth::config::AuthConfig;
use crate::core::error::{AuthError, AuthResult};

/// Well-known token endpoint of the Nimbus authorization server
pub const AUTH_TOKEN_URL: &str = "https://auth.nimbus.cloud/oauth2/token";

/// Live API host
pub const LIVE_API_URL: &str = "https://api.nimbus.cloud";

/// Test API host
pub const TEST_API_URL: &str = "https://api.test.nimbus.cloud";

/// Tenant id fragments that select the test API host
///
/// Matching is a case-insensitive substring search, so a live tenant whose
/// id happens to contain one of these is routed to the test host unless an
/// explicit environment is configured.
pub const TEST_TENANT_MARKERS: [&str; 3] = ["test", "dev", "staging"];

/// Target API environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
    /// Production API host
    Live,
    /// Test API host, for tenants that are not serving real workloads
    Test,
}

impl Environment {
    /// API base URL for this environment
    pub fn api_url(self) -> &'static str {
        match self {
            Self::Live => LIVE_API_URL,
            Self::Test => TEST_API_URL,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Test => write!(f, "test"),
        }
    }
}

impl FromStr for Environment {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" | "prod" | "production" => Ok(Self::Live),
            "test" | "dev" | "development" | "staging" | "sandbox" => Ok(Self::Test),
            other => Err(AuthError::configuration(format!(
                "Unknown environment '{other}', expected 'live' or 'test'"
            ))),
        }
    }
}

/// Parse an environment name such as `live`, `production` or `test`
pub fn parse_environment(name: &str) -> AuthResult<Environment> {
    name.parse()
}

/// Endpoints derived for one client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoints {
    /// Authorization server URL; the token endpoint or the mock server
    pub auth_url: String,
    /// API base URL
    pub api_url: String,
    /// Whether requests target the test environment
    pub is_test_environment: bool,
    /// Whether a mock server override is in effect
    pub is_mock: bool,
}

/// Derives auth and API URLs from a tenant id
#[derive(Debug, Clone, Default)]
pub struct EndpointResolver {
    mock_url: Option<String>,
    force_test: bool,
}

impl EndpointResolver {
    /// Resolver without overrides
    pub fn new() -> Self {
        Self::default()
    }

    /// Route everything to a mock server
    pub fn with_mock_url(mut self, mock_url: impl Into<String>) -> Self {
        self.mock_url = Some(mock_url.into());
        self
    }

    /// Always select the test API host
    pub fn with_forced_test(mut self, force_test: bool) -> Self {
        self.force_test = force_test;
        self
    }

    /// Resolver carrying the overrides of a configuration
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            mock_url: config.mock_url.clone(),
            force_test: config.force_test_environment,
        }
    }

    /// Resolve the endpoints for a tenant
    ///
    /// `explicit_env` may be empty. When set it overrides the tenant id
    /// heuristic; the forced-test flag still wins over it.
    pub fn resolve(&self, tenant_id: &str, explicit_env: &str) -> AuthResult<ResolvedEndpoints> {
        let tenant_id = tenant_id.trim();
        if tenant_id.is_empty() {
            return Err(AuthError::tenant_resolution("Tenant id is empty"));
        }
        if !tenant_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(AuthError::tenant_resolution(format!(
                "Tenant id '{tenant_id}' may only contain letters, digits and hyphens"
            )));
        }

        if let Some(mock_url) = &self.mock_url {
            return Ok(ResolvedEndpoints {
                auth_url: mock_url.clone(),
                api_url: mock_url.clone(),
                is_test_environment: true,
                is_mock: true,
            });
        }

        let environment = if self.force_test {
            Environment::Test
        } else if !explicit_env.trim().is_empty() {
            parse_environment(explicit_env)?
        } else if is_test_tenant(tenant_id) {
            Environment::Test
        } else {
            Environment::Live
        };

        Ok(ResolvedEndpoints {
            auth_url: AUTH_TOKEN_URL.to_string(),
            api_url: environment.api_url().to_string(),
            is_test_environment: environment == Environment::Test,
            is_mock: false,
        })
    }
}

/// Whether the tenant id carries one of the test markers
pub fn is_test_tenant(tenant_id: &str) -> bool {
    let lower = tenant_id.to_ascii_lowercase();
    TEST_TENANT_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::AuthErrorKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tenant_heuristic() {
        let resolver = EndpointResolver::new();

        let test = resolver.resolve("acme-test-01", "").unwrap();
        assert_eq!(test.api_url, TEST_API_URL);
        assert_eq!(test.auth_url, AUTH_TOKEN_URL);
        assert!(test.is_test_environment);

        let live = resolver.resolve("acme-prod-01", "").unwrap();
        assert_eq!(live.api_url, LIVE_API_URL);
        assert_eq!(live.auth_url, AUTH_TOKEN_URL);
        assert!(!live.is_test_environment);

        assert!(resolver.resolve("ACME-STAGING", "").unwrap().is_test_environment);
        assert!(resolver.resolve("devops-co", "").unwrap().is_test_environment);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let resolver = EndpointResolver::new();
        assert_eq!(
            resolver.resolve("acme-test-01", "").unwrap(),
            resolver.resolve("acme-test-01", "").unwrap()
        );
    }

    #[test]
    fn test_empty_tenant_fails() {
        let err = EndpointResolver::new().resolve("", "").unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::TenantResolution);
        assert!(!err.is_retryable());

        let err = EndpointResolver::new().resolve("acme/prod", "").unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::TenantResolution);
    }

    #[test]
    fn test_explicit_environment_overrides_heuristic() {
        let resolver = EndpointResolver::new();

        let live = resolver.resolve("contest-winners", "production").unwrap();
        assert!(!live.is_test_environment);

        let test = resolver.resolve("acme-prod-01", "test").unwrap();
        assert_eq!(test.api_url, TEST_API_URL);

        let err = resolver.resolve("acme-prod-01", "qa-lab").unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::Configuration);
    }

    #[test]
    fn test_forced_test_environment() {
        let resolver = EndpointResolver::new().with_forced_test(true);
        let endpoints = resolver.resolve("acme-prod-01", "live").unwrap();

        assert!(endpoints.is_test_environment);
        assert_eq!(endpoints.api_url, TEST_API_URL);
    }

    #[test]
    fn test_mock_override_is_used_verbatim() {
        let resolver = EndpointResolver::new().with_mock_url("http://127.0.0.1:8080");
        let endpoints = resolver.resolve("acme-prod-01", "").unwrap();

        assert_eq!(endpoints.auth_url, "http://127.0.0.1:8080");
        assert_eq!(endpoints.api_url, "http://127.0.0.1:8080");
        assert!(endpoints.is_test_environment);
        assert!(endpoints.is_mock);
    }

    #[test]
    fn test_environment_names() {
        assert_eq!(parse_environment("LIVE").unwrap(), Environment::Live);
        assert_eq!(parse_environment("sandbox").unwrap(), Environment::Test);
        assert_eq!(Environment::Test.to_string(), "test");
        assert!(parse_environment("").is_err());
    }
}
