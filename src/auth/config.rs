// ! Authentication configuration
// !
// ! Module defines the immutable configuration consumed by the resolver,
// ! discovery client and auth client, together with the builder used to
// ! assemble it from explicit values and environment variables.

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::core::error::{AuthError, AuthResult};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of retries for retryable failures
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Prefix of the standard environment variables
pub const ENV_PREFIX: &str = "NIMBUS_";

/// Prefix of the provider-specific environment variables
pub const PROVIDER_ENV_PREFIX: &str = "NIMBUS_PROVIDER_";

/// Client-credentials configuration for one tenant
///
/// Built once per [`AuthClient`](crate::auth::AuthClient) and never mutated
/// afterwards. The `Debug` output redacts the client secret.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// OAuth client identifier
    #[serde(default)]
    pub client_id: String,

    /// OAuth client secret
    pub client_secret: SecretString,

    /// Tenant identifier, drives live/test routing
    #[serde(default)]
    pub tenant_id: String,

    /// Authorization server base URL used for discovery
    #[serde(default)]
    pub base_url: Option<String>,

    /// Explicit token endpoint, bypasses discovery
    #[serde(default)]
    pub token_url: Option<String>,

    /// Requested scopes, in order and without duplicates
    #[serde(default, deserialize_with = "deserialize_scopes")]
    pub scopes: Vec<String>,

    /// Per-request timeout
    #[serde(
        default = "default_timeout",
        rename = "timeout_secs",
        deserialize_with = "deserialize_secs"
    )]
    pub timeout: Duration,

    /// Retries for retryable failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Skip discovery and use the resolved token URL directly
    #[serde(default)]
    pub disable_discovery: bool,

    /// Extra headers for API requests, keys lower-cased
    #[serde(default, deserialize_with = "deserialize_headers")]
    pub custom_headers: BTreeMap<String, String>,

    /// Explicit environment name ("live", "test", ...)
    #[serde(default)]
    pub environment: Option<String>,

    /// Mock server URL used for both auth and API in tests
    #[serde(default)]
    pub mock_url: Option<String>,

    /// Route the tenant to the test API regardless of its identifier
    #[serde(default)]
    pub force_test_environment: bool,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn deserialize_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}

fn deserialize_scopes<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<String>::deserialize(deserializer).map(normalize_scopes)
}

fn deserialize_headers<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    BTreeMap::<String, String>::deserialize(deserializer)
        .map(|headers| headers.into_iter().map(|(k, v)| (k.to_ascii_lowercase(), v)).collect())
}

/// Trim scopes, dropping empty entries and later duplicates
pub fn normalize_scopes<I, S>(scopes: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut normalized: Vec<String> = Vec::new();
    for scope in scopes {
        let scope = scope.into().trim().to_string();
        if !scope.is_empty() && !normalized.contains(&scope) {
            normalized.push(scope);
        }
    }
    normalized
}

impl AuthConfig {
    /// Create a configuration with the required fields and defaults elsewhere
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::new(client_secret.into()),
            tenant_id: tenant_id.into(),
            base_url: None,
            token_url: None,
            scopes: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            disable_discovery: false,
            custom_headers: BTreeMap::new(),
            environment: None,
            mock_url: None,
            force_test_environment: false,
        }
    }

    /// Start a builder
    pub fn builder() -> AuthConfigBuilder {
        AuthConfigBuilder::default()
    }

    /// Load the configuration entirely from environment variables
    pub fn from_env() -> AuthResult<Self> {
        Ok(Self::builder().resolve_env()?.build())
    }

    /// Whether a mock server override is configured
    pub fn is_mock(&self) -> bool {
        self.mock_url.is_some()
    }

    /// Space-delimited scope parameter, `None` when no scopes are requested
    pub fn scope_param(&self) -> Option<String> {
        if self.scopes.is_empty() {
            None
        } else {
            Some(self.scopes.join(" "))
        }
    }
}

/// Builder for [`AuthConfig`]
///
/// Explicit values always win over environment variables; standard
/// `NIMBUS_*` variables win over provider-specific `NIMBUS_PROVIDER_*` ones.
#[derive(Debug, Default, Clone)]
pub struct AuthConfigBuilder {
    client_id: Option<String>,
    client_secret: Option<SecretString>,
    tenant_id: Option<String>,
    base_url: Option<String>,
    token_url: Option<String>,
    scopes: Option<Vec<String>>,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    disable_discovery: bool,
    custom_headers: BTreeMap<String, String>,
    environment: Option<String>,
    mock_url: Option<String>,
    force_test_environment: Option<bool>,
}

impl AuthConfigBuilder {
    /// Set the tenant identifier
    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Set client credentials
    pub fn with_client_credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.client_id = Some(client_id.into());
        self.client_secret = Some(SecretString::new(client_secret.into()));
        self
    }

    /// Set the discovery base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set an explicit token endpoint
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = Some(token_url.into());
        self
    }

    /// Set scopes
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(normalize_scopes(scopes));
        self
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Disable discovery
    pub fn with_discovery_disabled(mut self, disabled: bool) -> Self {
        self.disable_discovery = disabled;
        self
    }

    /// Add a custom header for API requests
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Set an explicit environment name
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Point both auth and API at a mock server
    pub fn with_mock_url(mut self, mock_url: impl Into<String>) -> Self {
        self.mock_url = Some(mock_url.into());
        self
    }

    /// Force routing to the test API
    pub fn with_test_environment(mut self, forced: bool) -> Self {
        self.force_test_environment = Some(forced);
        self
    }

    /// Fill unset fields from the process environment
    pub fn resolve_env(self) -> AuthResult<Self> {
        self.resolve_env_with(|key| std::env::var(key).ok())
    }

    /// Fill unset fields through `lookup`, then require tenant and credentials
    pub fn resolve_env_with<F>(mut self, lookup: F) -> AuthResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |name: &str| -> Option<String> {
            [ENV_PREFIX, PROVIDER_ENV_PREFIX]
                .iter()
                .find_map(|prefix| lookup(&format!("{prefix}{name}")))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if self.tenant_id.is_none() {
            self.tenant_id = env("TENANT_ID");
        }
        if self.client_id.is_none() {
            self.client_id = env("CLIENT_ID");
        }
        if self.client_secret.is_none() {
            self.client_secret = env("CLIENT_SECRET").map(SecretString::new);
        }
        if self.base_url.is_none() {
            self.base_url = env("BASE_URL");
        }
        if self.token_url.is_none() {
            self.token_url = env("TOKEN_URL");
        }
        if self.scopes.is_none() {
            self.scopes = env("SCOPES").map(|raw| {
                normalize_scopes(raw.split(|c: char| c == ',' || c.is_whitespace()))
            });
        }
        if self.environment.is_none() {
            self.environment = env("ENVIRONMENT");
        }
        if self.mock_url.is_none() {
            self.mock_url = env("MOCK_URL");
        }
        if self.force_test_environment.is_none() {
            self.force_test_environment = env("TEST_ENVIRONMENT").map(|raw| parse_flag(&raw));
        }

        let mut missing = Vec::new();
        if self.tenant_id.is_none() {
            missing.push("TENANT_ID");
        }
        if self.client_id.is_none() {
            missing.push("CLIENT_ID");
        }
        if self.client_secret.is_none() {
            missing.push("CLIENT_SECRET");
        }

        if missing.is_empty() {
            Ok(self)
        } else {
            let tried: Vec<String> = missing
                .iter()
                .map(|name| format!("{ENV_PREFIX}{name} or {PROVIDER_ENV_PREFIX}{name}"))
                .collect();
            Err(AuthError::configuration(format!(
                "Missing required settings; set them in the configuration block or via {}",
                tried.join(", ")
            )))
        }
    }

    /// Build the configuration; unset required fields stay empty for the validator to report
    pub fn build(self) -> AuthConfig {
        AuthConfig {
            client_id: self.client_id.unwrap_or_default(),
            client_secret: self
                .client_secret
                .unwrap_or_else(|| SecretString::new(String::new())),
            tenant_id: self.tenant_id.unwrap_or_default(),
            base_url: self.base_url,
            token_url: self.token_url,
            scopes: self.scopes.unwrap_or_default(),
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            disable_discovery: self.disable_discovery,
            custom_headers: self.custom_headers,
            environment: self.environment,
            mock_url: self.mock_url,
            force_test_environment: self.force_test_environment.unwrap_or(false),
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::AuthErrorKind;
    use secrecy::ExposeSecret;
    use serde_json::json;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_scopes_are_an_ordered_set() {
        let config = AuthConfig::builder()
            .with_scopes(["infra.write", " infra.read ", "infra.write", ""])
            .build();

        assert_eq!(config.scopes, vec!["infra.write", "infra.read"]);
        assert_eq!(config.scope_param().as_deref(), Some("infra.write infra.read"));
    }

    #[test]
    fn test_header_keys_are_case_insensitive() {
        let config = AuthConfig::builder()
            .with_header("X-Request-Source", "a")
            .with_header("x-request-source", "b")
            .build();

        assert_eq!(config.custom_headers.len(), 1);
        assert_eq!(config.custom_headers.get("x-request-source").map(String::as_str), Some("b"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = AuthConfig::new("acme-prod-01", "client-12345", "super-secret-value");
        let debug = format!("{config:?}");

        assert!(!debug.contains("super-secret-value"));
        assert_eq!(config.client_secret.expose_secret(), "super-secret-value");
    }

    #[test]
    fn test_explicit_values_win_over_environment() {
        let lookup = lookup_from(&[
            ("NIMBUS_TENANT_ID", "env-tenant"),
            ("NIMBUS_CLIENT_ID", "env-client-id"),
            ("NIMBUS_CLIENT_SECRET", "env-secret-value"),
        ]);

        let config = AuthConfig::builder()
            .with_tenant_id("explicit-tenant")
            .resolve_env_with(lookup)
            .unwrap()
            .build();

        assert_eq!(config.tenant_id, "explicit-tenant");
        assert_eq!(config.client_id, "env-client-id");
    }

    #[test]
    fn test_standard_environment_wins_over_provider_environment() {
        let lookup = lookup_from(&[
            ("NIMBUS_CLIENT_ID", "standard-client"),
            ("NIMBUS_PROVIDER_CLIENT_ID", "provider-client"),
            ("NIMBUS_PROVIDER_TENANT_ID", "provider-tenant"),
            ("NIMBUS_PROVIDER_CLIENT_SECRET", "provider-secret"),
            ("NIMBUS_SCOPES", "infra.read, infra.write"),
            ("NIMBUS_TEST_ENVIRONMENT", "TRUE"),
        ]);

        let config = AuthConfig::builder()
            .resolve_env_with(lookup)
            .unwrap()
            .build();

        assert_eq!(config.client_id, "standard-client");
        assert_eq!(config.tenant_id, "provider-tenant");
        assert_eq!(config.client_secret.expose_secret(), "provider-secret");
        assert_eq!(config.scopes, vec!["infra.read", "infra.write"]);
        assert!(config.force_test_environment);
    }

    #[test]
    fn test_missing_settings_are_reported() {
        let err = AuthConfig::builder()
            .with_tenant_id("acme-prod-01")
            .resolve_env_with(|_| None)
            .unwrap_err();

        assert_eq!(err.kind(), AuthErrorKind::Configuration);
        assert!(err.message().contains("NIMBUS_CLIENT_ID"));
        assert!(err.message().contains("NIMBUS_PROVIDER_CLIENT_SECRET"));
        assert!(!err.message().contains("TENANT_ID"));
    }

    #[test]
    fn test_deserialize_configuration_block() {
        let config: AuthConfig = serde_json::from_value(json!({
            "client_id": "client-12345",
            "client_secret": "s3cr3t-Value-99",
            "tenant_id": "acme-prod-01",
            "base_url": "https://auth.example.com",
            "scopes": ["infra.read", "infra.read"],
            "timeout_secs": 12,
            "custom_headers": {"X-Team": "platform"}
        }))
        .unwrap();

        assert_eq!(config.timeout, Duration::from_secs(12));
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.scopes, vec!["infra.read"]);
        assert!(config.custom_headers.contains_key("x-team"));
        assert!(!config.disable_discovery);
    }
}
