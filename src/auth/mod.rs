// ! OAuth2 Client-Credentials Authentication
// !
// ! Module implements the authentication layer for the Nimbus infrastructure
// ! API: configuration validation, tenant endpoint resolution, authorization
// ! server discovery, token caching and the client that ties them together.
// !
// ! Only the client-credentials grant is supported. Tokens live in memory and
// ! are never persisted.

pub mod client;
pub mod config;
pub mod discovery;
pub mod endpoints;
pub mod errors;
pub mod token;
pub mod types;
pub mod validation;

pub use client::{AuthClient, AuthClientBuilder, AuthState};
pub use config::{AuthConfig, AuthConfigBuilder};
pub use discovery::{DISCOVERY_CACHE_TTL, DiscoveryClient};
pub use endpoints::{
    AUTH_TOKEN_URL, EndpointResolver, Environment, LIVE_API_URL, ResolvedEndpoints, TEST_API_URL,
};
pub use errors::{classify_discovery_status, classify_token_status, parse_retry_after};
pub use token::{CachedToken, REFRESH_SKEW, TokenCache};
pub use types::{DiscoveryDocument, OAuth2Error, TokenResponse};
pub use validation::{ConfigValidator, FieldError, FieldWarning, ValidationResult, mask_secret};
