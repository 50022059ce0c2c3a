//! Transport layer
//!
//! This module builds the shared `reqwest` client and the authorized HTTP
//! client that resource handlers use for every outbound API call.

use reqwest::Client;
use std::time::Duration;

use crate::core::error::{AuthError, AuthResult};

pub mod http_auth;
pub mod traits;

pub use http_auth::AuthorizedHttpClient;
pub use traits::TokenProvider;

/// `User-Agent` sent on every request
pub const DEFAULT_USER_AGENT: &str = concat!("nimbus-auth/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client shared by discovery, token exchange and API calls
///
/// TLS 1.2 or newer is required and plain HTTP is refused unless
/// `allow_http` is set for a local mock server.
pub fn build_http_client(timeout: Duration, allow_http: bool) -> AuthResult<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(DEFAULT_USER_AGENT)
        .https_only(!allow_http)
        .min_tls_version(reqwest::tls::Version::TLS_1_2)
        .build()
        .map_err(|e| AuthError::configuration(format!("Failed to build HTTP client: {e}")).with_cause(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_names_the_crate() {
        assert!(DEFAULT_USER_AGENT.starts_with("nimbus-auth/"));
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(Duration::from_secs(5), false).is_ok());
        assert!(build_http_client(Duration::from_secs(5), true).is_ok());
    }
}
