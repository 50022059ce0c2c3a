// ! OAuth 2.0 Types and Data Structures
// !
// ! Module contains the wire types exchanged with the authorization server:
// ! the discovery document, the token response and the RFC 6749 error body.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::core::error::{AuthError, AuthResult};
use crate::utils::uri::parse_endpoint_url;

/// Grant type this crate implements
pub const CLIENT_CREDENTIALS_GRANT: &str = "client_credentials";

// ============================================================================
// OpenID Connect Discovery Metadata
// ============================================================================

/// Authorization server metadata served from the well-known discovery path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    /// The authorization server's issuer identifier
    #[serde(default)]
    pub issuer: String,

    /// URL of the token endpoint
    #[serde(default)]
    pub token_endpoint: String,

    /// URL of the authorization endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,

    /// URL of the JWKS endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    /// JSON array containing a list of grant types
    #[serde(default)]
    pub grant_types_supported: Vec<String>,

    /// JSON array containing a list of token endpoint authentication methods
    #[serde(default)]
    pub token_endpoint_auth_methods_supported: Vec<String>,

    /// JSON array containing a list of response types
    #[serde(default)]
    pub response_types_supported: Vec<String>,

    /// JSON array containing a list of scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    /// Additional metadata fields
    #[serde(flatten)]
    pub additional: HashMap<String, serde_json::Value>,
}

impl DiscoveryDocument {
    /// Check the document can be used for the client-credentials grant
    ///
    /// `allow_http` is only set for mock servers.
    pub fn validate(&self, allow_http: bool) -> AuthResult<()> {
        if self.issuer.trim().is_empty() {
            return Err(AuthError::discovery(
                "Discovery document has an empty issuer",
            ));
        }

        if self.token_endpoint.trim().is_empty() {
            return Err(AuthError::discovery(
                "Discovery document has an empty token_endpoint",
            ));
        }

        parse_endpoint_url(&self.token_endpoint, allow_http).map_err(|e| {
            AuthError::discovery(format!(
                "Discovery document has an unusable token_endpoint: {}",
                e.message()
            ))
        })?;

        if !self.supports_grant(CLIENT_CREDENTIALS_GRANT) {
            return Err(AuthError::discovery(
                "Authorization server does not support the client_credentials grant",
            ));
        }

        Ok(())
    }

    /// Whether the server advertises the given grant type
    pub fn supports_grant(&self, grant_type: &str) -> bool {
        self.grant_types_supported.iter().any(|g| g == grant_type)
    }
}

// ============================================================================
// Token Endpoint
// ============================================================================

/// Successful token endpoint response
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The access token
    pub access_token: String,

    /// Token type, normally "Bearer"
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Lifetime in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    /// Granted scopes, space-delimited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// OAuth 2.0 error response (RFC 6749 section 5.2)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Error {
    /// Error code
    pub error: String,

    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,

    /// Link to documentation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}
