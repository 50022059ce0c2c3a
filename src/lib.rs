// Copyright (c) 2025 MCP Rust Contributors
// SPDX-License-Identifier: MIT

//! # Nimbus Auth
//!
//! OAuth2 client-credentials authentication for the Nimbus infrastructure
//! API. The crate obtains, caches and refreshes access tokens for a tenant
//! and routes API requests to the live or test environment.
// !
//! ## Features
//!
//! - **Validated configuration**: credentials, URLs, scopes and timeouts are
//!   checked before any network call, with secrets masked in diagnostics
//! - **Endpoint resolution**: tenant ids map deterministically to live or test
//!   API hosts, with mock and forced-test overrides
//! - **Discovery**: authorization server metadata is fetched, validated and
//!   cached for an hour, with a fallback token URL
//! - **Token cache**: expiry-aware, refreshed ahead of expiry, with concurrent
//!   refreshes collapsed into a single request
//! - **Classified errors**: every failure carries a kind and a retryable flag
// !
//! ## Quick Start
//!
//! ```rust,no_run
//! use nimbus_auth::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> AuthResult<()> {
//!     let config = AuthConfig::builder()
//!         .with_tenant_id("acme-prod-01")
//!         .with_client_credentials("svc_infra-client", "Zq8!vR2#pL7@xN4")
//!         .with_base_url("https://auth.nimbus.cloud")
//!         .with_scopes(["infra.read"])
//!         .build();
//!
//!     let client = AuthClient::new(config)?;
//!     client.authenticate().await?;
//!
//!     let api = client.http_client();
//!     let response = api.send(api.get("/v1/servers")).await?;
//!     println!("{}", response.status());
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod core;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use auth::{AuthClient, AuthConfig};
pub use crate::core::error::{AuthError, AuthErrorKind, AuthResult};

/// Prelude module for convenient imports
///
/// Use `use nimbus_auth::prelude::*;` to import everything you need.
pub mod prelude {
    pub use crate::auth::{
        AuthClient, AuthClientBuilder, AuthConfig, AuthConfigBuilder, AuthState, CachedToken,
        ConfigValidator, DiscoveryClient, EndpointResolver, ResolvedEndpoints, TokenCache,
        ValidationResult,
    };
    pub use crate::core::{
        AuthError, AuthErrorKind, AuthResult, ErrorContext, RetryConfig, RetryPolicy,
    };
    pub use crate::transport::{AuthorizedHttpClient, TokenProvider};

    pub use async_trait::async_trait;
}
