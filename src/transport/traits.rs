// ! Transport layer traits
// !
// ! Module defines the seam between the authorized HTTP client and whatever
// ! supplies its bearer tokens.

use crate::core::error::AuthResult;
use async_trait::async_trait;

/// Source of bearer tokens for outgoing requests
///
/// Implemented by [`AuthClient`](crate::auth::AuthClient); tests and
/// embedders may provide their own.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a token that is valid right now
    ///
    /// # Returns
    /// The raw access token, without the `Bearer ` prefix
    async fn bearer_token(&self) -> AuthResult<String>;

    /// Report that the server rejected `rejected` and return a fresh token
    ///
    /// Concurrent reports for the same token must collapse into a single
    /// refresh.
    async fn refresh_rejected(&self, rejected: &str) -> AuthResult<String>;
}
