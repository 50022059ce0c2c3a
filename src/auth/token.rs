// ! Token Cache
// !
// ! Module stores the current access token with its expiry. Entries are
// ! replaced wholesale and an expired token is never handed out.

use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// How long before expiry a token becomes due for refresh
pub const REFRESH_SKEW: Duration = Duration::from_secs(60);

/// Lifetime assumed when the token endpoint omits `expires_in`
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Upper bound applied to server-reported lifetimes
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(10 * 365 * 24 * 3600);

/// An access token with its expiry
#[derive(Clone)]
pub struct CachedToken {
    access_token: SecretString,
    /// Token type as returned by the server, usually `Bearer`
    pub token_type: String,
    /// Instant after which the token is no longer valid
    pub expires_at: DateTime<Utc>,
    /// Instant from which the token should be refreshed
    pub refresh_at: DateTime<Utc>,
    /// Granted scopes, if the server reported them
    pub scope: Option<String>,
}

impl CachedToken {
    /// Create a token valid for `lifetime` from now
    ///
    /// The refresh point is `REFRESH_SKEW` before expiry, or half the
    /// lifetime for tokens shorter than twice the skew.
    pub fn new(
        access_token: impl Into<String>,
        token_type: impl Into<String>,
        lifetime: Duration,
    ) -> Self {
        let lifetime = lifetime.min(MAX_TOKEN_LIFETIME);
        let skew = REFRESH_SKEW.min(lifetime / 2);
        let now = Utc::now();

        Self {
            access_token: SecretString::new(access_token.into()),
            token_type: token_type.into(),
            expires_at: now + to_delta(lifetime),
            refresh_at: now + to_delta(lifetime - skew),
            scope: None,
        }
    }

    /// Attach the granted scopes
    pub fn with_scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope;
        self
    }

    /// The raw token value
    pub fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }

    /// `Authorization` header value
    pub fn authorization_value(&self) -> String {
        format!("{} {}", self.token_type, self.access_token())
    }

    /// Whether the token has not expired yet
    pub fn is_valid(&self) -> bool {
        Utc::now() < self.expires_at
    }

    /// Whether the token should be refreshed
    pub fn is_due_for_refresh(&self) -> bool {
        Utc::now() >= self.refresh_at
    }
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::zero())
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("refresh_at", &self.refresh_at)
            .field("scope", &self.scope)
            .finish()
    }
}

impl PartialEq for CachedToken {
    fn eq(&self, other: &Self) -> bool {
        self.access_token() == other.access_token()
            && self.token_type == other.token_type
            && self.expires_at == other.expires_at
            && self.refresh_at == other.refresh_at
            && self.scope == other.scope
    }
}

/// Thread-safe holder for the current token
#[derive(Debug, Clone, Default)]
pub struct TokenCache {
    inner: Arc<RwLock<Option<CachedToken>>>,
}

impl TokenCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached token, if present and not expired
    pub async fn get(&self) -> Option<CachedToken> {
        self.inner
            .read()
            .await
            .as_ref()
            .filter(|token| token.is_valid())
            .cloned()
    }

    /// Non-blocking check for a valid token
    ///
    /// Returns `None` when a writer holds the lock.
    pub fn try_has_valid(&self) -> Option<bool> {
        self.inner
            .try_read()
            .ok()
            .map(|guard| guard.as_ref().is_some_and(CachedToken::is_valid))
    }

    /// Store a new token expiring `expires_in` from now
    pub async fn set(
        &self,
        access_token: impl Into<String>,
        token_type: impl Into<String>,
        expires_in: Duration,
    ) -> CachedToken {
        let token = CachedToken::new(access_token, token_type, expires_in);
        self.replace(token.clone()).await;
        token
    }

    /// Replace the cached entry with a prepared token
    pub async fn replace(&self, token: CachedToken) {
        *self.inner.write().await = Some(token);
    }

    /// Empty the cache
    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }

    /// Empty the cache only if it still holds `access_token`
    ///
    /// Returns whether the entry was removed.
    pub async fn clear_if_matches(&self, access_token: &str) -> bool {
        let mut guard = self.inner.write().await;
        let matches = guard
            .as_ref()
            .is_some_and(|token| token.access_token() == access_token);
        if matches {
            *guard = None;
        }
        matches
    }
}
