// ! Error types for the authentication layer
// !
// ! Module defines the classified error produced by every component of the
// ! crate. Each error carries its kind and a retryable flag decided at the
// ! point of failure, so callers never have to inspect message text.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Classification of an authentication failure
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
    /// Invalid or missing configuration
    #[error("Configuration error")]
    Configuration,

    /// The token endpoint rejected the client credentials
    #[error("Credentials error")]
    Credentials,

    /// Discovery endpoint missing or returned invalid metadata
    #[error("Discovery error")]
    Discovery,

    /// The server asked us to slow down (HTTP 429)
    #[error("Rate limit error")]
    RateLimit,

    /// HTTP 5xx from the authorization or discovery server
    #[error("Server error")]
    Server,

    /// Connection failures and timeouts
    #[error("Network error")]
    Network,

    /// Empty or unparseable tenant identifier
    #[error("Tenant resolution error")]
    TenantResolution,
}

impl AuthErrorKind {
    /// Whether errors of this kind are retryable unless stated otherwise
    pub fn default_retryable(self) -> bool {
        matches!(self, Self::RateLimit | Self::Server | Self::Network)
    }

    /// Stable label for logging and metrics
    pub fn category(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Credentials => "credentials",
            Self::Discovery => "discovery",
            Self::RateLimit => "rate_limit",
            Self::Server => "server",
            Self::Network => "network",
            Self::TenantResolution => "tenant_resolution",
        }
    }
}

/// Shared, cloneable error cause
#[derive(Clone)]
pub struct ErrorCause(Arc<dyn StdError + Send + Sync>);

impl ErrorCause {
    fn new<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self(Arc::new(err))
    }
}

impl fmt::Debug for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl StdError for ErrorCause {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

/// The main error type for the crate
///
/// Messages never contain the client secret or an access token.
#[derive(Error, Debug, Clone)]
#[error("{kind}: {message}")]
pub struct AuthError {
    kind: AuthErrorKind,
    message: String,
    retryable: bool,
    retry_after: Option<Duration>,
    #[source]
    cause: Option<ErrorCause>,
}

/// Result type alias for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// Create an error with the kind's default retryability
    pub fn new<S: Into<String>>(kind: AuthErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.default_retryable(),
            retry_after: None,
            cause: None,
        }
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::new(AuthErrorKind::Configuration, message)
    }

    /// Create a new credentials error
    pub fn credentials<S: Into<String>>(message: S) -> Self {
        Self::new(AuthErrorKind::Credentials, message)
    }

    /// Create a new discovery error
    pub fn discovery<S: Into<String>>(message: S) -> Self {
        Self::new(AuthErrorKind::Discovery, message)
    }

    /// Create a rate limit error carrying the server-requested delay
    pub fn rate_limited<S: Into<String>>(message: S, retry_after: Duration) -> Self {
        Self::new(AuthErrorKind::RateLimit, message).with_retry_after(retry_after)
    }

    /// Create a new server error
    pub fn server<S: Into<String>>(message: S) -> Self {
        Self::new(AuthErrorKind::Server, message)
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::new(AuthErrorKind::Network, message)
    }

    /// Create a new tenant resolution error
    pub fn tenant_resolution<S: Into<String>>(message: S) -> Self {
        Self::new(AuthErrorKind::TenantResolution, message)
    }

    /// Override the retryable flag
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Attach a server-requested backoff
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Attach the underlying cause
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.cause = Some(ErrorCause::new(cause));
        self
    }

    /// Prefix the message with additional context, keeping the classification
    pub fn with_context<S: AsRef<str>>(mut self, context: S) -> Self {
        self.message = format!("{}: {}", context.as_ref(), self.message);
        self
    }

    /// The error classification
    pub fn kind(&self) -> AuthErrorKind {
        self.kind
    }

    /// Human-readable message, without the kind prefix
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the operation may succeed if retried
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Server-requested backoff, if any
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Get the error category for logging/metrics
    pub fn category(&self) -> &'static str {
        self.kind.category()
    }

    /// Whether this error leaves the client unusable until reconfigured
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            AuthErrorKind::Credentials
                | AuthErrorKind::Configuration
                | AuthErrorKind::TenantResolution
        )
    }
}

impl From<url::ParseError> for AuthError {
    fn from(err: url::ParseError) -> Self {
        AuthError::configuration(format!("Invalid URL: {err}")).with_cause(err)
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::discovery(format!("Invalid JSON payload: {err}")).with_cause(err)
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        // Strip the URL: query strings could carry caller data.
        let err = err.without_url();
        let error = if err.is_timeout() {
            AuthError::network(format!("Request timed out: {err}"))
        } else if err.is_connect() {
            AuthError::network(format!("Connection failed: {err}"))
        } else if err.is_decode() {
            AuthError::server(format!("Failed to decode response body: {err}"))
                .with_retryable(false)
        } else if err.is_builder() {
            AuthError::configuration(format!("Failed to build request: {err}"))
        } else {
            AuthError::network(format!("HTTP request failed: {err}"))
        };
        error.with_cause(err)
    }
}
