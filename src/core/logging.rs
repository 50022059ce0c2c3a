// ! Structured logging for the authentication layer
// !
// ! Module provides structured error logging with categorization and
// ! context preservation. Secrets and tokens are never part of a log entry.

use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::{Level, error, info, span, warn};

use crate::core::error::{AuthError, AuthErrorKind};

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLogLevel {
    /// Errors that need operator action (bad credentials or configuration)
    Error,
    /// Transient problems that retries may resolve
    Warning,
    /// Expected conditions with a handled fallback
    Info,
}

impl From<&AuthError> for ErrorLogLevel {
    fn from(error: &AuthError) -> Self {
        match error.kind() {
            AuthErrorKind::Credentials
            | AuthErrorKind::Configuration
            | AuthErrorKind::TenantResolution => ErrorLogLevel::Error,

            AuthErrorKind::Network | AuthErrorKind::Server | AuthErrorKind::RateLimit => {
                ErrorLogLevel::Warning
            }

            // Discovery failures usually fall back to a configured token URL
            AuthErrorKind::Discovery => ErrorLogLevel::Info,
        }
    }
}

/// Extended error context for logging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Operation being performed when error occurred
    pub operation: String,
    /// Component identifier (discovery, token, transport)
    pub component: Option<String>,
    /// Tenant the operation ran for
    pub tenant_id: Option<String>,
    /// Additional context data
    pub extra: HashMap<String, Value>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            operation: "unknown".to_string(),
            component: None,
            tenant_id: None,
            extra: HashMap::new(),
        }
    }
}

impl ErrorContext {
    /// Create a new error context
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Default::default()
        }
    }

    /// Set component identifier
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Set tenant identifier
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Add extra context data
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Error logging with structured fields
pub struct ErrorLogger;

impl ErrorLogger {
    /// Log an error with full context
    pub fn log_error(error: &AuthError, context: &ErrorContext) {
        let category = error.category();
        let retryable = error.is_retryable();

        let log_data = json!({
            "error_category": category,
            "error_retryable": retryable,
            "retry_after_ms": error.retry_after().map(|d| d.as_millis() as u64),
            "operation": context.operation,
            "component": context.component,
            "tenant_id": context.tenant_id,
            "extra_context": context.extra,
        });

        match ErrorLogLevel::from(error) {
            ErrorLogLevel::Error => {
                error!(
                    target: "nimbus_auth",
                    error_category = category,
                    error_retryable = retryable,
                    operation = context.operation.as_str(),
                    "Authentication error: {} - {}",
                    error,
                    log_data
                );
            }
            ErrorLogLevel::Warning => {
                warn!(
                    target: "nimbus_auth",
                    error_category = category,
                    error_retryable = retryable,
                    operation = context.operation.as_str(),
                    "Authentication warning: {} - {}",
                    error,
                    log_data
                );
            }
            ErrorLogLevel::Info => {
                info!(
                    target: "nimbus_auth",
                    error_category = category,
                    error_retryable = retryable,
                    operation = context.operation.as_str(),
                    "Authentication notice: {} - {}",
                    error,
                    log_data
                );
            }
        }
    }

    /// Log a retry attempt with context
    pub fn log_retry_attempt(
        error: &AuthError,
        attempt: u32,
        max_attempts: u32,
        will_retry: bool,
        context: &ErrorContext,
    ) {
        let category = error.category();

        if will_retry {
            warn!(
                target: "nimbus_auth::retry",
                error_category = category,
                retry_attempt = attempt,
                max_attempts = max_attempts,
                operation = context.operation.as_str(),
                "Retry attempt {}/{}: {}",
                attempt,
                max_attempts,
                error
            );
        } else {
            Self::log_error(error, context);
        }
    }

    /// Log successful recovery after retries
    pub fn log_retry_success(context: &ErrorContext, total_attempts: u32) {
        info!(
            target: "nimbus_auth::retry",
            operation = context.operation.as_str(),
            total_attempts = total_attempts,
            "Operation '{}' succeeded after {} attempts",
            context.operation,
            total_attempts
        );
    }

    /// Create a logging span for an operation
    pub fn create_operation_span(context: &ErrorContext) -> tracing::Span {
        span!(
            Level::INFO,
            "auth_operation",
            operation = context.operation.as_str(),
            component = context.component.as_deref(),
            tenant_id = context.tenant_id.as_deref(),
        )
    }
}

impl AuthError {
    /// Log this error with structured context
    pub fn log_with_context(&self, context: &ErrorContext) {
        ErrorLogger::log_error(self, context);
    }
}

/// Install a `tracing` subscriber honouring `RUST_LOG`, falling back to `default_filter`
///
/// Returns `false` if a global subscriber was already installed.
#[cfg(feature = "tracing-subscriber")]
pub fn init_logging(default_filter: &str) -> bool {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_log_levels() {
        assert_eq!(
            ErrorLogLevel::from(&AuthError::credentials("test")),
            ErrorLogLevel::Error
        );
        assert_eq!(
            ErrorLogLevel::from(&AuthError::network("test")),
            ErrorLogLevel::Warning
        );
        assert_eq!(
            ErrorLogLevel::from(&AuthError::rate_limited("test", Duration::from_secs(1))),
            ErrorLogLevel::Warning
        );
        assert_eq!(
            ErrorLogLevel::from(&AuthError::discovery("test")),
            ErrorLogLevel::Info
        );
    }

    #[test]
    fn test_error_context_builder() {
        let context = ErrorContext::new("token_refresh")
            .with_component("client")
            .with_tenant("acme-prod-01")
            .with_extra("attempt", json!(2));

        assert_eq!(context.operation, "token_refresh");
        assert_eq!(context.component, Some("client".to_string()));
        assert_eq!(context.tenant_id, Some("acme-prod-01".to_string()));
        assert_eq!(context.extra.get("attempt"), Some(&json!(2)));
    }

    #[test]
    fn test_logging_does_not_panic_without_subscriber() {
        let context = ErrorContext::new("discovery");
        AuthError::server("boom").log_with_context(&context);
        ErrorLogger::log_retry_attempt(&AuthError::network("reset"), 1, 3, true, &context);
        ErrorLogger::log_retry_success(&context, 2);
        let _span = ErrorLogger::create_operation_span(&context);
    }
}
