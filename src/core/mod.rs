//! Core abstractions shared by every component
//!
//! This module contains the classified error type, the structured error
//! logger and the retry/backoff utility.

pub mod error;
pub mod logging;
pub mod retry;

// Re-export commonly used items
pub use error::{AuthError, AuthErrorKind, AuthResult};
pub use logging::{ErrorContext, ErrorLogger};
pub use retry::{RetryConfig, RetryPolicy};
