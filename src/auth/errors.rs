// ! HTTP failure classification
// !
// ! Module maps HTTP responses from the discovery and token endpoints to
// ! classified errors at the point of failure.

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;

use crate::auth::types::OAuth2Error;
use crate::core::error::AuthError;

/// Backoff used when a 429 response carries no usable Retry-After header
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Read the Retry-After header as a number of seconds
pub fn parse_retry_after(headers: &HeaderMap) -> Duration {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

/// Parse an RFC 6749 error body, if the body is one
pub fn parse_oauth_error(body: &str) -> Option<OAuth2Error> {
    serde_json::from_str::<OAuth2Error>(body)
        .ok()
        .filter(|e| !e.error.is_empty())
}

/// Classify a non-200 response from the discovery endpoint
pub fn classify_discovery_status(status: StatusCode, headers: &HeaderMap) -> AuthError {
    match status {
        StatusCode::NOT_FOUND => AuthError::discovery(
            "Authorization server does not support discovery (HTTP 404)",
        ),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = parse_retry_after(headers);
            AuthError::rate_limited(
                format!(
                    "Discovery endpoint rate limited the client, retry after {}s",
                    retry_after.as_secs()
                ),
                retry_after,
            )
        }
        status if status.is_server_error() => {
            AuthError::server(format!("Discovery endpoint returned HTTP {status}"))
        }
        status => AuthError::discovery(format!(
            "Discovery endpoint returned unexpected HTTP {status}"
        )),
    }
}

/// Classify a non-200 response from the token endpoint
pub fn classify_token_status(status: StatusCode, headers: &HeaderMap, body: &str) -> AuthError {
    let oauth_error = parse_oauth_error(body);
    let detail = oauth_error
        .as_ref()
        .map(describe_oauth_error)
        .unwrap_or_default();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AuthError::credentials(format!(
            "Token endpoint rejected the client credentials (HTTP {status}){detail}"
        )),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = parse_retry_after(headers);
            AuthError::rate_limited(
                format!(
                    "Token endpoint rate limited the client, retry after {}s{detail}",
                    retry_after.as_secs()
                ),
                retry_after,
            )
        }
        status if status.is_server_error() => {
            AuthError::server(format!("Token endpoint returned HTTP {status}{detail}"))
        }
        StatusCode::BAD_REQUEST => match oauth_error.as_ref().map(|e| e.error.as_str()) {
            Some("invalid_client" | "unauthorized_client" | "invalid_grant") => {
                AuthError::credentials(format!(
                    "Token endpoint rejected the client credentials{detail}"
                ))
            }
            _ => AuthError::configuration(format!(
                "Token endpoint rejected the request (HTTP 400){detail}"
            )),
        },
        status => AuthError::server(format!(
            "Token endpoint returned unexpected HTTP {status}{detail}"
        ))
        .with_retryable(false),
    }
}

fn describe_oauth_error(error: &OAuth2Error) -> String {
    match &error.error_description {
        Some(description) => format!(": {} ({})", error.error, description),
        None => format!(": {}", error.error),
    }
}
