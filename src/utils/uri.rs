// ! URL handling utilities
// !
// ! Module provides helpers for parsing and joining the endpoint URLs used by
// ! the discovery, token and API clients.

use crate::core::error::{AuthError, AuthResult};
use url::Url;

/// Well-known path of the OpenID Connect discovery document
pub const WELL_KNOWN_DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// Parse an endpoint URL, requiring HTTPS and a non-empty host
///
/// `allow_http` relaxes the scheme check for mock servers in tests.
pub fn parse_endpoint_url(raw: &str, allow_http: bool) -> AuthResult<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AuthError::configuration("URL cannot be empty"));
    }

    let url = Url::parse(trimmed).map_err(|e| {
        AuthError::configuration(format!("Invalid URL '{}': {e}", redact_userinfo(trimmed)))
            .with_cause(e)
    })?;
    let shown = redact_userinfo(trimmed);

    match url.scheme() {
        "https" => {}
        "http" if allow_http => {}
        scheme => {
            return Err(AuthError::configuration(format!(
                "URL '{shown}' must use https (got '{scheme}')"
            )));
        }
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(AuthError::configuration(format!(
            "URL '{shown}' has no host"
        )));
    }

    Ok(url)
}

/// Strip `user:password@` from a URL before it appears in diagnostics
///
/// Works on the raw text so unparseable input is handled too.
pub fn redact_userinfo(raw: &str) -> String {
    let Some((scheme, rest)) = raw.split_once("://") else {
        return raw.to_string();
    };

    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{scheme}://{}", &rest[at + 1..]),
        None => raw.to_string(),
    }
}

/// Build the discovery document URL for an authorization server base URL
pub fn discovery_url(base_url: &str) -> String {
    format!(
        "{}{}",
        base_url.trim().trim_end_matches('/'),
        WELL_KNOWN_DISCOVERY_PATH
    )
}

/// Join an API base URL with a request path
///
/// Absolute URLs are returned unchanged.
pub fn join_api_path(base: &str, path: &str) -> String {
    if path.contains("://") {
        return path.to_string();
    }

    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{path}")
    }
}
