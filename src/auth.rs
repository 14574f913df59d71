use http::header::{HeaderName, AUTHORIZATION};
use rustc_hash::FxHashSet;

use crate::config::AppConfig;
use crate::error::ProxyError;

const X_API_KEY: HeaderName = HeaderName::from_static("x-api-key");

/// Compact key index used in hot-path authentication.
pub enum AllowedClientKeys {
    /// No keys configured: all requests are accepted.
    Open,
    Single(Box<str>),
    Multiple(FxHashSet<String>),
}

/// Build the key index from config. One key gets the direct-compare fast
/// path; an empty list disables authentication.
#[must_use]
pub fn build_allowed_key_set(config: &AppConfig) -> AllowedClientKeys {
    let keys = &config.client_authentication.allowed_keys;
    match keys.len() {
        0 => AllowedClientKeys::Open,
        1 => AllowedClientKeys::Single(keys[0].clone().into_boxed_str()),
        _ => AllowedClientKeys::Multiple(keys.iter().cloned().collect()),
    }
}

/// Extract the API key from request headers.
///
/// Accepts `Authorization: Bearer <key>` first, then `x-api-key: <key>`.
///
/// # Errors
///
/// Returns `ProxyError::Auth` when neither header carries a key.
pub fn extract_api_key(headers: &http::HeaderMap) -> Result<&str, ProxyError> {
    let key = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .or_else(|| headers.get(X_API_KEY).and_then(|v| v.to_str().ok()));

    key.ok_or_else(|| ProxyError::Auth("Missing API key".to_string()))
}

/// Authenticate an incoming request by checking the extracted key against
/// the pre-indexed allowed set.
///
/// # Errors
///
/// Returns `ProxyError::Auth` when authentication is enabled and the key is
/// missing or invalid.
pub fn authenticate(
    headers: &http::HeaderMap,
    allowed_keys: &AllowedClientKeys,
) -> Result<(), ProxyError> {
    match allowed_keys {
        AllowedClientKeys::Open => Ok(()),
        AllowedClientKeys::Single(expected) => {
            let client_key = extract_api_key(headers)?;
            if client_key == expected.as_ref() {
                Ok(())
            } else {
                Err(ProxyError::Auth("Invalid API key".to_string()))
            }
        }
        AllowedClientKeys::Multiple(allowed_set) => {
            let client_key = extract_api_key(headers)?;
            if allowed_set.contains(client_key) {
                Ok(())
            } else {
                Err(ProxyError::Auth("Invalid API key".to_string()))
            }
        }
    }
}
