//! Configuration helpers for credentials and endpoint resolution.
//!
//! The SDK talks to a streaming "messages" endpoint. By default it reads the
//! credential from `ANTHROPIC_API_KEY` and targets the public endpoint; both
//! can be overridden per agent through [`AgentOptions`](crate::AgentOptions)
//! or globally through the environment.
//!
//! ## Environment Variables
//!
//! - `ANTHROPIC_API_KEY`: default credential when none is set on the options
//! - `ANTHROPIC_BASE_URL`: override the API base URL
//!
//! # Examples
//!
//! ```rust
//! use claude_agent::config::{resolve_base_url, DEFAULT_BASE_URL};
//!
//! let url = resolve_base_url(None);
//! assert!(url.starts_with("http"));
//!
//! let url = resolve_base_url(Some("http://localhost:8080"));
//! assert_eq!(url, "http://localhost:8080");
//! # let _ = DEFAULT_BASE_URL;
//! ```

use std::env;

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// API version header value sent with every request.
pub const API_VERSION: &str = "2023-06-01";

/// Beta flag required for server-side context compaction.
pub const COMPACTION_BETA: &str = "compact-2026-01-12";

/// Environment variable holding the default credential.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Environment variable overriding the base URL.
pub const BASE_URL_ENV: &str = "ANTHROPIC_BASE_URL";

/// Resolve the API base URL.
///
/// Precedence: explicit value > `ANTHROPIC_BASE_URL` > the default endpoint.
/// Trailing slashes are trimmed so callers can join paths uniformly.
pub fn resolve_base_url(explicit: Option<&str>) -> String {
    let url = match explicit {
        Some(url) if !url.trim().is_empty() => url.to_string(),
        _ => env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
    };
    url.trim_end_matches('/').to_string()
}

/// Resolve the API credential.
///
/// Precedence: explicit value > `ANTHROPIC_API_KEY`. Returns `None` when no
/// credential is available; the HTTP layer reports a configuration error in
/// that case rather than sending an unauthenticated request.
pub fn resolve_api_key(explicit: Option<&str>) -> Option<String> {
    match explicit {
        Some(key) if !key.trim().is_empty() => Some(key.to_string()),
        _ => env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_base_url_explicit_wins() {
        let url = resolve_base_url(Some("http://localhost:9999/"));
        assert_eq!(url, "http://localhost:9999");
    }

    #[test]
    fn test_resolve_base_url_default() {
        // Explicit empty string falls through to env/default.
        let url = resolve_base_url(Some(""));
        assert!(url.starts_with("http"));
    }

    #[test]
    fn test_resolve_api_key_explicit_wins() {
        let key = resolve_api_key(Some("sk-test-123"));
        assert_eq!(key.as_deref(), Some("sk-test-123"));
    }

    #[test]
    fn test_resolve_api_key_blank_explicit_ignored() {
        // A whitespace-only explicit key is treated as unset.
        let key = resolve_api_key(Some("   "));
        // Result depends on the environment; it must never be the blank value.
        assert_ne!(key.as_deref(), Some("   "));
    }
}
