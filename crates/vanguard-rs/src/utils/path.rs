//! Upstream path rewriting and URL assembly helpers.

use crate::models::instance::ServiceInstance;

/// Applies a route's prefix rewrites to a request path.
///
/// `strip_prefix` is removed first when the path starts with it, then
/// `add_prefix` is prepended. The result is normalized to keep a leading
/// slash and to drop a trailing slash on non-root paths, so configured
/// prefixes may be written with or without trailing slashes.
///
/// # Examples
///
/// ```rust
/// use vanguard_rs::utils::path::rewrite_path;
///
/// assert_eq!(rewrite_path("/api/users/1", Some("/api"), Some("/v1")), "/v1/users/1");
/// assert_eq!(rewrite_path("/api", Some("/api"), None), "/");
/// assert_eq!(rewrite_path("/health", None, None), "/health");
/// ```
pub fn rewrite_path(path: &str, strip_prefix: Option<&str>, add_prefix: Option<&str>) -> String {
    let mut rewritten = path.to_string();

    if let Some(strip) = strip_prefix {
        let strip = strip.trim_end_matches('/');
        if !strip.is_empty() && rewritten.starts_with(strip) {
            let rest = &rewritten[strip.len()..];
            if rest.is_empty() || rest.starts_with('/') {
                rewritten = rest.to_string();
            }
        }
    }

    if let Some(add) = add_prefix {
        let add = add.trim_end_matches('/');
        rewritten = format!("{}{}", add, rewritten);
    }

    crate::utils::pattern::normalize_path(&rewritten)
}

/// Formats the complete upstream URL for a discovered instance.
///
/// The URL follows `{protocol}://{host}:{port}{path}?{query}`. The query
/// string is appended verbatim when non-empty; the path is expected to be
/// already rewritten and normalized.
pub fn format_upstream_url(instance: &ServiceInstance, path: &str, query: &str) -> String {
    if query.is_empty() {
        format!(
            "{}://{}:{}{}",
            instance.protocol, instance.host, instance.port, path
        )
    } else {
        format!(
            "{}://{}:{}{}?{}",
            instance.protocol, instance.host, instance.port, path, query
        )
    }
}
