//! URL utilities for consistent URL handling
//!
//! The inference server is addressed by host and port in configuration, while
//! every request needs a full endpoint URL. These helpers keep the two in sync
//! and prevent double slashes when endpoints are appended.

/// Normalize a base URL by removing trailing slashes
///
/// # Examples
///
/// ```
/// use allm::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://localhost:1234"), "http://localhost:1234");
/// assert_eq!(normalize_base_url("http://localhost:1234/"), "http://localhost:1234");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Construct a complete API endpoint URL from a base URL and endpoint path
///
/// # Examples
///
/// ```
/// use allm::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://localhost:1234", "v1/chat/completions"),
///     "http://localhost:1234/v1/chat/completions"
/// );
/// assert_eq!(
///     construct_api_url("http://localhost:1234/", "/v1/models"),
///     "http://localhost:1234/v1/models"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

/// Strip any `http://` or `https://` scheme a user typed into the address field.
pub fn strip_scheme(address: &str) -> &str {
    let trimmed = address.trim();
    trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .unwrap_or(trimmed)
        .trim_end_matches('/')
}

/// Build the server root URL from an address and port.
///
/// The local server is always reached over plain HTTP.
///
/// ```
/// use allm::utils::url::server_url;
///
/// assert_eq!(server_url("https://192.168.1.20", 1234), "http://192.168.1.20:1234");
/// ```
pub fn server_url(address: &str, port: u16) -> String {
    format!("http://{}:{}", strip_scheme(address), port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("http://localhost:1234"),
            "http://localhost:1234"
        );

        // Multiple trailing slashes - should all be removed
        assert_eq!(
            normalize_base_url("http://localhost:1234///"),
            "http://localhost:1234"
        );

        assert_eq!(normalize_base_url(""), "");
        assert_eq!(normalize_base_url("///"), "");
    }

    #[test]
    fn test_construct_api_url() {
        assert_eq!(
            construct_api_url("http://localhost:1234", "v1/chat/completions"),
            "http://localhost:1234/v1/chat/completions"
        );

        // Both base URL with trailing slash and endpoint with leading slash
        assert_eq!(
            construct_api_url("http://localhost:1234/", "/v1/models"),
            "http://localhost:1234/v1/models"
        );

        assert_eq!(
            construct_api_url("http://localhost:1234", "///health"),
            "http://localhost:1234/health"
        );
    }

    #[test]
    fn server_url_strips_schemes_and_trailing_slashes() {
        assert_eq!(server_url("localhost", 1234), "http://localhost:1234");
        assert_eq!(
            server_url("http://192.168.50.89/", 1234),
            "http://192.168.50.89:1234"
        );
        assert_eq!(server_url("  https://lab.local  ", 8080), "http://lab.local:8080");
    }
}
