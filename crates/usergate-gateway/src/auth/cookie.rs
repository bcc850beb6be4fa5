//! Session cookie encoding.

use axum::http::{
    HeaderMap, HeaderValue,
    header::{COOKIE, InvalidHeaderValue},
};
use usergate_core::config::SessionConfig;

/// Name of the cookie carrying the session credential.
pub const SESSION_COOKIE_NAME: &str = "jwt";

/// Build the `HttpOnly` cookie for a session credential.
///
/// # Errors
///
/// Returns error if the token contains bytes not allowed in a header.
pub fn session_cookie(
    config: &SessionConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path={}; HttpOnly; SameSite=Strict; Max-Age={}",
        config.cookie_path,
        config.ttl().as_secs()
    );
    if config.cookie_secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Build a cookie that removes the session credential from the client.
///
/// # Errors
///
/// Returns error if the configured path is not a valid header value.
pub fn clear_session_cookie(config: &SessionConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}=; Path={}; HttpOnly; SameSite=Strict; Max-Age=0; \
         Expires=Thu, 01 Jan 1970 00:00:00 GMT",
        config.cookie_path
    );
    if config.cookie_secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Read the session credential from the request's `Cookie` headers.
///
/// Empty values are skipped, so the first non-empty `jwt` pair wins.
#[must_use]
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .filter(|(key, _)| key.trim() == SESSION_COOKIE_NAME)
        .map(|(_, value)| value.trim())
        .find(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_attributes() {
        let config = SessionConfig::builder().ttl_minutes(5).build();
        let cookie = session_cookie(&config, "abc.def.ghi").unwrap();
        let cookie = cookie.to_str().unwrap();

        assert!(cookie.starts_with("jwt=abc.def.ghi;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Path=/api"));
        assert!(cookie.contains("Max-Age=300"));
        assert!(!cookie.contains("Secure"));

        let secure = SessionConfig::builder().cookie_secure(true).build();
        let cookie = session_cookie(&secure, "t").unwrap();
        assert!(cookie.to_str().unwrap().ends_with("; Secure"));
    }

    #[test]
    fn test_clear_cookie() {
        let cookie = clear_session_cookie(&SessionConfig::default()).unwrap();
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with("jwt=;"));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn test_session_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_token(&headers), None);

        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; jwt=tok123"));
        assert_eq!(session_token(&headers), Some("tok123"));

        headers.insert(COOKIE, HeaderValue::from_static("jwt="));
        assert_eq!(session_token(&headers), None);

        let mut split = HeaderMap::new();
        split.append(COOKIE, HeaderValue::from_static("a=1"));
        split.append(COOKIE, HeaderValue::from_static("jwt=second"));
        assert_eq!(session_token(&split), Some("second"));
    }

    #[test]
    fn test_session_token_skips_empty_pair() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("jwt=; jwt=abc"));
        assert_eq!(session_token(&headers), Some("abc"));

        let mut split = HeaderMap::new();
        split.append(COOKIE, HeaderValue::from_static("jwt= "));
        split.append(COOKIE, HeaderValue::from_static("theme=dark; jwt=later"));
        assert_eq!(session_token(&split), Some("later"));
    }
}
