//! Refresh-token cookie contract: `refreshToken`, HttpOnly, SameSite=Lax,
//! 30 days, `Secure` only when the service is configured for HTTPS.

use axum::http::header::{InvalidHeaderValue, COOKIE};
use axum::http::{HeaderMap, HeaderValue};

pub const REFRESH_COOKIE_NAME: &str = "refreshToken";
const REFRESH_COOKIE_MAX_AGE_SECS: i64 = 30 * 24 * 60 * 60;

pub fn refresh_cookie(token: &str, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={REFRESH_COOKIE_MAX_AGE_SECS}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub fn clear_refresh_cookie(secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{REFRESH_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub fn extract_refresh_cookie(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == REFRESH_COOKIE_NAME && !val.is_empty() {
            return Some(val.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_carries_the_contract_attributes() {
        let cookie = refresh_cookie("abc", false).unwrap();
        let value = cookie.to_str().unwrap();
        assert!(value.starts_with("refreshToken=abc; "));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Lax"));
        assert!(value.contains("Path=/"));
        assert!(value.contains("Max-Age=2592000"));
        assert!(!value.contains("Secure"));

        let secure = refresh_cookie("abc", true).unwrap();
        assert!(secure.to_str().unwrap().ends_with("; Secure"));
    }

    #[test]
    fn clearing_expires_immediately() {
        let cookie = clear_refresh_cookie(false).unwrap();
        assert!(cookie.to_str().unwrap().contains("Max-Age=0"));
    }

    #[test]
    fn extraction_finds_the_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; refreshToken=tok123; lang=en"),
        );
        assert_eq!(extract_refresh_cookie(&headers).as_deref(), Some("tok123"));

        headers.insert(COOKIE, HeaderValue::from_static("theme=dark"));
        assert!(extract_refresh_cookie(&headers).is_none());

        headers.insert(COOKIE, HeaderValue::from_static("refreshToken="));
        assert!(extract_refresh_cookie(&headers).is_none());
    }
}
