//! Set-Cookie values for the OAuth CSRF state

use axum::http::HeaderValue;

/// Cookie carrying the state generated at `/oauth/start`
pub const OAUTH_STATE_NAME: &str = "oauth_state";
/// Lifetime of the state cookie in seconds (10 minutes)
pub const OAUTH_STATE_MAX_AGE_SECS: u32 = 600;
/// The callback lives under this prefix, so the cookie is scoped to it
pub const OAUTH_COOKIE_PATH: &str = "/api/social/oauth";

/// Build the state cookie; `Secure` is added when the site is served over https
pub fn build_state_cookie(state: &str, secure: bool) -> Option<HeaderValue> {
    let secure = if secure { " Secure;" } else { "" };
    let cookie = format!(
        "{}={}; HttpOnly;{} SameSite=Lax; Path={}; Max-Age={}",
        OAUTH_STATE_NAME, state, secure, OAUTH_COOKIE_PATH, OAUTH_STATE_MAX_AGE_SECS
    );
    HeaderValue::from_str(&cookie).ok()
}

/// Expire the state cookie
pub fn build_clear_state_cookie() -> HeaderValue {
    HeaderValue::from_static("oauth_state=; HttpOnly; SameSite=Lax; Path=/api/social/oauth; Max-Age=0")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_cookie_attributes() {
        let cookie = build_state_cookie("abc", false).unwrap();
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with("oauth_state=abc;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=600"));
        assert!(!cookie.contains("Secure"));

        let secure = build_state_cookie("abc", true).unwrap();
        assert!(secure.to_str().unwrap().contains("Secure;"));
    }

    #[test]
    fn test_clear_cookie_matches_name_and_path() {
        let cookie = build_clear_state_cookie();
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with(&format!("{}=;", OAUTH_STATE_NAME)));
        assert!(cookie.contains(&format!("Path={}", OAUTH_COOKIE_PATH)));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn test_control_characters_are_rejected() {
        assert!(build_state_cookie("bad\nvalue", false).is_none());
    }
}
