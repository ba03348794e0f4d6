use http::header::AUTHORIZATION;
use http::HeaderMap;
use tracing::warn;

/// Pull the bearer token out of the Authorization header. `Bearer` is
/// matched case-sensitively; a header without the prefix is tolerated and
/// matched as the full trimmed value, with a warning.
pub fn bearer_token(headers: &HeaderMap) -> String {
    let raw = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    match raw.strip_prefix("Bearer") {
        Some(rest) => rest.trim().to_string(),
        None => {
            if !raw.is_empty() {
                warn!(event = "auth_malformed_header", "authorization header should start with 'Bearer'");
            }
            raw.trim().to_string()
        }
    }
}

/// Admit iff any comma-separated element of `acceptable` equals the token
/// after trimming.
pub fn check_auth(token: &str, acceptable: &str) -> bool {
    acceptable.split(',').any(|entry| entry.trim() == token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers_with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn strips_bearer_prefix_and_whitespace() {
        assert_eq!(bearer_token(&headers_with_auth("Bearer tok-1")), "tok-1");
        assert_eq!(bearer_token(&headers_with_auth("Bearer   tok-1  ")), "tok-1");
    }

    #[test]
    fn malformed_header_matched_as_is() {
        assert_eq!(bearer_token(&headers_with_auth("tok-1")), "tok-1");
        // lowercase prefix is not recognized
        assert_eq!(bearer_token(&headers_with_auth("bearer tok-1")), "bearer tok-1");
    }

    #[test]
    fn missing_header_yields_empty_token() {
        assert_eq!(bearer_token(&HeaderMap::new()), "");
    }

    #[test]
    fn matches_any_trimmed_entry() {
        assert!(check_auth("b", "a, b ,c"));
        assert!(!check_auth("d", "a, b ,c"));
    }

    #[test]
    fn order_independent() {
        assert_eq!(check_auth("tok", "a, b ,tok"), check_auth("tok", "tok,b,a"));
        assert_eq!(check_auth("x", "a, b ,c"), check_auth("x", "c,b,a"));
    }

    #[test]
    fn empty_list_admits_only_empty_token() {
        assert!(check_auth("", ""));
        assert!(!check_auth("tok", ""));
    }
}
