use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CONNECTION, TRANSFER_ENCODING,
};
use http::{HeaderMap, HeaderName, HeaderValue};

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "POST, GET, OPTIONS, PUT, DELETE, PATCH";
pub const ALLOW_HEADERS: &str = "Origin, Authorization, Content-Type";

/// Set our CORS headers, leaving any value that is already present alone.
pub fn apply(headers: &mut HeaderMap) {
    if !headers.contains_key(ACCESS_CONTROL_ALLOW_ORIGIN) {
        headers.insert(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static(ALLOW_ORIGIN),
        );
    }
    if !headers.contains_key(ACCESS_CONTROL_ALLOW_METHODS) {
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
    }
    if !headers.contains_key(ACCESS_CONTROL_ALLOW_HEADERS) {
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
    }
}

/// Drop the upstream's own CORS grants and hop-by-hop headers before a
/// response is relayed; our grants are applied afterwards.
pub fn sanitize_upstream(headers: &mut HeaderMap) {
    let stale: Vec<HeaderName> = headers
        .keys()
        .filter(|name| name.as_str().starts_with("access-control-allow-"))
        .cloned()
        .collect();
    for name in stale {
        headers.remove(&name);
    }
    headers.remove(CONNECTION);
    headers.remove(TRANSFER_ENCODING);
    headers.remove(HeaderName::from_static("keep-alive"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_respects_existing_values() {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("https://app.example"),
        );
        apply(&mut headers);
        assert_eq!(
            headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://app.example"
        );
        assert_eq!(headers.get(ACCESS_CONTROL_ALLOW_METHODS).unwrap(), ALLOW_METHODS);
    }

    #[test]
    fn sanitize_strips_upstream_grants() {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("https://upstream.example"),
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        sanitize_upstream(&mut headers);
        assert!(headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
        assert!(headers.get("content-type").is_some());
    }
}
