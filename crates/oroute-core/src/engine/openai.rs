use std::time::Duration;

use http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HOST};
use http::{HeaderMap, HeaderValue, StatusCode};
use tracing::{info, warn};

use oroute_common::{RequestRecord, Upstream, SECRET_ASIS};

use super::{ProxyOutcome, RequestContext};
use crate::cors;
use crate::error::ProxyFailure;
use crate::upstream_client::{collect, UpstreamClient, UpstreamHttpRequest};

pub(super) async fn forward(
    client: &dyn UpstreamClient,
    upstream: &Upstream,
    ctx: &RequestContext,
    record: &mut RequestRecord,
) -> Result<ProxyOutcome, ProxyFailure> {
    let (url, host) = target_url(upstream, &ctx.path, ctx.query.as_deref())?;
    let headers = outbound_headers(upstream, ctx, &host)?;
    let timeout_secs = if ctx.probe.stream {
        upstream.stream_timeout
    } else {
        upstream.timeout
    };

    info!(
        event = "upstream_request",
        endpoint = %upstream.endpoint,
        url = %url,
        is_stream = ctx.probe.stream,
        timeout_secs = timeout_secs
    );

    let send = client.send(UpstreamHttpRequest {
        method: ctx.method.clone(),
        url,
        headers,
        body: Some(ctx.body.clone()),
    });
    // The timer races only the headers-received event. Once any response
    // headers have been accepted we are committed to relaying, streaming or
    // not, and never time out.
    let mut response = match tokio::time::timeout(Duration::from_secs(timeout_secs), send).await {
        Ok(Ok(response)) => response,
        Ok(Err(failure)) => {
            warn!(
                event = "upstream_response",
                endpoint = %upstream.endpoint,
                status = "error",
                elapsed_ms = ctx.started.elapsed().as_millis() as i64,
                error = %failure
            );
            return Err(failure.into());
        }
        Err(_) => {
            warn!(
                event = "upstream_response",
                endpoint = %upstream.endpoint,
                status = "timeout",
                elapsed_ms = ctx.started.elapsed().as_millis() as i64
            );
            return Err(ProxyFailure::Timeout);
        }
    };

    record.status = response.status.as_u16();
    record.response_time_ms = ctx.started.elapsed().as_millis() as i64;
    info!(
        event = "upstream_response",
        endpoint = %upstream.endpoint,
        status = %response.status.as_u16(),
        elapsed_ms = record.response_time_ms
    );

    if response.status != StatusCode::OK {
        let body = collect(&mut response.body).await;
        warn!(
            event = "upstream_error_status",
            endpoint = %upstream.endpoint,
            status = %response.status.as_u16(),
            body = %String::from_utf8_lossy(&body)
        );
        return Err(ProxyFailure::UpstreamStatus {
            status: response.status,
            headers: response.headers,
            body,
        });
    }

    let mut headers = response.headers;
    cors::sanitize_upstream(&mut headers);
    cors::apply(&mut headers);
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();

    if ctx.probe.stream || content_type.starts_with("text/event-stream") {
        headers.remove(CONTENT_LENGTH);
        Ok(ProxyOutcome::Streaming {
            status: StatusCode::OK,
            headers,
            content_type,
            body: response.body,
        })
    } else {
        let body = collect(&mut response.body).await;
        Ok(ProxyOutcome::Buffered {
            status: StatusCode::OK,
            headers,
            content_type,
            body,
        })
    }
}

/// Join the inbound path (its `/v1` prefix stripped) onto the upstream's
/// base path, keeping the query string.
fn target_url(
    upstream: &Upstream,
    path: &str,
    query: Option<&str>,
) -> Result<(String, String), ProxyFailure> {
    let uri: http::Uri = upstream.endpoint.parse().map_err(|err| {
        ProxyFailure::Invalid(format!(
            "invalid upstream endpoint '{}': {err}",
            upstream.endpoint
        ))
    })?;
    let scheme = uri.scheme_str().unwrap_or("https");
    let authority = uri
        .authority()
        .map(|authority| authority.as_str().to_string())
        .ok_or_else(|| {
            ProxyFailure::Invalid(format!(
                "upstream endpoint '{}' has no host",
                upstream.endpoint
            ))
        })?;
    let base_path = uri.path().trim_end_matches('/');
    let stripped = path.strip_prefix("/v1").unwrap_or(path);

    let mut url = format!("{scheme}://{authority}{base_path}{stripped}");
    if let Some(query) = query {
        url.push('?');
        url.push_str(query);
    }
    Ok((url, authority))
}

fn outbound_headers(
    upstream: &Upstream,
    ctx: &RequestContext,
    host: &str,
) -> Result<HeaderMap, ProxyFailure> {
    let mut headers = if upstream.keep_header {
        ctx.headers.clone()
    } else {
        HeaderMap::new()
    };

    if upstream.secret == SECRET_ASIS {
        match ctx.headers.get(AUTHORIZATION) {
            Some(value) => {
                headers.insert(AUTHORIZATION, value.clone());
            }
            None => {
                headers.remove(AUTHORIZATION);
            }
        }
    } else {
        let value = HeaderValue::from_str(&format!("Bearer {}", upstream.secret))
            .map_err(|_| ProxyFailure::Invalid("secret is not a valid header value".to_string()))?;
        headers.insert(AUTHORIZATION, value);
    }

    if let Some(content_type) = ctx.headers.get(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, content_type.clone());
    }
    headers.insert(
        HOST,
        HeaderValue::from_str(host)
            .map_err(|_| ProxyFailure::Invalid("upstream host is not a valid header value".to_string()))?,
    );
    // Content-Length follows the in-memory body we hand the client, so a
    // stale inbound value can never disagree with the forwarded payload.
    headers.remove(CONTENT_LENGTH);

    Ok(headers)
}
