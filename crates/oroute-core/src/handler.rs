use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use http::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use http::HeaderValue;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use oroute_common::RequestRecord;
use oroute_protocol::openai::ChatRequestProbe;

use crate::auth::bearer_token;
use crate::core::CoreState;
use crate::cors;
use crate::engine::{ProxyOutcome, RequestContext};
use crate::error::ProxyFailure;
use crate::metrics;
use crate::recorder;
use crate::upstream_client::ByteStream;

/// Dispatch entry point: build the candidate list, try upstreams in order
/// until one is allowed to answer, then hand the record to the audit sink.
pub async fn proxy_handler(
    State(state): State<Arc<CoreState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let trace_id = Uuid::new_v4().to_string();
    let mut record = RequestRecord::new(state.hostname.clone(), addr.ip().to_string());
    record.authorization = header_str(&headers, AUTHORIZATION.as_str());
    record.user_agent = header_str(&headers, USER_AGENT.as_str());
    record.headers = headers_to_json(&headers);
    record.body = String::from_utf8_lossy(&body).to_string();

    let token = bearer_token(&headers);
    let probe = ChatRequestProbe::sniff(&body);
    record.model = if probe.model.is_empty() {
        uri.path().to_string()
    } else {
        probe.model.clone()
    };

    info!(
        event = "request_received",
        trace_id = %trace_id,
        path = %uri.path(),
        model = %record.model,
        is_stream = probe.stream,
        ip = %record.ip
    );

    let candidates = state.registry.candidates(&token);
    if candidates.is_empty() {
        warn!(event = "no_available_upstream", ip = %record.ip);
        record.status = StatusCode::FORBIDDEN.as_u16();
        record.response = "no available upstream".to_string();
        seal_and_dispatch(&state, record, started);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        cors::apply(&mut headers);
        let mut response =
            Response::new(Body::from(r#"{"error":"no available upstream"}"#));
        *response.status_mut() = StatusCode::FORBIDDEN;
        response.headers_mut().extend(headers);
        tag_response(&mut response, &trace_id);
        return response;
    }

    let ctx = RequestContext {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(|q| q.to_string()),
        headers,
        body,
        probe,
        started,
    };

    let total = candidates.len();
    let mut last_failure = None;
    for (index, upstream) in candidates.iter().enumerate() {
        let is_last = index + 1 == total;
        record.upstream_endpoint = upstream.endpoint.clone();
        record.upstream_secret = upstream.secret.clone();

        match state.engine.dispatch(upstream, &ctx, &mut record).await {
            Ok(outcome) => {
                state.metrics.record_attempt(&upstream.endpoint, "ok");
                return finish_outcome(&state, outcome, record, started, &trace_id);
            }
            Err(failure) => {
                state.metrics.record_attempt(&upstream.endpoint, failure.label());
                if failure.is_terminal() {
                    warn!(
                        event = "client_aborted",
                        endpoint = %upstream.endpoint,
                        "client's connection lost, no further upstream will be tried"
                    );
                    last_failure = Some(failure);
                    break;
                }
                warn!(
                    event = "upstream_attempt_failed",
                    endpoint = %upstream.endpoint,
                    error = %failure,
                    will_retry = !is_last
                );
                last_failure = Some(failure);
            }
        }
    }

    finish_failure(&state, record, started, last_failure, &trace_id)
}

/// CORS preflight for the dispatch routes.
pub async fn preflight_handler() -> Response {
    let mut headers = HeaderMap::new();
    cors::apply(&mut headers);
    let mut response = Response::new(Body::empty());
    response.headers_mut().extend(headers);
    response
}

pub async fn metrics_handler(State(state): State<Arc<CoreState>>) -> Response {
    let body = metrics::render(&state.metrics_registry);
    let mut response = Response::new(Body::from(body));
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );
    response
}

fn finish_outcome(
    state: &Arc<CoreState>,
    outcome: ProxyOutcome,
    mut record: RequestRecord,
    started: Instant,
    trace_id: &str,
) -> Response {
    match outcome {
        ProxyOutcome::Buffered {
            status,
            headers,
            content_type,
            body,
        } => {
            recorder::apply_body(&mut record, &content_type, &body);
            seal_and_dispatch(state, record, started);

            let mut response = Response::new(Body::from(body));
            *response.status_mut() = status;
            response.headers_mut().extend(headers);
            tag_response(&mut response, trace_id);
            response
        }
        ProxyOutcome::Streaming {
            status,
            headers,
            content_type,
            body,
        } => {
            let client_body = spawn_tee(state.clone(), body, record, content_type, started);
            let mut response = Response::new(client_body);
            *response.status_mut() = status;
            response.headers_mut().extend(headers);
            tag_response(&mut response, trace_id);
            response
        }
    }
}

/// Forward upstream chunks to the client while duplicating them into an
/// in-memory buffer; when the stream ends the recorder runs and the record
/// is handed off. The forwarder owns the record from here on.
fn spawn_tee(
    state: Arc<CoreState>,
    mut upstream: ByteStream,
    mut record: RequestRecord,
    content_type: String,
    started: Instant,
) -> Body {
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, io::Error>>(16);
    tokio::spawn(async move {
        let mut buffer = BytesMut::new();
        let mut client_gone = false;
        while let Some(chunk) = upstream.recv().await {
            buffer.extend_from_slice(&chunk);
            if tx.send(Ok(chunk)).await.is_err() {
                client_gone = true;
                break;
            }
        }

        recorder::apply_body(&mut record, &content_type, &buffer);
        if client_gone {
            warn!(event = "client_aborted", "client disconnected mid-stream");
            record.status = StatusCode::INTERNAL_SERVER_ERROR.as_u16();
            if !record.response.is_empty() {
                record.response.push('\n');
            }
            record.response.push_str("client's connection lost");
        }
        seal_and_dispatch(&state, record, started);
    });
    Body::from_stream(ReceiverStream::new(rx))
}

fn finish_failure(
    state: &Arc<CoreState>,
    mut record: RequestRecord,
    started: Instant,
    failure: Option<ProxyFailure>,
    trace_id: &str,
) -> Response {
    let failure =
        failure.unwrap_or_else(|| ProxyFailure::Invalid("no candidate attempted".to_string()));
    let status = failure.client_status();
    record.status = status.as_u16();
    if !record.response.is_empty() {
        record.response.push('\n');
    }

    let (mut headers, body) = match failure {
        // The terminal candidate's upstream reply is surfaced verbatim.
        ProxyFailure::UpstreamStatus { headers, body, .. } => {
            record.response.push_str(&String::from_utf8_lossy(&body));
            let mut headers = headers;
            cors::sanitize_upstream(&mut headers);
            (headers, body)
        }
        other => {
            record.response.push_str(&other.to_string());
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            let body = serde_json::json!({ "error": other.to_string() }).to_string();
            (headers, Bytes::from(body))
        }
    };
    cors::apply(&mut headers);

    seal_and_dispatch(state, record, started);
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().extend(headers);
    tag_response(&mut response, trace_id);
    response
}

fn tag_response(response: &mut Response, trace_id: &str) {
    if let Ok(value) = HeaderValue::from_str(trace_id) {
        response.headers_mut().insert("x-oroute-request-id", value);
    }
}

/// Compute final timings, emit metrics, fire the failure notification and
/// hand the record to the audit sink. Called exactly once per request.
fn seal_and_dispatch(state: &CoreState, mut record: RequestRecord, started: Instant) {
    recorder::seal(&mut record, started);
    info!(
        event = "request_finished",
        status = record.status,
        model = %record.model,
        upstream = %record.upstream_endpoint,
        elapsed_ms = record.elapsed_ms
    );
    state.metrics.record_request(record.status);
    if record.status != 200 {
        state.notifier.notify(format!(
            "IP: {} request {} error {} with {}",
            record.ip, record.model, record.status, record.response
        ));
    }
    state.sink.persist(record);
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string()
}

fn headers_to_json(headers: &HeaderMap) -> String {
    let mut map = serde_json::Map::new();
    for (name, value) in headers.iter() {
        if let Ok(value) = value.to_str() {
            map.insert(
                name.to_string(),
                serde_json::Value::String(value.to_string()),
            );
        }
    }
    serde_json::Value::Object(map).to_string()
}
