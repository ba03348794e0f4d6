use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};

/// Upstream response bytes, delivered as they arrive. The channel closing
/// marks end-of-body; a mid-body transport error is surfaced as truncation,
/// exactly what a client streaming through us would observe anyway.
pub type ByteStream = tokio::sync::mpsc::Receiver<Bytes>;

#[derive(Debug, Clone)]
pub struct UpstreamHttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

#[derive(Debug)]
pub struct UpstreamHttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

/// Transport-level failure: no response headers were received.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamFailure {
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("connect: {0}")]
    Connect(String),
    #[error("read: {0}")]
    Read(String),
    #[error("{0}")]
    Other(String),
}

/// Seam between the proxy engine and the HTTP stack. `send` resolves when
/// response headers arrive; the body streams afterwards, uncancelled.
pub trait UpstreamClient: Send + Sync {
    fn send<'a>(
        &'a self,
        req: UpstreamHttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamHttpResponse, UpstreamFailure>> + Send + 'a>>;
}

#[derive(Clone)]
pub struct WreqUpstreamClient {
    client: wreq::Client,
}

impl WreqUpstreamClient {
    pub fn new() -> Result<Self, wreq::Error> {
        let client = wreq::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { client })
    }
}

impl UpstreamClient for WreqUpstreamClient {
    fn send<'a>(
        &'a self,
        req: UpstreamHttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamHttpResponse, UpstreamFailure>> + Send + 'a>>
    {
        Box::pin(async move {
            let method = wreq_method(&req.method);
            let mut builder = self.client.request(method, &req.url);
            for (name, value) in &req.headers {
                builder = builder.header(name.as_str(), value.as_bytes());
            }
            if let Some(body) = req.body {
                builder = builder.body(body);
            }

            let response = builder.send().await.map_err(map_wreq_error)?;
            Ok(convert_response(response))
        })
    }
}

fn wreq_method(method: &Method) -> wreq::Method {
    match method.as_str() {
        "GET" => wreq::Method::GET,
        "PUT" => wreq::Method::PUT,
        "PATCH" => wreq::Method::PATCH,
        "DELETE" => wreq::Method::DELETE,
        _ => wreq::Method::POST,
    }
}

fn convert_response(response: wreq::Response) -> UpstreamHttpResponse {
    let status = StatusCode::from_u16(response.status().as_u16())
        .unwrap_or(StatusCode::BAD_GATEWAY);

    let mut headers = HeaderMap::new();
    for (name, value) in response.headers() {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_str()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            headers.append(name, value);
        }
    }

    let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(16);
    tokio::spawn(async move {
        let mut stream = response.bytes_stream();
        while let Some(item) = stream.next().await {
            let Ok(chunk) = item else {
                break;
            };
            if tx.send(chunk).await.is_err() {
                break;
            }
        }
    });

    UpstreamHttpResponse {
        status,
        headers,
        body: rx,
    }
}

fn map_wreq_error(err: wreq::Error) -> UpstreamFailure {
    let message = err.to_string();
    if err.is_timeout() {
        UpstreamFailure::Timeout(message)
    } else if err.is_connect() || err.is_connection_reset() {
        UpstreamFailure::Connect(message)
    } else if message.to_ascii_lowercase().contains("body") {
        UpstreamFailure::Read(message)
    } else {
        UpstreamFailure::Other(message)
    }
}

/// Drain a body stream into one buffer.
pub async fn collect(body: &mut ByteStream) -> Bytes {
    let mut buffer = BytesMut::new();
    while let Some(chunk) = body.recv().await {
        buffer.extend_from_slice(&chunk);
    }
    buffer.freeze()
}
