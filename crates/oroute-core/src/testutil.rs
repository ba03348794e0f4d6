use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};

use oroute_common::{GatewayConfig, RequestRecord, Upstream, UpstreamKind};
use oroute_storage::AuditSink;

use crate::core::{Core, CoreState};
use crate::engine::ProxyEngine;
use crate::notify::Notifier;
use crate::upstream_client::{
    UpstreamClient, UpstreamFailure, UpstreamHttpRequest, UpstreamHttpResponse,
};

/// Scripted behavior for one `send` call on the stub client.
pub(crate) enum Plan {
    Reply {
        status: u16,
        content_type: &'static str,
        /// (delay before the chunk, chunk bytes)
        chunks: Vec<(u64, &'static str)>,
    },
    Hang,
    ConnectError,
}

pub(crate) struct StubClient {
    plans: Mutex<VecDeque<Plan>>,
    pub seen: Mutex<Vec<UpstreamHttpRequest>>,
}

impl StubClient {
    pub fn new(plans: Vec<Plan>) -> Arc<Self> {
        Arc::new(Self {
            plans: Mutex::new(plans.into()),
            seen: Mutex::new(Vec::new()),
        })
    }
}

impl UpstreamClient for StubClient {
    fn send<'a>(
        &'a self,
        req: UpstreamHttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamHttpResponse, UpstreamFailure>> + Send + 'a>>
    {
        self.seen.lock().unwrap().push(req.clone());
        let plan = self.plans.lock().unwrap().pop_front();
        Box::pin(async move {
            match plan {
                None | Some(Plan::ConnectError) => {
                    Err(UpstreamFailure::Connect("connection refused".to_string()))
                }
                Some(Plan::Hang) => {
                    futures_util::future::pending::<()>().await;
                    unreachable!()
                }
                Some(Plan::Reply {
                    status,
                    content_type,
                    chunks,
                }) => {
                    let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(16);
                    tokio::spawn(async move {
                        for (delay_ms, chunk) in chunks {
                            if delay_ms > 0 {
                                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                            }
                            if tx.send(Bytes::from_static(chunk.as_bytes())).await.is_err() {
                                break;
                            }
                        }
                    });
                    let mut headers = HeaderMap::new();
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
                    Ok(UpstreamHttpResponse {
                        status: StatusCode::from_u16(status).unwrap(),
                        headers,
                        body: rx,
                    })
                }
            }
        })
    }
}

#[derive(Clone, Default)]
pub(crate) struct CaptureSink {
    pub records: Arc<Mutex<Vec<RequestRecord>>>,
}

impl AuditSink for CaptureSink {
    fn persist(&self, record: RequestRecord) {
        self.records.lock().unwrap().push(record);
    }
}

impl CaptureSink {
    /// The record lands from a detached task on streaming paths; poll for it.
    pub async fn wait_for_record(&self) -> RequestRecord {
        for _ in 0..200 {
            if let Some(record) = self.records.lock().unwrap().first().cloned() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no record was persisted");
    }
}

#[derive(Clone, Default)]
pub(crate) struct CaptureNotifier {
    pub texts: Arc<Mutex<Vec<String>>>,
}

impl Notifier for CaptureNotifier {
    fn notify(&self, text: String) {
        self.texts.lock().unwrap().push(text);
    }
}

pub(crate) fn upstream(endpoint: &str) -> Upstream {
    Upstream {
        endpoint: endpoint.to_string(),
        secret: "sk".to_string(),
        kind: UpstreamKind::OpenAI,
        timeout: 2,
        stream_timeout: 2,
        allow: Vec::new(),
        deny: Vec::new(),
        authorization: String::new(),
        keep_header: false,
        noauth: false,
    }
}

pub(crate) fn state_with(
    upstreams: Vec<Upstream>,
    plans: Vec<Plan>,
) -> (Arc<CoreState>, Arc<StubClient>, CaptureSink, CaptureNotifier) {
    let config = GatewayConfig {
        upstreams,
        ..Default::default()
    };
    let client = StubClient::new(plans);
    let sink = CaptureSink::default();
    let notifier = CaptureNotifier::default();
    let core = Core::new(
        &config,
        false,
        ProxyEngine::new(client.clone()),
        Arc::new(sink.clone()),
        Arc::new(notifier.clone()),
    );
    (core.state(), client, sink, notifier)
}
