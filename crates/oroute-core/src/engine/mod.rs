use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};

use oroute_common::{RequestRecord, Upstream, UpstreamKind};
use oroute_protocol::openai::ChatRequestProbe;

use crate::error::ProxyFailure;
use crate::policy;
use crate::upstream_client::{ByteStream, UpstreamClient};

mod openai;
mod replicate;

/// Everything one candidate attempt needs from the inbound request. The
/// body lives here as `Bytes`, so every retry forwards exactly the bytes the
/// first attempt saw without touching the client stream again.
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub probe: ChatRequestProbe,
    pub started: Instant,
}

/// A committed upstream response, ready to relay.
pub enum ProxyOutcome {
    /// Fully buffered body, forwarded verbatim.
    Buffered {
        status: StatusCode,
        headers: HeaderMap,
        content_type: String,
        body: Bytes,
    },
    /// Live body; chunks are forwarded (and teed for the recorder) as they
    /// arrive.
    Streaming {
        status: StatusCode,
        headers: HeaderMap,
        content_type: String,
        body: ByteStream,
    },
}

pub struct ProxyEngine {
    client: Arc<dyn UpstreamClient>,
}

impl ProxyEngine {
    pub fn new(client: Arc<dyn UpstreamClient>) -> Self {
        Self { client }
    }

    /// Run one candidate to completion. Nothing is written to the client
    /// from here: failures come back as values so the failover loop decides
    /// who gets to respond.
    pub async fn dispatch(
        &self,
        upstream: &Upstream,
        ctx: &RequestContext,
        record: &mut RequestRecord,
    ) -> Result<ProxyOutcome, ProxyFailure> {
        if upstream.secret.is_empty() {
            return Err(ProxyFailure::Invalid(format!(
                "invalid secret key for upstream '{}'",
                upstream.endpoint
            )));
        }
        policy::check_model(upstream, &ctx.probe.model)?;

        match upstream.kind {
            UpstreamKind::OpenAI => {
                openai::forward(self.client.as_ref(), upstream, ctx, record).await
            }
            UpstreamKind::Replicate => {
                replicate::forward(self.client.as_ref(), upstream, ctx, record).await
            }
        }
    }
}
