use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;
use tracing::warn;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub status: u32,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct AttemptLabels {
    pub endpoint: String,
    pub outcome: String,
}

pub struct Metrics {
    requests: Family<RequestLabels, Counter>,
    upstream_attempts: Family<AttemptLabels, Counter>,
}

impl Metrics {
    pub fn new(registry: &mut Registry) -> Self {
        let requests = Family::default();
        registry.register(
            "requests",
            "The total number of client requests served",
            requests.clone(),
        );

        let upstream_attempts = Family::default();
        registry.register(
            "upstream_attempts",
            "The total number of upstream dispatch attempts",
            upstream_attempts.clone(),
        );

        Self {
            requests,
            upstream_attempts,
        }
    }

    pub fn record_request(&self, status: u16) {
        self.requests
            .get_or_create(&RequestLabels {
                status: status as u32,
            })
            .inc();
    }

    pub fn record_attempt(&self, endpoint: &str, outcome: &str) {
        self.upstream_attempts
            .get_or_create(&AttemptLabels {
                endpoint: endpoint.to_string(),
                outcome: outcome.to_string(),
            })
            .inc();
    }
}

/// Encode the registry in the Prometheus text format.
pub fn render(registry: &Registry) -> String {
    let mut out = String::new();
    if let Err(err) = encode(&mut out, registry) {
        warn!(event = "metrics_encode_failed", error = %err);
    }
    out
}
