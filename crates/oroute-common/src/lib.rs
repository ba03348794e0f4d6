use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const DEFAULT_ADDRESS: &str = ":8888";
pub const DEFAULT_DB_TYPE: &str = "sqlite";
pub const DEFAULT_DB_ADDR: &str = "./db.sqlite";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_STREAM_TIMEOUT_SECS: u64 = 10;

/// Timeout applied when only one upstream remains: the last try gets the
/// longest leash before the request is given up entirely.
pub const SINGLE_CANDIDATE_TIMEOUT_SECS: u64 = 120;

/// Request bodies larger than this are cleared from the record before it is
/// persisted.
pub const MAX_RECORDED_BODY_BYTES: usize = 512 * 1024;

/// Secret sentinel: forward the client's Authorization header verbatim
/// instead of injecting our own.
pub const SECRET_ASIS: &str = "asis";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("can't parse upstream endpoint URL '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("replicate upstream '{0}' requires a non-empty secret")]
    MissingSecret(String),
    #[error("unsupported database type '{0}'")]
    UnknownDbType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamKind {
    #[default]
    OpenAI,
    Replicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LbPolicy {
    #[default]
    Order,
    Random,
}

/// One configured upstream. Loaded once at startup and immutable for the
/// process lifetime; timeouts and the authorization list inherit global
/// defaults during config normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upstream {
    pub endpoint: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default, rename = "type")]
    pub kind: UpstreamKind,
    /// Seconds before giving up on response headers; 0 means "inherit".
    #[serde(default)]
    pub timeout: u64,
    /// Headers timeout applied when the inbound request asked for a stream.
    #[serde(default)]
    pub stream_timeout: u64,
    /// Model allow list; empty allows every model.
    #[serde(default)]
    pub allow: Vec<String>,
    /// Model deny list, applied after `allow`.
    #[serde(default)]
    pub deny: Vec<String>,
    /// Comma-separated client tokens admitted to this upstream; empty
    /// inherits the global list.
    #[serde(default)]
    pub authorization: String,
    /// Forward the inbound headers instead of starting from an empty set.
    #[serde(default)]
    pub keep_header: bool,
    /// Admit requests without checking the Authorization header.
    #[serde(default)]
    pub noauth: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub address: String,
    /// Overrides the system hostname stored in records.
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub dbtype: String,
    #[serde(default)]
    pub dbaddr: String,
    /// Default comma-separated client token list.
    #[serde(default)]
    pub authorization: String,
    #[serde(default)]
    pub timeout: u64,
    #[serde(default)]
    pub stream_timeout: u64,
    #[serde(default)]
    pub lb_policy: LbPolicy,
    #[serde(default)]
    pub upstreams: Vec<Upstream>,
}

/// Audit row for one client request. Created when the request arrives,
/// mutated by the dispatch pipeline, handed to the audit sink exactly once
/// when the exchange terminates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub created_at: OffsetDateTime,
    pub hostname: String,
    pub ip: String,
    pub user_agent: String,
    /// The Authorization header exactly as received.
    pub authorization: String,
    pub model: String,
    pub body: String,
    pub upstream_endpoint: String,
    pub upstream_secret: String,
    /// HTTP status returned to the client, or synthesized on failure.
    pub status: u16,
    /// Extracted assistant text, or the accumulated error text.
    pub response: String,
    /// Latency until upstream response headers arrived.
    pub response_time_ms: i64,
    /// Total wall time for the exchange.
    pub elapsed_ms: i64,
    /// Client request headers as a JSON object string.
    pub headers: String,
}

impl RequestRecord {
    pub fn new(hostname: String, ip: String) -> Self {
        Self {
            created_at: OffsetDateTime::now_utc(),
            hostname,
            ip,
            user_agent: String::new(),
            authorization: String::new(),
            model: String::new(),
            body: String::new(),
            upstream_endpoint: String::new(),
            upstream_secret: String::new(),
            status: 0,
            response: String::new(),
            response_time_ms: 0,
            elapsed_ms: 0,
            headers: String::new(),
        }
    }
}
