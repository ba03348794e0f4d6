use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use crate::upstream_client::UpstreamFailure;

/// Why a single candidate attempt failed. Everything except `ClientAborted`
/// lets the failover loop move on to the next candidate.
#[derive(Debug, thiserror::Error)]
pub enum ProxyFailure {
    #[error("client connection lost")]
    ClientAborted,
    #[error("Timeout upstream")]
    Timeout,
    #[error("upstream connect error: {0}")]
    Connect(String),
    #[error("upstream read error: {0}")]
    Read(String),
    #[error("model '{0}' not in upstream allow list")]
    ModelNotAllowed(String),
    #[error("model '{0}' in upstream deny list")]
    ModelDenied(String),
    #[error("upstream returned status {status}")]
    UpstreamStatus {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
    #[error("{0}")]
    Invalid(String),
}

impl ProxyFailure {
    /// Terminal failures stop the failover loop outright.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ClientAborted)
    }

    /// Status surfaced to the client when this failure ends the request.
    pub fn client_status(&self) -> StatusCode {
        match self {
            Self::UpstreamStatus { status, .. } => *status,
            Self::ClientAborted => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    /// Short tag for metrics and structured logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ClientAborted => "client_aborted",
            Self::Timeout => "timeout",
            Self::Connect(_) => "connect",
            Self::Read(_) => "read",
            Self::ModelNotAllowed(_) => "model_not_allowed",
            Self::ModelDenied(_) => "model_denied",
            Self::UpstreamStatus { .. } => "upstream_status",
            Self::Invalid(_) => "invalid",
        }
    }
}

impl From<UpstreamFailure> for ProxyFailure {
    fn from(failure: UpstreamFailure) -> Self {
        match failure {
            UpstreamFailure::Timeout(_) => Self::Timeout,
            UpstreamFailure::Connect(message) => Self::Connect(message),
            UpstreamFailure::Read(message) => Self::Read(message),
            UpstreamFailure::Other(message) => Self::Connect(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_client_abort_is_terminal() {
        assert!(ProxyFailure::ClientAborted.is_terminal());
        assert!(!ProxyFailure::Timeout.is_terminal());
        assert!(!ProxyFailure::Connect("x".to_string()).is_terminal());
        assert!(!ProxyFailure::ModelDenied("m".to_string()).is_terminal());
    }

    #[test]
    fn client_status_mapping() {
        assert_eq!(
            ProxyFailure::Timeout.client_status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ProxyFailure::ClientAborted.client_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let failure = ProxyFailure::UpstreamStatus {
            status: StatusCode::TOO_MANY_REQUESTS,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        };
        assert_eq!(failure.client_status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn timeout_message_matches_surfaced_error() {
        assert_eq!(ProxyFailure::Timeout.to_string(), "Timeout upstream");
    }
}
