use std::sync::Arc;

use tracing::warn;

use oroute_common::RequestRecord;

use crate::bus::RecordBus;

/// Where finished request records go. `persist` is best-effort and must
/// never block the request path.
pub trait AuditSink: Send + Sync {
    fn persist(&self, record: RequestRecord);
}

pub type SharedAuditSink = Arc<dyn AuditSink>;

impl AuditSink for RecordBus {
    fn persist(&self, record: RequestRecord) {
        if self.tx.try_send(record).is_err() {
            warn!(event = "record_dropped", "audit queue full, dropping record");
        }
    }
}

/// Installed when persistence is disabled (`dbtype: none`).
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn persist(&self, _record: RequestRecord) {}
}
