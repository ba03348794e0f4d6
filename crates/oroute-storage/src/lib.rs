pub mod bus;
pub mod entities;
pub mod sink;
pub mod storage;

pub use bus::{RecordBus, RecordBusConfig};
pub use sink::{AuditSink, NoopAuditSink, SharedAuditSink};
pub use storage::{dsn_for, RecordStorage, StorageError};
