use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self as tokio_time, MissedTickBehavior};
use tracing::warn;

use oroute_common::RequestRecord;

use crate::storage::RecordStorage;

#[derive(Debug, Clone)]
pub struct RecordBusConfig {
    pub capacity: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub retry_delay: Duration,
}

impl Default for RecordBusConfig {
    fn default() -> Self {
        Self {
            capacity: 4096,
            batch_size: 64,
            flush_interval: Duration::from_millis(200),
            retry_delay: Duration::from_millis(200),
        }
    }
}

/// Detached writer for request records. Enqueueing is non-blocking; the
/// writer batches inserts and retries on database errors so a slow sink can
/// never fail a request.
pub struct RecordBus {
    pub tx: mpsc::Sender<RequestRecord>,
    _handle: JoinHandle<()>,
}

impl RecordBus {
    pub fn spawn(storage: RecordStorage, config: RecordBusConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.capacity);
        let handle = tokio::spawn(record_writer(
            storage,
            rx,
            config.batch_size,
            config.flush_interval,
            config.retry_delay,
        ));
        Self {
            tx,
            _handle: handle,
        }
    }
}

async fn record_writer(
    storage: RecordStorage,
    mut rx: mpsc::Receiver<RequestRecord>,
    batch_size: usize,
    flush_interval: Duration,
    retry_delay: Duration,
) {
    let mut buffer = Vec::with_capacity(batch_size);
    let mut ticker = tokio_time::interval(flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            Some(record) = rx.recv() => {
                buffer.push(record);
                if buffer.len() >= batch_size {
                    flush_records(&storage, &mut buffer, retry_delay).await;
                }
            }
            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    flush_records(&storage, &mut buffer, retry_delay).await;
                }
            }
            else => {
                if !buffer.is_empty() {
                    flush_records(&storage, &mut buffer, retry_delay).await;
                }
                break;
            }
        }
    }
}

async fn flush_records(
    storage: &RecordStorage,
    buffer: &mut Vec<RequestRecord>,
    retry_delay: Duration,
) {
    let mut batch = Vec::new();
    std::mem::swap(buffer, &mut batch);

    loop {
        match storage.insert_records(batch.clone()).await {
            Ok(()) => break,
            Err(err) => {
                warn!(event = "record_write_failed", error = %err);
                tokio_time::sleep(retry_delay).await;
            }
        }
    }
}
