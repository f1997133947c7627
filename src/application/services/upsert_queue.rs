use crate::ingestion::domain::{timestamp_value, Document, WriteMode, WriteRequest};
use crate::ports::outbound::{DocumentStore, WriteOperation};
use crate::shared::Result;
use anyhow::Context;
use chrono::Utc;
use futures::FutureExt;
use serde_json::Value;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::Notify;

const FIELD_CREATED_AT: &str = "created_at";
const FIELD_UPDATED_AT: &str = "updated_at";

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<WriteRequest>,
    writer_active: bool,
}

#[derive(Debug, Default)]
struct QueueCounters {
    applied_batches: AtomicUsize,
    failed_batches: AtomicUsize,
    written_records: AtomicUsize,
    skipped_records: AtomicUsize,
}

/// Point-in-time counters of an [`UpsertQueue`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub applied_batches: usize,
    pub failed_batches: usize,
    pub written_records: usize,
    pub skipped_records: usize,
}

struct QueueInner {
    store: Arc<dyn DocumentStore>,
    state: Mutex<QueueState>,
    idle: Notify,
    counters: QueueCounters,
}

impl QueueInner {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// UpsertQueue serializes write requests from every source into bulk calls.
///
/// `enqueue` appends to an in-memory FIFO and starts a writer task when none
/// is running. The writer drains the FIFO one request at a time and exits as
/// soon as it finds it empty, so at most one writer exists and requests are
/// applied in enqueue order.
///
/// Each request becomes one bulk call. A failed or panicking call is logged
/// and its batch dropped; the writer moves on to the next request. Pending
/// requests are lost if the process exits before they are drained.
///
/// Cloning is cheap; clones share the same FIFO and writer.
#[derive(Clone)]
pub struct UpsertQueue {
    inner: Arc<QueueInner>,
    runtime: Handle,
}

impl UpsertQueue {
    /// Creates a queue bound to the current Tokio runtime
    ///
    /// # Errors
    /// Returns an error when called outside a Tokio runtime.
    pub fn new(store: Arc<dyn DocumentStore>) -> Result<Self> {
        let runtime = Handle::try_current()
            .context("The upsert queue must be created inside a Tokio runtime")?;
        Ok(Self {
            inner: Arc::new(QueueInner {
                store,
                state: Mutex::new(QueueState::default()),
                idle: Notify::new(),
                counters: QueueCounters::default(),
            }),
            runtime,
        })
    }

    /// Appends a request without waiting for it to be written
    pub fn enqueue(&self, request: WriteRequest) {
        if request.is_empty() {
            tracing::debug!(collection = %request.collection, "Ignoring empty write request");
            return;
        }

        let start_writer = {
            let mut state = self.inner.lock_state();
            state.pending.push_back(request);
            if state.writer_active {
                false
            } else {
                state.writer_active = true;
                true
            }
        };

        if start_writer {
            tracing::trace!("Starting queue writer");
            self.runtime.spawn(drain(self.inner.clone()));
        }
    }

    /// Convenience for the common case: field-level merge on `key_field`
    pub fn enqueue_merge(&self, collection: &str, records: Vec<Document>, key_field: &str) {
        self.enqueue(WriteRequest::merge(collection, records, key_field));
    }

    /// Number of requests waiting for the writer
    pub fn pending(&self) -> usize {
        self.inner.lock_state().pending.len()
    }

    pub fn is_idle(&self) -> bool {
        let state = self.inner.lock_state();
        !state.writer_active && state.pending.is_empty()
    }

    /// Waits until every request enqueued so far has been applied or dropped
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    pub fn stats(&self) -> QueueStats {
        let counters = &self.inner.counters;
        QueueStats {
            applied_batches: counters.applied_batches.load(Ordering::Relaxed),
            failed_batches: counters.failed_batches.load(Ordering::Relaxed),
            written_records: counters.written_records.load(Ordering::Relaxed),
            skipped_records: counters.skipped_records.load(Ordering::Relaxed),
        }
    }
}

/// Writer loop; exits when the FIFO is empty
async fn drain(inner: Arc<QueueInner>) {
    loop {
        let next = {
            let mut state = inner.lock_state();
            match state.pending.pop_front() {
                Some(request) => request,
                None => {
                    state.writer_active = false;
                    break;
                }
            }
        };
        let collection = next.collection.clone();
        if AssertUnwindSafe(apply(&inner, next))
            .catch_unwind()
            .await
            .is_err()
        {
            inner.counters.failed_batches.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                collection = %collection,
                "Write batch panicked, batch dropped"
            );
        }
    }

    tracing::trace!("Queue writer idle");
    inner.idle.notify_waiters();
}

async fn apply(inner: &QueueInner, request: WriteRequest) {
    let WriteRequest {
        collection,
        records,
        mode,
    } = request;
    let record_count = records.len();
    let (operations, skipped) = build_operations(records, &mode, timestamp_value(Utc::now()));

    if skipped > 0 {
        inner
            .counters
            .skipped_records
            .fetch_add(skipped, Ordering::Relaxed);
        tracing::warn!(
            collection = %collection,
            skipped,
            "Skipped records without a key value"
        );
    }
    if operations.is_empty() {
        return;
    }

    match inner.store.bulk_write(&collection, operations).await {
        Ok(summary) => {
            inner.counters.applied_batches.fetch_add(1, Ordering::Relaxed);
            inner
                .counters
                .written_records
                .fetch_add(summary.total(), Ordering::Relaxed);
            tracing::debug!(
                collection = %collection,
                records = record_count,
                inserted = summary.inserted,
                updated = summary.updated,
                "Applied write batch"
            );
        }
        Err(err) => {
            inner.counters.failed_batches.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                collection = %collection,
                records = record_count,
                error = %format!("{:#}", err),
                "Bulk write failed, batch dropped"
            );
        }
    }
}

/// Turns queued records into store operations stamped with `now`.
///
/// Returns the operations plus the number of merge records skipped for lacking
/// a usable key value.
fn build_operations(
    records: Vec<Document>,
    mode: &WriteMode,
    now: Value,
) -> (Vec<WriteOperation>, usize) {
    let mut operations = Vec::with_capacity(records.len());
    let mut skipped = 0;

    for mut record in records {
        match mode {
            WriteMode::Merge { key_field } => {
                let key_value = match record.get(key_field) {
                    Some(value) if !value.is_null() => value.clone(),
                    _ => {
                        skipped += 1;
                        continue;
                    }
                };
                record.remove(FIELD_CREATED_AT);
                record.insert(FIELD_UPDATED_AT.to_string(), now.clone());

                let mut set_on_insert = Document::new();
                set_on_insert.insert(FIELD_CREATED_AT.to_string(), now.clone());

                operations.push(WriteOperation::Upsert {
                    key_field: key_field.clone(),
                    key_value,
                    set: record,
                    set_on_insert,
                });
            }
            WriteMode::Insert => {
                record.insert(FIELD_CREATED_AT.to_string(), now.clone());
                record.insert(FIELD_UPDATED_AT.to_string(), now.clone());
                operations.push(WriteOperation::Insert { document: record });
            }
        }
    }

    (operations, skipped)
}
