//! Serialized persistence of failed-verification records.
//!
//! Dispatcher tasks for a page run concurrently and several may fail at once;
//! the append target must never see interleaved writes. All records flow
//! through one channel drained by a single writer task, so appends happen one
//! at a time and `record` never blocks the verification path.

use crate::runtime::contracts::WatcherStore;
use crate::runtime::telemetry::Telemetry;
use anyhow::Result;
use crate::model::outcome::FailedRecord;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Non-blocking handle used by dispatcher tasks to queue failed records.
#[derive(Clone)]
pub struct FailureRecorder {
    tx: mpsc::UnboundedSender<FailedRecord>,
}

/// Owns the drain task; joined at shutdown so queued records are flushed.
pub struct RecorderHandle {
    handle: JoinHandle<()>,
}

impl FailureRecorder {
    /// Spawns the single writer task and returns the sender handle plus the
    /// join handle the watcher keeps for shutdown draining.
    pub fn spawn(
        store: Arc<dyn WatcherStore>,
        telemetry: Arc<Telemetry>,
    ) -> (Self, RecorderHandle) {
        let (tx, mut rx) = mpsc::unbounded_channel::<FailedRecord>();

        let handle = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                match store.save_failed_record(&record).await {
                    Ok(()) => {
                        telemetry.record_appended_record();
                        tracing::debug!(
                            item_id = %record.item_id,
                            reason = %record.reason,
                            submitter = %record.submitter,
                            "failed submission saved"
                        );
                    }
                    Err(err) => {
                        telemetry.record_record_write_error();
                        tracing::error!(
                            item_id = %record.item_id,
                            error = %err,
                            "failed to append failure record"
                        );
                    }
                }
            }
            tracing::debug!("failure recorder drained; writer task exiting");
        });

        (Self { tx }, RecorderHandle { handle })
    }

    /// Queues a record for durable append. Never blocks; ordering of appends
    /// follows queue order.
    pub fn record(&self, record: FailedRecord) {
        if self.tx.send(record).is_err() {
            tracing::error!("failure recorder is gone; dropping record");
        }
    }
}

impl RecorderHandle {
    /// Waits for the writer to drain every queued record. All
    /// [`FailureRecorder`] clones must be dropped first or this never returns.
    pub async fn drain(self) -> Result<()> {
        self.handle.await?;
        Ok(())
    }
}
