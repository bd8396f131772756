use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Tracks the running count of fully processed pages and the last checkpoint
/// the loop persisted, readable from outside the polling task.
#[derive(Debug, Default)]
pub struct WatcherProgress {
    pages_processed: AtomicU64,
    last_checkpoint: Mutex<Option<String>>,
}

impl WatcherProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fully processed page and its persisted end cursor.
    pub fn mark_page(&self, end_cursor: Option<&str>) {
        self.pages_processed.fetch_add(1, Ordering::SeqCst);
        if let Some(cursor) = end_cursor {
            let mut slot = self.last_checkpoint.lock().expect("progress lock poisoned");
            *slot = Some(cursor.to_owned());
        }
    }

    pub fn pages_processed(&self) -> u64 {
        self.pages_processed.load(Ordering::SeqCst)
    }

    /// Last checkpoint persisted by the loop, if any page has completed.
    pub fn last_checkpoint(&self) -> Option<String> {
        self.last_checkpoint
            .lock()
            .expect("progress lock poisoned")
            .clone()
    }
}
