//! In-memory scripted collaborators for pipeline tests.

use anyhow::anyhow;
use futures::future::BoxFuture;
use proofwatch::{
    BulkContentProvider, ChainContext, Checkpoint, ContentBlob, FailedRecord, FailureReason,
    FeedPage, FeedProvider, ProofVerdict, ProofVerifier, ProviderError, ProviderFuture,
    Publication, ReadyItem, StoreFuture, TimestampProofs, VerificationOutcome, VerifyOptions,
    WatcherStore,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Cursor-keyed scripted feed. Pages are registered per pagination key; a key
/// with no page registered yields an empty page, which is what a drained feed
/// looks like to the watcher.
#[derive(Default)]
pub struct MockFeed {
    pages: Mutex<HashMap<Option<String>, FeedPage>>,
    calls: Mutex<Vec<Option<String>>>,
    fail_remaining: AtomicUsize,
    timeout_remaining: AtomicUsize,
}

impl MockFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_page(&self, cursor: Option<&str>, page: FeedPage) {
        self.pages
            .lock()
            .unwrap()
            .insert(cursor.map(str::to_owned), page);
    }

    /// Makes the next `count` fetches fail with a generic fault.
    pub fn fail_next(&self, count: usize) {
        self.fail_remaining.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` fetches report the timeout sentinel.
    pub fn timeout_next(&self, count: usize) {
        self.timeout_remaining.store(count, Ordering::SeqCst);
    }

    /// Pagination keys seen so far, in call order.
    pub fn calls(&self) -> Vec<Option<String>> {
        self.calls.lock().unwrap().clone()
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
            current.checked_sub(1)
        })
        .is_ok()
}

impl FeedProvider for MockFeed {
    fn fetch_page<'a>(
        &'a self,
        _environment: &'a str,
        _deployment: &'a str,
        checkpoint: &'a Checkpoint,
    ) -> ProviderFuture<'a, FeedPage> {
        Box::pin(async move {
            let key = checkpoint.as_key().map(str::to_owned);
            self.calls.lock().unwrap().push(key.clone());

            if take_one(&self.timeout_remaining) {
                return Err(ProviderError::Timeout { what: "feed" });
            }
            if take_one(&self.fail_remaining) {
                return Err(ProviderError::Failed(anyhow!("feed unavailable")));
            }

            Ok(self
                .pages
                .lock()
                .unwrap()
                .get(&key)
                .cloned()
                .unwrap_or_else(FeedPage::empty))
        })
    }
}

/// Id-keyed blob store that answers bulk fetches in request order.
#[derive(Default)]
pub struct MockContent {
    blobs: Mutex<HashMap<String, ContentBlob>>,
    calls: Mutex<Vec<Vec<String>>>,
    timeout_remaining: AtomicUsize,
}

impl MockContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, blob: ContentBlob) {
        self.blobs.lock().unwrap().insert(blob.id.clone(), blob);
    }

    pub fn timeout_next(&self, count: usize) {
        self.timeout_remaining.store(count, Ordering::SeqCst);
    }

    /// Requested id lists, one entry per bulk call.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

impl BulkContentProvider for MockContent {
    fn fetch_bulk<'a>(&'a self, ids: &'a [String]) -> ProviderFuture<'a, Vec<ContentBlob>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(ids.to_vec());

            if take_one(&self.timeout_remaining) {
                return Err(ProviderError::Timeout { what: "bulk content" });
            }

            let blobs = self.blobs.lock().unwrap();
            ids.iter()
                .map(|id| {
                    blobs
                        .get(id)
                        .cloned()
                        .ok_or_else(|| ProviderError::Failed(anyhow!("unknown blob id {id}")))
                })
                .collect()
        })
    }
}

/// Scripted verdict per item id. Unscripted ids verify as valid.
pub enum VerdictScript {
    Valid,
    Invalid(FailureReason),
    Fault(String),
}

#[derive(Default)]
pub struct MockVerifier {
    scripts: Mutex<HashMap<String, VerdictScript>>,
    /// Timestamp-proof payload each item was verified against, keyed by id.
    seen_proofs: Mutex<HashMap<String, TimestampProofs>>,
    calls: AtomicUsize,
}

impl MockVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, id: &str, verdict: VerdictScript) {
        self.scripts.lock().unwrap().insert(id.to_owned(), verdict);
    }

    pub fn seen_proofs(&self, id: &str) -> Option<TimestampProofs> {
        self.seen_proofs.lock().unwrap().get(id).cloned()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProofVerifier for MockVerifier {
    fn verify<'a>(
        &'a self,
        item: &'a ReadyItem,
        _chain: &'a ChainContext,
        _options: VerifyOptions,
    ) -> BoxFuture<'a, anyhow::Result<ProofVerdict>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_proofs
                .lock()
                .unwrap()
                .insert(item.id.clone(), item.timestamp_proofs.clone());

            match self.scripts.lock().unwrap().get(&item.id) {
                None | Some(VerdictScript::Valid) => {
                    Ok(ProofVerdict::Valid(item.publication.clone()))
                }
                Some(VerdictScript::Invalid(reason)) => Ok(ProofVerdict::Invalid(*reason)),
                Some(VerdictScript::Fault(detail)) => Err(anyhow!("{}", detail.clone())),
            }
        })
    }
}

/// In-memory store with fault injection for checkpoint writes and loads.
#[derive(Default)]
pub struct MemoryStore {
    results: Mutex<HashMap<String, VerificationOutcome>>,
    failed_records: Mutex<Vec<FailedRecord>>,
    checkpoint: Mutex<Option<String>>,
    publication_metadata: Mutex<HashMap<String, Publication>>,
    proofs_metadata: Mutex<HashMap<String, TimestampProofs>>,
    checkpoint_write_failures: AtomicUsize,
    checkpoint_load_fails: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_checkpoint(cursor: &str) -> Self {
        let store = Self::default();
        *store.checkpoint.lock().unwrap() = Some(cursor.to_owned());
        store
    }

    pub fn fail_next_checkpoint_writes(&self, count: usize) {
        self.checkpoint_write_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_checkpoint_loads(&self, count: usize) {
        self.checkpoint_load_fails.store(count, Ordering::SeqCst);
    }

    pub fn result(&self, id: &str) -> Option<VerificationOutcome> {
        self.results.lock().unwrap().get(id).cloned()
    }

    pub fn results(&self) -> HashMap<String, VerificationOutcome> {
        self.results.lock().unwrap().clone()
    }

    pub fn failed_records(&self) -> Vec<FailedRecord> {
        self.failed_records.lock().unwrap().clone()
    }

    pub fn checkpoint(&self) -> Option<String> {
        self.checkpoint.lock().unwrap().clone()
    }

    pub fn publication_metadata(&self, id: &str) -> Option<Publication> {
        self.publication_metadata.lock().unwrap().get(id).cloned()
    }

    pub fn proofs_metadata(&self, id: &str) -> Option<TimestampProofs> {
        self.proofs_metadata.lock().unwrap().get(id).cloned()
    }
}

impl WatcherStore for MemoryStore {
    fn save_result<'a>(
        &'a self,
        id: &'a str,
        outcome: &'a VerificationOutcome,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.results
                .lock()
                .unwrap()
                .insert(id.to_owned(), outcome.clone());
            Ok(())
        })
    }

    fn save_failed_record<'a>(&'a self, record: &'a FailedRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.failed_records.lock().unwrap().push(record.clone());
            Ok(())
        })
    }

    fn save_checkpoint<'a>(&'a self, cursor: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if take_one(&self.checkpoint_write_failures) {
                anyhow::bail!("checkpoint write rejected");
            }
            *self.checkpoint.lock().unwrap() = Some(cursor.to_owned());
            Ok(())
        })
    }

    fn load_last_checkpoint(&self) -> StoreFuture<'_, Option<String>> {
        Box::pin(async move {
            if take_one(&self.checkpoint_load_fails) {
                anyhow::bail!("checkpoint store unreadable");
            }
            Ok(self.checkpoint.lock().unwrap().clone())
        })
    }

    fn save_publication_metadata<'a>(
        &'a self,
        id: &'a str,
        publication: &'a Publication,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.publication_metadata
                .lock()
                .unwrap()
                .insert(id.to_owned(), publication.clone());
            Ok(())
        })
    }

    fn save_timestamp_proofs_metadata<'a>(
        &'a self,
        id: &'a str,
        proofs: &'a TimestampProofs,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.proofs_metadata
                .lock()
                .unwrap()
                .insert(id.to_owned(), proofs.clone());
            Ok(())
        })
    }
}
