//! Collaborator contracts consumed by the pipeline. The feed, bulk content
//! retrieval, proof verification, and storage are external concerns; the
//! watcher only depends on these trait seams and is driven entirely through
//! `Arc<dyn _>` handles.

use crate::model::content::{ContentBlob, Publication, ReadyItem, TimestampProofs};
use crate::model::feed::{Checkpoint, FeedPage};
use crate::model::outcome::{FailedRecord, FailureReason, VerificationOutcome};
use futures::future::BoxFuture;
use std::sync::Arc;

/// Error surfaced by the feed and bulk content providers. A timeout is a
/// distinguished recoverable condition: the poll loop backs off and retries
/// with the same checkpoint instead of treating it as a fault.
#[derive(Debug)]
pub enum ProviderError {
    Timeout { what: &'static str },
    Failed(anyhow::Error),
}

impl ProviderError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProviderError::Timeout { .. })
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::Timeout { what } => write!(f, "provider {what} request timed out"),
            ProviderError::Failed(err) => write!(f, "provider request failed: {err}"),
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProviderError::Timeout { .. } => None,
            ProviderError::Failed(err) => Some(err.as_ref()),
        }
    }
}

impl From<anyhow::Error> for ProviderError {
    fn from(err: anyhow::Error) -> Self {
        ProviderError::Failed(err)
    }
}

pub type ProviderFuture<'a, T> = BoxFuture<'a, Result<T, ProviderError>>;
pub type StoreFuture<'a, T> = BoxFuture<'a, anyhow::Result<T>>;

/// Network/chain descriptor handed to the verifier with every item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainContext {
    pub environment: String,
    pub deployment: String,
    pub node_url: String,
}

/// Per-call verification options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Enables pointer-style cross-checks against referenced publications.
    pub verify_pointer: bool,
}

/// Discriminated verification result. Expected rule violations come back as
/// `Invalid`; an `Err` from [`ProofVerifier::verify`] means the verifier
/// itself faulted and the item settles with the reserved unknown reason.
#[derive(Debug, Clone, PartialEq)]
pub enum ProofVerdict {
    Valid(Publication),
    Invalid(FailureReason),
}

/// The remote transaction-discovery stream.
pub trait FeedProvider: Send + Sync {
    fn fetch_page<'a>(
        &'a self,
        environment: &'a str,
        deployment: &'a str,
        checkpoint: &'a Checkpoint,
    ) -> ProviderFuture<'a, FeedPage>;
}

/// Bulk retrieval of raw stored payloads by id. The success list preserves
/// input ordering; the correlator depends on that contract.
pub trait BulkContentProvider: Send + Sync {
    fn fetch_bulk<'a>(&'a self, ids: &'a [String]) -> ProviderFuture<'a, Vec<ContentBlob>>;
}

/// The external proof-verification capability.
pub trait ProofVerifier: Send + Sync {
    fn verify<'a>(
        &'a self,
        item: &'a ReadyItem,
        chain: &'a ChainContext,
        options: VerifyOptions,
    ) -> BoxFuture<'a, anyhow::Result<ProofVerdict>>;
}

/// Durable storage consumed by the pipeline. Each call is individually
/// atomic; no cross-call transaction is required.
pub trait WatcherStore: Send + Sync {
    /// Idempotent upsert keyed by item id.
    fn save_result<'a>(
        &'a self,
        id: &'a str,
        outcome: &'a VerificationOutcome,
    ) -> StoreFuture<'a, ()>;

    fn save_failed_record<'a>(&'a self, record: &'a FailedRecord) -> StoreFuture<'a, ()>;

    fn save_checkpoint<'a>(&'a self, cursor: &'a str) -> StoreFuture<'a, ()>;

    fn load_last_checkpoint(&self) -> StoreFuture<'_, Option<String>>;

    fn save_publication_metadata<'a>(
        &'a self,
        id: &'a str,
        publication: &'a Publication,
    ) -> StoreFuture<'a, ()>;

    fn save_timestamp_proofs_metadata<'a>(
        &'a self,
        id: &'a str,
        proofs: &'a TimestampProofs,
    ) -> StoreFuture<'a, ()>;
}

/// Optional push callback invoked at most once per item, after persistence.
pub type StreamSink = Arc<dyn Fn(&VerificationOutcome) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn timeout_is_distinguished_from_failure() {
        let timeout = ProviderError::Timeout { what: "feed" };
        assert!(timeout.is_timeout());
        assert!(format!("{timeout}").contains("feed"));

        let failed = ProviderError::Failed(anyhow!("boom"));
        assert!(!failed.is_timeout());
        assert!(format!("{failed}").contains("boom"));
    }
}
