pub mod model;
pub mod runtime;
pub mod watcher;

pub use model::content::{
    encode_json_payload, ContentBlob, CorrelatedItem, Publication, ReadyItem, TimestampProofs,
};
pub use model::feed::{Checkpoint, FeedEntry, FeedPage};
pub use model::outcome::{FailedRecord, FailureReason, VerificationOutcome};
pub use runtime::config::{WatcherConfig, WatcherConfigBuilder, WatcherConfigParams};
pub use runtime::contracts::{
    BulkContentProvider, ChainContext, FeedProvider, ProofVerdict, ProofVerifier, ProviderError,
    ProviderFuture, StoreFuture, StreamSink, VerifyOptions, WatcherStore,
};
pub use runtime::progress::WatcherProgress;
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use watcher::correlator::Correlator;
pub use watcher::dispatcher::{Dispatcher, DispatcherParams};
pub use watcher::poller::{Collaborators, Watcher};
pub use watcher::recorder::{FailureRecorder, RecorderHandle};
