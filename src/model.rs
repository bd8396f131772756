//! Data model for the watcher pipeline: feed pages and checkpoints, decoded
//! publication payloads, and terminal verification verdicts.

pub mod content;
pub mod feed;
pub mod outcome;

pub use content::{ContentBlob, CorrelatedItem, Publication, ReadyItem, TimestampProofs};
pub use feed::{Checkpoint, FeedEntry, FeedPage};
pub use outcome::{FailedRecord, FailureReason, VerificationOutcome};
