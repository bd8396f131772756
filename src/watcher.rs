//! The watcher pipeline: cursor-based resumable polling, two-stage batch
//! correlation, concurrent per-item verification, and serialized
//! failure-record persistence.

pub mod backoff;
pub mod correlator;
pub mod dispatcher;
pub mod poller;
pub mod recorder;
