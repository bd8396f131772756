//! Concurrent per-item verification with partial-failure isolation.
//!
//! Every correlated item runs as its own task; the dispatcher returns only
//! once all of them have settled, which is what lets the polling loop advance
//! the checkpoint. One item's failure never aborts or delays its siblings,
//! and no item may be dropped silently: even a panicking task is settled as
//! an unknown-reason outcome.

use crate::model::content::{CorrelatedItem, ReadyItem};
use crate::model::outcome::VerificationOutcome;
use crate::runtime::contracts::{
    ChainContext, ProofVerdict, ProofVerifier, StreamSink, VerifyOptions, WatcherStore,
};
use crate::runtime::telemetry::Telemetry;
use crate::watcher::recorder::FailureRecorder;
use futures::future::join_all;
use std::sync::Arc;

pub struct Dispatcher {
    verifier: Arc<dyn ProofVerifier>,
    store: Arc<dyn WatcherStore>,
    recorder: FailureRecorder,
    telemetry: Arc<Telemetry>,
    chain: ChainContext,
    options: VerifyOptions,
    stream: Option<StreamSink>,
}

pub struct DispatcherParams {
    pub verifier: Arc<dyn ProofVerifier>,
    pub store: Arc<dyn WatcherStore>,
    pub recorder: FailureRecorder,
    pub telemetry: Arc<Telemetry>,
    pub chain: ChainContext,
    pub options: VerifyOptions,
    pub stream: Option<StreamSink>,
}

impl Dispatcher {
    pub fn new(params: DispatcherParams) -> Self {
        let DispatcherParams {
            verifier,
            store,
            recorder,
            telemetry,
            chain,
            options,
            stream,
        } = params;

        Self {
            verifier,
            store,
            recorder,
            telemetry,
            chain,
            options,
            stream,
        }
    }

    /// Settles every item in the page. Returns once all per-item tasks have
    /// reached a terminal state; never fails.
    pub async fn dispatch(self: &Arc<Self>, items: Vec<CorrelatedItem>) {
        let mut handles = Vec::with_capacity(items.len());

        for item in items {
            let id = item.id().to_owned();
            let submitter = item.submitter().to_owned();
            let dispatcher = Arc::clone(self);
            let handle = tokio::spawn(async move { dispatcher.settle_item(item).await });
            handles.push((id, submitter, handle));
        }

        let joined = join_all(
            handles
                .into_iter()
                .map(|(id, submitter, handle)| async move { (id, submitter, handle.await) }),
        )
        .await;

        for (id, submitter, result) in joined {
            if let Err(err) = result {
                // A panicking item task still gets a terminal outcome.
                tracing::error!(item_id = %id, error = %err, "item task panicked");
                let outcome = VerificationOutcome::unknown(&id, format!("item task panicked: {err}"));
                self.telemetry.record_unknown_failure();
                self.finish_outcome(&id, &submitter, outcome).await;
            }
        }
    }

    async fn settle_item(&self, item: CorrelatedItem) {
        match item {
            CorrelatedItem::Malformed {
                id,
                submitter,
                detail,
            } => {
                tracing::info!(item_id = %id, detail = %detail, "item payload malformed; settling as unknown");
                let outcome = VerificationOutcome::unknown(&id, detail);
                self.telemetry.record_unknown_failure();
                self.finish_outcome(&id, &submitter, outcome).await;
            }
            CorrelatedItem::Ready(item) => self.verify_item(item).await,
        }
    }

    async fn verify_item(&self, item: ReadyItem) {
        let id = item.id.clone();
        let submitter = item.submitter.clone();
        let event_timestamp = item.publication.event.timestamp;

        let outcome = match self.verifier.verify(&item, &self.chain, self.options).await {
            Ok(ProofVerdict::Valid(verified)) => {
                self.telemetry.record_verified_item();
                VerificationOutcome::success(&id, verified)
            }
            Ok(ProofVerdict::Invalid(reason)) => {
                self.telemetry.record_failed_item();
                VerificationOutcome::failure(&id, reason, Some(item.publication))
            }
            Err(err) => {
                self.telemetry.record_unknown_failure();
                VerificationOutcome::unknown(&id, format!("{err:#}"))
            }
        };

        match &outcome.failure_reason {
            None => {
                tracing::info!(item_id = %id, event_timestamp, "OK");
            }
            Some(reason) => {
                tracing::info!(item_id = %id, event_timestamp, %reason, "FAILED");
            }
        }

        self.finish_outcome(&id, &submitter, outcome).await;
    }

    /// Persists an outcome, routes failures to the recorder without awaiting
    /// the append, and pushes to the stream sink after persistence.
    async fn finish_outcome(&self, id: &str, submitter: &str, outcome: VerificationOutcome) {
        if let Err(err) = self.store.save_result(id, &outcome).await {
            tracing::error!(item_id = %id, error = %err, "failed to persist verification outcome");
        }

        if let Some(record) = outcome.failed_record(submitter) {
            self.recorder.record(record);
        }

        if let Some(stream) = &self.stream {
            tracing::debug!(item_id = %id, "streaming verification outcome");
            stream(&outcome);
        }
    }
}
