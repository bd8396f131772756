//! The top-level polling driver.
//!
//! `Watcher` wires the collaborators, loads the last checkpoint, and runs the
//! fetch → correlate → dispatch → advance loop until its cancellation token
//! fires. A single iteration can fail in many ways (provider timeout, feed
//! fault, checkpoint write error); none of them terminate the loop. The one
//! fatal condition is a checkpoint *load* error at startup.

use crate::model::feed::Checkpoint;
use crate::runtime::config::WatcherConfig;
use crate::runtime::contracts::{
    BulkContentProvider, FeedProvider, ProofVerifier, StreamSink, VerifyOptions, WatcherStore,
};
use crate::runtime::progress::WatcherProgress;
use crate::runtime::telemetry::{self, Telemetry};
use crate::watcher::backoff::{retry_with_backoff, sleep_cancellable, RetryBackoff};
use crate::watcher::correlator::Correlator;
use crate::watcher::dispatcher::{Dispatcher, DispatcherParams};
use crate::watcher::recorder::{FailureRecorder, RecorderHandle};
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// External collaborators consumed by the watcher.
pub struct Collaborators {
    pub feed: Arc<dyn FeedProvider>,
    pub content: Arc<dyn BulkContentProvider>,
    pub verifier: Arc<dyn ProofVerifier>,
    pub store: Arc<dyn WatcherStore>,
    pub stream: Option<StreamSink>,
}

pub struct Watcher {
    config: WatcherConfig,
    collaborators: Collaborators,
    telemetry: Arc<Telemetry>,
    progress: Arc<WatcherProgress>,
    shutdown_root: CancellationToken,
    running: bool,
    loop_handle: Option<JoinHandle<()>>,
    metrics_handle: Option<JoinHandle<()>>,
    recorder_handle: Option<RecorderHandle>,
    run_token: Option<CancellationToken>,
}

struct LoopContext {
    config: WatcherConfig,
    feed: Arc<dyn FeedProvider>,
    correlator: Correlator,
    dispatcher: Arc<Dispatcher>,
    store: Arc<dyn WatcherStore>,
    telemetry: Arc<Telemetry>,
    progress: Arc<WatcherProgress>,
}

impl Watcher {
    /// Creates a watcher with its own root cancellation token. Use
    /// [`Self::with_cancellation_token`] to integrate with an existing
    /// shutdown mechanism.
    pub fn new(config: WatcherConfig, collaborators: Collaborators) -> Self {
        Self::with_cancellation_token(config, collaborators, CancellationToken::new())
    }

    pub fn with_cancellation_token(
        config: WatcherConfig,
        collaborators: Collaborators,
        shutdown_root: CancellationToken,
    ) -> Self {
        Self {
            config,
            collaborators,
            telemetry: Arc::new(Telemetry::default()),
            progress: Arc::new(WatcherProgress::new()),
            shutdown_root,
            running: false,
            loop_handle: None,
            metrics_handle: None,
            recorder_handle: None,
            run_token: None,
        }
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Returns a clone of the telemetry handle for observability.
    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    /// Running count of fully processed pages and last persisted checkpoint.
    pub fn progress(&self) -> Arc<WatcherProgress> {
        self.progress.clone()
    }

    /// Replaces the root shutdown token. Must only be called while idle.
    pub fn replace_shutdown_root(&mut self, shutdown: CancellationToken) {
        debug_assert!(
            !self.running,
            "shutdown token should not change while the watcher is running"
        );
        self.shutdown_root = shutdown;
    }

    /// Loads the last checkpoint and spawns the recorder, metrics reporter,
    /// and polling loop.
    ///
    /// A checkpoint *read* failure here is the one fatal startup condition; a
    /// missing checkpoint is not an error and polling starts from the
    /// beginning of the feed.
    pub async fn start(&mut self) -> Result<()> {
        if self.running {
            bail!("watcher already running");
        }

        debug_assert!(
            self.config.validate().is_ok(),
            "WatcherConfig should have been validated at construction time"
        );

        let checkpoint = Checkpoint::from_stored(
            self.collaborators
                .store
                .load_last_checkpoint()
                .await
                .context("failed to load last checkpoint")?,
        );

        tracing::info!(
            environment = self.config.environment(),
            deployment = self.config.deployment(),
            checkpoint = ?checkpoint.as_key(),
            "starting verification watcher"
        );

        let run_token = self.shutdown_root.child_token();

        let (recorder, recorder_handle) =
            FailureRecorder::spawn(self.collaborators.store.clone(), self.telemetry.clone());

        let metrics_handle = telemetry::spawn_metrics_reporter(
            self.telemetry.clone(),
            self.progress.clone(),
            run_token.clone(),
            self.config.metrics_interval(),
        );

        let dispatcher = Arc::new(Dispatcher::new(DispatcherParams {
            verifier: self.collaborators.verifier.clone(),
            store: self.collaborators.store.clone(),
            recorder,
            telemetry: self.telemetry.clone(),
            chain: self.config.chain_context(),
            options: VerifyOptions {
                verify_pointer: self.config.verify_pointer(),
            },
            stream: self.collaborators.stream.clone(),
        }));

        let context = LoopContext {
            config: self.config.clone(),
            feed: self.collaborators.feed.clone(),
            correlator: Correlator::new(
                self.collaborators.content.clone(),
                self.collaborators.store.clone(),
            ),
            dispatcher,
            store: self.collaborators.store.clone(),
            telemetry: self.telemetry.clone(),
            progress: self.progress.clone(),
        };

        self.loop_handle = Some(Self::spawn_poll_loop(context, checkpoint, run_token.clone()));
        self.metrics_handle = Some(metrics_handle);
        self.recorder_handle = Some(recorder_handle);
        self.run_token = Some(run_token);
        self.running = true;

        Ok(())
    }

    /// Stops the watcher gracefully: cancels the loop, joins every task, and
    /// drains the failure recorder.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }

        tracing::info!("stopping verification watcher");

        if let Some(token) = &self.run_token {
            token.cancel();
        }

        if let Some(handle) = self.loop_handle.take() {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "poll loop task terminated unexpectedly");
            }
        }

        if let Some(handle) = self.metrics_handle.take() {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "metrics reporter task panicked");
            }
        }

        // The loop owned the only dispatcher (and with it the recorder
        // sender); once it is joined the drain completes.
        if let Some(handle) = self.recorder_handle.take() {
            if let Err(err) = handle.drain().await {
                tracing::warn!(error = %err, "failure recorder task panicked");
            }
        }

        self.run_token = None;
        self.running = false;

        Ok(())
    }

    fn spawn_poll_loop(
        context: LoopContext,
        checkpoint: Checkpoint,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut checkpoint = checkpoint;

            loop {
                if shutdown.is_cancelled() {
                    break;
                }

                match Self::poll_once(&context, &mut checkpoint, &shutdown).await {
                    Ok(PollOutcome::Processed) => {}
                    Ok(PollOutcome::Idle) => {
                        if sleep_cancellable(context.config.empty_poll_interval(), &shutdown)
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(PollOutcome::Cancelled) => break,
                    Err(err) => {
                        // Any iteration failure is transient: log, back off,
                        // retry with the same checkpoint.
                        tracing::warn!(
                            checkpoint = ?checkpoint.as_key(),
                            error = %err,
                            "iteration failed; backing off"
                        );
                        if sleep_cancellable(context.config.error_backoff(), &shutdown)
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }

            tracing::info!(
                pages_processed = context.progress.pages_processed(),
                "poll loop stopped"
            );
        })
    }

    async fn poll_once(
        context: &LoopContext,
        checkpoint: &mut Checkpoint,
        shutdown: &CancellationToken,
    ) -> Result<PollOutcome> {
        let page = tokio::select! {
            _ = shutdown.cancelled() => return Ok(PollOutcome::Cancelled),
            page = context.feed.fetch_page(
                context.config.environment(),
                context.config.deployment(),
                checkpoint,
            ) => match page {
                Ok(page) => page,
                Err(err) => {
                    if err.is_timeout() {
                        context.telemetry.record_provider_timeout();
                    }
                    return Err(err.into());
                }
            },
        };

        if page.is_empty() {
            tracing::debug!("no new submissions found");
            return Ok(PollOutcome::Idle);
        }

        tracing::info!(entries = page.entries.len(), "found new submissions");

        let items = match context.correlator.correlate(&page).await {
            Ok(items) => items,
            Err(err) => {
                if err.is_timeout() {
                    context.telemetry.record_provider_timeout();
                }
                return Err(err.into());
            }
        };

        context.dispatcher.dispatch(items).await;

        // Every item has settled; the page is fully processed. Persisting the
        // cursor is retried rather than re-fetching the page: downstream
        // writes are idempotent, so losing this race to a crash only costs one
        // page of reprocessing.
        if let Some(end_cursor) = page.end_cursor.clone() {
            let store = context.store.as_ref();
            let cursor = end_cursor.as_str();
            let persisted = retry_with_backoff(
                RetryBackoff::new(
                    context.config.error_backoff(),
                    context.config.checkpoint_retry_max_backoff(),
                ),
                shutdown,
                move |_| async move {
                    store
                        .save_checkpoint(cursor)
                        .await
                        .context("failed to persist checkpoint")
                },
                |attempt, backoff, err| {
                    tracing::warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "checkpoint persistence failed; retrying"
                    );
                },
            )
            .await;

            if persisted.is_err() {
                // Only cancellation breaks the retry loop.
                return Ok(PollOutcome::Cancelled);
            }
        }

        checkpoint.advance(page.end_cursor.clone());
        context.progress.mark_page(page.end_cursor.as_deref());
        tracing::info!(
            completed_pages = context.progress.pages_processed(),
            checkpoint = ?checkpoint.as_key(),
            "page fully processed"
        );

        Ok(PollOutcome::Processed)
    }
}

enum PollOutcome {
    Processed,
    Idle,
    Cancelled,
}
