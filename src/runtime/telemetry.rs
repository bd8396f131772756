use crate::runtime::progress::WatcherProgress;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Lightweight rolling counters used to derive runtime metrics.
#[derive(Default, Debug)]
pub struct Telemetry {
    items_verified: AtomicU64,
    items_failed: AtomicU64,
    unknown_failures: AtomicU64,
    provider_timeouts: AtomicU64,
    records_appended: AtomicU64,
    record_write_errors: AtomicU64,
}

impl Telemetry {
    pub fn record_verified_item(&self) {
        self.items_verified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_item(&self) {
        self.items_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unknown_failure(&self) {
        self.unknown_failures.fetch_add(1, Ordering::Relaxed);
        self.items_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_provider_timeout(&self) {
        self.provider_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_appended_record(&self) {
        self.records_appended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_record_write_error(&self) {
        self.record_write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            items_verified: self.items_verified.load(Ordering::Relaxed),
            items_failed: self.items_failed.load(Ordering::Relaxed),
            unknown_failures: self.unknown_failures.load(Ordering::Relaxed),
            provider_timeouts: self.provider_timeouts.load(Ordering::Relaxed),
            records_appended: self.records_appended.load(Ordering::Relaxed),
            record_write_errors: self.record_write_errors.load(Ordering::Relaxed),
        }
    }

    pub fn items_verified(&self) -> u64 {
        self.items_verified.load(Ordering::Relaxed)
    }

    pub fn items_failed(&self) -> u64 {
        self.items_failed.load(Ordering::Relaxed)
    }

    pub fn provider_timeouts(&self) -> u64 {
        self.provider_timeouts.load(Ordering::Relaxed)
    }

    pub fn records_appended(&self) -> u64 {
        self.records_appended.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Copy, Clone)]
pub struct TelemetrySnapshot {
    pub items_verified: u64,
    pub items_failed: u64,
    pub unknown_failures: u64,
    pub provider_timeouts: u64,
    pub records_appended: u64,
    pub record_write_errors: u64,
}

/// Spawns a background task that periodically logs throughput, processed
/// pages, and failure counters.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    progress: Arc<WatcherProgress>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "proofwatch::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current_snapshot = telemetry.snapshot();
                    let verified_delta = current_snapshot
                        .items_verified
                        .saturating_sub(last_snapshot.items_verified);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        verified_delta as f64 / elapsed
                    };

                    tracing::info!(
                        target: "proofwatch::metrics",
                        throughput = format!("{throughput:.2}"),
                        pages_processed = progress.pages_processed(),
                        items_verified = current_snapshot.items_verified,
                        items_failed = current_snapshot.items_failed,
                        unknown_failures = current_snapshot.unknown_failures,
                        provider_timeouts = current_snapshot.provider_timeouts,
                        records_appended = current_snapshot.records_appended,
                        record_write_errors = current_snapshot.record_write_errors,
                        "runtime metrics snapshot"
                    );

                    last_snapshot = current_snapshot;
                    last_tick = Instant::now();
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test]
    async fn telemetry_records_counters() {
        let telemetry = Telemetry::default();
        telemetry.record_verified_item();
        telemetry.record_verified_item();
        telemetry.record_failed_item();
        telemetry.record_unknown_failure();
        telemetry.record_provider_timeout();
        telemetry.record_appended_record();
        telemetry.record_record_write_error();

        let snapshot = telemetry.snapshot();
        assert_eq!(snapshot.items_verified, 2);
        assert_eq!(snapshot.items_failed, 2);
        assert_eq!(snapshot.unknown_failures, 1);
        assert_eq!(snapshot.provider_timeouts, 1);
        assert_eq!(snapshot.records_appended, 1);
        assert_eq!(snapshot.record_write_errors, 1);
    }

    #[tokio::test]
    async fn metrics_reporter_logs_until_shutdown() {
        let telemetry = Arc::new(Telemetry::default());
        telemetry.record_verified_item();
        let progress = Arc::new(WatcherProgress::new());
        progress.mark_page(Some("cursor-1"));

        let shutdown = CancellationToken::new();
        let handle = spawn_metrics_reporter(
            telemetry,
            progress,
            shutdown.clone(),
            Duration::from_millis(10),
        );

        shutdown.cancel();
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("reporter should stop promptly")
            .expect("task should not panic");
    }
}
