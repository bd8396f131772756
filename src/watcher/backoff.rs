use anyhow::{anyhow, Result};
use std::time::Duration;
use tokio::task::yield_now;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Backoff policy for operations retried until they succeed or the run is
/// cancelled. The polling loop never gives up on its own; cancellation is the
/// only exit.
#[derive(Clone, Copy)]
pub(crate) struct RetryBackoff {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryBackoff {
    pub(crate) fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
        }
    }
}

/// Retries `operation` with capped exponential backoff until it succeeds or
/// `cancellation` fires. Every failed attempt is reported through `on_retry`.
pub(crate) async fn retry_with_backoff<T, F, Fut, L>(
    config: RetryBackoff,
    cancellation: &CancellationToken,
    mut operation: F,
    mut on_retry: L,
) -> Result<T>
where
    F: FnMut(usize) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
    L: FnMut(usize, Duration, &anyhow::Error),
{
    let mut attempt = 0;
    let mut backoff = config.initial_delay;

    loop {
        if cancellation.is_cancelled() {
            return Err(anyhow!("retry cancelled"));
        }

        attempt += 1;

        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                on_retry(attempt, backoff, &err);
                sleep_cancellable(backoff, cancellation).await?;
                backoff = next_backoff(backoff, config.max_delay);
            }
        }
    }
}

/// Sleeps for `delay` unless the token fires first, in which case an error is
/// returned so callers unwind out of their loops.
pub(crate) async fn sleep_cancellable(
    delay: Duration,
    cancellation: &CancellationToken,
) -> Result<()> {
    if delay.is_zero() {
        yield_now().await;
        return Ok(());
    }

    tokio::select! {
        _ = cancellation.cancelled() => Err(anyhow!("sleep cancelled")),
        _ = sleep(delay) => Ok(()),
    }
}

fn next_backoff(current: Duration, max_backoff: Duration) -> Duration {
    if current.is_zero() {
        return max_backoff.min(Duration::from_millis(1));
    }

    let mut next = current.saturating_mul(2);
    if next > max_backoff {
        next = max_backoff;
    }
    next
}
